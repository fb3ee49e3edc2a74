//! AdamW optimizer (Adam with decoupled Weight decay)

use super::{Optimizer, ParamGroup};
use crate::nn::Parameter;
use ndarray::ArrayD;
use std::collections::HashMap;

/// AdamW optimizer
///
/// Weight decay is applied directly to the parameters instead of being folded
/// into the gradient.
///
/// AdamW: θ_t = (1 - lr * λ) * θ_{t-1} - lr * m̂_t / (√v̂_t + ε)
pub struct AdamW {
    groups: Vec<ParamGroup>,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    moments: HashMap<usize, (ArrayD<f32>, ArrayD<f32>)>,
}

impl AdamW {
    /// Create a new AdamW optimizer over every parameter
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self::with_groups(vec![ParamGroup::all(lr, weight_decay)], beta1, beta2, epsilon)
    }

    /// Create AdamW with default parameters (weight_decay = 0.05)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.05)
    }

    pub fn with_groups(groups: Vec<ParamGroup>, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            groups,
            beta1,
            beta2,
            epsilon,
            t: 0,
            moments: HashMap::new(),
        }
    }

    /// Number of steps taken
    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Parameter]) {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let n = params.len();

        for group in &self.groups {
            for i in group.indices(n) {
                let param = &mut params[i];
                let Some(grad) = param.grad().cloned() else { continue };

                let (m, v) = self
                    .moments
                    .entry(i)
                    .or_insert_with(|| (ArrayD::zeros(grad.raw_dim()), ArrayD::zeros(grad.raw_dim())));
                m.zip_mut_with(&grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
                v.zip_mut_with(&grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

                let lr = group.lr;
                let decay = 1.0 - lr * group.weight_decay;
                let data = param.data_mut();
                ndarray::Zip::from(data)
                    .and(&*m)
                    .and(&*v)
                    .for_each(|p, &m, &v| {
                        let m_hat = m / bias1;
                        let v_hat = v / bias2;
                        *p = *p * decay - lr * m_hat / (v_hat.sqrt() + eps);
                    });
            }
        }
    }

    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }
}
