//! Stochastic Gradient Descent optimizer

use super::{Optimizer, ParamGroup};
use crate::nn::Parameter;
use ndarray::ArrayD;
use std::collections::HashMap;

/// SGD optimizer with optional momentum and L2 weight decay
pub struct SGD {
    groups: Vec<ParamGroup>,
    momentum: f32,
    velocities: HashMap<usize, ArrayD<f32>>,
}

impl SGD {
    /// Create a new SGD optimizer over every parameter
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self::with_groups(vec![ParamGroup::all(lr, 0.0)], momentum)
    }

    pub fn with_groups(groups: Vec<ParamGroup>, momentum: f32) -> Self {
        Self {
            groups,
            momentum,
            velocities: HashMap::new(),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Parameter]) {
        let n = params.len();
        for group in &self.groups {
            for i in group.indices(n) {
                let param = &mut params[i];
                let Some(grad) = param.grad() else { continue };
                let mut grad = grad.clone();
                if group.weight_decay > 0.0 {
                    grad.scaled_add(group.weight_decay, param.data());
                }

                let update = if self.momentum > 0.0 {
                    // v = momentum * v + grad
                    let velocity = match self.velocities.remove(&i) {
                        Some(v) => v * self.momentum + &grad,
                        None => grad,
                    };
                    let update = velocity.clone();
                    self.velocities.insert(i, velocity);
                    update
                } else {
                    grad
                };

                param.data_mut().scaled_add(-group.lr, &update);
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
