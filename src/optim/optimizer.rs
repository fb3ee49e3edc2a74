//! Optimizer trait and parameter groups

use crate::nn::Parameter;

/// Hyperparameters shared by a subset of the model's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub lr: f32,
    pub weight_decay: f32,
    /// Indices into the model's parameter list (`None` = every parameter)
    pub params: Option<Vec<usize>>,
}

impl ParamGroup {
    /// Group covering every parameter
    pub fn all(lr: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            weight_decay,
            params: None,
        }
    }

    pub fn with_params(lr: f32, weight_decay: f32, params: Vec<usize>) -> Self {
        Self {
            lr,
            weight_decay,
            params: Some(params),
        }
    }

    /// Parameter indices covered by this group
    pub fn indices(&self, num_params: usize) -> Vec<usize> {
        match &self.params {
            Some(indices) => indices
                .iter()
                .copied()
                .filter(|&i| i < num_params)
                .collect(),
            None => (0..num_params).collect(),
        }
    }
}

/// Optimizers that need second-order information from the backward pass
///
/// Implemented only by optimizers that consume curvature estimates; the
/// training loop asks for a retained graph when an optimizer exposes it via
/// [`Optimizer::as_second_order`].
pub trait SecondOrder {
    /// Exponent applied to the Hessian diagonal estimate
    fn hessian_power(&self) -> f32;
}

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Parameter]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Parameter]) {
        for param in params {
            param.zero_grad();
        }
    }

    fn param_groups(&self) -> &[ParamGroup];

    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// Learning rate of the first parameter group
    fn lr(&self) -> f32 {
        self.param_groups().first().map_or(0.0, |g| g.lr)
    }

    /// Set learning rate on every group
    fn set_lr(&mut self, lr: f32) {
        for group in self.param_groups_mut() {
            group.lr = lr;
        }
    }

    /// Second-order capability, if this optimizer has it
    fn as_second_order(&self) -> Option<&dyn SecondOrder> {
        None
    }
}

/// Split parameters into `[no_decay, decay]` groups
///
/// One-dimensional parameters, biases and names in `skip` get no weight decay.
pub fn param_groups_weight_decay(
    params: &[Parameter],
    lr: f32,
    weight_decay: f32,
    skip: &[&str],
) -> Vec<ParamGroup> {
    let mut no_decay = Vec::new();
    let mut decay = Vec::new();
    for (i, p) in params.iter().enumerate() {
        if !p.requires_grad() {
            continue;
        }
        if p.shape().len() <= 1 || p.name().ends_with(".bias") || skip.contains(&p.name()) {
            no_decay.push(i);
        } else {
            decay.push(i);
        }
    }
    vec![
        ParamGroup::with_params(lr, 0.0, no_decay),
        ParamGroup::with_params(lr, weight_decay, decay),
    ]
}
