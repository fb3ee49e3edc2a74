//! Gradient norm clipping

use crate::nn::Parameter;

/// Squares accumulate in f64 so large finite gradients do not overflow
fn grad_norm_f64(params: &[Parameter]) -> f64 {
    params
        .iter()
        .filter_map(Parameter::grad)
        .map(|g| g.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

/// Total L2 norm over every parameter gradient
pub fn grad_norm(params: &[Parameter]) -> f32 {
    grad_norm_f64(params) as f32
}

/// Rescale gradients so their total L2 norm is at most `max_norm`
///
/// Returns the norm measured before clipping. Gradients holding NaN or
/// infinity are left untouched so the caller can decide how to handle them.
pub fn clip_grad_norm(params: &mut [Parameter], max_norm: f32) -> f32 {
    let total = grad_norm_f64(params);
    let all_finite = params
        .iter()
        .filter_map(Parameter::grad)
        .all(|g| g.iter().all(|v| v.is_finite()));
    if !all_finite || total <= f64::from(max_norm) {
        return total as f32;
    }
    let coef = f64::from(max_norm) / (total + 1e-6);
    for p in params.iter_mut() {
        if let Some(g) = p.grad_mut() {
            g.mapv_inplace(|v| (f64::from(v) * coef) as f32);
        }
    }
    total as f32
}
