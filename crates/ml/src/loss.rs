use crate::recorder::Recorder;
use crate::tensor::{Tensor, TensorStore};

/// Mean squared error over every element.
pub fn l2_loss(
    pred: &Tensor,
    target: &Tensor,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Tensor {
    let diff = pred.sub(target, recorder, tensors);
    let sq = diff.pow(2.0, recorder, tensors);
    sq.reduce_mean(recorder, tensors)
}

/// [`l2_loss`] on plain slices, for evaluation passes.
#[must_use]
pub fn l2_loss_value(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(pred.len(), target.len());
    let n = pred.len();
    let sum: f32 = pred.iter().zip(target).map(|(&p, &t)| (p - t).powi(2)).sum();
    sum / n as f32
}

/// Gradient of [`l2_loss_value`] with respect to `pred`.
#[must_use]
pub fn l2_loss_grad(pred: &[f32], target: &[f32]) -> Vec<f32> {
    let scale = 2.0 / pred.len() as f32;
    pred.iter().zip(target).map(|(&p, &t)| scale * (p - t)).collect()
}
