//! Binary cross entropy on logits, averaged over the last axis.
//!
//! For logits `x` and targets `z` the per-element loss is
//! `max(x, 0) - x * z + ln(1 + exp(-|x|))`, which equals
//! `-z * ln(sigmoid(x)) - (1 - z) * ln(1 - sigmoid(x))` without overflowing
//! for large `|x|`.

mod cpu_kernel;

use super::same_shape;
use crate::{
    dtypes::Dtype,
    gradients::{Blobs, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    tensor::{Blob, Cpu, Error, Tensor},
};

pub trait SigmoidCrossEntropyKernel<E: Dtype> {
    fn forward(&self, logits: &Tensor<E>, targets: &Tensor<E>) -> Result<Tensor<E>, Error>;

    fn backward(
        &self,
        grad_out: &Tensor<E>,
        logits: &Tensor<E>,
        targets: &Tensor<E>,
    ) -> Result<Tensor<E>, Error>;
}

fn check_inputs<E: Dtype>(logits: &Tensor<E>, targets: &Tensor<E>) -> Result<(), Error> {
    same_shape("SigmoidCrossEntropyWithLogits", logits, targets)?;
    match logits.shape().dims().last() {
        Some(&inner) if inner > 0 => Ok(()),
        _ => Err(Error::invalid_arg(
            "logits",
            format!(
                "expected at least one dimension with a non-zero last axis, got {}",
                logits.shape()
            ),
        )),
    }
}

/// Mean sigmoid cross entropy over the last axis. The result has the shape
/// of `logits` without its last axis; rank 1 logits give a scalar.
pub fn try_sigmoid_cross_entropy_with_logits<E: Dtype, D: SigmoidCrossEntropyKernel<E>>(
    device: &D,
    logits: &Tensor<E>,
    targets: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    check_inputs(logits, targets)?;
    device.forward(logits, targets)
}

/// Gradient of [try_sigmoid_cross_entropy_with_logits] with respect to the
/// logits, given the gradient of its output.
pub fn try_sigmoid_cross_entropy_with_logits_grad<E: Dtype, D: SigmoidCrossEntropyKernel<E>>(
    device: &D,
    grad_out: &Tensor<E>,
    logits: &Tensor<E>,
    targets: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    check_inputs(logits, targets)?;
    let out_shape = logits.shape().remove_dim(logits.shape().ndim() - 1);
    if grad_out.shape() != &out_shape {
        return Err(Error::ShapeMismatch {
            op: "SigmoidCrossEntropyWithLogitsGradient",
            lhs: grad_out.shape().clone(),
            rhs: out_shape,
        });
    }
    device.backward(grad_out, logits, targets)
}

#[derive(Debug, Clone)]
pub struct SigmoidCrossEntropyWithLogitsOp {
    device: Cpu,
}

impl Operator for SigmoidCrossEntropyWithLogitsOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let out = try_sigmoid_cross_entropy_with_logits(
            &self.device,
            inputs[0].as_f32()?,
            inputs[1].as_f32()?,
        )?;
        Ok(vec![out.into()])
    }
}

#[derive(Debug, Clone)]
pub struct SigmoidCrossEntropyWithLogitsGradientOp {
    device: Cpu,
}

impl Operator for SigmoidCrossEntropyWithLogitsGradientOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let grad = try_sigmoid_cross_entropy_with_logits_grad(
            &self.device,
            inputs[0].as_f32()?,
            inputs[1].as_f32()?,
            inputs[2].as_f32()?,
        )?;
        Ok(vec![grad.into()])
    }
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let b = Blobs(def);
    Ok(GradientOps::single(
        def,
        "SigmoidCrossEntropyWithLogitsGradient",
        vec![b.output_grad(0), b.input(0), b.input(1)],
        &[0],
    ))
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "SigmoidCrossEntropyWithLogits",
        OperatorEntry {
            schema: OpSchema::new(2, 1),
            create: |_, device| {
                Ok(Box::new(SigmoidCrossEntropyWithLogitsOp {
                    device: device.clone(),
                }))
            },
            gradient: Some(gradient),
        },
    );
    registry.register(
        "SigmoidCrossEntropyWithLogitsGradient",
        OperatorEntry {
            schema: OpSchema::new(3, 1),
            create: |_, device| {
                Ok(Box::new(SigmoidCrossEntropyWithLogitsGradientOp {
                    device: device.clone(),
                }))
            },
            gradient: None,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn test_sigmoid_xent_2d() {
        let dev: TestDevice = Default::default();
        let logits: Tensor<TestDtype> =
            Tensor::from_vec([2, 2], vec![0.5, -1.0, 2.0, 0.0]).unwrap();
        let targets: Tensor<TestDtype> =
            Tensor::from_vec([2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let out = try_sigmoid_cross_entropy_with_logits(&dev, &logits, &targets).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        // row 0: -ln(sigmoid(0.5)), -ln(1 - sigmoid(-1))
        // row 1: -ln(1 - sigmoid(2)), -ln(sigmoid(0))
        assert_close!(
            out.as_slice(),
            [(0.474077 + 0.313262) / 2.0, (2.126928 + 0.693147) / 2.0],
            1e-5
        );
    }

    #[test]
    fn test_sigmoid_xent_1d_is_scalar() {
        let dev: TestDevice = Default::default();
        let logits: Tensor<TestDtype> = Tensor::from_vec([3], vec![0.0, 0.0, 0.0]).unwrap();
        let targets: Tensor<TestDtype> = Tensor::from_vec([3], vec![1.0, 0.0, 1.0]).unwrap();
        let out = try_sigmoid_cross_entropy_with_logits(&dev, &logits, &targets).unwrap();
        assert_eq!(out.shape().ndim(), 0);
        assert_close!(out.as_slice(), [std::f32::consts::LN_2], 1e-6);
    }

    #[test]
    fn test_sigmoid_xent_large_logits_are_finite() {
        let dev: TestDevice = Default::default();
        let logits: Tensor<TestDtype> = Tensor::from_vec([2], vec![100.0, -100.0]).unwrap();
        let targets: Tensor<TestDtype> = Tensor::from_vec([2], vec![0.0, 1.0]).unwrap();
        let out = try_sigmoid_cross_entropy_with_logits(&dev, &logits, &targets).unwrap();
        assert_close!(out.as_slice(), [100.0], 1e-4);
    }

    #[test]
    fn test_sigmoid_xent_grad() {
        let dev: TestDevice = Default::default();
        let logits: Tensor<TestDtype> = Tensor::from_vec([1, 2], vec![0.0, 1.0]).unwrap();
        let targets: Tensor<TestDtype> = Tensor::from_vec([1, 2], vec![1.0, 0.0]).unwrap();
        let g: Tensor<TestDtype> = Tensor::from_vec([1], vec![2.0]).unwrap();
        let dx =
            try_sigmoid_cross_entropy_with_logits_grad(&dev, &g, &logits, &targets).unwrap();
        // -g * (z - sigmoid(x)) / 2
        assert_close!(dx.as_slice(), [-0.5, 0.7310586], 1e-6);
    }

    #[test]
    fn test_sigmoid_xent_rejects_bad_shapes() {
        let dev: TestDevice = Default::default();
        let a: Tensor<TestDtype> = Tensor::zeros([2, 3]);
        let b: Tensor<TestDtype> = Tensor::zeros([3, 2]);
        assert!(matches!(
            try_sigmoid_cross_entropy_with_logits(&dev, &a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
        let s: Tensor<TestDtype> = Tensor::scalar(1.0);
        assert!(try_sigmoid_cross_entropy_with_logits(&dev, &s, &s).is_err());
        let g: Tensor<TestDtype> = Tensor::zeros([3]);
        assert!(try_sigmoid_cross_entropy_with_logits_grad(&dev, &g, &a, &a).is_err());
    }
}
