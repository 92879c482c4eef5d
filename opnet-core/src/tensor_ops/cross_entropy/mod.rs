//! Cross entropy against soft (probability) labels:
//! `Y[i] = sum_j -label[i, j] * ln(max(X[i, j], 1e-20))`.

mod cpu_kernel;

use super::same_shape;
use crate::{
    dtypes::Dtype,
    gradients::{Blobs, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    shapes::Shape,
    tensor::{Blob, Cpu, Error, Tensor},
};

pub trait CrossEntropyKernel<E: Dtype> {
    fn forward(&self, n: usize, x: &Tensor<E>, label: &Tensor<E>) -> Result<Tensor<E>, Error>;

    fn backward(
        &self,
        n: usize,
        x: &Tensor<E>,
        label: &Tensor<E>,
        grad_out: &Tensor<E>,
    ) -> Result<Tensor<E>, Error>;
}

/// Number of rows: the first axis, or one row for rank 1 inputs.
fn rows<E: Dtype>(x: &Tensor<E>, label: &Tensor<E>) -> Result<usize, Error> {
    same_shape("CrossEntropy", x, label)?;
    match x.shape().ndim() {
        0 => Err(Error::invalid_arg("X", "expected at least one dimension")),
        1 => Ok(1),
        _ => Ok(x.shape()[0]),
    }
}

/// Per-row cross entropy of probabilities `x` against soft labels `label`.
/// Returns a tensor of shape `[N]`.
pub fn try_cross_entropy<E: Dtype, D: CrossEntropyKernel<E>>(
    device: &D,
    x: &Tensor<E>,
    label: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    let n = rows(x, label)?;
    device.forward(n, x, label)
}

/// Gradient of [try_cross_entropy] with respect to `x`.
pub fn try_cross_entropy_grad<E: Dtype, D: CrossEntropyKernel<E>>(
    device: &D,
    x: &Tensor<E>,
    label: &Tensor<E>,
    grad_out: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    let n = rows(x, label)?;
    if grad_out.shape() != &Shape::from([n]) {
        return Err(Error::ShapeMismatch {
            op: "CrossEntropyGradient",
            lhs: grad_out.shape().clone(),
            rhs: Shape::from([n]),
        });
    }
    device.backward(n, x, label, grad_out)
}

#[derive(Debug, Clone)]
pub struct CrossEntropyOp {
    device: Cpu,
}

impl Operator for CrossEntropyOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let y = try_cross_entropy(&self.device, inputs[0].as_f32()?, inputs[1].as_f32()?)?;
        Ok(vec![y.into()])
    }
}

#[derive(Debug, Clone)]
pub struct CrossEntropyGradientOp {
    device: Cpu,
}

impl Operator for CrossEntropyGradientOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let dx = try_cross_entropy_grad(
            &self.device,
            inputs[0].as_f32()?,
            inputs[1].as_f32()?,
            inputs[2].as_f32()?,
        )?;
        Ok(vec![dx.into()])
    }
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let b = Blobs(def);
    Ok(GradientOps::single(
        def,
        "CrossEntropyGradient",
        vec![b.input(0), b.input(1), b.output_grad(0)],
        &[0],
    ))
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "CrossEntropy",
        OperatorEntry {
            schema: OpSchema::new(2, 1),
            create: |_, device| {
                Ok(Box::new(CrossEntropyOp {
                    device: device.clone(),
                }))
            },
            gradient: Some(gradient),
        },
    );
    registry.register(
        "CrossEntropyGradient",
        OperatorEntry {
            schema: OpSchema::new(3, 1),
            create: |_, device| {
                Ok(Box::new(CrossEntropyGradientOp {
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
    fn test_cross_entropy_soft_labels() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_vec([2, 2], vec![0.25, 0.75, 0.5, 0.5]).unwrap();
        let label: Tensor<TestDtype> =
            Tensor::from_vec([2, 2], vec![0.5, 0.5, 1.0, 0.0]).unwrap();
        let y = try_cross_entropy(&dev, &x, &label).unwrap();
        assert_eq!(y.shape().dims(), &[2]);
        assert_close!(
            y.as_slice(),
            [0.5 * 1.3862944 + 0.5 * 0.2876821, 0.6931472],
            1e-6
        );
    }

    #[test]
    fn test_cross_entropy_rank_1_is_one_row() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_vec([2], vec![0.0, 1.0]).unwrap();
        let label: Tensor<TestDtype> = Tensor::from_vec([2], vec![0.0, 1.0]).unwrap();
        let y = try_cross_entropy(&dev, &x, &label).unwrap();
        assert_eq!(y.shape().dims(), &[1]);
        // zero probability with zero label contributes nothing despite ln(0)
        assert_close!(y.as_slice(), [0.0]);
    }

    #[test]
    fn test_cross_entropy_grad() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_vec([1, 2], vec![0.25, 0.5]).unwrap();
        let label: Tensor<TestDtype> = Tensor::from_vec([1, 2], vec![0.5, 1.0]).unwrap();
        let g: Tensor<TestDtype> = Tensor::from_vec([1], vec![3.0]).unwrap();
        let dx = try_cross_entropy_grad(&dev, &x, &label, &g).unwrap();
        assert_close!(dx.as_slice(), [-6.0, -6.0]);
    }

    #[test]
    fn test_cross_entropy_shape_errors() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([2, 2]);
        let label: Tensor<TestDtype> = Tensor::zeros([2, 3]);
        assert!(try_cross_entropy(&dev, &x, &label).is_err());
        let g: Tensor<TestDtype> = Tensor::zeros([3]);
        assert!(try_cross_entropy_grad(&dev, &x, &x, &g).is_err());
    }
}
