//! Cross entropy against integer class labels:
//! `Y[i] = -ln(max(X[i, label[i]], 1e-20))`.

mod cpu_kernel;

use crate::{
    dtypes::Dtype,
    gradients::{Blobs, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    shapes::Shape,
    tensor::{Blob, Cpu, Error, Tensor},
};

pub trait LabelCrossEntropyKernel<E: Dtype> {
    fn forward(&self, x: &Tensor<E>, label: &Tensor<i32>) -> Result<Tensor<E>, Error>;

    fn backward(
        &self,
        x: &Tensor<E>,
        label: &Tensor<i32>,
        grad_out: &Tensor<E>,
    ) -> Result<Tensor<E>, Error>;
}

/// Checks `x` is `N x D` (or `D`, one row) and `label` holds `N` labels in
/// `[0, D)`. Returns `(N, D)`.
fn check_inputs<E: Dtype>(x: &Tensor<E>, label: &Tensor<i32>) -> Result<(usize, usize), Error> {
    let (n, d) = match x.shape().dims() {
        [d] => (1, *d),
        [n, d] => (*n, *d),
        _ => {
            return Err(Error::invalid_arg(
                "X",
                format!("expected a 1 or 2 dimensional input, got {}", x.shape()),
            ))
        }
    };
    let label_ok = match label.shape().dims() {
        [m] => *m == n,
        [m, 1] => *m == n,
        _ => false,
    };
    if !label_ok {
        return Err(Error::ShapeMismatch {
            op: "LabelCrossEntropy",
            lhs: label.shape().clone(),
            rhs: Shape::from([n]),
        });
    }
    if let Some(&bad) = label.as_slice().iter().find(|&&l| l < 0 || l as usize >= d) {
        return Err(Error::LabelOutOfRange {
            label: bad,
            classes: d,
        });
    }
    Ok((n, d))
}

/// Per-row negative log probability of the labelled class. Returns `[N]`.
pub fn try_label_cross_entropy<E: Dtype, D: LabelCrossEntropyKernel<E>>(
    device: &D,
    x: &Tensor<E>,
    label: &Tensor<i32>,
) -> Result<Tensor<E>, Error> {
    check_inputs(x, label)?;
    device.forward(x, label)
}

/// Gradient of [try_label_cross_entropy] with respect to `x`.
pub fn try_label_cross_entropy_grad<E: Dtype, D: LabelCrossEntropyKernel<E>>(
    device: &D,
    x: &Tensor<E>,
    label: &Tensor<i32>,
    grad_out: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    let (n, _) = check_inputs(x, label)?;
    if grad_out.num_elements() != n {
        return Err(Error::ShapeMismatch {
            op: "LabelCrossEntropyGradient",
            lhs: grad_out.shape().clone(),
            rhs: Shape::from([n]),
        });
    }
    device.backward(x, label, grad_out)
}

#[derive(Debug, Clone)]
pub struct LabelCrossEntropyOp {
    device: Cpu,
}

impl Operator for LabelCrossEntropyOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let y = try_label_cross_entropy(&self.device, inputs[0].as_f32()?, inputs[1].as_i32()?)?;
        Ok(vec![y.into()])
    }
}

#[derive(Debug, Clone)]
pub struct LabelCrossEntropyGradientOp {
    device: Cpu,
}

impl Operator for LabelCrossEntropyGradientOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let dx = try_label_cross_entropy_grad(
            &self.device,
            inputs[0].as_f32()?,
            inputs[1].as_i32()?,
            inputs[2].as_f32()?,
        )?;
        Ok(vec![dx.into()])
    }
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let b = Blobs(def);
    Ok(GradientOps::single(
        def,
        "LabelCrossEntropyGradient",
        vec![b.input(0), b.input(1), b.output_grad(0)],
        &[0],
    ))
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "LabelCrossEntropy",
        OperatorEntry {
            schema: OpSchema::new(2, 1),
            create: |_, device| {
                Ok(Box::new(LabelCrossEntropyOp {
                    device: device.clone(),
                }))
            },
            gradient: Some(gradient),
        },
    );
    registry.register(
        "LabelCrossEntropyGradient",
        OperatorEntry {
            schema: OpSchema::new(3, 1),
            create: |_, device| {
                Ok(Box::new(LabelCrossEntropyGradientOp {
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
    fn test_label_cross_entropy() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> =
            Tensor::from_vec([2, 3], vec![0.2, 0.3, 0.5, 0.1, 0.8, 0.1]).unwrap();
        let label = Tensor::from_vec([2], vec![2, 1]).unwrap();
        let y = try_label_cross_entropy(&dev, &x, &label).unwrap();
        assert_close!(y.as_slice(), [0.6931472, 0.22314355], 1e-6);

        let g: Tensor<TestDtype> = Tensor::from_vec([2], vec![1.0, 2.0]).unwrap();
        let dx = try_label_cross_entropy_grad(&dev, &x, &label, &g).unwrap();
        assert_close!(dx.as_slice(), [0.0, 0.0, -2.0, 0.0, -2.5, 0.0], 1e-6);
    }

    #[test]
    fn test_label_cross_entropy_accepts_column_labels() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_vec([1, 2], vec![0.5, 0.5]).unwrap();
        let label = Tensor::from_vec([1, 1], vec![0]).unwrap();
        let y = try_label_cross_entropy(&dev, &x, &label).unwrap();
        assert_close!(y.as_slice(), [std::f32::consts::LN_2], 1e-6);
    }

    #[test]
    fn test_label_out_of_range() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([1, 2]);
        let label = Tensor::from_vec([1], vec![2]).unwrap();
        assert!(matches!(
            try_label_cross_entropy(&dev, &x, &label),
            Err(Error::LabelOutOfRange {
                label: 2,
                classes: 2
            })
        ));
        let label = Tensor::from_vec([1], vec![-1]).unwrap();
        assert!(try_label_cross_entropy(&dev, &x, &label).is_err());
    }
}
