//! Softmax followed by cross entropy against integer labels, fused for
//! numerical stability.
//!
//! Inputs are logits `X`, labels `T` and optional per-sample weights. The
//! outputs are the softmax probabilities `P` (same shape as `X`) and the
//! weighted average loss (a scalar).
//!
//! With `spatial` set, `X` is `N x D x H x W`, `T` is `N x H x W`, the
//! softmax runs over `D` at every `(n, y, x)` location, and the label `-1`
//! marks a location to ignore.

mod cpu_kernel;

use crate::{
    dtypes::Dtype,
    gradients::{Blobs, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    shapes::Shape,
    tensor::{Blob, Cpu, Error, Tensor},
};

/// Label value ignored by the spatial loss.
pub const DONT_CARE: i32 = -1;

/// Arguments of `SoftmaxWithLoss` and its gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftmaxWithLossConfig {
    /// Multiplier applied to the average loss. Defaults to `1.0`.
    pub scale: f64,

    /// Softmax over the channel axis of `N x D x H x W` logits.
    /// Defaults to `false`.
    pub spatial: bool,
}

impl Default for SoftmaxWithLossConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            spatial: false,
        }
    }
}

impl SoftmaxWithLossConfig {
    pub fn from_def(def: &OperatorDef) -> Result<Self, Error> {
        Ok(Self {
            scale: def.single_arg("scale", 1.0f32)? as f64,
            spatial: def.single_arg("spatial", false)?,
        })
    }
}

pub trait SoftmaxWithLossKernel<E: Dtype> {
    /// Returns the probabilities and the scalar average loss.
    fn forward(
        &self,
        cfg: &SoftmaxWithLossConfig,
        logits: &Tensor<E>,
        labels: &Tensor<i32>,
        weights: Option<&Tensor<E>>,
    ) -> Result<(Tensor<E>, Tensor<E>), Error>;

    /// Gradient with respect to the logits, given the forward
    /// probabilities and the gradient of the average loss.
    fn backward(
        &self,
        cfg: &SoftmaxWithLossConfig,
        labels: &Tensor<i32>,
        weights: Option<&Tensor<E>>,
        probs: &Tensor<E>,
        grad_loss: &Tensor<E>,
    ) -> Result<Tensor<E>, Error>;
}

fn check_inputs<E: Dtype>(
    cfg: &SoftmaxWithLossConfig,
    logits: &Tensor<E>,
    labels: &Tensor<i32>,
    weights: Option<&Tensor<E>>,
) -> Result<(), Error> {
    let dims = logits.shape().dims();
    let (classes, label_shape) = if cfg.spatial {
        let [n, d, h, w] = dims else {
            return Err(Error::invalid_arg(
                "X",
                format!("spatial mode expects N x D x H x W logits, got {}", logits.shape()),
            ));
        };
        (*d, Shape::from([*n, *h, *w]))
    } else {
        let [n, d] = dims else {
            return Err(Error::invalid_arg(
                "X",
                format!("expected N x D logits, got {}", logits.shape()),
            ));
        };
        (*d, Shape::from([*n]))
    };

    let labels_match = labels.shape() == &label_shape
        || (!cfg.spatial && labels.shape() == &Shape::from([label_shape[0], 1]));
    if !labels_match {
        return Err(Error::ShapeMismatch {
            op: "SoftmaxWithLoss",
            lhs: labels.shape().clone(),
            rhs: label_shape,
        });
    }

    let bad_label = labels.as_slice().iter().find(|&&l| {
        let ignored = cfg.spatial && l == DONT_CARE;
        !ignored && (l < 0 || l as usize >= classes)
    });
    if let Some(&label) = bad_label {
        return Err(Error::LabelOutOfRange { label, classes });
    }

    if let Some(w) = weights {
        if w.num_elements() != label_shape.num_elements() {
            return Err(Error::ShapeMismatch {
                op: "SoftmaxWithLoss",
                lhs: w.shape().clone(),
                rhs: label_shape,
            });
        }
    }
    Ok(())
}

/// Softmax probabilities of `logits` and the weighted mean cross entropy
/// against `labels`, multiplied by [SoftmaxWithLossConfig::scale].
pub fn try_softmax_with_loss<E: Dtype, D: SoftmaxWithLossKernel<E>>(
    device: &D,
    cfg: &SoftmaxWithLossConfig,
    logits: &Tensor<E>,
    labels: &Tensor<i32>,
    weights: Option<&Tensor<E>>,
) -> Result<(Tensor<E>, Tensor<E>), Error> {
    check_inputs(cfg, logits, labels, weights)?;
    device.forward(cfg, logits, labels, weights)
}

/// Gradient of the average loss of [try_softmax_with_loss] with respect to
/// the logits.
pub fn try_softmax_with_loss_grad<E: Dtype, D: SoftmaxWithLossKernel<E>>(
    device: &D,
    cfg: &SoftmaxWithLossConfig,
    logits: &Tensor<E>,
    labels: &Tensor<i32>,
    weights: Option<&Tensor<E>>,
    probs: &Tensor<E>,
    grad_loss: &Tensor<E>,
) -> Result<Tensor<E>, Error> {
    check_inputs(cfg, logits, labels, weights)?;
    if probs.shape() != logits.shape() {
        return Err(Error::ShapeMismatch {
            op: "SoftmaxWithLossGradient",
            lhs: probs.shape().clone(),
            rhs: logits.shape().clone(),
        });
    }
    if grad_loss.num_elements() != 1 {
        return Err(Error::ShapeMismatch {
            op: "SoftmaxWithLossGradient",
            lhs: grad_loss.shape().clone(),
            rhs: Shape::scalar(),
        });
    }
    device.backward(cfg, labels, weights, probs, grad_loss)
}

#[derive(Debug, Clone)]
pub struct SoftmaxWithLossOp {
    cfg: SoftmaxWithLossConfig,
    device: Cpu,
}

impl Operator for SoftmaxWithLossOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let weights = match inputs.get(2) {
            Some(w) => Some(w.as_f32()?),
            None => None,
        };
        let (probs, loss) = try_softmax_with_loss(
            &self.device,
            &self.cfg,
            inputs[0].as_f32()?,
            inputs[1].as_i32()?,
            weights,
        )?;
        Ok(vec![probs.into(), loss.into()])
    }
}

/// Inputs are `X, T, [weights], P, d_avg_loss`.
#[derive(Debug, Clone)]
pub struct SoftmaxWithLossGradientOp {
    cfg: SoftmaxWithLossConfig,
    device: Cpu,
}

impl Operator for SoftmaxWithLossGradientOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let n = inputs.len();
        let weights = if n > 4 {
            Some(inputs[2].as_f32()?)
        } else {
            None
        };
        let dx = try_softmax_with_loss_grad(
            &self.device,
            &self.cfg,
            inputs[0].as_f32()?,
            inputs[1].as_i32()?,
            weights,
            inputs[n - 2].as_f32()?,
            inputs[n - 1].as_f32()?,
        )?;
        Ok(vec![dx.into()])
    }
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let b = Blobs(def);
    let mut inputs = vec![b.input(0), b.input(1)];
    if def.inputs.len() == 3 {
        inputs.push(b.input(2));
    }
    inputs.push(b.output(0));
    inputs.push(b.output_grad(1));
    Ok(GradientOps::single(
        def,
        "SoftmaxWithLossGradient",
        inputs,
        &[0],
    ))
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "SoftmaxWithLoss",
        OperatorEntry {
            schema: OpSchema::new(2, 2).inputs(2, 3),
            create: |def, device| {
                Ok(Box::new(SoftmaxWithLossOp {
                    cfg: SoftmaxWithLossConfig::from_def(def)?,
                    device: device.clone(),
                }))
            },
            gradient: Some(gradient),
        },
    );
    registry.register(
        "SoftmaxWithLossGradient",
        OperatorEntry {
            schema: OpSchema::new(4, 1).inputs(4, 5),
            create: |def, device| {
                Ok(Box::new(SoftmaxWithLossGradientOp {
                    cfg: SoftmaxWithLossConfig::from_def(def)?,
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
    fn test_softmax_with_loss_uniform_logits() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([2, 4]);
        let t = Tensor::from_vec([2], vec![0, 3]).unwrap();
        let cfg = SoftmaxWithLossConfig::default();
        let (p, loss) = try_softmax_with_loss(&dev, &cfg, &x, &t, None).unwrap();
        assert_close!(p.as_slice(), [0.25; 8]);
        assert_eq!(loss.shape().ndim(), 0);
        assert_close!(loss.as_slice(), [4.0f32.ln()], 1e-5);
    }

    #[test]
    fn test_softmax_with_loss_weights_and_scale() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> =
            Tensor::from_vec([2, 2], vec![0.0, 0.0, 1000.0, 0.0]).unwrap();
        let t = Tensor::from_vec([2, 1], vec![0, 0]).unwrap();
        let w: Tensor<TestDtype> = Tensor::from_vec([2], vec![3.0, 1.0]).unwrap();
        let cfg = SoftmaxWithLossConfig {
            scale: 2.0,
            spatial: false,
        };
        let (p, loss) = try_softmax_with_loss(&dev, &cfg, &x, &t, Some(&w)).unwrap();
        assert_close!(p.as_slice(), [0.5, 0.5, 1.0, 0.0]);
        // (3 * ln 2 + 1 * 0) * 2 / 4
        assert_close!(loss.as_slice(), [1.5 * std::f32::consts::LN_2], 1e-6);
    }

    #[test]
    fn test_softmax_with_loss_grad() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([2, 2]);
        let t = Tensor::from_vec([2], vec![1, 0]).unwrap();
        let cfg = SoftmaxWithLossConfig::default();
        let (p, _) = try_softmax_with_loss(&dev, &cfg, &x, &t, None).unwrap();
        let g: Tensor<TestDtype> = Tensor::scalar(2.0);
        let dx = try_softmax_with_loss_grad(&dev, &cfg, &x, &t, None, &p, &g).unwrap();
        // (P - onehot) * 2 / N
        assert_close!(dx.as_slice(), [0.5, -0.5, -0.5, 0.5]);
    }

    #[test]
    fn test_spatial_dont_care() {
        let dev: TestDevice = Default::default();
        // N=1, D=2, H=1, W=2
        let x: Tensor<TestDtype> = Tensor::zeros([1, 2, 1, 2]);
        let t = Tensor::from_vec([1, 1, 2], vec![1, DONT_CARE]).unwrap();
        let cfg = SoftmaxWithLossConfig {
            scale: 1.0,
            spatial: true,
        };
        let (p, loss) = try_softmax_with_loss(&dev, &cfg, &x, &t, None).unwrap();
        assert_close!(p.as_slice(), [0.5; 4]);
        assert_close!(loss.as_slice(), [std::f32::consts::LN_2], 1e-6);

        let g: Tensor<TestDtype> = Tensor::scalar(1.0);
        let dx = try_softmax_with_loss_grad(&dev, &cfg, &x, &t, None, &p, &g).unwrap();
        // layout is [c][w]: channel 0 then channel 1; w=1 is ignored
        assert_close!(dx.as_slice(), [0.5, 0.0, -0.5, 0.0]);
    }

    #[test]
    fn test_spatial_all_dont_care_is_zero() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([1, 3, 1, 1]);
        let t = Tensor::from_vec([1, 1, 1], vec![DONT_CARE]).unwrap();
        let cfg = SoftmaxWithLossConfig {
            scale: 1.0,
            spatial: true,
        };
        let (_, loss) = try_softmax_with_loss(&dev, &cfg, &x, &t, None).unwrap();
        assert_close!(loss.as_slice(), [0.0]);
    }

    #[test]
    fn test_softmax_with_loss_validation() {
        let dev: TestDevice = Default::default();
        let cfg = SoftmaxWithLossConfig::default();
        let x: Tensor<TestDtype> = Tensor::zeros([2, 3]);
        let t = Tensor::from_vec([2], vec![0, 3]).unwrap();
        assert!(matches!(
            try_softmax_with_loss(&dev, &cfg, &x, &t, None),
            Err(Error::LabelOutOfRange {
                label: 3,
                classes: 3
            })
        ));
        let t = Tensor::from_vec([2], vec![0, DONT_CARE]).unwrap();
        assert!(try_softmax_with_loss(&dev, &cfg, &x, &t, None).is_err());
        let t = Tensor::from_vec([3], vec![0, 0, 0]).unwrap();
        assert!(try_softmax_with_loss(&dev, &cfg, &x, &t, None).is_err());
        let t = Tensor::from_vec([2], vec![0, 0]).unwrap();
        let w: Tensor<TestDtype> = Tensor::zeros([3]);
        assert!(try_softmax_with_loss(&dev, &cfg, &x, &t, Some(&w)).is_err());
        let x4: Tensor<TestDtype> = Tensor::zeros([1, 2, 1, 1]);
        assert!(try_softmax_with_loss(&dev, &cfg, &x4, &t, None).is_err());
    }

    #[test]
    fn test_gradient_def_with_weights() {
        let def = crate::operator::create_operator("SoftmaxWithLoss", ["X", "T", "W"], ["P", "L"]);
        let g = gradient(&def).unwrap();
        assert_eq!(g.ops[0].inputs, vec!["X", "T", "W", "P", "L_grad"]);
        assert_eq!(g.ops[0].outputs, vec!["X_grad"]);
        assert_eq!(g.input_grads, vec![Some("X_grad".to_string()), None, None]);
    }
}
