mod cpu_kernel;

use crate::{
    dtypes::Dtype,
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    tensor::{enforce, Blob, Cpu, Error, Tensor},
};

/// Configuration of the `RmsProp` update.
///
/// ```rust
/// # use opnet_core::prelude::*;
/// RmsPropConfig {
///     decay: 0.95,
///     momentum: 0.9,
///     epsilon: 1e-6,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmsPropConfig {
    /// Decay of the running mean of squared gradients. Defaults to `0.9`.
    pub decay: f64,

    /// Momentum factor. Defaults to `0.0`.
    pub momentum: f64,

    /// Added to the mean square inside the square root. Defaults to `1e-5`.
    pub epsilon: f64,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            momentum: 0.0,
            epsilon: 1e-5,
        }
    }
}

impl RmsPropConfig {
    pub fn from_def(def: &OperatorDef) -> Result<Self, Error> {
        let d = Self::default();
        Ok(Self {
            decay: def.single_arg("decay", d.decay as f32)? as f64,
            momentum: def.single_arg("momentum", d.momentum as f32)? as f64,
            epsilon: def.single_arg("epsilon", d.epsilon as f32)? as f64,
        })
    }
}

pub trait RmsPropKernel<E: Dtype> {
    /// Computes the new mean squares and momentum in place. The momentum is
    /// also the update to apply, returned as the new gradient.
    fn update(
        &self,
        cfg: &RmsPropConfig,
        grad: &mut Tensor<E>,
        mean_squares: &mut Tensor<E>,
        momentum: &mut Tensor<E>,
        lr: E,
    ) -> Result<(), Error>;
}

/// Runs one RmsProp step and returns `(grad, mean_squares, momentum)`.
pub fn try_rmsprop<E: Dtype, D: RmsPropKernel<E>>(
    device: &D,
    cfg: &RmsPropConfig,
    grad: &Tensor<E>,
    mean_squares: &Tensor<E>,
    momentum: &Tensor<E>,
    lr: &Tensor<E>,
) -> Result<(Tensor<E>, Tensor<E>, Tensor<E>), Error> {
    enforce!(
        lr.num_elements() == 1,
        "RmsProp expects a single learning rate, got shape {}",
        lr.shape()
    );
    let n = grad.num_elements();
    enforce!(
        mean_squares.num_elements() == n && momentum.num_elements() == n,
        "RmsProp expects grad, mean_squares and momentum of equal size, got {}, {} and {}",
        n,
        mean_squares.num_elements(),
        momentum.num_elements()
    );
    let mut grad = grad.clone();
    let mut ms = mean_squares.clone();
    let mut mom = momentum.clone();
    device.update(cfg, &mut grad, &mut ms, &mut mom, lr.as_slice()[0])?;
    Ok((grad, ms, mom))
}

#[derive(Debug, Clone)]
pub struct RmsPropOp {
    cfg: RmsPropConfig,
    device: Cpu,
}

impl Operator for RmsPropOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let (g, ms, mom) = try_rmsprop(
            &self.device,
            &self.cfg,
            inputs[0].as_f32()?,
            inputs[1].as_f32()?,
            inputs[2].as_f32()?,
            inputs[3].as_f32()?,
        )?;
        Ok(vec![g.into(), ms.into(), mom.into()])
    }
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "RmsProp",
        OperatorEntry {
            schema: OpSchema::new(4, 3),
            create: |def, device| {
                Ok(Box::new(RmsPropOp {
                    cfg: RmsPropConfig::from_def(def)?,
                    device: device.clone(),
                }))
            },
            gradient: None,
        },
    );
}
