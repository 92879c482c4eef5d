//! Operations on tensors, each exposed three ways: a kernel trait implemented
//! by [crate::tensor::Cpu], a `try_*` function calling the kernel with
//! validated shapes, and a named operator registered in the
//! [crate::registry::OperatorRegistry].
//!
//! Operators that participate in training also register a gradient maker;
//! see [crate::gradients].
//!
//! | Module | Operator types |
//! | --- | --- |
//! | [concat] | `Concat` |
//! | [split] | `Split` |
//! | [sigmoid_cross_entropy] | `SigmoidCrossEntropyWithLogits`, `SigmoidCrossEntropyWithLogitsGradient` |
//! | [cross_entropy] | `CrossEntropy`, `CrossEntropyGradient` |
//! | [label_cross_entropy] | `LabelCrossEntropy`, `LabelCrossEntropyGradient` |
//! | [softmax_with_loss] | `SoftmaxWithLoss`, `SoftmaxWithLossGradient` |
//! | [rmsprop] | `RmsProp` |

pub mod concat;
pub mod cross_entropy;
pub mod label_cross_entropy;
pub mod rmsprop;
pub mod sigmoid_cross_entropy;
pub mod softmax_with_loss;
pub mod split;

pub use concat::{try_concat, ConcatConfig, ConcatKernel};
pub use cross_entropy::{try_cross_entropy, CrossEntropyKernel};
pub use label_cross_entropy::{try_label_cross_entropy, LabelCrossEntropyKernel};
pub use rmsprop::{try_rmsprop, RmsPropConfig, RmsPropKernel};
pub use sigmoid_cross_entropy::{try_sigmoid_cross_entropy_with_logits, SigmoidCrossEntropyKernel};
pub use softmax_with_loss::{try_softmax_with_loss, SoftmaxWithLossConfig, SoftmaxWithLossKernel};
pub use split::{try_split, SplitConfig, SplitKernel};

use crate::{
    dtypes::Unit,
    operator::OperatorDef,
    registry::OperatorRegistry,
    tensor::{Blob, Error, Tensor},
};

/// Registers every operator in this module.
pub(crate) fn register_builtins(registry: &mut OperatorRegistry) {
    concat::register(registry);
    split::register(registry);
    sigmoid_cross_entropy::register(registry);
    cross_entropy::register(registry);
    label_cross_entropy::register(registry);
    softmax_with_loss::register(registry);
    rmsprop::register(registry);
}

/// Reads the `axis` argument, falling back to the channel axis of the
/// `order` argument (`NCHW` → 1, `NHWC` → last), then to `1`.
pub(crate) fn axis_from_def(def: &OperatorDef) -> Result<i64, Error> {
    if def.has_arg("axis") {
        return def.single_arg("axis", 1);
    }
    if !def.has_arg("order") {
        return Ok(1);
    }
    match def.single_arg("order", String::new())?.as_str() {
        "NCHW" => Ok(1),
        "NHWC" => Ok(-1),
        other => Err(Error::invalid_arg(
            "order",
            format!("unknown storage order `{other}`"),
        )),
    }
}

/// Views every blob as a tensor of one element type.
pub(crate) fn typed_inputs<'a, E>(
    inputs: &[&'a Blob],
    view: impl Fn(&'a Blob) -> Result<&'a Tensor<E>, Error>,
) -> Result<Vec<&'a Tensor<E>>, Error> {
    inputs.iter().map(|&b| view(b)).collect()
}

/// Converts a count or a hyperparameter into the kernel's float type.
pub(crate) fn cast<E, V>(v: V) -> Result<E, Error>
where
    E: num_traits::NumCast,
    V: num_traits::ToPrimitive + Copy + std::fmt::Display,
{
    <E as num_traits::NumCast>::from(v)
        .ok_or_else(|| Error::Enforce(format!("{v} is not representable as a float")))
}

/// Floor applied to probabilities before taking their log.
pub(crate) fn log_floor<E: num_traits::Float>() -> E {
    <E as num_traits::NumCast>::from(1e-20).unwrap_or_else(E::min_positive_value)
}

/// Fails with [Error::ShapeMismatch] unless both tensors share a shape.
pub(crate) fn same_shape<A: Unit, B: Unit>(op: &'static str, a: &Tensor<A>, b: &Tensor<B>) -> Result<(), Error> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            op,
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    Ok(())
}
