//! # opnet-core
//!
//! A small runtime of named tensor operators, invoked by name with positional
//! blob arguments, plus the gradient makers that turn one operator definition
//! into the definitions of its gradient operators.
//!
//! # Tensors & Blobs
//!
//! *See [tensor] and [shapes] for more information.*
//!
//! A [`tensor::Tensor`] is a contiguous, row-major nd-array with a runtime
//! [`shapes::Shape`]. Element types are [f32] and [i32] (see [dtypes]).
//! Inside a [`workspace::Workspace`] tensors are stored type-erased as
//! [`tensor::Blob`]s under a name.
//!
//! # Operators
//!
//! *See [operator], [registry] and [tensor_ops] for more information.*
//!
//! An [`operator::OperatorDef`] names an operator type, its input and output
//! blobs, and its arguments. The [`registry::OperatorRegistry`] maps the type
//! name to a schema, a constructor and (optionally) a gradient maker:
//!
//! ```rust
//! # use opnet_core::prelude::*;
//! let mut ws = Workspace::default();
//! ws.feed_blob("a", Tensor::from_vec([1, 2], vec![1.0f32, 2.0])?);
//! ws.feed_blob("b", Tensor::from_vec([1, 1], vec![3.0f32])?);
//! let op = create_operator("Concat", ["a", "b"], ["c", "c_dims"]).arg("axis", 1);
//! ws.run_operator_once(&op)?;
//! assert_eq!(ws.fetch_blob("c")?.as_f32()?.as_slice(), &[1.0, 2.0, 3.0]);
//! # Ok::<(), opnet_core::tensor::Error>(())
//! ```
//!
//! | Operator | Inputs | Outputs |
//! | --- | --- | --- |
//! | `Concat` | `X_0, ..., X_n` | `concat_result, split_info` |
//! | `Split` | `input, [split]` | `output_0, ..., output_n` |
//! | `SigmoidCrossEntropyWithLogits` | `logits, targets` | `xentropy` |
//! | `CrossEntropy` | `X, label` | `Y` |
//! | `LabelCrossEntropy` | `X, label` | `Y` |
//! | `SoftmaxWithLoss` | `logits, labels, [weights]` | `softmax, avg_loss` |
//! | `RmsProp` | `grad, mean_squares, momentum, lr` | `grad, mean_squares, momentum` |

pub mod dtypes;
pub mod gradients;
pub mod operator;
pub mod registry;
pub mod shapes;
pub mod tensor;
pub mod tensor_ops;
pub mod workspace;

mod unique_id;

pub use tensor::Error;
pub use unique_id::UniqueId;

/// Contains subset of all public exports.
pub mod prelude {
    pub use crate::dtypes::*;
    pub use crate::gradients::{grad_name, GradientOps};
    pub use crate::operator::*;
    pub use crate::registry::*;
    pub use crate::shapes::*;
    pub use crate::tensor::*;
    pub use crate::tensor_ops::*;
    pub use crate::workspace::*;
}

#[cfg(test)]
pub(crate) mod tests {
    pub type TestDevice = crate::tensor::Cpu;

    pub type TestDtype = f32;

    pub trait AssertClose {
        type Elem: std::fmt::Display + std::fmt::Debug + Copy;
        const DEFAULT_TOLERANCE: Self::Elem;
        fn get_default_tol(&self) -> Self::Elem {
            Self::DEFAULT_TOLERANCE
        }
        fn get_far_pair(
            &self,
            rhs: &Self,
            tolerance: Self::Elem,
        ) -> Option<(Self::Elem, Self::Elem)>;
    }

    impl AssertClose for f32 {
        type Elem = f32;
        const DEFAULT_TOLERANCE: Self::Elem = 1e-6;
        fn get_far_pair(&self, rhs: &Self, tolerance: f32) -> Option<(f32, f32)> {
            if (self - rhs).abs() > tolerance {
                Some((*self, *rhs))
            } else {
                None
            }
        }
    }

    impl<T: AssertClose> AssertClose for [T] {
        type Elem = T::Elem;
        const DEFAULT_TOLERANCE: Self::Elem = T::DEFAULT_TOLERANCE;
        fn get_far_pair(
            &self,
            rhs: &Self,
            tolerance: Self::Elem,
        ) -> Option<(Self::Elem, Self::Elem)> {
            assert_eq!(self.len(), rhs.len(), "length mismatch");
            for (l, r) in self.iter().zip(rhs.iter()) {
                if let Some(pair) = l.get_far_pair(r, tolerance) {
                    return Some(pair);
                }
            }
            None
        }
    }

    /// Installs a fmt subscriber once so `RUST_LOG=debug` shows operator logs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    macro_rules! assert_close {
        ($Lhs:expr, $Rhs:expr) => {{
            let lhs_buf = $Lhs;
            let rhs_buf = $Rhs;
            let lhs: &[f32] = &lhs_buf[..];
            let rhs: &[f32] = &rhs_buf[..];
            let tol = AssertClose::get_default_tol(lhs);
            if let Some((l, r)) = AssertClose::get_far_pair(lhs, rhs, tol) {
                panic!("lhs != rhs | {l} != {r}\n\n{lhs:?}\n\n{rhs:?}");
            }
        }};
        ($Lhs:expr, $Rhs:expr, $Tolerance:expr) => {{
            let lhs_buf = $Lhs;
            let rhs_buf = $Rhs;
            let lhs: &[f32] = &lhs_buf[..];
            let rhs: &[f32] = &rhs_buf[..];
            if let Some((l, r)) = AssertClose::get_far_pair(lhs, rhs, $Tolerance) {
                panic!("lhs != rhs | {l} != {r}\n\n{lhs:?}\n\n{rhs:?}");
            }
        }};
    }
    pub(crate) use assert_close;
}
