use crate::{dtypes::DataType, shapes::Shape};

/// Represents a number of different errors that can occur from creating
/// tensors, creating operators, or running them in a workspace.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No operator with this type name is registered.
    #[error("operator type `{0}` is not registered")]
    UnknownOperator(String),
    /// The operator type has no gradient maker.
    #[error("no gradient is registered for operator type `{0}`")]
    NoGradient(String),
    /// A named blob is not present in the workspace.
    #[error("blob `{0}` does not exist in the workspace")]
    BlobNotFound(String),
    #[error("{op_type} takes {expected} inputs, but {received} were given")]
    WrongNumInputs {
        op_type: String,
        expected: String,
        received: usize,
    },
    #[error("{op_type} produces {expected} outputs, but {received} were named")]
    WrongNumOutputs {
        op_type: String,
        expected: String,
        received: usize,
    },
    /// A blob holds a different element type than the one requested.
    #[error("expected a {expected} blob, found {found}")]
    WrongDtype { expected: DataType, found: DataType },
    /// Not enough (or too many) elements were provided when creating a tensor.
    #[error("shape {shape} holds {expected} elements, but {received} were provided")]
    WrongNumElements {
        shape: Shape,
        expected: usize,
        received: usize,
    },
    #[error("shapes {lhs} and {rhs} are not compatible for {op}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("label seems incorrect: label value {label} is outside of [0, {classes})")]
    LabelOutOfRange { label: i32, classes: usize },
    /// A runtime precondition of an operator did not hold.
    #[error("{0}")]
    Enforce(String),
}

impl Error {
    pub(crate) fn invalid_arg(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Returns [Error::Enforce] with the formatted message when `$cond` is false.
macro_rules! enforce {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err($crate::tensor::Error::Enforce(format!($($msg)+)));
        }
    };
}
pub(crate) use enforce;
