//! # opnet
//!
//! Model building on top of [opnet_core]: record schemas describing the
//! blobs a layer consumes and produces, a [net::Net] builder with unique blob
//! naming, the [model::LayerModelHelper] that turns layers into operators,
//! and [checks] for testing operators against references and finite
//! differences.
//!
//! ```rust
//! # use opnet::prelude::*;
//! let mut model = LayerModelHelper::new("model");
//! let record = Field::structure([
//!     ("a", Field::scalar(DataType::Float, [2]).with_blob("a")),
//!     ("b", Field::scalar(DataType::Float, [3]).with_blob("b")),
//! ]);
//! let output = model.concat(record, 1)?;
//! assert_eq!(output.shape(), Some(&[5][..]));
//! assert_eq!(model.net().proto().ops[0].op_type, "Concat");
//! # Ok::<(), opnet::Error>(())
//! ```

pub mod checks;
pub mod layers;
pub mod model;
pub mod net;
pub mod schema;

/// Errors raised while building layers and nets.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Incorrect input type. Expected {expected}, but received: {received}")]
    IncorrectInputType {
        expected: &'static str,
        received: String,
    },
    /// A field has fewer dimensions than the concat axis needs.
    #[error("Concat expects that limited dimensions of the input tensor: axis {axis}, shape {shape:?}")]
    LimitedDimensions { axis: i64, shape: Vec<usize> },
    #[error("Shapes {lhs:?} and {rhs:?} are not compatible for Concat")]
    IncompatibleShapes { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("axis {0} is invalid, the batch dimension (axis 0) cannot be concatenated")]
    InvalidAxis(i64),
    #[error("layer `{0}` received an empty record")]
    EmptyRecord(String),
    /// A scalar field was used as an input before a blob was bound to it.
    #[error("field {0} has no blob")]
    UnboundField(String),
    #[error(transparent)]
    Core(#[from] opnet_core::Error),
}

/// Contains subset of all public exports.
pub mod prelude {
    pub use crate::checks::*;
    pub use crate::layers::*;
    pub use crate::model::*;
    pub use crate::net::*;
    pub use crate::schema::*;
    pub use crate::Error;
    pub use opnet_core::dtypes::DataType;
}
