//! Record schemas: the typed description of the blobs a layer reads and
//! writes.
//!
//! Shapes exclude the leading batch dimension.

use std::fmt;

use opnet_core::dtypes::DataType;

use crate::Error;

/// A record field: a single typed blob, or an ordered list of named fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Scalar {
        dtype: DataType,
        shape: Vec<usize>,
        blob: Option<String>,
    },
    Struct(Vec<(String, Field)>),
}

impl Field {
    /// A scalar field not yet bound to a blob.
    pub fn scalar(dtype: DataType, shape: impl Into<Vec<usize>>) -> Self {
        Self::Scalar {
            dtype,
            shape: shape.into(),
            blob: None,
        }
    }

    /// Binds a scalar field to `blob`. Structs are returned unchanged.
    pub fn with_blob(self, blob: impl Into<String>) -> Self {
        match self {
            Self::Scalar { dtype, shape, .. } => Self::Scalar {
                dtype,
                shape,
                blob: Some(blob.into()),
            },
            s => s,
        }
    }

    pub fn structure<N: Into<String>>(fields: impl IntoIterator<Item = (N, Field)>) -> Self {
        Self::Struct(
            fields
                .into_iter()
                .map(|(name, field)| (name.into(), field))
                .collect(),
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// The per-example shape of a scalar.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Self::Scalar { shape, .. } => Some(shape),
            Self::Struct(_) => None,
        }
    }

    /// The named children of a struct.
    pub fn fields(&self) -> Option<&[(String, Field)]> {
        match self {
            Self::Struct(fields) => Some(fields),
            Self::Scalar { .. } => None,
        }
    }

    /// Blob names of every scalar, depth first in field order.
    pub fn field_blobs(&self) -> Result<Vec<String>, Error> {
        let mut blobs = Vec::new();
        self.collect_blobs(&mut blobs)?;
        Ok(blobs)
    }

    fn collect_blobs(&self, blobs: &mut Vec<String>) -> Result<(), Error> {
        match self {
            Self::Scalar { blob: Some(b), .. } => blobs.push(b.clone()),
            Self::Scalar { blob: None, .. } => return Err(Error::UnboundField(self.to_string())),
            Self::Struct(fields) => {
                for (_, field) in fields {
                    field.collect_blobs(blobs)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { dtype, shape, blob } => {
                write!(f, "Scalar({dtype}, {shape:?}")?;
                if let Some(b) = blob {
                    write!(f, ", {b}")?;
                }
                write!(f, ")")
            }
            Self::Struct(fields) => {
                write!(f, "Struct(")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {field}")?;
                }
                write!(f, ")")
            }
        }
    }
}
