use super::{Error, Tensor};
use crate::{dtypes::DataType, shapes::Shape};

/// A type-erased tensor, as stored in a [crate::workspace::Workspace].
#[derive(Debug, Clone)]
pub enum Blob {
    Float(Tensor<f32>),
    Int32(Tensor<i32>),
}

impl Blob {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Int32(_) => DataType::Int32,
        }
    }

    pub fn shape(&self) -> &Shape {
        match self {
            Self::Float(t) => t.shape(),
            Self::Int32(t) => t.shape(),
        }
    }

    pub fn num_elements(&self) -> usize {
        self.shape().num_elements()
    }

    pub fn as_f32(&self) -> Result<&Tensor<f32>, Error> {
        match self {
            Self::Float(t) => Ok(t),
            other => Err(Error::WrongDtype {
                expected: DataType::Float,
                found: other.data_type(),
            }),
        }
    }

    pub fn as_i32(&self) -> Result<&Tensor<i32>, Error> {
        match self {
            Self::Int32(t) => Ok(t),
            other => Err(Error::WrongDtype {
                expected: DataType::Int32,
                found: other.data_type(),
            }),
        }
    }
}

impl From<Tensor<f32>> for Blob {
    fn from(t: Tensor<f32>) -> Self {
        Self::Float(t)
    }
}

impl From<Tensor<i32>> for Blob {
    fn from(t: Tensor<i32>) -> Self {
        Self::Int32(t)
    }
}
