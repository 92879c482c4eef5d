//! The [Tensor] struct, the type-erased [Blob] stored in workspaces, and the
//! [Cpu] device that owns the random number generator.
//!
//! Tensors are always contiguous and row-major. Their data lives behind an
//! [std::sync::Arc], so cloning a tensor is cheap and kernels allocate fresh
//! outputs instead of writing into their inputs.
//!
//! ```rust
//! # use opnet_core::prelude::*;
//! let t: Tensor<f32> = Tensor::from_vec([2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! assert_eq!(t.shape().dims(), &[2, 3]);
//! let z: Tensor<i32> = Tensor::zeros([4]);
//! assert_eq!(z.as_slice(), &[0, 0, 0, 0]);
//! ```

mod blob;
mod cpu;
mod error;

pub use blob::Blob;
pub use cpu::Cpu;
pub use error::Error;
pub(crate) use error::enforce;

use std::sync::Arc;

use crate::{dtypes::Unit, shapes::Shape, UniqueId};

/// A contiguous row-major nd-array.
#[derive(Debug, Clone)]
pub struct Tensor<E> {
    pub(crate) id: UniqueId,
    pub(crate) shape: Shape,
    pub(crate) data: Arc<Vec<E>>,
}

impl<E: Unit> Tensor<E> {
    /// Creates a tensor from row-major `data`, checking the element count
    /// against `shape`.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<E>) -> Result<Self, Error> {
        let shape = shape.into();
        if shape.num_elements() != data.len() {
            return Err(Error::WrongNumElements {
                expected: shape.num_elements(),
                received: data.len(),
                shape,
            });
        }
        Ok(Self {
            id: UniqueId::next(),
            shape,
            data: Arc::new(data),
        })
    }

    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, E::default())
    }

    pub fn full(shape: impl Into<Shape>, value: E) -> Self {
        let shape = shape.into();
        let data = vec![value; shape.num_elements()];
        Self {
            id: UniqueId::next(),
            shape,
            data: Arc::new(data),
        }
    }

    /// A 0-dimensional tensor holding `value`.
    pub fn scalar(value: E) -> Self {
        Self::full(Shape::scalar(), value)
    }

    /// Builds a tensor of `shape` where each element is `f(flat_index)`.
    pub fn from_fn(shape: impl Into<Shape>, f: impl FnMut(usize) -> E) -> Self {
        let shape = shape.into();
        let data = (0..shape.num_elements()).map(f).collect();
        Self {
            id: UniqueId::next(),
            shape,
            data: Arc::new(data),
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[E] {
        self.data.as_slice()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.data.as_ref().clone()
    }

    /// Mutable access to the data, copying it first if it is shared.
    pub fn as_mut_slice(&mut self) -> &mut [E] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Same data viewed with a different shape of equal element count.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self, Error> {
        let shape = shape.into();
        if shape.num_elements() != self.data.len() {
            return Err(Error::WrongNumElements {
                expected: shape.num_elements(),
                received: self.data.len(),
                shape,
            });
        }
        Ok(Self {
            id: UniqueId::next(),
            shape,
            data: self.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_len() {
        let r = Tensor::from_vec([2, 2], vec![1.0f32, 2.0, 3.0]);
        assert!(matches!(
            r,
            Err(Error::WrongNumElements {
                expected: 4,
                received: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let a: Tensor<f32> = Tensor::zeros([3]);
        let b = a.clone();
        let c: Tensor<f32> = Tensor::zeros([3]);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_as_mut_slice_copies_shared_data() {
        let a: Tensor<f32> = Tensor::zeros([2]);
        let mut b = a.clone();
        b.as_mut_slice()[0] = 1.0;
        assert_eq!(a.as_slice(), &[0.0, 0.0]);
        assert_eq!(b.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_reshape() {
        let a = Tensor::from_fn([2, 3], |i| i as i32);
        let b = a.reshape([3, 2]).unwrap();
        assert_eq!(b.shape().dims(), &[3, 2]);
        assert_eq!(b.as_slice(), a.as_slice());
        assert!(a.reshape([4]).is_err());
    }
}
