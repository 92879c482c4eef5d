//! Runtime shapes. A [Shape] is a list of dimension sizes; the empty list is
//! the shape of a scalar.

use crate::tensor::Error;

/// Dimension sizes of a row-major tensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// The shape of a single element.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// The product of all dimensions. A scalar has one element.
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }

    /// Product of the dimensions before `k`.
    pub fn size_to_dim(&self, k: usize) -> usize {
        self.0[..k].iter().product()
    }

    /// Product of the dimensions from `k` on.
    pub fn size_from_dim(&self, k: usize) -> usize {
        self.0[k..].iter().product()
    }

    /// Copy of this shape with `axis` set to `size`.
    pub fn with_dim(&self, axis: usize, size: usize) -> Self {
        let mut dims = self.0.clone();
        dims[axis] = size;
        Self(dims)
    }

    /// Copy of this shape with a new dimension of `size` inserted at `axis`.
    pub fn insert_dim(&self, axis: usize, size: usize) -> Self {
        let mut dims = self.0.clone();
        dims.insert(axis, size);
        Self(dims)
    }

    /// Copy of this shape without `axis`.
    pub fn remove_dim(&self, axis: usize) -> Self {
        let mut dims = self.0.clone();
        dims.remove(axis);
        Self(dims)
    }

    /// Resolves a possibly negative `axis` against `ndim` dimensions.
    pub fn canonical_axis(axis: i64, ndim: usize) -> Result<usize, Error> {
        let n = ndim as i64;
        let resolved = if axis < 0 { axis + n } else { axis };
        if resolved < 0 || resolved >= n {
            return Err(Error::invalid_arg(
                "axis",
                format!("axis {axis} is out of range for {ndim} dimensions"),
            ));
        }
        Ok(resolved as usize)
    }

    /// The shape of `shapes` joined along `axis`.
    ///
    /// Every shape must have the same rank and the same size on every axis
    /// except `axis`; the result holds the sum of the `axis` sizes.
    pub fn concat_along(shapes: &[&Shape], axis: usize) -> Result<Shape, Error> {
        let (first, rest) = shapes
            .split_first()
            .ok_or_else(|| Error::invalid_arg("inputs", "cannot concat zero tensors"))?;
        if axis >= first.ndim() {
            return Err(Error::invalid_arg(
                "axis",
                format!("axis {axis} is out of range for shape {first}"),
            ));
        }
        let mut total = first.0[axis];
        for shape in rest {
            let compatible = shape.ndim() == first.ndim()
                && shape
                    .0
                    .iter()
                    .zip(first.0.iter())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::ShapeMismatch {
                    op: "Concat",
                    lhs: (*shape).clone(),
                    rhs: (*first).clone(),
                });
            }
            total += shape.0[axis];
        }
        Ok(first.with_dim(axis, total))
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = usize;
    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
