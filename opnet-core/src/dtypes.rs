//! Module for data type related traits. Contains [Unit], [Dtype] and the
//! runtime tag [DataType] that blobs carry.

/// The element type of a blob, known at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
    Int32,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float => f.write_str("float"),
            Self::Int32 => f.write_str("int32"),
        }
    }
}

/// Represents a unit type, but no arithmetic.
pub trait Unit:
    'static + Copy + Clone + Default + std::fmt::Debug + PartialEq + PartialOrd + Send + Sync
{
    const ONE: Self;
}

macro_rules! unit {
    ($type:ty, $one:expr) => {
        impl Unit for $type {
            const ONE: Self = $one;
        }
    };
}

unit!(f32, 1.0);
unit!(i32, 1);

/// Represents a data type or element of an array that can have
/// arithmatic operations applied to it.
pub trait Dtype:
    Unit
    + std::ops::Add<Self, Output = Self>
    + std::ops::Sub<Self, Output = Self>
    + std::ops::Mul<Self, Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + std::ops::MulAssign
    + num_traits::Zero
{
}

impl Dtype for f32 {}
impl Dtype for i32 {}
