//! Layers that can be added to a [crate::model::LayerModelHelper].

mod concat;

pub use concat::Concat;
