#![allow(dead_code)]

use opnet_core::prelude::*;

/// Installs a fmt subscriber once so `RUST_LOG=trace` shows check details.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn float(shape: impl Into<Shape>, data: Vec<f32>) -> Blob {
    Tensor::from_vec(shape, data).unwrap().into()
}

pub fn int32(shape: impl Into<Shape>, data: Vec<i32>) -> Blob {
    Tensor::from_vec(shape, data).unwrap().into()
}

pub fn values(blob: &Blob) -> Vec<f32> {
    blob.as_f32().unwrap().to_vec()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
