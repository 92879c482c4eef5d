use super::Tensor;
use crate::shapes::Shape;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use std::sync::{Arc, Mutex, MutexGuard};

/// The cpu device. Kernels are implemented on it, and it owns the seeded
/// random number generator used to sample tensors.
#[derive(Clone, Debug)]
pub struct Cpu {
    pub(crate) rng: Arc<Mutex<StdRng>>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Cpu {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Samples every element uniformly from `[low, high)`.
    ///
    /// # Panics
    ///
    /// If `low >= high` or either bound is not finite.
    pub fn sample_uniform(&self, shape: impl Into<Shape>, low: f32, high: f32) -> Tensor<f32> {
        let distr = Uniform::new(low, high);
        let mut rng = self.rng();
        Tensor::from_fn(shape, |_| distr.sample(&mut *rng))
    }

    /// Samples every element as `1.0` with probability `p`, else `0.0`.
    pub fn sample_bernoulli(&self, shape: impl Into<Shape>, p: f64) -> Tensor<f32> {
        let mut rng = self.rng();
        Tensor::from_fn(shape, |_| if rng.gen::<f64>() < p { 1.0 } else { 0.0 })
    }

    /// Samples integer class labels from `[0, classes)`.
    pub fn sample_labels(&self, shape: impl Into<Shape>, classes: usize) -> Tensor<i32> {
        let mut rng = self.rng();
        let classes = classes.max(1) as i32;
        Tensor::from_fn(shape, |_| rng.gen_range(0..classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_samples() {
        let a = Cpu::with_seed(7).sample_uniform([3, 4], -1.0, 1.0);
        let b = Cpu::with_seed(7).sample_uniform([3, 4], -1.0, 1.0);
        assert_eq!(a.as_slice(), b.as_slice());
        assert!(a.as_slice().iter().all(|x| (-1.0..1.0).contains(x)));
    }

    #[test]
    #[should_panic]
    fn test_sample_uniform_empty_range() {
        Cpu::default().sample_uniform([2], 1.0, 1.0);
    }

    #[test]
    fn test_sample_labels_in_range() {
        let dev = Cpu::default();
        let t = dev.sample_labels([100], 5);
        assert!(t.as_slice().iter().all(|&l| (0..5).contains(&l)));
    }

    #[test]
    fn test_sample_bernoulli_is_binary() {
        let dev = Cpu::default();
        let t = dev.sample_bernoulli([50], 0.5);
        assert!(t.as_slice().iter().all(|&x| x == 0.0 || x == 1.0));
    }
}
