use super::{SoftmaxWithLossConfig, DONT_CARE};
use crate::{
    dtypes::Dtype,
    tensor::{Cpu, Error, Tensor},
    tensor_ops::{cast, log_floor},
};
use num_traits::Float;

/// Iteration layout shared by both modes: `outer` groups of `classes`
/// values spaced `inner` apart. Non-spatial inputs have `inner == 1`.
struct Layout {
    outer: usize,
    classes: usize,
    inner: usize,
}

impl Layout {
    fn new(cfg: &SoftmaxWithLossConfig, dims: &[usize]) -> Self {
        if cfg.spatial {
            Self {
                outer: dims[0],
                classes: dims[1],
                inner: dims[2] * dims[3],
            }
        } else {
            Self {
                outer: dims[0],
                classes: dims[1],
                inner: 1,
            }
        }
    }

    fn index(&self, i: usize, c: usize, j: usize) -> usize {
        i * self.classes * self.inner + c * self.inner + j
    }
}

/// Label and weight of location `(i, j)`, `None` when it is ignored.
fn target<E: Dtype>(
    layout: &Layout,
    labels: &[i32],
    weights: Option<&[E]>,
    i: usize,
    j: usize,
) -> Option<(usize, E)> {
    let k = i * layout.inner + j;
    let label = labels[k];
    if label == DONT_CARE {
        return None;
    }
    let w = weights.map_or(E::ONE, |w| w[k]);
    Some((label as usize, w))
}

fn total_weight<E: Dtype>(layout: &Layout, labels: &[i32], weights: Option<&[E]>) -> E {
    let mut total = E::zero();
    for i in 0..layout.outer {
        for j in 0..layout.inner {
            if let Some((_, w)) = target(layout, labels, weights, i, j) {
                total += w;
            }
        }
    }
    total
}

impl<E: Dtype + Float> super::SoftmaxWithLossKernel<E> for Cpu {
    fn forward(
        &self,
        cfg: &SoftmaxWithLossConfig,
        logits: &Tensor<E>,
        labels: &Tensor<i32>,
        weights: Option<&Tensor<E>>,
    ) -> Result<(Tensor<E>, Tensor<E>), Error> {
        let layout = Layout::new(cfg, logits.shape().dims());
        let x = logits.as_slice();
        let mut probs = Tensor::zeros(logits.shape().clone());
        let p = probs.as_mut_slice();
        for i in 0..layout.outer {
            for j in 0..layout.inner {
                let max = (0..layout.classes)
                    .map(|c| x[layout.index(i, c, j)])
                    .fold(E::neg_infinity(), E::max);
                let mut sum = E::zero();
                for c in 0..layout.classes {
                    let idx = layout.index(i, c, j);
                    p[idx] = (x[idx] - max).exp();
                    sum += p[idx];
                }
                for c in 0..layout.classes {
                    p[layout.index(i, c, j)] = p[layout.index(i, c, j)] / sum;
                }
            }
        }

        let labels = labels.as_slice();
        let weights = weights.map(Tensor::as_slice);
        let floor = log_floor::<E>();
        let mut loss = E::zero();
        for i in 0..layout.outer {
            for j in 0..layout.inner {
                if let Some((c, w)) = target(&layout, labels, weights, i, j) {
                    loss -= p[layout.index(i, c, j)].max(floor).ln() * w;
                }
            }
        }
        let total = total_weight(&layout, labels, weights);
        let scale: E = cast(cfg.scale)?;
        let avg = if total > E::zero() {
            loss * scale / total
        } else {
            E::zero()
        };
        Ok((probs, Tensor::scalar(avg)))
    }

    fn backward(
        &self,
        cfg: &SoftmaxWithLossConfig,
        labels: &Tensor<i32>,
        weights: Option<&Tensor<E>>,
        probs: &Tensor<E>,
        grad_loss: &Tensor<E>,
    ) -> Result<Tensor<E>, Error> {
        let layout = Layout::new(cfg, probs.shape().dims());
        let labels = labels.as_slice();
        let weights = weights.map(Tensor::as_slice);
        let total = total_weight(&layout, labels, weights);
        let mut dx = Tensor::zeros(probs.shape().clone());
        if total <= E::zero() {
            return Ok(dx);
        }
        let scale: E = cast(cfg.scale)?;
        let coef = grad_loss.as_slice()[0] * scale / total;

        let p = probs.as_slice();
        let d = dx.as_mut_slice();
        for i in 0..layout.outer {
            for j in 0..layout.inner {
                let Some((label, w)) = target(&layout, labels, weights, i, j) else {
                    continue;
                };
                for c in 0..layout.classes {
                    let idx = layout.index(i, c, j);
                    let onehot = if c == label { E::ONE } else { E::zero() };
                    d[idx] = (p[idx] - onehot) * w * coef;
                }
            }
        }
        Ok(dx)
    }
}
