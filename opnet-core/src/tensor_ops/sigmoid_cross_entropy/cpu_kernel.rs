use super::super::cast;
use crate::{
    dtypes::Dtype,
    tensor::{Cpu, Error, Tensor},
};
use num_traits::Float;

#[inline(always)]
fn sigmoid<F: Float>(x: F) -> F {
    (F::one() + (-x).exp()).recip()
}

#[inline(always)]
fn xent<F: Float>(logit: F, target: F) -> F {
    logit.max(F::zero()) - logit * target + (F::one() + (-logit.abs()).exp()).ln()
}

impl<E: Dtype + Float> super::SigmoidCrossEntropyKernel<E> for Cpu {
    fn forward(&self, logits: &Tensor<E>, targets: &Tensor<E>) -> Result<Tensor<E>, Error> {
        let shape = logits.shape();
        let inner = shape[shape.ndim() - 1];
        let n: E = cast(inner)?;
        let out = logits
            .as_slice()
            .chunks(inner)
            .zip(targets.as_slice().chunks(inner))
            .map(|(x, z)| {
                let sum = x
                    .iter()
                    .zip(z.iter())
                    .fold(E::zero(), |acc, (&x, &z)| acc + xent(x, z));
                sum / n
            })
            .collect();
        Tensor::from_vec(shape.remove_dim(shape.ndim() - 1), out)
    }

    fn backward(
        &self,
        grad_out: &Tensor<E>,
        logits: &Tensor<E>,
        targets: &Tensor<E>,
    ) -> Result<Tensor<E>, Error> {
        let shape = logits.shape();
        let inner = shape[shape.ndim() - 1];
        let n: E = cast(inner)?;
        let mut grad = Vec::with_capacity(logits.num_elements());
        for ((x, z), &g) in logits
            .as_slice()
            .chunks(inner)
            .zip(targets.as_slice().chunks(inner))
            .zip(grad_out.as_slice().iter())
        {
            grad.extend(
                x.iter()
                    .zip(z.iter())
                    .map(|(&x, &z)| -g * (z - sigmoid(x)) / n),
            );
        }
        Tensor::from_vec(shape.clone(), grad)
    }
}
