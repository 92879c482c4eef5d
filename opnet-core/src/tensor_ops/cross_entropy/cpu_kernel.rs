use super::super::log_floor;
use crate::{
    dtypes::Dtype,
    tensor::{Cpu, Error, Tensor},
};
use num_traits::Float;

impl<E: Dtype + Float> super::CrossEntropyKernel<E> for Cpu {
    fn forward(&self, n: usize, x: &Tensor<E>, label: &Tensor<E>) -> Result<Tensor<E>, Error> {
        let floor = log_floor::<E>();
        let d = (x.num_elements() / n.max(1)).max(1);
        let mut y = Vec::with_capacity(n);
        for (x, l) in x.as_slice().chunks(d).zip(label.as_slice().chunks(d)) {
            let sum = x
                .iter()
                .zip(l.iter())
                .fold(E::zero(), |acc, (&x, &l)| acc - l * x.max(floor).ln());
            y.push(sum);
        }
        y.resize(n, E::zero());
        Tensor::from_vec([n], y)
    }

    fn backward(
        &self,
        n: usize,
        x: &Tensor<E>,
        label: &Tensor<E>,
        grad_out: &Tensor<E>,
    ) -> Result<Tensor<E>, Error> {
        let floor = log_floor::<E>();
        let d = (x.num_elements() / n.max(1)).max(1);
        let dx = x
            .as_slice()
            .iter()
            .zip(label.as_slice().iter())
            .enumerate()
            .map(|(i, (&x, &l))| -grad_out.as_slice()[i / d] * l / x.max(floor))
            .collect();
        Tensor::from_vec(x.shape().clone(), dx)
    }
}
