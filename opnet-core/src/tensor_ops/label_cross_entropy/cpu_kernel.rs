use super::super::log_floor;
use crate::{
    dtypes::Dtype,
    tensor::{Cpu, Error, Tensor},
};
use num_traits::Float;

impl<E: Dtype + Float> super::LabelCrossEntropyKernel<E> for Cpu {
    fn forward(&self, x: &Tensor<E>, label: &Tensor<i32>) -> Result<Tensor<E>, Error> {
        let floor = log_floor::<E>();
        let n = label.num_elements();
        let d = x.num_elements() / n.max(1);
        let x = x.as_slice();
        let y = label
            .as_slice()
            .iter()
            .enumerate()
            .map(|(i, &l)| -x[i * d + l as usize].max(floor).ln())
            .collect();
        Tensor::from_vec([n], y)
    }

    fn backward(
        &self,
        x: &Tensor<E>,
        label: &Tensor<i32>,
        grad_out: &Tensor<E>,
    ) -> Result<Tensor<E>, Error> {
        let floor = log_floor::<E>();
        let n = label.num_elements();
        let d = x.num_elements() / n.max(1);
        let mut dx = Tensor::zeros(x.shape().clone());
        let buf = dx.as_mut_slice();
        for (i, (&l, &g)) in label.as_slice().iter().zip(grad_out.as_slice()).enumerate() {
            let idx = i * d + l as usize;
            buf[idx] = -g / x.as_slice()[idx].max(floor);
        }
        Ok(dx)
    }
}
