use crate::{
    dtypes::Unit,
    shapes::Shape,
    tensor::{Cpu, Error, Tensor},
};

impl<E: Unit> super::ConcatKernel<E> for Cpu {
    fn concat(
        &self,
        axis: usize,
        inputs: &[&Tensor<E>],
        out_shape: Shape,
    ) -> Result<Tensor<E>, Error> {
        let outer = out_shape.size_to_dim(axis);
        let mut data = Vec::with_capacity(out_shape.num_elements());
        if outer > 0 {
            // each input contributes one contiguous chunk per outer index
            let chunks: Vec<usize> = inputs.iter().map(|t| t.num_elements() / outer).collect();
            for o in 0..outer {
                for (t, &n) in inputs.iter().zip(chunks.iter()) {
                    data.extend_from_slice(&t.as_slice()[o * n..(o + 1) * n]);
                }
            }
        }
        Tensor::from_vec(out_shape, data)
    }
}
