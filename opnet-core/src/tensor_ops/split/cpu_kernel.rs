use crate::{
    dtypes::Unit,
    tensor::{Cpu, Error, Tensor},
};

impl<E: Unit> super::SplitKernel<E> for Cpu {
    fn split(
        &self,
        axis: usize,
        input: &Tensor<E>,
        sizes: &[usize],
    ) -> Result<Vec<Tensor<E>>, Error> {
        let shape = input.shape();
        let outer = shape.size_to_dim(axis);
        let inner = shape.size_from_dim(axis + 1);
        let axis_size = shape[axis];
        let data = input.as_slice();

        let mut outputs = Vec::with_capacity(sizes.len());
        let mut offset = 0;
        for &size in sizes {
            let mut buf = Vec::with_capacity(outer * size * inner);
            for o in 0..outer {
                let start = (o * axis_size + offset) * inner;
                buf.extend_from_slice(&data[start..start + size * inner]);
            }
            outputs.push(Tensor::from_vec(shape.with_dim(axis, size), buf)?);
            offset += size;
        }
        Ok(outputs)
    }
}
