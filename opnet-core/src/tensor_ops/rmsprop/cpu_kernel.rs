use super::RmsPropConfig;
use crate::{
    dtypes::Dtype,
    tensor::{Cpu, Error, Tensor},
    tensor_ops::cast,
};
use num_traits::Float;

impl<E: Dtype + Float> super::RmsPropKernel<E> for Cpu {
    fn update(
        &self,
        cfg: &RmsPropConfig,
        grad: &mut Tensor<E>,
        mean_squares: &mut Tensor<E>,
        momentum: &mut Tensor<E>,
        lr: E,
    ) -> Result<(), Error> {
        let decay: E = cast(cfg.decay)?;
        let mu: E = cast(cfg.momentum)?;
        let eps: E = cast(cfg.epsilon)?;
        for (g, (ms, m)) in grad.as_mut_slice().iter_mut().zip(
            mean_squares
                .as_mut_slice()
                .iter_mut()
                .zip(momentum.as_mut_slice().iter_mut()),
        ) {
            // ms = ms + (1 - decay) * (g^2 - ms)
            *ms += (E::one() - decay) * (*g * *g - *ms);
            *m = *m * mu + lr * *g / (eps + *ms).sqrt();
            *g = *m;
        }
        Ok(())
    }
}
