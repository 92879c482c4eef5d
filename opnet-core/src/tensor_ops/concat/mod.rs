mod cpu_kernel;

use super::{axis_from_def, typed_inputs};
use crate::{
    dtypes::{DataType, Unit},
    gradients::{grad_name, Blobs, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    shapes::Shape,
    tensor::{Blob, Cpu, Error, Tensor},
};

/// Arguments of the `Concat` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatConfig {
    /// Axis to join along, negative counts from the end. Defaults to `1`,
    /// or to the channel axis named by the `order` argument.
    pub axis: i64,

    /// Join along a new axis inserted at `axis` instead of an existing one.
    /// Defaults to `false`.
    pub add_axis: bool,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            axis: 1,
            add_axis: false,
        }
    }
}

impl ConcatConfig {
    pub fn from_def(def: &OperatorDef) -> Result<Self, Error> {
        Ok(Self {
            axis: axis_from_def(def)?,
            add_axis: def.single_arg("add_axis", false)?,
        })
    }

    /// Resolves [ConcatConfig::axis] against the rank of the inputs.
    pub fn canonical_axis(&self, input_ndim: usize) -> Result<usize, Error> {
        let ndim = if self.add_axis { input_ndim + 1 } else { input_ndim };
        Shape::canonical_axis(self.axis, ndim)
    }
}

pub trait ConcatKernel<E: Unit> {
    /// Joins `inputs` along `axis` into a tensor of `out_shape`.
    fn concat(&self, axis: usize, inputs: &[&Tensor<E>], out_shape: Shape) -> Result<Tensor<E>, Error>;
}

/// Joins tensors along `cfg.axis`, returning the result and the size each
/// input contributed along that axis.
pub fn try_concat<E: Unit, D: ConcatKernel<E>>(
    device: &D,
    cfg: &ConcatConfig,
    inputs: &[&Tensor<E>],
) -> Result<(Tensor<E>, Vec<usize>), Error> {
    let first = inputs
        .first()
        .ok_or_else(|| Error::invalid_arg("inputs", "Concat needs at least one input"))?;
    let axis = cfg.canonical_axis(first.shape().ndim())?;
    let shapes: Vec<Shape> = if cfg.add_axis {
        for t in inputs {
            if t.shape() != first.shape() {
                return Err(Error::ShapeMismatch {
                    op: "Concat",
                    lhs: t.shape().clone(),
                    rhs: first.shape().clone(),
                });
            }
        }
        inputs.iter().map(|t| t.shape().insert_dim(axis, 1)).collect()
    } else {
        inputs.iter().map(|t| t.shape().clone()).collect()
    };
    let refs: Vec<&Shape> = shapes.iter().collect();
    let out_shape = Shape::concat_along(&refs, axis)?;
    let split = shapes.iter().map(|s| s[axis]).collect();
    let out = device.concat(axis, inputs, out_shape)?;
    Ok((out, split))
}

#[derive(Debug, Clone)]
pub struct ConcatOp {
    cfg: ConcatConfig,
    device: Cpu,
}

impl ConcatOp {
    fn run_typed<E: Unit>(&self, inputs: &[&Tensor<E>]) -> Result<Vec<Blob>, Error>
    where
        Cpu: ConcatKernel<E>,
        Blob: From<Tensor<E>>,
    {
        let (out, split) = try_concat(&self.device, &self.cfg, inputs)?;
        let split: Vec<i32> = split.into_iter().map(|s| s as i32).collect();
        let split = Tensor::from_vec([split.len()], split)?;
        Ok(vec![out.into(), split.into()])
    }
}

impl Operator for ConcatOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        match inputs.first().map(|b| b.data_type()) {
            Some(DataType::Int32) => self.run_typed(&typed_inputs(inputs, Blob::as_i32)?),
            _ => self.run_typed(&typed_inputs(inputs, Blob::as_f32)?),
        }
    }
}

fn create(def: &OperatorDef, device: &Cpu) -> Result<Box<dyn Operator>, Error> {
    Ok(Box::new(ConcatOp {
        cfg: ConcatConfig::from_def(def)?,
        device: device.clone(),
    }))
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let b = Blobs(def);
    let outputs: Vec<String> = def.inputs.iter().map(|i| grad_name(i)).collect();
    let mut split = OperatorDef::new("Split", [b.output_grad(0), b.output(1)], outputs.clone());
    split.args = def.args.clone();
    Ok(GradientOps {
        ops: vec![split],
        input_grads: outputs.into_iter().map(Some).collect(),
    })
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "Concat",
        OperatorEntry {
            schema: OpSchema::new(1, 2).inputs(1, usize::MAX),
            create,
            gradient: Some(gradient),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{operator::create_operator, tests::*};

    #[test]
    fn test_concat_axis_1() {
        let dev: TestDevice = Default::default();
        let a: Tensor<TestDtype> = Tensor::from_vec([2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b: Tensor<TestDtype> = Tensor::from_vec([2, 1], vec![5.0, 6.0]).unwrap();
        let cfg = ConcatConfig::default();
        let (c, split) = try_concat(&dev, &cfg, &[&a, &b]).unwrap();
        assert_eq!(c.shape().dims(), &[2, 3]);
        assert_close!(c.as_slice(), [1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
        assert_eq!(split, vec![2, 1]);
    }

    #[test]
    fn test_concat_axis_0_and_negative() {
        let dev: TestDevice = Default::default();
        let a: Tensor<TestDtype> = Tensor::from_fn([1, 3], |i| i as f32);
        let b: Tensor<TestDtype> = Tensor::from_fn([2, 3], |i| 10.0 + i as f32);
        let cfg = ConcatConfig {
            axis: 0,
            ..Default::default()
        };
        let (c, _) = try_concat(&dev, &cfg, &[&a, &b]).unwrap();
        assert_eq!(c.shape().dims(), &[3, 3]);
        assert_close!(
            c.as_slice(),
            [0.0, 1.0, 2.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]
        );

        let cfg = ConcatConfig {
            axis: -1,
            ..Default::default()
        };
        let (c, split) = try_concat(&dev, &cfg, &[&a, &a]).unwrap();
        assert_eq!(c.shape().dims(), &[1, 6]);
        assert_eq!(split, vec![3, 3]);
    }

    #[test]
    fn test_concat_add_axis() {
        let dev: TestDevice = Default::default();
        let a: Tensor<TestDtype> = Tensor::from_vec([2], vec![1.0, 2.0]).unwrap();
        let b: Tensor<TestDtype> = Tensor::from_vec([2], vec![3.0, 4.0]).unwrap();
        let cfg = ConcatConfig {
            axis: 1,
            add_axis: true,
        };
        let (c, split) = try_concat(&dev, &cfg, &[&a, &b]).unwrap();
        assert_eq!(c.shape().dims(), &[2, 2]);
        assert_close!(c.as_slice(), [1.0, 3.0, 2.0, 4.0]);
        assert_eq!(split, vec![1, 1]);
    }

    #[test]
    fn test_concat_mismatched_shapes() {
        let dev: TestDevice = Default::default();
        let a: Tensor<f32> = Tensor::zeros([2, 2]);
        let b: Tensor<f32> = Tensor::zeros([3, 1]);
        let r = try_concat(&dev, &ConcatConfig::default(), &[&a, &b]);
        assert!(matches!(r, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_concat_op_int32_and_split_info() {
        let dev: TestDevice = Default::default();
        let op = create_operator("Concat", ["a", "b"], ["c", "c_dims"]).arg("axis", 0);
        let concat = create(&op, &dev).unwrap();
        let a: Blob = Tensor::from_vec([1], vec![7i32]).unwrap().into();
        let b: Blob = Tensor::from_vec([2], vec![8i32, 9]).unwrap().into();
        let out = concat.run(&[&a, &b]).unwrap();
        assert_eq!(out[0].as_i32().unwrap().as_slice(), &[7, 8, 9]);
        assert_eq!(out[1].as_i32().unwrap().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_concat_op_rejects_mixed_dtypes() {
        let dev: TestDevice = Default::default();
        let op = create_operator("Concat", ["a", "b"], ["c", "c_dims"]);
        let concat = create(&op, &dev).unwrap();
        let a: Blob = Tensor::<f32>::zeros([1, 1]).into();
        let b: Blob = Tensor::<i32>::zeros([1, 1]).into();
        assert!(matches!(
            concat.run(&[&a, &b]),
            Err(Error::WrongDtype { .. })
        ));
    }

    #[test]
    fn test_concat_order_argument() {
        let op = create_operator("Concat", ["a"], ["b", "c"]).arg("order", "NHWC");
        assert_eq!(ConcatConfig::from_def(&op).unwrap().axis, -1);
        let op = op.arg("axis", 2);
        assert_eq!(ConcatConfig::from_def(&op).unwrap().axis, 2);
    }

    #[test]
    fn test_concat_gradient_is_split() {
        let op = create_operator("Concat", ["a", "b"], ["c", "c_dims"]).arg("axis", 2);
        let g = gradient(&op).unwrap();
        assert_eq!(g.ops[0].op_type, "Split");
        assert_eq!(g.ops[0].inputs, vec!["c_grad", "c_dims"]);
        assert_eq!(g.ops[0].outputs, vec!["a_grad", "b_grad"]);
        assert_eq!(g.ops[0].single_arg("axis", 0i64).unwrap(), 2);
    }
}
