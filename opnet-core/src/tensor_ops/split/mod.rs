mod cpu_kernel;

use super::axis_from_def;
use crate::{
    dtypes::{DataType, Unit},
    gradients::{grad_name, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    registry::{OperatorEntry, OperatorRegistry},
    shapes::Shape,
    tensor::{Blob, Cpu, Error, Tensor},
};

/// Arguments of the `Split` operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    /// Axis to split along. Defaults to `1`, or to the channel axis named by
    /// the `order` argument.
    pub axis: i64,

    /// Sizes of the parts along `axis`. Ignored when the sizes are given as a
    /// second input. Empty means an even split.
    pub split: Vec<i64>,

    /// Remove `axis` from every part. Every part must then have size 1.
    pub add_axis: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            axis: 1,
            split: Vec::new(),
            add_axis: false,
        }
    }
}

impl SplitConfig {
    pub fn from_def(def: &OperatorDef) -> Result<Self, Error> {
        Ok(Self {
            axis: axis_from_def(def)?,
            split: def.repeated_arg("split")?,
            add_axis: def.single_arg("add_axis", false)?,
        })
    }
}

pub trait SplitKernel<E: Unit> {
    /// Cuts `input` along `axis` into consecutive parts of `sizes`.
    fn split(&self, axis: usize, input: &Tensor<E>, sizes: &[usize]) -> Result<Vec<Tensor<E>>, Error>;
}

/// Resolves the part sizes from, in order of precedence, an explicit
/// `sizes` tensor, [SplitConfig::split], or an even split into `parts`.
pub fn split_sizes(
    cfg: &SplitConfig,
    axis_size: usize,
    sizes: Option<&Tensor<i32>>,
    parts: usize,
) -> Result<Vec<usize>, Error> {
    let given: Vec<i64> = match sizes {
        Some(t) => t.as_slice().iter().map(|&s| s as i64).collect(),
        None => cfg.split.clone(),
    };
    let sizes: Vec<usize> = if given.is_empty() {
        if parts == 0 || axis_size % parts != 0 {
            return Err(Error::invalid_arg(
                "split",
                format!("cannot split an axis of size {axis_size} evenly into {parts} parts"),
            ));
        }
        vec![axis_size / parts; parts]
    } else {
        if let Some(s) = given.iter().find(|&&s| s < 0) {
            return Err(Error::invalid_arg("split", format!("negative split size {s}")));
        }
        given.into_iter().map(|s| s as usize).collect()
    };
    if sizes.len() != parts {
        return Err(Error::invalid_arg(
            "split",
            format!("{} split sizes given for {parts} outputs", sizes.len()),
        ));
    }
    let total: usize = sizes.iter().sum();
    if total != axis_size {
        return Err(Error::invalid_arg(
            "split",
            format!("split sizes {sizes:?} do not sum to the axis size {axis_size}"),
        ));
    }
    Ok(sizes)
}

/// Splits `input` into `parts` tensors along `cfg.axis`.
pub fn try_split<E: Unit, D: SplitKernel<E>>(
    device: &D,
    cfg: &SplitConfig,
    input: &Tensor<E>,
    sizes: Option<&Tensor<i32>>,
    parts: usize,
) -> Result<Vec<Tensor<E>>, Error> {
    let axis = Shape::canonical_axis(cfg.axis, input.shape().ndim())?;
    let sizes = split_sizes(cfg, input.shape()[axis], sizes, parts)?;
    if cfg.add_axis && sizes.iter().any(|&s| s != 1) {
        return Err(Error::invalid_arg(
            "add_axis",
            format!("every part must have size 1 along the removed axis, got {sizes:?}"),
        ));
    }
    let outputs = device.split(axis, input, &sizes)?;
    if cfg.add_axis {
        outputs
            .iter()
            .map(|t| t.reshape(t.shape().remove_dim(axis)))
            .collect()
    } else {
        Ok(outputs)
    }
}

#[derive(Debug, Clone)]
pub struct SplitOp {
    cfg: SplitConfig,
    parts: usize,
    device: Cpu,
}

impl SplitOp {
    fn run_typed<E: Unit>(&self, input: &Tensor<E>, sizes: Option<&Tensor<i32>>) -> Result<Vec<Blob>, Error>
    where
        Cpu: SplitKernel<E>,
        Blob: From<Tensor<E>>,
    {
        let parts = try_split(&self.device, &self.cfg, input, sizes, self.parts)?;
        Ok(parts.into_iter().map(Blob::from).collect())
    }
}

impl Operator for SplitOp {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error> {
        let sizes = match inputs.get(1) {
            Some(b) => Some(b.as_i32()?),
            None => None,
        };
        match inputs[0].data_type() {
            DataType::Float => self.run_typed(inputs[0].as_f32()?, sizes),
            DataType::Int32 => self.run_typed(inputs[0].as_i32()?, sizes),
        }
    }
}

fn create(def: &OperatorDef, device: &Cpu) -> Result<Box<dyn Operator>, Error> {
    Ok(Box::new(SplitOp {
        cfg: SplitConfig::from_def(def)?,
        parts: def.outputs.len(),
        device: device.clone(),
    }))
}

fn gradient(def: &OperatorDef) -> Result<GradientOps, Error> {
    let input_grad = grad_name(&def.inputs[0]);
    let output_grads: Vec<String> = def.outputs.iter().map(|o| grad_name(o)).collect();
    let dims = format!("_{input_grad}_dims");
    let mut concat = OperatorDef::new("Concat", output_grads, [input_grad.clone(), dims]);
    concat.args = def
        .args
        .iter()
        .filter(|a| a.name != "split")
        .cloned()
        .collect();
    let mut input_grads = vec![None; def.inputs.len()];
    input_grads[0] = Some(input_grad);
    Ok(GradientOps {
        ops: vec![concat],
        input_grads,
    })
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register(
        "Split",
        OperatorEntry {
            schema: OpSchema::new(1, 1).inputs(1, 2).outputs(1, usize::MAX),
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
    fn test_split_by_arg() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_fn([2, 3], |i| i as f32);
        let cfg = SplitConfig {
            split: vec![1, 2],
            ..Default::default()
        };
        let parts = try_split(&dev, &cfg, &x, None, 2).unwrap();
        assert_eq!(parts[0].shape().dims(), &[2, 1]);
        assert_close!(parts[0].as_slice(), [0.0, 3.0]);
        assert_eq!(parts[1].shape().dims(), &[2, 2]);
        assert_close!(parts[1].as_slice(), [1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_split_by_input_takes_precedence() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_fn([4], |i| i as f32);
        let sizes = Tensor::from_vec([2], vec![3, 1]).unwrap();
        let cfg = SplitConfig {
            axis: 0,
            split: vec![2, 2],
            add_axis: false,
        };
        let parts = try_split(&dev, &cfg, &x, Some(&sizes), 2).unwrap();
        assert_close!(parts[0].as_slice(), [0.0, 1.0, 2.0]);
        assert_close!(parts[1].as_slice(), [3.0]);
    }

    #[test]
    fn test_split_even_and_invalid() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::zeros([2, 4]);
        let parts = try_split(&dev, &SplitConfig::default(), &x, None, 2).unwrap();
        assert!(parts.iter().all(|p| p.shape().dims() == [2, 2]));
        assert!(try_split(&dev, &SplitConfig::default(), &x, None, 3).is_err());
        let cfg = SplitConfig {
            split: vec![1, 1],
            ..Default::default()
        };
        assert!(try_split(&dev, &cfg, &x, None, 2).is_err());
    }

    #[test]
    fn test_split_add_axis() {
        let dev: TestDevice = Default::default();
        let x: Tensor<TestDtype> = Tensor::from_fn([2, 2], |i| i as f32);
        let cfg = SplitConfig {
            add_axis: true,
            ..Default::default()
        };
        let parts = try_split(&dev, &cfg, &x, None, 2).unwrap();
        assert_eq!(parts[0].shape().dims(), &[2]);
        assert_close!(parts[0].as_slice(), [0.0, 2.0]);
        assert_close!(parts[1].as_slice(), [1.0, 3.0]);
    }

    #[test]
    fn test_split_gradient_is_concat() {
        let op = create_operator("Split", ["x"], ["a", "b"]).arg("axis", 0).arg("split", vec![1i64, 2]);
        let g = gradient(&op).unwrap();
        assert_eq!(g.ops[0].op_type, "Concat");
        assert_eq!(g.ops[0].inputs, vec!["a_grad", "b_grad"]);
        assert_eq!(g.ops[0].outputs[0], "x_grad");
        assert!(!g.ops[0].has_arg("split"));
        assert_eq!(g.input_grads, vec![Some("x_grad".to_string())]);
    }
}
