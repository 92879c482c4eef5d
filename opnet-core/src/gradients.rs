//! Gradient makers: given a forward [OperatorDef], produce the definitions
//! of the operators computing its input gradients.
//!
//! Gradient blobs are named after the blob they differentiate, with a
//! `_grad` suffix (see [grad_name]). A gradient maker reads the gradient of
//! the forward outputs from those names and writes the gradients of the
//! forward inputs the same way.

use std::collections::BTreeMap;

use crate::{operator::OperatorDef, tensor::Error};

/// Function producing the gradient operators of a forward operator.
pub type GradientMaker = fn(&OperatorDef) -> Result<GradientOps, Error>;

/// The name of the blob holding the gradient of `blob`.
pub fn grad_name(blob: &str) -> String {
    format!("{blob}_grad")
}

/// Gradient operators for one forward operator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientOps {
    pub ops: Vec<OperatorDef>,
    /// For each forward input, the blob its gradient is written to, if any.
    pub input_grads: Vec<Option<String>>,
}

impl GradientOps {
    /// Maps each forward input blob to the blob holding its gradient.
    pub fn grad_map(&self, forward: &OperatorDef) -> BTreeMap<String, String> {
        forward
            .inputs
            .iter()
            .zip(self.input_grads.iter())
            .filter_map(|(input, grad)| Some((input.clone(), grad.clone()?)))
            .collect()
    }

    /// A single gradient operator writing the gradients of the forward
    /// inputs selected by `grad_inputs`.
    pub(crate) fn single(
        forward: &OperatorDef,
        op_type: &str,
        inputs: Vec<String>,
        grad_inputs: &[usize],
    ) -> Self {
        let outputs: Vec<String> = grad_inputs
            .iter()
            .map(|&i| grad_name(&forward.inputs[i]))
            .collect();
        let mut input_grads = vec![None; forward.inputs.len()];
        for (&i, name) in grad_inputs.iter().zip(outputs.iter()) {
            input_grads[i] = Some(name.clone());
        }
        let mut op = OperatorDef::new(op_type, inputs, outputs);
        op.args = forward.args.clone();
        Self {
            ops: vec![op],
            input_grads,
        }
    }
}

/// Names of a forward operator's blobs, in the shape gradient makers read
/// them.
pub(crate) struct Blobs<'a>(pub(crate) &'a OperatorDef);

impl Blobs<'_> {
    pub(crate) fn input(&self, i: usize) -> String {
        self.0.inputs[i].clone()
    }

    pub(crate) fn output(&self, i: usize) -> String {
        self.0.outputs[i].clone()
    }

    pub(crate) fn output_grad(&self, i: usize) -> String {
        grad_name(&self.0.outputs[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::create_operator;

    #[test]
    fn test_single_gradient_op() {
        let fwd = create_operator("CrossEntropy", ["X", "label"], ["Y"]).arg("k", 1);
        let b = Blobs(&fwd);
        let g = GradientOps::single(
            &fwd,
            "CrossEntropyGradient",
            vec![b.input(0), b.input(1), b.output_grad(0)],
            &[0],
        );
        assert_eq!(g.ops.len(), 1);
        assert_eq!(g.ops[0].inputs, vec!["X", "label", "Y_grad"]);
        assert_eq!(g.ops[0].outputs, vec!["X_grad"]);
        assert_eq!(g.ops[0].args, fwd.args);
        assert_eq!(g.input_grads, vec![Some("X_grad".to_string()), None]);
        let map = g.grad_map(&fwd);
        assert_eq!(map.len(), 1);
        assert_eq!(map["X"], "X_grad");
    }
}
