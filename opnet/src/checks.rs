//! Utilities for testing operators: comparing outputs and gradients against
//! reference implementations, and comparing registered gradients against
//! finite differences.
//!
//! ```rust
//! # use opnet::prelude::*;
//! # use opnet_core::prelude::*;
//! let op = create_operator("LabelCrossEntropy", ["X", "label"], ["Y"]);
//! let x = Tensor::from_vec([1, 2], vec![0.25f32, 0.75])?;
//! let label = Tensor::from_vec([1], vec![1i32])?;
//! assert_reference_checks(
//!     cpu_do(),
//!     &op,
//!     vec![x.into(), label.into()],
//!     |_| vec![Some(Tensor::from_vec([1], vec![-(0.75f32.ln())]).unwrap().into())],
//!     1e-4,
//! )?;
//! # Ok::<(), opnet::checks::CheckError>(())
//! ```

use opnet_core::{
    gradients::grad_name,
    operator::OperatorDef,
    shapes::Shape,
    tensor::{Blob, Cpu, Tensor},
    workspace::Workspace,
};

/// The device a check runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceOption {
    #[default]
    Cpu,
}

impl DeviceOption {
    pub fn device(&self) -> Cpu {
        match self {
            Self::Cpu => Cpu::default(),
        }
    }
}

/// Shorthand for [DeviceOption::Cpu].
pub fn cpu_do() -> DeviceOption {
    DeviceOption::Cpu
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("output `{blob}` differs from the reference at element {index}: {actual} vs {expected}")]
    OutputMismatch {
        blob: String,
        index: usize,
        actual: f32,
        expected: f32,
    },
    #[error("gradient `{blob}` differs at element {index}: {actual} vs {expected}")]
    GradientMismatch {
        blob: String,
        index: usize,
        actual: f32,
        expected: f32,
    },
    #[error("blob `{blob}` has shape {actual}, expected {expected}")]
    ShapeMismatch {
        blob: String,
        actual: Shape,
        expected: Shape,
    },
    #[error("{op_type} has {available} outputs, but the reference returned {returned}")]
    MissingOutput {
        op_type: String,
        available: usize,
        returned: usize,
    },
    #[error("no gradient is computed for input `{0}`")]
    MissingGradient(String),
    #[error("{op_type} names {expected} inputs, but {received} were provided")]
    WrongNumInputs {
        op_type: String,
        expected: usize,
        received: usize,
    },
    #[error("{what} index {index} is out of range for {len} entries")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    Core(#[from] opnet_core::Error),
}

fn get<'s, T>(items: &'s [T], index: usize, what: &'static str) -> Result<&'s T, CheckError> {
    items.get(index).ok_or(CheckError::IndexOutOfRange {
        what,
        index,
        len: items.len(),
    })
}

/// Computes the expected outputs from the forward inputs. `None` skips the
/// output at that position.
pub type Reference<'a> = Box<dyn Fn(&[Blob]) -> Vec<Option<Blob>> + 'a>;

/// Computes the expected input gradients from the output gradient, the
/// forward outputs and the forward inputs. `None` skips the input at that
/// position.
pub type GradReference<'a> = Box<dyn Fn(&Blob, &[Blob], &[Blob]) -> Vec<Option<Blob>> + 'a>;

/// Runs an operator and compares it to a reference implementation.
pub struct ReferenceCheck<'a> {
    device: DeviceOption,
    op: OperatorDef,
    inputs: Vec<Blob>,
    reference: Reference<'a>,
    threshold: f32,
    output_to_grad: Option<String>,
    grad_reference: Option<GradReference<'a>>,
}

impl<'a> ReferenceCheck<'a> {
    pub fn new(
        device: DeviceOption,
        op: &OperatorDef,
        inputs: Vec<Blob>,
        reference: impl Fn(&[Blob]) -> Vec<Option<Blob>> + 'a,
    ) -> Self {
        Self {
            device,
            op: op.clone(),
            inputs,
            reference: Box::new(reference),
            threshold: 1e-4,
            output_to_grad: None,
            grad_reference: None,
        }
    }

    /// Tolerance `t` of `|actual - expected| <= t + t * |expected|`.
    /// Defaults to `1e-4`.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// The output whose value is fed back as its own gradient when checking
    /// [ReferenceCheck::grad_reference].
    pub fn output_to_grad(mut self, output: &str) -> Self {
        self.output_to_grad = Some(output.to_string());
        self
    }

    pub fn grad_reference(
        mut self,
        reference: impl Fn(&Blob, &[Blob], &[Blob]) -> Vec<Option<Blob>> + 'a,
    ) -> Self {
        self.grad_reference = Some(Box::new(reference));
        self
    }

    pub fn run(&self) -> Result<(), CheckError> {
        let mut ws = feed_inputs(self.device, &self.op, &self.inputs)?;
        ws.run_operator_once(&self.op)?;

        let expected = (self.reference)(&self.inputs);
        if expected.len() > self.op.outputs.len() {
            return Err(CheckError::MissingOutput {
                op_type: self.op.op_type.clone(),
                available: self.op.outputs.len(),
                returned: expected.len(),
            });
        }
        for (name, expected) in self.op.outputs.iter().zip(expected) {
            if let Some(expected) = expected {
                let actual = ws.fetch_blob(name)?;
                compare(name, actual, &expected, self.threshold).map_err(|m| m.into_output())?;
            }
        }

        match (&self.output_to_grad, &self.grad_reference) {
            (Some(output), Some(grad_reference)) => {
                self.check_grad_reference(&mut ws, output, grad_reference)
            }
            _ => Ok(()),
        }
    }

    fn check_grad_reference(
        &self,
        ws: &mut Workspace,
        output: &str,
        grad_reference: &GradReference<'a>,
    ) -> Result<(), CheckError> {
        let outputs = self
            .op
            .outputs
            .iter()
            .map(|name| ws.fetch_blob(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let g = ws.fetch_blob(output)?.clone();
        ws.feed_blob(&grad_name(output), g.clone());

        let grads = ws.registry().gradient_for(&self.op)?;
        ws.run_operators_once(&grads.ops)?;

        let expected = grad_reference(&g, &outputs, &self.inputs);
        for (i, expected) in expected.into_iter().enumerate() {
            let input = get(&self.op.inputs, i, "gradient reference")?;
            let Some(expected) = expected else {
                continue;
            };
            let name = grads
                .input_grads
                .get(i)
                .cloned()
                .flatten()
                .ok_or_else(|| CheckError::MissingGradient(input.clone()))?;
            let actual = ws.fetch_blob(&name)?;
            compare(&name, actual, &expected, self.threshold).map_err(|m| m.into_gradient())?;
        }
        Ok(())
    }
}

/// Runs `op` on `inputs` and checks the outputs against `reference`.
pub fn assert_reference_checks<'a>(
    device: DeviceOption,
    op: &OperatorDef,
    inputs: Vec<Blob>,
    reference: impl Fn(&[Blob]) -> Vec<Option<Blob>> + 'a,
    threshold: f32,
) -> Result<(), CheckError> {
    ReferenceCheck::new(device, op, inputs, reference)
        .threshold(threshold)
        .run()
}

/// Compares registered gradients against central differences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientChecker {
    /// Perturbation applied to each input element. Defaults to `0.05`.
    pub stepsize: f32,

    /// Tolerance `t` of `|analytic - numeric| <= t + t * |numeric|`.
    /// Defaults to `0.005`.
    pub threshold: f32,
}

impl Default for GradientChecker {
    fn default() -> Self {
        Self {
            stepsize: 0.05,
            threshold: 0.005,
        }
    }
}

impl GradientChecker {
    pub fn new(stepsize: f32, threshold: f32) -> Self {
        Self {
            stepsize,
            threshold,
        }
    }

    /// Returns the analytic and the numeric gradient of
    /// `loss = 0.5 * sum(y^2)` over `outputs_with_grads`, with respect to
    /// input `input_to_check`.
    pub fn gradients(
        &self,
        device: DeviceOption,
        op: &OperatorDef,
        inputs: &[Blob],
        input_to_check: usize,
        outputs_with_grads: &[usize],
    ) -> Result<(Tensor<f32>, Tensor<f32>), CheckError> {
        let mut ws = feed_inputs(device, op, inputs)?;
        let input_name = get(&op.inputs, input_to_check, "input")?;
        for &i in outputs_with_grads {
            get(&op.outputs, i, "output")?;
        }
        let grads = ws.registry().gradient_for(op)?;
        let grad_blob = grads
            .input_grads
            .get(input_to_check)
            .cloned()
            .flatten()
            .ok_or_else(|| CheckError::MissingGradient(input_name.clone()))?;
        let x = get(inputs, input_to_check, "input")?.as_f32()?.clone();

        ws.feed_blob(input_name, x.clone());
        loss(&mut ws, op, outputs_with_grads)?;
        ws.run_operators_once(&grads.ops)?;
        let analytic = ws.fetch_blob(&grad_blob)?.as_f32()?.clone();
        if analytic.shape() != x.shape() {
            return Err(CheckError::ShapeMismatch {
                blob: grad_blob,
                actual: analytic.shape().clone(),
                expected: x.shape().clone(),
            });
        }

        let step = self.stepsize as f64;
        let mut numeric = Tensor::zeros(x.shape().clone());
        for i in 0..x.num_elements() {
            let mut xp = x.clone();
            xp.as_mut_slice()[i] += self.stepsize;
            ws.feed_blob(input_name, xp);
            let pos = loss(&mut ws, op, outputs_with_grads)?;

            let mut xn = x.clone();
            xn.as_mut_slice()[i] -= self.stepsize;
            ws.feed_blob(input_name, xn);
            let neg = loss(&mut ws, op, outputs_with_grads)?;

            numeric.as_mut_slice()[i] = ((pos - neg) / (2.0 * step)) as f32;
        }
        ws.feed_blob(input_name, x);
        Ok((analytic, numeric))
    }

    /// Fails on the first element where the analytic and numeric gradients
    /// are not close.
    pub fn check_simple(
        &self,
        device: DeviceOption,
        op: &OperatorDef,
        inputs: &[Blob],
        input_to_check: usize,
        outputs_with_grads: &[usize],
    ) -> Result<(), CheckError> {
        let (analytic, numeric) =
            self.gradients(device, op, inputs, input_to_check, outputs_with_grads)?;
        let blob = grad_name(get(&op.inputs, input_to_check, "input")?);
        for (index, (&a, &n)) in analytic.as_slice().iter().zip(numeric.as_slice()).enumerate() {
            tracing::trace!(%blob, index, analytic = a, numeric = n, "gradient check");
            if !is_close(a, n, self.threshold) {
                return Err(CheckError::GradientMismatch {
                    blob,
                    index,
                    actual: a,
                    expected: n,
                });
            }
        }
        Ok(())
    }
}

/// Checks the gradient of `op` with respect to input `input_to_check`
/// against finite differences.
pub fn assert_gradient_checks(
    device: DeviceOption,
    op: &OperatorDef,
    inputs: &[Blob],
    input_to_check: usize,
    outputs_with_grads: &[usize],
    checker: &GradientChecker,
) -> Result<(), CheckError> {
    checker.check_simple(device, op, inputs, input_to_check, outputs_with_grads)
}

fn feed_inputs(device: DeviceOption, op: &OperatorDef, inputs: &[Blob]) -> Result<Workspace, CheckError> {
    if inputs.len() != op.inputs.len() {
        return Err(CheckError::WrongNumInputs {
            op_type: op.op_type.clone(),
            expected: op.inputs.len(),
            received: inputs.len(),
        });
    }
    let mut ws = Workspace::new(device.device());
    for (name, blob) in op.inputs.iter().zip(inputs) {
        ws.feed_blob(name, blob.clone());
    }
    Ok(ws)
}

/// Runs `op`, feeds each output in `outputs_with_grads` as its own gradient
/// and returns `0.5 * sum(y^2)` over them.
fn loss(ws: &mut Workspace, op: &OperatorDef, outputs_with_grads: &[usize]) -> Result<f64, CheckError> {
    ws.run_operator_once(op)?;
    let mut loss = 0.0f64;
    for &i in outputs_with_grads {
        let name = get(&op.outputs, i, "output")?;
        let y = ws.fetch_blob(name)?.as_f32()?.clone();
        loss += y.as_slice().iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>();
        ws.feed_blob(&grad_name(name), y);
    }
    Ok(loss / 2.0)
}

fn is_close(actual: f32, expected: f32, threshold: f32) -> bool {
    (actual - expected).abs() <= threshold + threshold * expected.abs()
}

/// The first disagreement between two blobs, before it is labelled as an
/// output or gradient mismatch.
enum Mismatch {
    Shape {
        blob: String,
        actual: Shape,
        expected: Shape,
    },
    Value {
        blob: String,
        index: usize,
        actual: f32,
        expected: f32,
    },
}

impl Mismatch {
    fn into_output(self) -> CheckError {
        match self {
            Self::Shape {
                blob,
                actual,
                expected,
            } => CheckError::ShapeMismatch {
                blob,
                actual,
                expected,
            },
            Self::Value {
                blob,
                index,
                actual,
                expected,
            } => CheckError::OutputMismatch {
                blob,
                index,
                actual,
                expected,
            },
        }
    }

    fn into_gradient(self) -> CheckError {
        match self {
            Self::Value {
                blob,
                index,
                actual,
                expected,
            } => CheckError::GradientMismatch {
                blob,
                index,
                actual,
                expected,
            },
            shape => shape.into_output(),
        }
    }
}

fn values(blob: &Blob) -> Vec<f32> {
    match blob {
        Blob::Float(t) => t.to_vec(),
        Blob::Int32(t) => t.as_slice().iter().map(|&v| v as f32).collect(),
    }
}

fn compare(name: &str, actual: &Blob, expected: &Blob, threshold: f32) -> Result<(), Mismatch> {
    if actual.shape() != expected.shape() {
        return Err(Mismatch::Shape {
            blob: name.to_string(),
            actual: actual.shape().clone(),
            expected: expected.shape().clone(),
        });
    }
    let (a, e) = (values(actual), values(expected));
    match a.iter().zip(&e).position(|(&a, &e)| !is_close(a, e, threshold)) {
        Some(index) => Err(Mismatch::Value {
            blob: name.to_string(),
            index,
            actual: a[index],
            expected: e[index],
        }),
        None => Ok(()),
    }
}
