//! Operator definitions and the [Operator] trait every kernel wrapper
//! implements.
//!
//! An [OperatorDef] is plain data: an operator type name, positional input and
//! output blob names, and named arguments. It is turned into a runnable
//! [Operator] by the [crate::registry::OperatorRegistry].

use crate::tensor::{Blob, Error};

/// The value of a named operator argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Str(String),
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for ArgValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f32> for ArgValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        Self::Float(v as f32)
    }
}

impl From<Vec<i64>> for ArgValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Ints(v)
    }
}

impl From<Vec<f32>> for ArgValue {
    fn from(v: Vec<f32>) -> Self {
        Self::Floats(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Conversion out of an [ArgValue], used by [OperatorDef::single_arg].
pub trait FromArg: Sized {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error>;
}

impl FromArg for i64 {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error> {
        match value {
            ArgValue::Int(v) => Ok(*v),
            other => Err(Error::invalid_arg(name, format!("expected an int, found {other:?}"))),
        }
    }
}

impl FromArg for bool {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error> {
        i64::from_arg(name, value).map(|v| v != 0)
    }
}

impl FromArg for f32 {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error> {
        match value {
            ArgValue::Float(v) => Ok(*v),
            ArgValue::Int(v) => Ok(*v as f32),
            other => Err(Error::invalid_arg(name, format!("expected a float, found {other:?}"))),
        }
    }
}

impl FromArg for String {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error> {
        match value {
            ArgValue::Str(v) => Ok(v.clone()),
            other => Err(Error::invalid_arg(name, format!("expected a string, found {other:?}"))),
        }
    }
}

impl FromArg for Vec<i64> {
    fn from_arg(name: &str, value: &ArgValue) -> Result<Self, Error> {
        match value {
            ArgValue::Ints(v) => Ok(v.clone()),
            ArgValue::Int(v) => Ok(vec![*v]),
            other => Err(Error::invalid_arg(name, format!("expected ints, found {other:?}"))),
        }
    }
}

/// A named argument of an [OperatorDef].
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

/// Describes one operator invocation: which kernel, which blobs, which
/// arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperatorDef {
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub args: Vec<Argument>,
}

impl OperatorDef {
    pub fn new<I, O>(op_type: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            op_type: op_type.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            args: Vec::new(),
        }
    }

    /// Sets (or replaces) the argument `name`.
    pub fn arg(mut self, name: &str, value: impl Into<ArgValue>) -> Self {
        self.set_arg(name, value);
        self
    }

    pub fn set_arg(&mut self, name: &str, value: impl Into<ArgValue>) {
        let value = value.into();
        match self.args.iter_mut().find(|a| a.name == name) {
            Some(a) => a.value = value,
            None => self.args.push(Argument {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get_arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.get_arg(name).is_some()
    }

    /// The argument `name` converted to `T`, or `default` when absent.
    pub fn single_arg<T: FromArg>(&self, name: &str, default: T) -> Result<T, Error> {
        match self.get_arg(name) {
            Some(v) => T::from_arg(name, v),
            None => Ok(default),
        }
    }

    /// The repeated argument `name`, empty when absent.
    pub fn repeated_arg(&self, name: &str) -> Result<Vec<i64>, Error> {
        self.single_arg(name, Vec::new())
    }
}

/// Shorthand for [OperatorDef::new].
///
/// ```rust
/// # use opnet_core::prelude::*;
/// let op = create_operator("CrossEntropy", ["X", "label"], ["Y"]);
/// assert_eq!(op.op_type, "CrossEntropy");
/// assert_eq!(op.inputs, vec!["X", "label"]);
/// ```
pub fn create_operator<I, O>(op_type: &str, inputs: I, outputs: O) -> OperatorDef
where
    I: IntoIterator,
    I::Item: Into<String>,
    O: IntoIterator,
    O::Item: Into<String>,
{
    OperatorDef::new(op_type, inputs, outputs)
}

/// An ordered list of operators run one after the other.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetDef {
    pub name: String,
    pub ops: Vec<OperatorDef>,
    pub external_inputs: Vec<String>,
}

impl NetDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A runnable operator, created from an [OperatorDef] by the registry.
///
/// `inputs` are positional, in the order of [OperatorDef::inputs]; the
/// returned blobs are stored under [OperatorDef::outputs] in order.
pub trait Operator: std::fmt::Debug {
    fn run(&self, inputs: &[&Blob]) -> Result<Vec<Blob>, Error>;
}

/// Arity constraints checked when an operator is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSchema {
    pub min_inputs: usize,
    pub max_inputs: usize,
    pub min_outputs: usize,
    pub max_outputs: usize,
}

impl OpSchema {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            min_inputs: inputs,
            max_inputs: inputs,
            min_outputs: outputs,
            max_outputs: outputs,
        }
    }

    pub const fn inputs(mut self, min: usize, max: usize) -> Self {
        self.min_inputs = min;
        self.max_inputs = max;
        self
    }

    pub const fn outputs(mut self, min: usize, max: usize) -> Self {
        self.min_outputs = min;
        self.max_outputs = max;
        self
    }

    pub fn verify(&self, def: &OperatorDef) -> Result<(), Error> {
        let n_in = def.inputs.len();
        if n_in < self.min_inputs || n_in > self.max_inputs {
            return Err(Error::WrongNumInputs {
                op_type: def.op_type.clone(),
                expected: describe_range(self.min_inputs, self.max_inputs),
                received: n_in,
            });
        }
        let n_out = def.outputs.len();
        if n_out < self.min_outputs || n_out > self.max_outputs {
            return Err(Error::WrongNumOutputs {
                op_type: def.op_type.clone(),
                expected: describe_range(self.min_outputs, self.max_outputs),
                received: n_out,
            });
        }
        Ok(())
    }
}

fn describe_range(min: usize, max: usize) -> String {
    match (min, max) {
        (a, b) if a == b => a.to_string(),
        (a, usize::MAX) => format!("at least {a}"),
        (a, b) => format!("{a} to {b}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let op = create_operator("Concat", ["a", "b"], ["c", "d"])
            .arg("axis", 2)
            .arg("order", "NHWC")
            .arg("axis", 3);
        assert_eq!(op.args.len(), 2);
        assert_eq!(op.single_arg("axis", 1i64).unwrap(), 3);
        assert_eq!(op.single_arg("missing", 1i64).unwrap(), 1);
        assert_eq!(op.single_arg("order", String::new()).unwrap(), "NHWC");
        assert!(op.single_arg("order", 0.0f32).is_err());
        assert_eq!(op.repeated_arg("axis").unwrap(), vec![3]);
    }

    #[test]
    fn test_schema_verify() {
        let schema = OpSchema::new(2, 1).outputs(1, usize::MAX);
        let ok = create_operator("X", ["a", "b"], ["c", "d", "e"]);
        assert!(schema.verify(&ok).is_ok());
        let bad = create_operator("X", ["a"], ["c"]);
        assert!(matches!(
            schema.verify(&bad),
            Err(Error::WrongNumInputs { received: 1, .. })
        ));
        let none: [&str; 0] = [];
        let bad = create_operator("X", ["a", "b"], none);
        assert!(matches!(
            schema.verify(&bad),
            Err(Error::WrongNumOutputs { .. })
        ));
    }
}
