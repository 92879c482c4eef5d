//! The table from operator type name to schema, constructor and gradient
//! maker.

use std::collections::BTreeMap;

use crate::{
    gradients::{GradientMaker, GradientOps},
    operator::{OpSchema, Operator, OperatorDef},
    tensor::{Cpu, Error},
    tensor_ops,
};

/// Builds a runnable operator from its definition.
pub type OperatorCreator = fn(&OperatorDef, &Cpu) -> Result<Box<dyn Operator>, Error>;

/// Everything the registry knows about one operator type.
#[derive(Debug, Clone, Copy)]
pub struct OperatorEntry {
    pub schema: OpSchema,
    pub create: OperatorCreator,
    pub gradient: Option<GradientMaker>,
}

/// Maps operator type names to [OperatorEntry]s.
///
/// [OperatorRegistry::default] holds every built-in operator of
/// [crate::tensor_ops]; [OperatorRegistry::empty] holds none.
///
/// ```rust
/// # use opnet_core::prelude::*;
/// let registry = OperatorRegistry::default();
/// assert!(registry.contains("SoftmaxWithLoss"));
/// let def = create_operator("CrossEntropy", ["X", "label"], ["Y"]);
/// let grads = registry.gradient_for(&def)?;
/// assert_eq!(grads.ops[0].op_type, "CrossEntropyGradient");
/// # Ok::<(), opnet_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    entries: BTreeMap<String, OperatorEntry>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        tensor_ops::register_builtins(&mut registry);
        registry
    }
}

impl OperatorRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds `op_type`, replacing any previous entry of that name.
    pub fn register(&mut self, op_type: &str, entry: OperatorEntry) {
        self.entries.insert(op_type.to_string(), entry);
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.entries.contains_key(op_type)
    }

    /// Registered type names, sorted.
    pub fn op_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn schema(&self, op_type: &str) -> Result<&OpSchema, Error> {
        self.entry(op_type).map(|e| &e.schema)
    }

    fn entry(&self, op_type: &str) -> Result<&OperatorEntry, Error> {
        self.entries
            .get(op_type)
            .ok_or_else(|| Error::UnknownOperator(op_type.to_string()))
    }

    /// Checks `def` against its schema and builds the operator.
    pub fn create(&self, def: &OperatorDef, device: &Cpu) -> Result<Box<dyn Operator>, Error> {
        let entry = self.entry(&def.op_type)?;
        entry.schema.verify(def)?;
        let op = (entry.create)(def, device)?;
        tracing::debug!(
            op_type = %def.op_type,
            inputs = ?def.inputs,
            outputs = ?def.outputs,
            "created operator"
        );
        Ok(op)
    }

    /// Checks `def` against its schema and returns its gradient operators.
    pub fn gradient_for(&self, def: &OperatorDef) -> Result<GradientOps, Error> {
        let entry = self.entry(&def.op_type)?;
        entry.schema.verify(def)?;
        let maker = entry
            .gradient
            .ok_or_else(|| Error::NoGradient(def.op_type.clone()))?;
        maker(def)
    }
}
