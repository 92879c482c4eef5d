//! A builder for [NetDef]s that hands out unique blob names.

use std::collections::HashSet;

use opnet_core::operator::{ArgValue, NetDef, OperatorDef};

/// Collects operators into a [NetDef] and tracks which blob names are taken.
#[derive(Debug, Clone)]
pub struct Net {
    proto: NetDef,
    names: HashSet<String>,
}

impl Net {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            proto: NetDef::new(name),
            names: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.proto.name
    }

    pub fn proto(&self) -> &NetDef {
        &self.proto
    }

    pub fn is_defined(&self, blob: &str) -> bool {
        self.names.contains(blob)
    }

    /// Returns `"<net>/<prefix>"`, or the first of `"<net>/<prefix>_2"`,
    /// `"<net>/<prefix>_3"`, ... not yet taken. The returned name is taken
    /// from then on.
    pub fn next_name(&mut self, prefix: &str) -> String {
        let base = format!("{}/{prefix}", self.proto.name);
        let mut name = base.clone();
        let mut index = 2;
        while self.names.contains(&name) {
            name = format!("{base}_{index}");
            index += 1;
        }
        self.names.insert(name.clone());
        name
    }

    pub fn add_external_input(&mut self, blob: impl Into<String>) {
        let blob = blob.into();
        self.names.insert(blob.clone());
        self.proto.external_inputs.push(blob);
    }

    /// Appends an operator, marking its outputs as taken.
    pub fn add_op<I, O, A>(&mut self, op_type: &str, inputs: I, outputs: O, args: A) -> &OperatorDef
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
        A: IntoIterator<Item = (&'static str, ArgValue)>,
    {
        let mut def = OperatorDef::new(op_type, inputs, outputs);
        for (name, value) in args {
            def.set_arg(name, value);
        }
        self.names.extend(def.outputs.iter().cloned());
        tracing::trace!(net = %self.proto.name, op_type, outputs = ?def.outputs, "added operator");
        self.proto.ops.push(def);
        &self.proto.ops[self.proto.ops.len() - 1]
    }

    /// Appends a `Concat` along `axis`. `outputs` are the result and its
    /// split info.
    pub fn concat<I, O>(&mut self, inputs: I, outputs: O, axis: i64) -> &OperatorDef
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.add_op("Concat", inputs, outputs, [("axis", ArgValue::Int(axis))])
    }
}
