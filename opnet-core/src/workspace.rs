//! Named blob storage that runs operators by name.

use std::{collections::HashMap, sync::Arc};

use crate::{
    operator::{NetDef, OperatorDef},
    registry::OperatorRegistry,
    tensor::{Blob, Cpu, Error},
};

/// Holds blobs by name and runs operator definitions against them.
///
/// Each run creates the operator through the registry, reads its inputs,
/// and stores its outputs only once the operator has succeeded.
#[derive(Debug, Clone)]
pub struct Workspace {
    device: Cpu,
    registry: Arc<OperatorRegistry>,
    blobs: HashMap<String, Blob>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Cpu::default())
    }
}

impl Workspace {
    pub fn new(device: Cpu) -> Self {
        Self::with_registry(device, Arc::new(OperatorRegistry::default()))
    }

    pub fn with_registry(device: Cpu, registry: Arc<OperatorRegistry>) -> Self {
        Self {
            device,
            registry,
            blobs: HashMap::new(),
        }
    }

    pub fn device(&self) -> &Cpu {
        &self.device
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Stores `blob` under `name`, replacing any previous value.
    pub fn feed_blob(&mut self, name: &str, blob: impl Into<Blob>) {
        self.blobs.insert(name.to_string(), blob.into());
    }

    pub fn fetch_blob(&self, name: &str) -> Result<&Blob, Error> {
        self.blobs
            .get(name)
            .ok_or_else(|| Error::BlobNotFound(name.to_string()))
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    /// Names of every stored blob, sorted.
    pub fn blob_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn run_operator_once(&mut self, def: &OperatorDef) -> Result<(), Error> {
        let op = self.registry.create(def, &self.device)?;
        let inputs = def
            .inputs
            .iter()
            .map(|name| self.fetch_blob(name))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = op.run(&inputs).map_err(|err| {
            tracing::debug!(op_type = %def.op_type, %err, "operator failed");
            err
        })?;
        if outputs.len() != def.outputs.len() {
            return Err(Error::WrongNumOutputs {
                op_type: def.op_type.clone(),
                expected: def.outputs.len().to_string(),
                received: outputs.len(),
            });
        }
        for (name, blob) in def.outputs.iter().zip(outputs) {
            tracing::trace!(blob = %name, shape = %blob.shape(), "stored output");
            self.blobs.insert(name.clone(), blob);
        }
        tracing::debug!(op_type = %def.op_type, "ran operator");
        Ok(())
    }

    /// Runs `defs` in order, stopping at the first failure.
    pub fn run_operators_once<'a>(
        &mut self,
        defs: impl IntoIterator<Item = &'a OperatorDef>,
    ) -> Result<(), Error> {
        for def in defs {
            self.run_operator_once(def)?;
        }
        Ok(())
    }

    pub fn run_net_once(&mut self, net: &NetDef) -> Result<(), Error> {
        tracing::debug!(net = %net.name, num_ops = net.ops.len(), "running net");
        for name in &net.external_inputs {
            if !self.has_blob(name) {
                return Err(Error::BlobNotFound(name.clone()));
            }
        }
        self.run_operators_once(&net.ops)
    }
}
