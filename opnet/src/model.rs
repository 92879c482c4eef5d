//! The layer model helper: owns the net layers emit operators into.

use std::collections::HashSet;

use crate::{layers::Concat, net::Net, schema::Field, Error};

/// A declarative node of a model. It validates its input record when it is
/// created, and emits the operators computing its output when added to a
/// [LayerModelHelper].
pub trait ModelLayer: std::fmt::Debug {
    /// The unique name given by [LayerModelHelper::next_layer_name].
    fn name(&self) -> &str;

    fn layer_type(&self) -> &str;

    fn input_record(&self) -> &Field;

    fn output_schema(&self) -> &Field;

    fn add_ops(&self, net: &mut Net) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct LayerModelHelper {
    net: Net,
    layers: Vec<Box<dyn ModelLayer>>,
    layer_names: HashSet<String>,
}

impl LayerModelHelper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            net: Net::new(name),
            layers: Vec::new(),
            layer_names: HashSet::new(),
        }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

    pub fn layers(&self) -> &[Box<dyn ModelLayer>] {
        &self.layers
    }

    /// `prefix`, or `prefix_auto_0`, `prefix_auto_1`, ... when taken.
    pub fn next_layer_name(&mut self, prefix: &str) -> String {
        let mut name = prefix.to_string();
        let mut index = 0;
        while self.layer_names.contains(&name) {
            name = format!("{prefix}_auto_{index}");
            index += 1;
        }
        self.layer_names.insert(name.clone());
        name
    }

    /// Emits the operators of `layer` and returns its output schema.
    pub fn add_layer(&mut self, layer: impl ModelLayer + 'static) -> Result<Field, Error> {
        layer.add_ops(&mut self.net)?;
        let output = layer.output_schema().clone();
        tracing::debug!(
            layer = layer.name(),
            layer_type = layer.layer_type(),
            output = %output,
            "added layer"
        );
        self.layers.push(Box::new(layer));
        Ok(output)
    }

    /// Adds a [Concat] layer named `concat` over the fields of `input_record`.
    pub fn concat(&mut self, input_record: Field, axis: i64) -> Result<Field, Error> {
        let layer = Concat::new(self, input_record, axis, "concat")?;
        self.add_layer(layer)
    }
}
