use opnet_core::dtypes::DataType;

use crate::{
    model::{LayerModelHelper, ModelLayer},
    net::Net,
    schema::Field,
    Error,
};

/// Concatenates the scalar fields of a struct record along `axis`.
///
/// `axis` counts the batch dimension, which is not part of field shapes, so
/// it must be at least 1 and the field shapes are joined on `axis - 1`.
#[derive(Debug, Clone)]
pub struct Concat {
    name: String,
    axis: i64,
    input_record: Field,
    output_schema: Field,
}

impl Concat {
    pub fn new(
        model: &mut LayerModelHelper,
        input_record: Field,
        axis: i64,
        name: &str,
    ) -> Result<Self, Error> {
        let fields = input_record
            .fields()
            .ok_or_else(|| Error::IncorrectInputType {
                expected: "Struct",
                received: input_record.to_string(),
            })?;
        if axis < 1 {
            return Err(Error::InvalidAxis(axis));
        }
        let dim = (axis - 1) as usize;

        let mut shapes = Vec::with_capacity(fields.len());
        for (_, field) in fields {
            let shape = field.shape().ok_or_else(|| Error::IncorrectInputType {
                expected: "Scalar",
                received: field.to_string(),
            })?;
            if shape.len() < axis as usize {
                return Err(Error::LimitedDimensions {
                    axis,
                    shape: shape.to_vec(),
                });
            }
            shapes.push(shape);
        }
        let (first, _) = shapes
            .split_first()
            .ok_or_else(|| Error::EmptyRecord(name.to_string()))?;

        let mut output_dims = first.to_vec();
        output_dims[dim] = 0;
        for shape in &shapes {
            let compatible = shape.len() == first.len()
                && shape
                    .iter()
                    .zip(first.iter())
                    .enumerate()
                    .all(|(i, (a, b))| i == dim || a == b);
            if !compatible {
                return Err(Error::IncompatibleShapes {
                    lhs: shape.to_vec(),
                    rhs: first.to_vec(),
                });
            }
            output_dims[dim] += shape[dim];
        }
        input_record.field_blobs()?;

        let name = model.next_layer_name(name);
        let blob = model.net_mut().next_name(&format!("{name}_output"));
        let output_schema = Field::scalar(DataType::Float, output_dims).with_blob(blob);
        tracing::debug!(layer = %name, output = %output_schema, "concat output schema");
        Ok(Self {
            name,
            axis,
            input_record,
            output_schema,
        })
    }

    pub fn axis(&self) -> i64 {
        self.axis
    }
}

impl ModelLayer for Concat {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_type(&self) -> &str {
        "Concat"
    }

    fn input_record(&self) -> &Field {
        &self.input_record
    }

    fn output_schema(&self) -> &Field {
        &self.output_schema
    }

    fn add_ops(&self, net: &mut Net) -> Result<(), Error> {
        let inputs = self.input_record.field_blobs()?;
        let output = self.output_schema.field_blobs()?.remove(0);
        let dims = net.next_name(&format!("_{output}_concat_dims"));
        net.concat(inputs, [output, dims], self.axis);
        Ok(())
    }
}
