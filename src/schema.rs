use std::io::{Read, Write};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    Leaf, ParameterValue, Parameters, ParamsErr, Precision, Result, Shape, leaf::MAX_PARAMETERS,
};

/// The persisted description of a parameter tree: names, indices and shapes, never values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub children: Vec<SchemaEntry>,
}

/// A child of a `Schema` and the index it's registered at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub index: usize,
    pub node: SchemaNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaNode {
    Leaf {
        name: String,
        shape: Shape,
        precision: Precision,
    },
    Composite(Schema),
}

impl Parameters<'_> {
    /// Describes the structure of this tree.
    pub fn schema(&self) -> Schema {
        let children = self
            .iter()
            .map(|(index, value)| {
                let node = match value {
                    ParameterValue::Leaf(leaf) => SchemaNode::Leaf {
                        name: leaf.name().to_string(),
                        shape: leaf.shape(),
                        precision: leaf.precision(),
                    },
                    ParameterValue::Composite(params) => SchemaNode::Composite(params.schema()),
                };

                SchemaEntry { index, node }
            })
            .collect();

        Schema {
            name: self.name().to_string(),
            children,
        }
    }

    /// Writes the structure of this tree to `writer`.
    ///
    /// # Arguments
    /// * `writer` - Where to write the schema to.
    ///
    /// # Returns
    /// A `Codec` error if the schema couldn't be written.
    pub fn serialize<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.schema())?;
        Ok(())
    }
}

impl Parameters<'static> {
    /// Builds a tree of detached leaves out of a schema.
    ///
    /// # Returns
    /// The new tree, a `DuplicateIndex` or `DuplicateName` error if the schema is invalid or a
    /// `TooLarge` error if it describes more values than could ever be allocated.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let mut params = Parameters::new(schema.name.as_str());
        let mut total = 0_usize;

        for SchemaEntry { index, node } in &schema.children {
            let value: ParameterValue<'static> = match node {
                SchemaNode::Leaf {
                    name,
                    shape,
                    precision,
                } => Leaf::detached(name.as_str(), *shape, *precision)?.into(),
                SchemaNode::Composite(schema) => Parameters::from_schema(schema)?.into(),
            };

            total = total
                .checked_add(value.parameter_count())
                .filter(|&n| n <= MAX_PARAMETERS)
                .ok_or_else(|| ParamsErr::TooLarge {
                    name: schema.name.clone(),
                })?;

            params.add(*index, value)?;
        }

        Ok(params)
    }

    /// Reads a structure previously written with `serialize`.
    ///
    /// The leaves of the returned tree are detached: they know their shape but hold no values.
    ///
    /// # Arguments
    /// * `reader` - Where to read the schema from.
    ///
    /// # Returns
    /// The reconstituted tree, or a `Codec` error if the schema couldn't be read.
    pub fn reconstitute<R: Read>(reader: R) -> Result<Self> {
        let schema: Schema = serde_json::from_reader(reader)?;
        let params = Self::from_schema(&schema)?;

        debug!(name = params.name(), params = params.parameter_count(); "reconstituted parameters");

        Ok(params)
    }
}
