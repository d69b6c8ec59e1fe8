//! Hierarchical containers for the trainable parameters of numeric models.
//!
//! A `Parameters` tree names and orders the weights of a model, whether they live in the
//! model's own buffers, in buffers owned by a `ParametersCopy`, or nowhere yet (a shape read
//! back with `reconstitute`). Optimizers derive gradient and momentum trees with the same shape
//! over other buffers and then work on all of them in one flattening order.

mod arithmetic;
mod config;
mod error;
mod layer;
mod leaf;
mod parameters;
mod policy;
mod precision;
mod reference;
mod schema;
mod store;
mod value;

pub use config::InitConfig;
pub use error::{ParamsErr, Result};
pub use layer::Layer;
pub use leaf::{Leaf, Shape};
pub use parameters::Parameters;
pub use policy::LockingPolicy;
pub use precision::{Float, Precision};
pub use reference::ParametersRef;
pub use schema::{Schema, SchemaEntry, SchemaNode};
pub use store::ParametersCopy;
pub use value::ParameterValue;
