use crate::{Parameters, Result};

/// A parameter-bearing model component.
///
/// Layers describe themselves by registering views of their own buffers into the tree they're
/// handed, so new kinds of layers extend the system without touching `Parameters`.
pub trait Layer {
    /// The name the layer's parameters are registered under.
    fn name(&self) -> &str;

    /// Registers this layer's parameters into `params`.
    ///
    /// # Arguments
    /// * `params` - The empty composite reserved for this layer.
    ///
    /// # Returns
    /// An error if any of the registrations fails.
    fn add_parameters<'a>(&'a mut self, params: &mut Parameters<'a>) -> Result<()>;
}
