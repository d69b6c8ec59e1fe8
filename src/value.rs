use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Leaf, Parameters, Result, leaf::Storage, precision::Float};

/// Anything that can be registered into a `Parameters` tree.
#[derive(Debug)]
pub enum ParameterValue<'a> {
    Leaf(Leaf<'a>),
    Composite(Parameters<'a>),
}

impl<'a> ParameterValue<'a> {
    /// Returns the name, unique amongst the siblings of this value.
    pub fn name(&self) -> &str {
        match self {
            ParameterValue::Leaf(leaf) => leaf.name(),
            ParameterValue::Composite(params) => params.name(),
        }
    }

    /// Returns the amount of scalars this value represents.
    pub fn parameter_count(&self) -> usize {
        match self {
            ParameterValue::Leaf(leaf) => leaf.parameter_count(),
            ParameterValue::Composite(params) => params.parameter_count(),
        }
    }

    /// Whether some part of this value owns its storage.
    pub fn owns_storage(&self) -> bool {
        match self {
            ParameterValue::Leaf(leaf) => leaf.owns_storage(),
            ParameterValue::Composite(params) => params.owns_storage(),
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf<'a>> {
        match self {
            ParameterValue::Leaf(leaf) => Some(leaf),
            ParameterValue::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Parameters<'a>> {
        match self {
            ParameterValue::Leaf(_) => None,
            ParameterValue::Composite(params) => Some(params),
        }
    }

    pub(crate) fn as_composite_mut(&mut self) -> Option<&mut Parameters<'a>> {
        match self {
            ParameterValue::Leaf(_) => None,
            ParameterValue::Composite(params) => Some(params),
        }
    }

    /// Copies the values in flattening order to the front of `dest`.
    ///
    /// # Returns
    /// The remainder of `dest` after the copied values.
    pub fn copy_to<'d, G: Float>(&self, dest: &'d mut [G]) -> Result<&'d mut [G]> {
        match self {
            ParameterValue::Leaf(leaf) => leaf.copy_to(dest),
            ParameterValue::Composite(params) => params.copy_to(dest),
        }
    }

    /// Creates a value with the same structure that refers to `values`.
    pub fn compatible_ref<'b, G: Float>(&self, values: &'b mut [G]) -> Result<ParameterValue<'b>> {
        match self {
            ParameterValue::Leaf(leaf) => leaf.compatible_ref(values).map(ParameterValue::Leaf),
            ParameterValue::Composite(params) => params
                .compatible_ref(values)
                .map(|params| ParameterValue::Composite(params.into_inner())),
        }
    }

    /// Creates a value with the same structure that refers to `values`, initialized with the
    /// current values.
    pub fn compatible_copy<'b, G: Float>(
        &self,
        values: &'b mut [G],
    ) -> Result<ParameterValue<'b>> {
        match self {
            ParameterValue::Leaf(leaf) => leaf.compatible_copy(values).map(ParameterValue::Leaf),
            ParameterValue::Composite(params) => params
                .compatible_copy(values)
                .map(|params| ParameterValue::Composite(params.into_inner())),
        }
    }

    pub(crate) fn collect_leaves<'s>(&'s self, out: &mut Vec<&'s Leaf<'a>>) {
        match self {
            ParameterValue::Leaf(leaf) => out.push(leaf),
            ParameterValue::Composite(params) => params.collect_leaves(out),
        }
    }

    pub(crate) fn rebind<'b>(
        &self,
        next: &mut dyn FnMut(usize) -> Storage<'b>,
    ) -> ParameterValue<'b> {
        match self {
            ParameterValue::Leaf(leaf) => {
                ParameterValue::Leaf(leaf.rebind(next(leaf.parameter_count())))
            }
            ParameterValue::Composite(params) => ParameterValue::Composite(params.rebind(next)),
        }
    }

    pub(crate) fn alias(&self) -> ParameterValue<'a> {
        match self {
            ParameterValue::Leaf(leaf) => ParameterValue::Leaf(leaf.alias()),
            ParameterValue::Composite(params) => ParameterValue::Composite(params.alias()),
        }
    }

    pub(crate) fn adopt_lock(&mut self, lock: &Arc<Mutex<()>>) {
        if let ParameterValue::Composite(params) = self {
            params.adopt_lock(lock);
        }
    }
}

impl<'a> From<Leaf<'a>> for ParameterValue<'a> {
    fn from(value: Leaf<'a>) -> Self {
        Self::Leaf(value)
    }
}

impl<'a> From<Parameters<'a>> for ParameterValue<'a> {
    fn from(value: Parameters<'a>) -> Self {
        Self::Composite(value)
    }
}
