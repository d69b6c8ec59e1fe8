use std::{fmt, ops::Deref};

use crate::{Layer, Leaf, ParameterValue, Parameters, ParamsErr, Result, precision::Float};

/// A composite in which every leaf is a view into storage it doesn't own.
///
/// Gradient, momentum and other auxiliary trees are usually built with `compatible_ref` over
/// buffers of their own; this type keeps them from ever holding a slice of an owning store.
#[repr(transparent)]
pub struct ParametersRef<'a>(Parameters<'a>);

impl<'a> ParametersRef<'a> {
    /// Creates a new empty `ParametersRef`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Parameters::new(name))
    }

    /// Wraps a tree that's known to only hold borrowed views.
    pub(crate) fn from_borrowed(params: Parameters<'a>) -> Self {
        Self(params)
    }

    /// Registers a value at `index`.
    ///
    /// # Arguments
    /// * `index` - The position of the value.
    /// * `value` - The value to register, it can't own any storage.
    ///
    /// # Returns
    /// This same collection or an `OwnsStorage` error if the value, or any of its descendants,
    /// owns its storage.
    pub fn add(&mut self, index: usize, value: impl Into<ParameterValue<'a>>) -> Result<&mut Self> {
        let value = value.into();

        if value.owns_storage() {
            return Err(ParamsErr::OwnsStorage {
                name: value.name().to_string(),
            });
        }

        self.0.add(index, value)?;
        Ok(self)
    }

    pub fn add_vector<F: Float>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut [F],
    ) -> Result<&mut Self> {
        self.add(index, Leaf::vector(name, values))
    }

    pub fn add_matrix<F: Float>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut [F],
        rows: usize,
        cols: usize,
    ) -> Result<&mut Self> {
        let leaf = Leaf::matrix(name, values, rows, cols)?;
        self.add(index, leaf)
    }

    /// Lets `layer` register its parameters in a new collection at `index`.
    pub fn add_subparams<L>(&mut self, index: usize, layer: &'a mut L) -> Result<&mut Self>
    where
        L: Layer + ?Sized,
    {
        let mut subparams = Parameters::new(layer.name());
        layer.add_parameters(&mut subparams)?;
        self.add(index, subparams)
    }

    /// Returns the nested collection registered at `index`, as a reference tree itself.
    ///
    /// # Returns
    /// The nested collection or the same errors as `Parameters::subparams`.
    pub fn subparams(&self, index: usize, name: &str) -> Result<&ParametersRef<'a>> {
        let params = self.0.subparams(index, name)?;

        // SAFETY: `ParametersRef` is a transparent wrapper, and every descendant of a
        //         reference tree is a view, so the nested collection is one as well.
        Ok(unsafe { &*(params as *const Parameters<'a>).cast::<ParametersRef<'a>>() })
    }

    /// Mutable version of `subparams`.
    pub fn subparams_mut(&mut self, index: usize, name: &str) -> Result<&mut ParametersRef<'a>> {
        let params = self.0.subparams_mut(index, name)?;

        // SAFETY: Same as in `subparams`, and registering through the returned value goes
        //         through `ParametersRef::add`, which keeps the invariant.
        Ok(unsafe { &mut *(params as *mut Parameters<'a>).cast::<ParametersRef<'a>>() })
    }

    /// Removes every child, the buffers they referred to aren't modified.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Unwraps the inner tree.
    pub fn into_inner(self) -> Parameters<'a> {
        self.0
    }
}

impl<'a> Deref for ParametersRef<'a> {
    type Target = Parameters<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> TryFrom<Parameters<'a>> for ParametersRef<'a> {
    type Error = ParamsErr;

    fn try_from(params: Parameters<'a>) -> Result<Self> {
        if let Some(leaf) = params.leaves().find(|leaf| leaf.owns_storage()) {
            return Err(ParamsErr::OwnsStorage {
                name: leaf.name().to_string(),
            });
        }

        Ok(Self(params))
    }
}

impl fmt::Debug for ParametersRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParametersRef").field(&self.0).finish()
    }
}
