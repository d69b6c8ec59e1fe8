use std::{fmt, io::Read, mem, ops::Deref, sync::Arc};

use log::debug;

use crate::{Layer, LockingPolicy, Parameters, Result, leaf::Storage, precision::Float};

/// A parameter tree backed by a single contiguous buffer it owns.
///
/// The buffer is allocated once, when the whole shape is known, and every leaf is a disjoint
/// slice of it laid out in flattening order. The store dereferences to `Parameters`, so it's
/// read and updated like any other tree, but its structure can't be changed.
pub struct ParametersCopy<F: Float> {
    params: Parameters<'static>,
    buffer: Option<Arc<[F::Cell]>>,
}

impl<F: Float> Default for ParametersCopy<F> {
    fn default() -> Self {
        Self {
            params: Parameters::new(""),
            buffer: None,
        }
    }
}

impl<F: Float> ParametersCopy<F> {
    /// Creates a new `ParametersCopy` with the shape and values of `params`.
    ///
    /// # Arguments
    /// * `params` - The tree to copy, in any precision.
    ///
    /// # Returns
    /// A new `ParametersCopy` or a `Detached` error if some leaf of `params` has no values.
    pub fn from_params(params: &Parameters<'_>) -> Result<Self> {
        params.check_attached()?;

        let store = Self::zeros(params);
        store.params.assign(params, LockingPolicy::None)?;
        Ok(store)
    }

    /// Creates a new `ParametersCopy` with the shape of `params` and every value set to zero.
    ///
    /// The values of `params` aren't read, so it can be a reconstituted shape.
    pub fn zeros(params: &Parameters<'_>) -> Self {
        let len = params.parameter_count();
        let buffer = F::alloc(len);

        debug!(name = params.name(), params = len; "allocated parameter store");

        Self {
            params: Self::bind(params, &buffer),
            buffer: Some(buffer),
        }
    }

    /// Creates a new `ParametersCopy` with the shape and values of a layer.
    ///
    /// # Arguments
    /// * `layer` - The layer to copy, its own buffers aren't modified.
    ///
    /// # Returns
    /// A new `ParametersCopy` or the first error the layer hits while registering.
    pub fn from_layer<L>(layer: &mut L) -> Result<Self>
    where
        L: Layer + ?Sized,
    {
        let mut params = Parameters::new(layer.name());
        layer.add_parameters(&mut params)?;
        Self::from_params(&params)
    }

    /// Reads a persisted shape and allocates a zeroed store for it.
    pub fn reconstitute<R: Read>(reader: R) -> Result<Self> {
        let shape = Parameters::reconstitute(reader)?;
        Ok(Self::zeros(&shape))
    }

    /// Exchanges the structure and buffers of both stores, no values are copied.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Removes every child. The buffer isn't freed until the store is dropped.
    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Collects the whole buffer.
    pub fn to_vec(&self) -> Vec<F> {
        self.buffer
            .iter()
            .flat_map(|buffer| buffer.iter().map(F::load))
            .collect()
    }

    /// Returns the address of the buffer, null for an empty default store.
    pub fn as_ptr(&self) -> *const F {
        self.buffer
            .as_ref()
            .map_or(std::ptr::null(), |buffer| buffer.as_ptr().cast())
    }

    /// Builds another tree over this store's buffer, to be registered into a larger tree.
    ///
    /// Its leaves own their storage, so it can't be part of a `ParametersRef`. Both trees share
    /// the row locks of every leaf. The coarse lock is shared too until the returned tree is
    /// registered into another one, from then on it takes that tree's lock.
    pub fn share(&self) -> Parameters<'static> {
        self.params.alias()
    }

    /// Lays the leaves of `params` out over successive slices of `buffer`.
    fn bind(params: &Parameters<'_>, buffer: &Arc<[F::Cell]>) -> Parameters<'static> {
        let mut offset = 0;

        params.rebind(&mut |n: usize| {
            let range = offset..offset + n;
            offset += n;

            Storage::Shared {
                buffer: F::share(Arc::clone(buffer)),
                range,
            }
        })
    }
}

impl<F: Float> Clone for ParametersCopy<F> {
    fn clone(&self) -> Self {
        let Some(from) = &self.buffer else {
            return Self {
                params: Parameters::new(self.params.name()),
                buffer: None,
            };
        };

        let buffer = F::alloc(from.len());
        let (source, dest) = (F::view(from), F::view(&buffer));
        (0..source.len()).for_each(|i| dest.store(i, source.load(i)));

        Self {
            params: Self::bind(&self.params, &buffer),
            buffer: Some(buffer),
        }
    }
}

impl<F: Float> Deref for ParametersCopy<F> {
    type Target = Parameters<'static>;

    fn deref(&self) -> &Self::Target {
        &self.params
    }
}

impl<F: Float> fmt::Debug for ParametersCopy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametersCopy")
            .field("precision", &F::PRECISION)
            .field("params", &self.params)
            .finish()
    }
}
