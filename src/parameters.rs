use std::{collections::{BTreeMap, HashMap}, fmt, sync::Arc};

use log::debug;
use ndarray::{Array1, Array2};
use parking_lot::{Mutex, MutexGuard};

use crate::{
    Layer, Leaf, LockingPolicy, ParameterValue, ParametersRef, ParamsErr, Result,
    leaf::Storage,
    precision::Float,
};

/// An ordered, indexed and named collection of leaves and nested collections.
///
/// The children are ordered by index, and a depth-first, index-ascending walk over the tree
/// defines its flattening order. Every operation that relates a tree to a flat buffer, or two
/// trees to each other, uses that same order.
///
/// A single coarse lock guards the whole tree: nested collections take the lock of the tree
/// they're registered into.
pub struct Parameters<'a> {
    name: String,
    params: BTreeMap<usize, ParameterValue<'a>>,
    by_name: HashMap<String, usize>,
    lock: Arc<Mutex<()>>,
}

impl<'a> Parameters<'a> {
    /// Creates a new empty `Parameters`.
    ///
    /// # Arguments
    /// * `name` - The name of the collection.
    ///
    /// # Returns
    /// A new `Parameters` instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            by_name: HashMap::new(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the amount of direct children.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Registers a leaf or a nested collection at `index`.
    ///
    /// # Arguments
    /// * `index` - The position of the value, lower indices are flattened first.
    /// * `value` - The value, its name must be unique amongst its siblings.
    ///
    /// # Returns
    /// This same collection, or a `DuplicateIndex` or `DuplicateName` error.
    pub fn add(&mut self, index: usize, value: impl Into<ParameterValue<'a>>) -> Result<&mut Self> {
        let mut value = value.into();

        if self.params.contains_key(&index) {
            return Err(ParamsErr::DuplicateIndex { index });
        }

        if let Some(&existing) = self.by_name.get(value.name()) {
            return Err(ParamsErr::DuplicateName {
                name: value.name().to_string(),
                index,
                existing,
            });
        }

        value.adopt_lock(&self.lock);
        self.by_name.insert(value.name().to_string(), index);
        self.params.insert(index, value);
        Ok(self)
    }

    /// Registers a vector view over `values` at `index`.
    pub fn add_vector<F: Float>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        values: &'a mut [F],
    ) -> Result<&mut Self> {
        self.add(index, Leaf::vector(name, values))
    }

    /// Registers a `rows` by `cols` matrix view over `values` at `index`.
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

    pub fn add_array1<F: Float>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        array: &'a mut Array1<F>,
    ) -> Result<&mut Self> {
        let leaf = Leaf::from_array1(name, array)?;
        self.add(index, leaf)
    }

    pub fn add_array2<F: Float>(
        &mut self,
        index: usize,
        name: impl Into<String>,
        array: &'a mut Array2<F>,
    ) -> Result<&mut Self> {
        let leaf = Leaf::from_array2(name, array)?;
        self.add(index, leaf)
    }

    /// Lets `layer` register its parameters in a new collection at `index`.
    ///
    /// # Arguments
    /// * `index` - The position of the layer's parameters.
    /// * `layer` - The layer, its name becomes the name of the nested collection.
    ///
    /// # Returns
    /// This same collection, or the first error found while registering.
    pub fn add_subparams<L>(&mut self, index: usize, layer: &'a mut L) -> Result<&mut Self>
    where
        L: Layer + ?Sized,
    {
        let mut subparams = Parameters::new(layer.name());
        layer.add_parameters(&mut subparams)?;
        self.add(index, subparams)
    }

    pub fn get(&self, index: usize) -> Option<&ParameterValue<'a>> {
        self.params.get(&index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Iterates over the direct children and their indices in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ParameterValue<'a>)> {
        self.params.iter().map(|(&index, value)| (index, value))
    }

    /// Iterates over the names of the direct children in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.values().map(|value| value.name())
    }

    /// Returns the nested collection registered at `index`.
    ///
    /// # Arguments
    /// * `index` - The index the collection was registered at.
    /// * `name` - The name it's expected to have.
    ///
    /// # Returns
    /// The nested collection, a `NotFound` error if nothing is registered at `index`, a
    /// `NameMismatch` error if it's named differently or a `NotComposite` error if it's a leaf.
    pub fn subparams(&self, index: usize, name: &str) -> Result<&Parameters<'a>> {
        let value = self.lookup(index, name)?;
        value
            .as_composite()
            .ok_or(ParamsErr::NotComposite { index })
    }

    /// Mutable version of `subparams`.
    pub fn subparams_mut(&mut self, index: usize, name: &str) -> Result<&mut Parameters<'a>> {
        self.lookup(index, name)?;

        self.params
            .get_mut(&index)
            .and_then(ParameterValue::as_composite_mut)
            .ok_or(ParamsErr::NotComposite { index })
    }

    fn lookup(&self, index: usize, name: &str) -> Result<&ParameterValue<'a>> {
        let value = self
            .params
            .get(&index)
            .ok_or(ParamsErr::NotFound { index })?;

        if value.name() != name {
            return Err(ParamsErr::NameMismatch {
                index,
                got: value.name().to_string(),
                expected: name.to_string(),
            });
        }

        Ok(value)
    }

    /// Returns the amount of scalars in the whole tree.
    pub fn parameter_count(&self) -> usize {
        self.params.values().map(ParameterValue::parameter_count).sum()
    }

    /// Whether any leaf of the tree owns its storage.
    pub fn owns_storage(&self) -> bool {
        self.params.values().any(ParameterValue::owns_storage)
    }

    /// Iterates over every leaf in flattening order.
    pub fn leaves(&self) -> impl Iterator<Item = &Leaf<'a>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves.into_iter()
    }

    pub(crate) fn collect_leaves<'s>(&'s self, out: &mut Vec<&'s Leaf<'a>>) {
        self.params
            .values()
            .for_each(|value| value.collect_leaves(out));
    }

    /// Copies every value in flattening order to the front of `dest`.
    ///
    /// Nothing is written unless the whole tree fits.
    ///
    /// # Arguments
    /// * `dest` - The destination, it may be larger than the tree.
    ///
    /// # Returns
    /// The remainder of `dest` after the copied values, a `SizeMismatch` error if `dest` is too
    /// small or a `Detached` error if some leaf has no values.
    pub fn copy_to<'d, G: Float>(&self, dest: &'d mut [G]) -> Result<&'d mut [G]> {
        let n = self.parameter_count();

        if dest.len() < n {
            return Err(ParamsErr::SizeMismatch {
                what: "copy_to destination",
                got: dest.len(),
                expected: n,
            });
        }

        self.check_attached()?;

        self.params
            .values()
            .try_fold(dest, |dest, value| value.copy_to(dest))
    }

    /// Collects the flattened values of the tree.
    pub fn to_vec<G: Float>(&self) -> Result<Vec<G>> {
        let mut values = vec![G::default(); self.parameter_count()];
        self.copy_to(&mut values)?;
        Ok(values)
    }

    /// Creates a tree with this one's structure whose leaves refer to successive slices of
    /// `values`. The given values aren't modified.
    ///
    /// # Arguments
    /// * `values` - The buffer for the new tree, in any precision.
    ///
    /// # Returns
    /// A new `ParametersRef` or a `SizeMismatch` error if `values` isn't exactly as long as
    /// the tree.
    pub fn compatible_ref<'b, G: Float>(&self, values: &'b mut [G]) -> Result<ParametersRef<'b>> {
        let n = self.parameter_count();

        if values.len() != n {
            return Err(ParamsErr::SizeMismatch {
                what: "compatible_ref buffer",
                got: values.len(),
                expected: n,
            });
        }

        let mut rest = G::view(G::as_cells(values));
        let params = self.rebind(&mut |len: usize| {
            let (head, tail) = rest.split_at(len);
            rest = tail;
            Storage::Borrowed(head)
        });

        Ok(ParametersRef::from_borrowed(params))
    }

    /// Same as `compatible_ref`, but `values` is initialized with this tree's values.
    pub fn compatible_copy<'b, G: Float>(&self, values: &'b mut [G]) -> Result<ParametersRef<'b>> {
        self.check_attached()?;

        let params = self.compatible_ref(values)?;
        params.assign(self, LockingPolicy::None)?;
        Ok(params)
    }

    /// Removes every child from this collection.
    ///
    /// The values the leaves referred to aren't modified.
    pub fn clear(&mut self) {
        debug!(name = self.name.as_str(), children = self.params.len(); "clearing parameters");

        self.params.clear();
        self.by_name.clear();
    }

    /// Builds a tree with this one's structure over the storage `next` hands out for each leaf,
    /// guarded by a coarse lock of its own.
    pub(crate) fn rebind<'b>(&self, next: &mut dyn FnMut(usize) -> Storage<'b>) -> Parameters<'b> {
        let mut params = Parameters {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .map(|(&index, value)| (index, value.rebind(next)))
                .collect(),
            by_name: self.by_name.clone(),
            lock: Arc::new(Mutex::new(())),
        };

        let lock = Arc::clone(&params.lock);
        params.adopt_lock(&lock);
        params
    }

    /// Builds another tree over this same storage that shares every lock with this one.
    pub(crate) fn alias(&self) -> Parameters<'a> {
        Parameters {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .map(|(&index, value)| (index, value.alias()))
                .collect(),
            by_name: self.by_name.clone(),
            lock: Arc::clone(&self.lock),
        }
    }

    pub(crate) fn adopt_lock(&mut self, lock: &Arc<Mutex<()>>) {
        self.lock = Arc::clone(lock);
        self.params
            .values_mut()
            .for_each(|value| value.adopt_lock(lock));
    }

    pub(crate) fn check_attached(&self) -> Result<()> {
        match self.leaves().find(|leaf| leaf.is_detached()) {
            Some(leaf) => Err(ParamsErr::Detached {
                name: leaf.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Takes the tree-wide lock if the policy asks for it.
    pub(crate) fn coarse_guard(&self, policy: LockingPolicy) -> Option<MutexGuard<'_, ()>> {
        (policy == LockingPolicy::Coarse).then(|| self.lock.lock())
    }
}

impl fmt::Debug for Parameters<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}
