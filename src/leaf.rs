use std::{fmt, ops::Range, sync::Arc};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{LockingPolicy, ParamsErr, Result, precision::{Cells, Float, Precision, SharedCells}};

/// The largest amount of scalars a single tree can describe, larger buffers can't be allocated.
pub(crate) const MAX_PARAMETERS: usize = isize::MAX as usize / size_of::<f64>();

/// The dimensions of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Vector(usize),
    /// Rows and columns of a row-major matrix.
    Matrix(usize, usize),
}

impl Shape {
    /// Returns the amount of scalars of this shape.
    ///
    /// # Panics
    /// In debug builds, if `rows * cols` overflows. Use `checked_len` for untrusted shapes.
    pub fn len(&self) -> usize {
        match *self {
            Shape::Vector(n) => n,
            Shape::Matrix(rows, cols) => rows * cols,
        }
    }

    /// Returns the amount of scalars of this shape, `None` if it's too large to be stored.
    pub fn checked_len(&self) -> Option<usize> {
        let len = match *self {
            Shape::Vector(n) => Some(n),
            Shape::Matrix(rows, cols) => rows.checked_mul(cols),
        }?;

        (len <= MAX_PARAMETERS).then_some(len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of independently lockable rows, a vector is a single row.
    pub fn rows(&self) -> usize {
        match *self {
            Shape::Vector(_) => 1,
            Shape::Matrix(rows, _) => rows,
        }
    }

    /// Returns the flat positions of the `row`-th row.
    pub fn row(&self, row: usize) -> Range<usize> {
        match *self {
            Shape::Vector(n) => 0..n,
            Shape::Matrix(_, cols) => row * cols..(row + 1) * cols,
        }
    }
}

/// Where the values of a leaf live.
#[derive(Debug, Clone)]
pub(crate) enum Storage<'a> {
    /// A view into a buffer managed by the caller.
    Borrowed(Cells<'a>),
    /// A slice of the buffer owned by a `ParametersCopy`.
    Shared {
        buffer: SharedCells,
        range: Range<usize>,
    },
    /// Only the shape is known.
    Detached(Precision),
}

impl Storage<'_> {
    fn cells(&self) -> Option<Cells<'_>> {
        match self {
            Storage::Borrowed(cells) => Some(*cells),
            Storage::Shared { buffer, range } => Some(buffer.view().slice(range.clone())),
            Storage::Detached(_) => None,
        }
    }

    fn precision(&self) -> Precision {
        match self {
            Storage::Borrowed(cells) => cells.precision(),
            Storage::Shared { buffer, .. } => buffer.view().precision(),
            Storage::Detached(precision) => *precision,
        }
    }
}

/// A named vector or matrix of parameters.
///
/// A leaf never allocates nor frees the values it refers to. Borrowed leaves keep the caller's
/// buffer exclusively borrowed for `'a`, every access then goes through the leaf.
///
/// The row locks belong to the storage: every leaf over the same slice of a store's buffer
/// shares them, a detached leaf has none.
pub struct Leaf<'a> {
    name: String,
    shape: Shape,
    storage: Storage<'a>,
    rows: Arc<[Mutex<()>]>,
}

impl<'a> Leaf<'a> {
    /// Creates a new vector `Leaf` over `values`.
    ///
    /// # Arguments
    /// * `name` - The name of the leaf.
    /// * `values` - The buffer holding the values.
    ///
    /// # Returns
    /// A new `Leaf` instance.
    pub fn vector<F: Float>(name: impl Into<String>, values: &'a mut [F]) -> Self {
        let shape = Shape::Vector(values.len());
        let cells = F::view(F::as_cells(values));
        Self::new(name.into(), shape, Storage::Borrowed(cells))
    }

    /// Creates a new row-major matrix `Leaf` over `values`.
    ///
    /// # Arguments
    /// * `name` - The name of the leaf.
    /// * `values` - The buffer holding the values.
    /// * `rows` - The amount of rows.
    /// * `cols` - The amount of columns.
    ///
    /// # Returns
    /// A new `Leaf` or a `SizeMismatch` error if `values` doesn't hold `rows * cols` elements.
    pub fn matrix<F: Float>(
        name: impl Into<String>,
        values: &'a mut [F],
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let shape = Shape::Matrix(rows, cols);

        let Some(len) = shape.checked_len() else {
            return Err(ParamsErr::TooLarge { name: name.into() });
        };

        if values.len() != len {
            return Err(ParamsErr::SizeMismatch {
                what: "matrix buffer",
                got: values.len(),
                expected: len,
            });
        }

        let cells = F::view(F::as_cells(values));
        Ok(Self::new(name.into(), shape, Storage::Borrowed(cells)))
    }

    /// Creates a new vector `Leaf` over the values of an array.
    ///
    /// # Returns
    /// A new `Leaf` or a `NonContiguous` error if the array isn't in standard layout.
    pub fn from_array1<F: Float>(
        name: impl Into<String>,
        array: &'a mut Array1<F>,
    ) -> Result<Self> {
        let name = name.into();

        let Some(values) = array.as_slice_mut() else {
            return Err(ParamsErr::NonContiguous { name });
        };

        Ok(Self::vector(name, values))
    }

    /// Creates a new matrix `Leaf` over the values of an array.
    ///
    /// # Returns
    /// A new `Leaf` or a `NonContiguous` error if the array isn't in standard layout.
    pub fn from_array2<F: Float>(
        name: impl Into<String>,
        array: &'a mut Array2<F>,
    ) -> Result<Self> {
        let name = name.into();
        let (rows, cols) = array.dim();

        let Some(values) = array.as_slice_mut() else {
            return Err(ParamsErr::NonContiguous { name });
        };

        Self::matrix(name, values, rows, cols)
    }

    pub(crate) fn new(name: String, shape: Shape, storage: Storage<'a>) -> Self {
        let rows = match storage {
            Storage::Detached(_) => Arc::from([]),
            _ if shape.is_empty() => Arc::from([]),
            _ => (0..shape.rows()).map(|_| Mutex::new(())).collect(),
        };

        Self {
            name,
            shape,
            storage,
            rows,
        }
    }

    /// Builds a leaf with the same name and shape over some other storage.
    pub(crate) fn rebind<'b>(&self, storage: Storage<'b>) -> Leaf<'b> {
        Leaf::new(self.name.clone(), self.shape, storage)
    }

    /// Builds another leaf over this same storage, sharing its row locks.
    pub(crate) fn alias(&self) -> Leaf<'a> {
        Leaf {
            name: self.name.clone(),
            shape: self.shape,
            storage: self.storage.clone(),
            rows: Arc::clone(&self.rows),
        }
    }
}

impl Leaf<'static> {
    /// Creates a new `Leaf` with a shape but without any values.
    ///
    /// # Arguments
    /// * `name` - The name of the leaf.
    /// * `shape` - Its dimensions.
    /// * `precision` - The precision its values would be stored in.
    ///
    /// # Returns
    /// A new detached `Leaf` or a `TooLarge` error if the shape can't ever be stored.
    pub fn detached(name: impl Into<String>, shape: Shape, precision: Precision) -> Result<Self> {
        let name = name.into();

        if shape.checked_len().is_none() {
            return Err(ParamsErr::TooLarge { name });
        }

        Ok(Self::new(name, shape, Storage::Detached(precision)))
    }
}

impl Leaf<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn precision(&self) -> Precision {
        self.storage.precision()
    }

    /// Returns the amount of scalars this leaf represents.
    pub fn parameter_count(&self) -> usize {
        self.shape.len()
    }

    /// Whether this leaf is a slice of a buffer owned by a `ParametersCopy`.
    pub fn owns_storage(&self) -> bool {
        matches!(self.storage, Storage::Shared { .. })
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.storage, Storage::Detached(_))
    }

    /// Reads the `i`-th value, `None` if out of bounds or detached.
    pub fn get(&self, i: usize) -> Option<f64> {
        let cells = self.storage.cells()?;
        (i < cells.len()).then(|| cells.load(i))
    }

    /// Copies the values of this leaf to the front of `dest`.
    ///
    /// # Arguments
    /// * `dest` - The destination, it may be larger than this leaf.
    ///
    /// # Returns
    /// The remainder of `dest` after the copied values, a `SizeMismatch` error if `dest`
    /// is too small or a `Detached` error if there are no values to copy.
    pub fn copy_to<'d, G: Float>(&self, dest: &'d mut [G]) -> Result<&'d mut [G]> {
        let n = self.parameter_count();

        if dest.len() < n {
            return Err(ParamsErr::SizeMismatch {
                what: "copy_to destination",
                got: dest.len(),
                expected: n,
            });
        }

        let cells = self.cells()?;
        let (head, tail) = dest.split_at_mut(n);

        head.iter_mut()
            .enumerate()
            .for_each(|(i, d)| *d = G::from_f64(cells.load(i)));

        Ok(tail)
    }

    /// Collects the values of this leaf.
    pub fn to_vec<G: Float>(&self) -> Result<Vec<G>> {
        let mut values = vec![G::default(); self.parameter_count()];
        self.copy_to(&mut values)?;
        Ok(values)
    }

    /// Collects the values of this leaf as a matrix, a vector becomes a single row.
    pub fn to_array2<G: Float>(&self) -> Result<Array2<G>> {
        let dim = match self.shape {
            Shape::Vector(n) => (1, n),
            Shape::Matrix(rows, cols) => (rows, cols),
        };

        let values = self.to_vec()?;
        let len = values.len();

        Array2::from_shape_vec(dim, values).map_err(|_| ParamsErr::SizeMismatch {
            what: "matrix values",
            got: len,
            expected: dim.0 * dim.1,
        })
    }

    /// Creates a leaf with this one's name and shape that refers to `values`.
    ///
    /// The given values aren't modified.
    ///
    /// # Returns
    /// A new `Leaf` or a `SizeMismatch` error if `values` isn't exactly as long as this leaf.
    pub fn compatible_ref<'b, G: Float>(&self, values: &'b mut [G]) -> Result<Leaf<'b>> {
        let n = self.parameter_count();

        if values.len() != n {
            return Err(ParamsErr::SizeMismatch {
                what: "compatible_ref buffer",
                got: values.len(),
                expected: n,
            });
        }

        let cells = G::view(G::as_cells(values));
        Ok(self.rebind(Storage::Borrowed(cells)))
    }

    /// Creates a leaf with this one's name and shape that refers to `values`, which are
    /// initialized with this leaf's values.
    pub fn compatible_copy<'b, G: Float>(&self, values: &'b mut [G]) -> Result<Leaf<'b>> {
        let source = self.cells()?;
        let leaf = self.compatible_ref(values)?;
        leaf.write(LockingPolicy::None, |i| source.load(i))?;
        Ok(leaf)
    }

    pub(crate) fn cells(&self) -> Result<Cells<'_>> {
        self.storage.cells().ok_or_else(|| ParamsErr::Detached {
            name: self.name.clone(),
        })
    }

    /// Overwrites every value with `op(i)`.
    ///
    /// Stores are single atomic writes, so only the fine policy needs to lock anything here;
    /// the coarse lock is held by the caller.
    pub(crate) fn write<W>(&self, policy: LockingPolicy, mut op: W) -> Result<()>
    where
        W: FnMut(usize) -> f64,
    {
        let cells = self.cells()?;

        match policy {
            LockingPolicy::Fine => self.for_each_row(|range| {
                range.for_each(|i| cells.store(i, op(i)));
            }),
            _ => (0..cells.len()).for_each(|i| cells.store(i, op(i))),
        }

        Ok(())
    }

    /// Replaces every value `x` at position `i` with `op(i, x)`.
    pub(crate) fn modify<M>(&self, policy: LockingPolicy, mut op: M) -> Result<()>
    where
        M: FnMut(usize, f64) -> f64,
    {
        let cells = self.cells()?;

        match policy {
            LockingPolicy::None => {
                (0..cells.len()).for_each(|i| cells.store(i, op(i, cells.load(i))));
            }
            // A store's subtree shared into another tree is guarded by two coarse locks.
            LockingPolicy::Atomic | LockingPolicy::Coarse => {
                (0..cells.len()).for_each(|i| cells.fetch_update(i, |x| op(i, x)));
            }
            LockingPolicy::Fine => self.for_each_row(|range| {
                range.for_each(|i| cells.store(i, op(i, cells.load(i))));
            }),
        }

        Ok(())
    }

    /// Returns the sum of the squares of every value.
    pub(crate) fn sum_squares(&self) -> Result<f64> {
        let cells = self.cells()?;
        Ok((0..cells.len()).map(|i| cells.load(i).powi(2)).sum())
    }

    fn for_each_row<R>(&self, mut op: R)
    where
        R: FnMut(Range<usize>),
    {
        for (row, lock) in self.rows.iter().enumerate() {
            let _guard = lock.lock();
            op(self.shape.row(row));
        }
    }
}

impl fmt::Debug for Leaf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("precision", &self.precision())
            .field("owns_storage", &self.owns_storage())
            .field("detached", &self.is_detached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::precision::sealed::Sealed;

    use super::*;

    #[test]
    fn copy_to_boundaries() {
        let mut values = [1.0_f32, 2.0, 3.0];
        let leaf = Leaf::vector("bias", &mut values);

        let mut short = [0.0_f32; 2];
        assert!(matches!(
            leaf.copy_to(&mut short),
            Err(ParamsErr::SizeMismatch {
                got: 2,
                expected: 3,
                ..
            })
        ));
        assert_eq!(short, [0.0; 2]);

        let mut exact = [0.0_f32; 3];
        let rest = leaf.copy_to(&mut exact).unwrap();
        assert!(rest.is_empty());
        assert_eq!(exact, [1.0, 2.0, 3.0]);

        let mut long = [-1.0_f64; 4];
        let rest = leaf.copy_to(&mut long).unwrap();
        assert_eq!(rest, [-1.0]);
        assert_eq!(long, [1.0, 2.0, 3.0, -1.0]);
    }

    #[test]
    fn matrix_requires_matching_buffer() {
        let mut values = [0.0_f64; 5];
        let err = Leaf::matrix("w", &mut values, 2, 3).unwrap_err();

        assert!(matches!(
            err,
            ParamsErr::SizeMismatch {
                got: 5,
                expected: 6,
                ..
            }
        ));
    }

    #[test]
    fn compatible_ref_changes_precision_without_copying() {
        let mut values = [1.0_f32, 2.0, 3.0, 4.0];
        let leaf = Leaf::matrix("w", &mut values, 2, 2).unwrap();

        let mut other = [0.0_f64; 4];
        let alias = leaf.compatible_ref(&mut other).unwrap();

        assert_eq!(alias.name(), "w");
        assert_eq!(alias.shape(), Shape::Matrix(2, 2));
        assert_eq!(alias.precision(), Precision::F64);
        assert_eq!(alias.to_vec::<f64>().unwrap(), [0.0; 4]);
    }

    #[test]
    fn compatible_ref_rejects_wrong_lengths() {
        let mut values = [0.0_f32; 3];
        let leaf = Leaf::vector("v", &mut values);

        assert!(leaf.compatible_ref(&mut [0.0_f32; 2]).is_err());
        assert!(leaf.compatible_ref(&mut [0.0_f32; 3]).is_ok());
        assert!(leaf.compatible_ref(&mut [0.0_f32; 4]).is_err());
    }

    #[test]
    fn compatible_copy_populates_the_new_buffer() {
        let mut values = [0.5_f64, -1.5];
        let leaf = Leaf::vector("v", &mut values);

        let mut other = [0.0_f32; 2];
        {
            let copy = leaf.compatible_copy(&mut other).unwrap();
            assert_eq!(copy.get(1), Some(-1.5));
        }

        assert_eq!(other, [0.5, -1.5]);
    }

    #[test]
    fn arrays_must_be_in_standard_layout() {
        let mut w = array![[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let leaf = Leaf::from_array2("w", &mut w).unwrap();
        assert_eq!(leaf.shape(), Shape::Matrix(2, 3));
        assert_eq!(leaf.to_array2::<f32>().unwrap(), array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        let mut transposed = array![[1.0_f32, 2.0], [3.0, 4.0]].reversed_axes();
        let err = Leaf::from_array2("wt", &mut transposed).unwrap_err();
        assert!(matches!(err, ParamsErr::NonContiguous { .. }));
    }

    #[test]
    fn detached_leaves_have_a_shape_but_no_values() {
        let leaf = Leaf::detached("w", Shape::Matrix(3, 2), Precision::F32).unwrap();

        assert_eq!(leaf.parameter_count(), 6);
        assert_eq!(leaf.get(0), None);
        assert!(matches!(
            leaf.to_vec::<f32>(),
            Err(ParamsErr::Detached { .. })
        ));

        let mut values = [1.0_f32; 6];
        let bound = leaf.compatible_ref(&mut values).unwrap();
        assert_eq!(bound.get(5), Some(1.0));
    }

    #[test]
    fn overflowing_shapes_are_too_large() {
        let mut values = [0.0_f32; 4];

        let err = Leaf::matrix("w", &mut values, usize::MAX, 2).unwrap_err();
        assert!(matches!(err, ParamsErr::TooLarge { .. }));

        let err = Leaf::detached("w", Shape::Vector(MAX_PARAMETERS + 1), Precision::F32);
        assert!(matches!(err, Err(ParamsErr::TooLarge { .. })));

        let mut none: [f32; 0] = [];
        let empty = Leaf::matrix("w", &mut none, usize::MAX / 2, 0).unwrap();
        assert_eq!(empty.parameter_count(), 0);
        empty.modify(LockingPolicy::Fine, |_, x| x + 1.0).unwrap();
    }

    #[test]
    fn aliases_share_row_locks() {
        let buffer = f32::alloc(4);
        let storage = Storage::Shared {
            buffer: f32::share(Arc::clone(&buffer)),
            range: 0..4,
        };

        let leaf = Leaf::new("w".to_string(), Shape::Matrix(2, 2), storage);
        let alias = leaf.alias();
        let rebound = leaf.rebind(alias.storage.clone());

        assert!(Arc::ptr_eq(&leaf.rows, &alias.rows));
        assert!(!Arc::ptr_eq(&leaf.rows, &rebound.rows));

        let _guard = leaf.rows[1].lock();
        assert!(alias.rows[1].is_locked());
        assert!(!rebound.rows[1].is_locked());
    }

    #[test]
    fn fine_policy_walks_every_row() {
        let mut values = [1.0_f64; 6];
        let leaf = Leaf::matrix("w", &mut values, 3, 2).unwrap();

        leaf.modify(LockingPolicy::Fine, |i, x| x + i as f64).unwrap();
        assert_eq!(leaf.to_vec::<f64>().unwrap(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        leaf.write(LockingPolicy::Atomic, |_| 0.0).unwrap();
        assert_eq!(leaf.sum_squares().unwrap(), 0.0);
    }

    #[test]
    fn shape_rows() {
        assert_eq!(Shape::Vector(4).rows(), 1);
        assert_eq!(Shape::Vector(4).row(0), 0..4);
        assert_eq!(Shape::Matrix(3, 2).rows(), 3);
        assert_eq!(Shape::Matrix(3, 2).row(2), 4..6);
    }
}
