use std::{fmt::Debug, ops::Range, slice, sync::{Arc, atomic::{AtomicU32, AtomicU64, Ordering}}};

use serde::{Deserialize, Serialize};

// Cells are reinterpretations of the caller's buffers, layouts must agree.
const _: () = assert!(size_of::<f32>() == size_of::<AtomicU32>());
const _: () = assert!(align_of::<f32>() == align_of::<AtomicU32>());
const _: () = assert!(size_of::<f64>() == size_of::<AtomicU64>());
const _: () = assert!(align_of::<f64>() == align_of::<AtomicU64>());

/// The numeric precision of a parameter's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    F32,
    F64,
}

/// A floating point type parameters can be stored in.
///
/// The set of implementors is closed: `f32` as the reduced precision and `f64` as the
/// extended one. Every conversion between them goes through `f64`.
pub trait Float: sealed::Sealed + Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The precision tag of this type.
    const PRECISION: Precision;

    /// Converts an extended precision value into this type.
    fn from_f64(value: f64) -> Self;

    /// Converts this value into extended precision.
    fn to_f64(self) -> f64;
}

pub(crate) mod sealed {
    use std::sync::Arc;

    use super::{Cells, SharedCells};

    pub trait Sealed: Sized {
        /// The atomic cell every element of this type is accessed through.
        type Cell: Send + Sync;

        fn load(cell: &Self::Cell) -> Self;

        fn as_cells(values: &mut [Self]) -> &[Self::Cell];

        fn view(cells: &[Self::Cell]) -> Cells<'_>;

        fn share(buffer: Arc<[Self::Cell]>) -> SharedCells;

        fn alloc(len: usize) -> Arc<[Self::Cell]>;
    }
}

macro_rules! impl_float {
    ($float:ty, $atomic:ty, $variant:ident) => {
        impl Float for $float {
            const PRECISION: Precision = Precision::$variant;

            fn from_f64(value: f64) -> Self {
                value as $float
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }

        impl sealed::Sealed for $float {
            type Cell = $atomic;

            fn load(cell: &Self::Cell) -> Self {
                <$float>::from_bits(cell.load(Ordering::Relaxed))
            }

            fn as_cells(values: &mut [Self]) -> &[Self::Cell] {
                // SAFETY: The cell type has the same size and alignment as the float (asserted at
                //         the top of this module) and the exclusive borrow guarantees every other
                //         access goes through the returned cells for as long as they live.
                unsafe {
                    slice::from_raw_parts(values.as_mut_ptr().cast::<$atomic>(), values.len())
                }
            }

            fn view(cells: &[Self::Cell]) -> Cells<'_> {
                Cells::$variant(cells)
            }

            fn share(buffer: Arc<[Self::Cell]>) -> SharedCells {
                SharedCells::$variant(buffer)
            }

            fn alloc(len: usize) -> Arc<[Self::Cell]> {
                (0..len).map(|_| <$atomic>::new(0)).collect()
            }
        }
    };
}

impl_float!(f32, AtomicU32, F32);
impl_float!(f64, AtomicU64, F64);

/// A type erased run of element cells.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Cells<'a> {
    F32(&'a [AtomicU32]),
    F64(&'a [AtomicU64]),
}

impl<'a> Cells<'a> {
    pub fn precision(&self) -> Precision {
        match self {
            Cells::F32(_) => Precision::F32,
            Cells::F64(_) => Precision::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cells::F32(cells) => cells.len(),
            Cells::F64(cells) => cells.len(),
        }
    }

    pub fn load(&self, i: usize) -> f64 {
        match self {
            Cells::F32(cells) => f32::from_bits(cells[i].load(Ordering::Relaxed)) as f64,
            Cells::F64(cells) => f64::from_bits(cells[i].load(Ordering::Relaxed)),
        }
    }

    pub fn store(&self, i: usize, value: f64) {
        match self {
            Cells::F32(cells) => cells[i].store((value as f32).to_bits(), Ordering::Relaxed),
            Cells::F64(cells) => cells[i].store(value.to_bits(), Ordering::Relaxed),
        }
    }

    /// Atomically replaces the `i`-th element with `op` applied to it.
    ///
    /// `op` may be called more than once if another writer gets in between.
    pub fn fetch_update<O>(&self, i: usize, mut op: O)
    where
        O: FnMut(f64) -> f64,
    {
        // The closure never returns `None`, so neither call can fail.
        match self {
            Cells::F32(cells) => {
                let _ = cells[i].fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                    Some((op(f32::from_bits(bits) as f64) as f32).to_bits())
                });
            }
            Cells::F64(cells) => {
                let _ = cells[i].fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                    Some(op(f64::from_bits(bits)).to_bits())
                });
            }
        }
    }

    pub fn slice(self, range: Range<usize>) -> Cells<'a> {
        match self {
            Cells::F32(cells) => Cells::F32(&cells[range]),
            Cells::F64(cells) => Cells::F64(&cells[range]),
        }
    }

    pub fn split_at(self, mid: usize) -> (Cells<'a>, Cells<'a>) {
        match self {
            Cells::F32(cells) => {
                let (head, tail) = cells.split_at(mid);
                (Cells::F32(head), Cells::F32(tail))
            }
            Cells::F64(cells) => {
                let (head, tail) = cells.split_at(mid);
                (Cells::F64(head), Cells::F64(tail))
            }
        }
    }
}

/// A reference counted buffer of cells owned by a `ParametersCopy`.
#[derive(Debug, Clone)]
pub(crate) enum SharedCells {
    F32(Arc<[AtomicU32]>),
    F64(Arc<[AtomicU64]>),
}

impl SharedCells {
    pub fn view(&self) -> Cells<'_> {
        match self {
            SharedCells::F32(buffer) => Cells::F32(buffer),
            SharedCells::F64(buffer) => Cells::F64(buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{sealed::Sealed, *};

    #[test]
    fn cells_alias_the_original_buffer() {
        let mut values = [1.0_f32, 2.0, 3.0];

        {
            let cells = f32::view(f32::as_cells(&mut values));
            assert_eq!(cells.precision(), Precision::F32);
            assert_eq!(cells.load(1), 2.0);

            cells.store(1, 5.0);
            cells.fetch_update(2, |x| x * 2.0);
        }

        assert_eq!(values, [1.0, 5.0, 6.0]);
    }

    #[test]
    fn conversions_go_through_extended_precision() {
        let mut values = [0.1_f64, 0.25];
        let cells = f64::view(f64::as_cells(&mut values));

        assert_eq!(cells.load(0), 0.1);
        assert_eq!(f32::from_f64(cells.load(1)), 0.25_f32);
        assert_eq!(0.5_f32.to_f64(), 0.5);
    }

    #[test]
    fn split_and_slice_keep_positions() {
        let mut values = [0.0_f64, 1.0, 2.0, 3.0, 4.0];
        let cells = f64::view(f64::as_cells(&mut values));

        let (head, tail) = cells.split_at(2);
        assert_eq!(head.len(), 2);
        assert_eq!(tail.load(0), 2.0);

        let middle = tail.slice(1..3);
        assert_eq!(middle.len(), 2);
        assert_eq!(middle.load(1), 4.0);
    }

    #[test]
    fn allocated_buffers_start_zeroed() {
        let buffer = f32::alloc(4);
        let shared = f32::share(buffer);

        let cells = shared.view();
        assert_eq!(cells.len(), 4);
        assert!((0..4).all(|i| cells.load(i) == 0.0));
    }
}
