use log::trace;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;

use crate::{InitConfig, Leaf, LockingPolicy, Parameters, ParamsErr, Result, precision::Float};

/// Bulk arithmetic over the flattened values of a tree.
///
/// Every operation takes `&self`: the leaves are views over atomic cells, so several threads can
/// drive the same tree at once, synchronized as the given `LockingPolicy` dictates. Independent
/// leaves are processed in parallel.
impl<'a> Parameters<'a> {
    /// Sets every value to `value`.
    pub fn fill(&self, value: f64, policy: LockingPolicy) -> Result<()> {
        let leaves = self.attached_leaves()?;
        let _guard = self.coarse_guard(policy);

        trace!(name = self.name(), leaves = leaves.len(); "fill");

        leaves
            .par_iter()
            .try_for_each(|leaf| leaf.write(policy, |_| value))
    }

    /// Adds the values of `other` element by element (`this[i] += other[i]`).
    ///
    /// # Arguments
    /// * `other` - A tree with the same shape, in any precision.
    /// * `policy` - How to synchronize with other writers of this tree.
    ///
    /// # Returns
    /// A `ShapeMismatch` error if the trees aren't partitioned the same way.
    pub fn add_assign(&self, other: &Parameters<'_>, policy: LockingPolicy) -> Result<()> {
        trace!(name = self.name(), other = other.name(); "add_assign");
        self.zip_with(other, policy, |x, y| x + y)
    }

    /// Subtracts the values of `other` element by element (`this[i] -= other[i]`).
    pub fn sub_assign(&self, other: &Parameters<'_>, policy: LockingPolicy) -> Result<()> {
        trace!(name = self.name(), other = other.name(); "sub_assign");
        self.zip_with(other, policy, |x, y| x - y)
    }

    /// Applies a scaled update (`this[i] += rate * other[i]`).
    ///
    /// A rate of zero leaves every value untouched, though the shapes are still validated.
    ///
    /// # Arguments
    /// * `other` - A tree with the same shape, in any precision.
    /// * `rate` - The factor `other` is scaled by.
    /// * `policy` - How to synchronize with other writers of this tree.
    ///
    /// # Returns
    /// A `ShapeMismatch` error if the trees aren't partitioned the same way.
    pub fn update(&self, other: &Parameters<'_>, rate: f64, policy: LockingPolicy) -> Result<()> {
        if rate == 0.0 {
            return self.zip_leaves(other).map(|_| ());
        }

        trace!(name = self.name(), other = other.name(); "update");
        self.zip_with(other, policy, |x, y| x + rate * y)
    }

    /// Overwrites every value with the corresponding one of `other`.
    pub fn assign(&self, other: &Parameters<'_>, policy: LockingPolicy) -> Result<()> {
        trace!(name = self.name(), other = other.name(); "assign");
        self.zip_with(other, policy, |_, y| y)
    }

    /// Multiplies every value by `value`.
    pub fn scale(&self, value: f64, policy: LockingPolicy) -> Result<()> {
        let leaves = self.attached_leaves()?;
        let _guard = self.coarse_guard(policy);

        trace!(name = self.name(), leaves = leaves.len(); "scale");

        leaves
            .par_iter()
            .try_for_each(|leaf| leaf.modify(policy, |_, x| x * value))
    }

    /// Computes the euclidean norm of the flattened values, accumulated in extended precision.
    ///
    /// # Returns
    /// The norm, or a `Detached` error if some leaf has no values.
    pub fn two_norm(&self) -> Result<f64> {
        let leaves = self.attached_leaves()?;

        let sums = leaves
            .par_iter()
            .map(|leaf| leaf.sum_squares())
            .collect::<Result<Vec<_>>>()?;

        Ok(sums.into_iter().sum::<f64>().sqrt())
    }

    /// Overwrites the tree with a flat buffer laid out in flattening order.
    ///
    /// # Arguments
    /// * `values` - The new values, exactly as many as the tree holds.
    /// * `policy` - How to synchronize with other writers of this tree.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the lengths differ.
    pub fn copy_from<G: Float>(&self, values: &[G], policy: LockingPolicy) -> Result<()> {
        let n = self.parameter_count();

        if values.len() != n {
            return Err(ParamsErr::SizeMismatch {
                what: "copy_from source",
                got: values.len(),
                expected: n,
            });
        }

        let leaves = self.attached_leaves()?;
        let _guard = self.coarse_guard(policy);

        trace!(name = self.name(), leaves = leaves.len(); "copy_from");

        let mut chunks = Vec::with_capacity(leaves.len());
        let mut rest = values;

        for leaf in &leaves {
            let (chunk, tail) = rest.split_at(leaf.parameter_count());
            chunks.push(chunk);
            rest = tail;
        }

        leaves
            .par_iter()
            .zip(chunks.par_iter())
            .try_for_each(|(leaf, chunk)| leaf.write(policy, |i| chunk[i].to_f64()))
    }

    /// Draws every value independently and uniformly from `[-limit, limit]`.
    ///
    /// Values are drawn in flattening order, so a seeded `rng` always produces the same tree.
    ///
    /// # Arguments
    /// * `limit` - The absolute bound of the values.
    /// * `rng` - A random number generator.
    /// * `policy` - How to synchronize with other writers of this tree.
    ///
    /// # Returns
    /// An `InvalidLimit` error if `limit` is negative or not finite.
    pub fn random_fill<R>(&self, limit: f64, rng: &mut R, policy: LockingPolicy) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let uniform = Uniform::new_inclusive(-limit, limit)
            .map_err(|_| ParamsErr::InvalidLimit { limit })?;

        let leaves = self.attached_leaves()?;
        let _guard = self.coarse_guard(policy);

        trace!(name = self.name(), leaves = leaves.len(); "random_fill");

        leaves
            .iter()
            .try_for_each(|leaf| leaf.write(policy, |_| uniform.sample(&mut *rng)))
    }

    /// Initializes the tree as described by `config`.
    pub fn init(&self, config: &InitConfig, policy: LockingPolicy) -> Result<()> {
        let mut rng = config.rng();
        self.random_fill(config.limit, &mut rng, policy)
    }

    /// Applies `op(this[i], other[i])` to every pair of values.
    fn zip_with<O>(&self, other: &Parameters<'_>, policy: LockingPolicy, op: O) -> Result<()>
    where
        O: Fn(f64, f64) -> f64 + Sync,
    {
        let pairs = self.zip_leaves(other)?;
        let _guard = self.coarse_guard(policy);

        pairs.par_iter().try_for_each(|(leaf, other)| {
            let values = other.cells()?;
            leaf.modify(policy, |i, x| op(x, values.load(i)))
        })
    }

    /// Pairs the leaves of both trees, checking they're partitioned the same way.
    fn zip_leaves<'s, 'o, 'b>(
        &'s self,
        other: &'o Parameters<'b>,
    ) -> Result<Vec<(&'s Leaf<'a>, &'o Leaf<'b>)>> {
        let leaves = self.attached_leaves()?;
        let others = other.attached_leaves()?;

        if let Some((leaf, (a, b))) = leaves
            .iter()
            .zip(&others)
            .enumerate()
            .find(|(_, (a, b))| a.parameter_count() != b.parameter_count())
        {
            return Err(ParamsErr::ShapeMismatch {
                leaf,
                got: b.parameter_count(),
                expected: a.parameter_count(),
            });
        }

        if leaves.len() != others.len() {
            let leaf = leaves.len().min(others.len());

            return Err(ParamsErr::ShapeMismatch {
                leaf,
                got: others.get(leaf).map_or(0, |l| l.parameter_count()),
                expected: leaves.get(leaf).map_or(0, |l| l.parameter_count()),
            });
        }

        Ok(leaves.into_iter().zip(others).collect())
    }

    /// Collects the leaves in flattening order, failing if any of them is detached.
    fn attached_leaves(&self) -> Result<Vec<&Leaf<'a>>> {
        self.check_attached()?;
        Ok(self.leaves().collect())
    }
}
