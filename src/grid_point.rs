use std::hash::{Hash, Hasher};
use bitfield_struct::bitfield;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::errors::SGError;

pub type LevelType = u8;
pub type IndexType = u32;

/// Deepest level whose indices fit into [`IndexType`]. Points on this level have no children.
pub const MAX_LEVEL: LevelType = IndexType::BITS as LevelType;

#[bitfield(u8, new=false)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct GridPointFlags
{
    pub is_leaf: bool,
    pub is_inner: bool,
    #[bits(6)]
    pub _empty: u8
}

impl GridPointFlags
{
    pub fn new(level: &[LevelType], is_leaf: bool) -> Self
    {
        let mut r = Self::default();
        r.set_is_leaf(is_leaf);
        r.set_is_inner(!level.contains(&0));
        r
    }
}

///
/// A point of a hierarchical sparse grid: one dyadic `(level, index)` pair per
/// dimension, describing the position `index * 2^-level`.
///
/// Hash and equality cover only the level/index vectors. The hash is cached and
/// recomputed by every mutating call, so a point can be used as a scratch
/// variable during traversal and then cloned into a hash container.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "GridPointData", into = "GridPointData")]
pub struct GridPoint
{
    level: Vec<LevelType>,
    index: Vec<IndexType>,
    h_inv: Vec<u64>,
    flags: GridPointFlags,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct GridPointData
{
    level: Vec<LevelType>,
    index: Vec<IndexType>,
    flags: GridPointFlags,
}

impl TryFrom<GridPointData> for GridPoint
{
    type Error = SGError;

    fn try_from(data: GridPointData) -> Result<Self, Self::Error> {
        if data.level.len() != data.index.len()
            || data.level.iter().zip(data.index.iter()).any(|(&level, &index)| !is_valid_coordinate(level, index))
        {
            return Err(SGError::DeserializationFailed);
        }
        Ok(GridPoint::new(&data.level, &data.index, data.flags.is_leaf()))
    }
}

impl From<GridPoint> for GridPointData
{
    fn from(point: GridPoint) -> Self {
        Self { level: point.level, index: point.index, flags: point.flags }
    }
}

impl Hash for GridPoint
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for GridPoint
{
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.level == other.level && self.index == other.index
    }
}
impl Eq for GridPoint{}

impl std::fmt::Display for GridPoint
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for d in 0..self.dimension()
        {
            if d > 0
            {
                write!(f, ", ")?;
            }
            write!(f, "[{}, {}]", self.level[d], self.index[d])?;
        }
        Ok(())
    }
}

///
/// Level 0 holds the two boundary indices 0 and 1, every other level the odd
/// indices below `2^level`.
///
pub fn is_valid_coordinate(level: LevelType, index: IndexType) -> bool
{
    match level
    {
        0 => index <= 1,
        l if l <= MAX_LEVEL => index % 2 == 1 && (index as u64) < (1_u64 << l),
        _ => false,
    }
}

fn hash_of(level: &[LevelType], index: &[IndexType]) -> u64
{
    let hasher = &mut FxHasher::default();
    level.hash(hasher);
    index.hash(hasher);
    hasher.finish()
}

impl GridPoint
{
    pub fn new(level: &[LevelType], index: &[IndexType], is_leaf: bool) -> Self
    {
        debug_assert_eq!(level.len(), index.len());
        let flags = GridPointFlags::new(level, is_leaf);
        let h_inv = level.iter().map(|&l| 1_u64 << l).collect();
        Self { level: level.to_vec(), index: index.to_vec(), h_inv, flags, hash: hash_of(level, index) }
    }

    ///
    /// Point with level 0 and index 0 in every dimension (the lower left corner).
    ///
    pub fn zero_index(num_inputs: usize) -> Self
    {
        Self::new(&vec![0; num_inputs], &vec![0; num_inputs], true)
    }

    ///
    /// Level 1 center point in every dimension.
    ///
    pub fn root(num_inputs: usize) -> Self
    {
        Self::new(&vec![1; num_inputs], &vec![1; num_inputs], true)
    }

    #[inline]
    pub fn dimension(&self) -> usize
    {
        self.level.len()
    }

    #[inline]
    pub fn levels(&self) -> &[LevelType]
    {
        &self.level
    }

    #[inline]
    pub fn indices(&self) -> &[IndexType]
    {
        &self.index
    }

    #[inline(always)]
    pub fn level(&self, dim: usize) -> LevelType
    {
        self.level[dim]
    }

    #[inline(always)]
    pub fn index(&self, dim: usize) -> IndexType
    {
        self.index[dim]
    }

    #[inline]
    pub fn get(&self, dim: usize) -> (LevelType, IndexType)
    {
        (self.level[dim], self.index[dim])
    }

    /// Inverse mesh width `2^level` in direction `dim`.
    #[inline]
    pub fn h_inv(&self, dim: usize) -> u64
    {
        self.h_inv[dim]
    }

    #[inline]
    pub fn hash_value(&self) -> u64
    {
        self.hash
    }

    pub fn set(&mut self, dim: usize, level: LevelType, index: IndexType)
    {
        self.level[dim] = level;
        self.index[dim] = index;
        self.h_inv[dim] = 1_u64 << level;
        self.rehash();
    }

    pub fn set_with_leaf(&mut self, dim: usize, level: LevelType, index: IndexType, is_leaf: bool)
    {
        self.set(dim, level, index);
        self.flags.set_is_leaf(is_leaf);
    }

    fn rehash(&mut self)
    {
        self.flags.set_is_inner(!self.level.contains(&0));
        self.hash = hash_of(&self.level, &self.index);
    }

    #[inline]
    pub fn flags(&self) -> GridPointFlags
    {
        self.flags
    }

    pub fn is_leaf(&self) -> bool
    {
        self.flags.is_leaf()
    }

    pub fn set_is_leaf(&mut self, is_leaf: bool)
    {
        self.flags.set_is_leaf(is_leaf);
    }

    ///
    /// This is an inner point if no levels are zero...
    ///
    pub fn is_inner_point(&self) -> bool
    {
        self.flags.is_inner()
    }

    pub fn level_sum(&self) -> u32
    {
        self.level.iter().map(|&l| l as u32).sum()
    }
    #[inline]
    pub fn level_max(&self) -> LevelType
    {
        *self.level.iter().max().unwrap_or(&0)
    }
    pub fn level_min(&self) -> LevelType
    {
        *self.level.iter().min().unwrap_or(&0)
    }

    ///
    /// Move to the left child in direction `dim`. Both children of a level-0
    /// boundary point are the level 1 center point. Returns false and leaves the
    /// point unchanged on [`MAX_LEVEL`].
    ///
    pub fn left_child(&mut self, dim: usize) -> bool
    {
        let (level, index) = self.get(dim);
        if level == 0
        {
            self.set(dim, 1, 1);
            return true;
        }
        if level >= MAX_LEVEL
        {
            return false;
        }
        self.set(dim, level + 1, 2 * index - 1);
        true
    }

    pub fn right_child(&mut self, dim: usize) -> bool
    {
        let (level, index) = self.get(dim);
        if level == 0
        {
            self.set(dim, 1, 1);
            return true;
        }
        if level >= MAX_LEVEL
        {
            return false;
        }
        self.set(dim, level + 1, 2 * index + 1);
        true
    }

    ///
    /// Move to the hierarchical parent in direction `dim`. Points on level 0 or 1
    /// have no parent in a grid without boundaries and are left unchanged.
    ///
    pub fn parent(&mut self, dim: usize)
    {
        let (level, index) = self.get(dim);
        if level > 1
        {
            self.set(dim, level - 1, (index >> 1) | 1);
        }
    }

    ///
    /// Move to the ancestor located on the left edge of this point's support.
    ///
    /// With `index - 1 = 2^k * m` and `m` odd, the left edge `(index - 1) * 2^-level`
    /// is the point `(level - k, m)`. If `k >= level` the edge is the domain
    /// boundary and the point becomes `(0, 0)`. `trailing_zeros(0)` is the bit
    /// width of the index type, which covers the `index == 1` case.
    ///
    pub fn left_boundary_point(&mut self, dim: usize)
    {
        let (level, index) = self.get(dim);
        if level == 0
        {
            return;
        }
        let edge = index.wrapping_sub(1);
        let k = edge.trailing_zeros();
        if k >= level as u32
        {
            self.set(dim, 0, 0);
        }
        else
        {
            self.set(dim, level - k as LevelType, edge >> k);
        }
    }

    ///
    /// Right edge counterpart of [`GridPoint::left_boundary_point`]; resolves to
    /// `(0, 1)` when the edge is the domain boundary.
    ///
    pub fn right_boundary_point(&mut self, dim: usize)
    {
        let (level, index) = self.get(dim);
        if level == 0
        {
            return;
        }
        let edge = index.wrapping_add(1);
        let k = edge.trailing_zeros();
        if k >= level as u32
        {
            self.set(dim, 0, 1);
        }
        else
        {
            self.set(dim, level - k as LevelType, edge >> k);
        }
    }

    ///
    /// True if the open support of this point in direction `dim` contains the
    /// coordinate of `other` and `other` lives on a finer level.
    ///
    pub fn is_hierarchical_ancestor_in(&self, other: &GridPoint, dim: usize) -> bool
    {
        let (level, index) = self.get(dim);
        let (other_level, other_index) = other.get(dim);
        if level >= other_level
        {
            return false;
        }
        let shift = (other_level - level) as u32;
        let lower = (index as i64 - 1) << shift;
        let upper = (index as i64 + 1) << shift;
        let position = other_index as i64;
        lower < position && position < upper
    }

    pub fn is_hierarchical_ancestor(&self, other: &GridPoint) -> bool
    {
        (0..self.dimension()).all(|d| self.is_hierarchical_ancestor_in(other, d))
    }

    #[inline]
    pub fn unit_coordinate(&self, dim: usize) -> f64
    {
        self.index[dim] as f64 / self.h_inv[dim] as f64
    }

    pub fn unit_coordinates(&self) -> Vec<f64>
    {
        (0..self.dimension()).map(|d| self.unit_coordinate(d)).collect()
    }
}
