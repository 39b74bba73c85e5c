use std::io::Write;
use std::ops::Deref;
use indexmap::{set::MutableValues, IndexSet};
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::{errors::SGError, grid_point::{GridPoint, IndexType, LevelType}, serialization::{self, SerializationFormat}};

/// Version tag written with every serialized storage.
pub const STORAGE_VERSION: u32 = 1;

type PointMap = IndexSet<GridPoint, FxBuildHasher>;

///
/// Set of grid points. Each point keeps the sequence number it received on
/// insertion, which callers use to address coefficient arrays. Points are never
/// removed, so sequence numbers are stable for the lifetime of the storage.
///
/// Flags are edited in place on the stored point; they do not take part in
/// hashing or equality.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "StorageData", into = "StorageData")]
pub struct GridStorage
{
    num_inputs: usize,
    map: PointMap,
}

#[derive(Serialize, Deserialize)]
struct StorageData
{
    version: u32,
    num_inputs: usize,
    points: Vec<GridPoint>,
}

impl TryFrom<StorageData> for GridStorage
{
    type Error = SGError;

    fn try_from(data: StorageData) -> Result<Self, Self::Error> {
        if data.version != STORAGE_VERSION
        {
            return Err(SGError::UnsupportedVersion);
        }
        let num_points = data.points.len();
        let mut storage = GridStorage::new(data.num_inputs);
        for point in data.points
        {
            if point.dimension() != data.num_inputs
            {
                return Err(SGError::DeserializationFailed);
            }
            storage.insert(point);
        }
        if storage.len() != num_points
        {
            return Err(SGError::DeserializationFailed);
        }
        Ok(storage)
    }
}

impl From<GridStorage> for StorageData
{
    fn from(storage: GridStorage) -> Self {
        let points = storage.map.into_iter().collect();
        Self { version: STORAGE_VERSION, num_inputs: storage.num_inputs, points }
    }
}

///
/// Borrowed view of a stored point together with its sequence number.
///
#[derive(Clone, Copy)]
pub struct GridPointRef<'a>
{
    seq: usize,
    point: &'a GridPoint,
}

impl<'a> GridPointRef<'a>
{
    #[inline]
    pub fn seq(&self) -> usize
    {
        self.seq
    }
    #[inline]
    pub fn point(&self) -> &'a GridPoint
    {
        self.point
    }
    pub fn to_point(&self) -> GridPoint
    {
        self.point.clone()
    }
}

impl Deref for GridPointRef<'_>
{
    type Target = GridPoint;

    fn deref(&self) -> &Self::Target {
        self.point
    }
}

impl GridStorage
{
    pub fn new(num_inputs: usize) -> Self
    {
        Self { num_inputs, map: PointMap::default() }
    }

    #[inline]
    pub fn dimension(&self) -> usize
    {
        self.num_inputs
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.map.is_empty()
    }

    pub fn clear(&mut self)
    {
        self.map.clear();
    }

    ///
    /// Insert `point` and return its sequence number. A point that is already
    /// stored keeps its number and flags.
    ///
    pub fn insert(&mut self, point: GridPoint) -> usize
    {
        debug_assert_eq!(point.dimension(), self.num_inputs);
        self.map.insert_full(point).0
    }

    #[inline]
    pub fn find(&self, point: &GridPoint) -> Option<usize>
    {
        self.map.get_index_of(point)
    }

    #[inline]
    pub fn index_of(&self, point: &GridPoint) -> Option<usize>
    {
        self.find(point)
    }

    #[inline]
    pub fn contains(&self, point: &GridPoint) -> bool
    {
        self.map.contains(point)
    }

    pub fn get(&self, point: &GridPoint) -> Option<GridPointRef<'_>>
    {
        self.map.get_full(point).map(|(seq, point)| GridPointRef { seq, point })
    }

    pub fn node(&self, seq: usize) -> Option<GridPointRef<'_>>
    {
        self.map.get_index(seq).map(|point| GridPointRef { seq, point })
    }

    ///
    /// Owned copy of the point with sequence number `seq`.
    ///
    pub fn point(&self, seq: usize) -> Option<GridPoint>
    {
        self.map.get_index(seq).cloned()
    }

    pub fn set_is_leaf(&mut self, seq: usize, is_leaf: bool) -> Result<(), SGError>
    {
        let point = self.map.get_index_mut2(seq).ok_or(SGError::InvalidIndex)?;
        point.set_is_leaf(is_leaf);
        Ok(())
    }

    ///
    /// Set the leaf flag of `point` if it is stored. Returns false otherwise.
    ///
    pub fn set_leaf_of(&mut self, point: &GridPoint, is_leaf: bool) -> bool
    {
        if let Some((_, stored)) = self.map.get_full_mut2(point)
        {
            stored.set_is_leaf(is_leaf);
            true
        }
        else
        {
            false
        }
    }

    ///
    /// Return the nodes in the grid in sequence order...
    ///
    pub fn nodes(&self) -> NodeIterator<'_>
    {
        NodeIterator::new(self)
    }

    ///
    /// True if a child of `point` in direction `dim` is stored. A boundary point
    /// (level 0) has the level 1 center point as its only child, a point on
    /// [`MAX_LEVEL`](crate::grid_point::MAX_LEVEL) has none.
    ///
    pub fn has_child(&self, point: &GridPoint, dim: usize) -> bool
    {
        let mut child = point.clone();
        if !child.left_child(dim)
        {
            return false;
        }
        if self.contains(&child)
        {
            return true;
        }
        child = point.clone();
        child.right_child(dim);
        self.contains(&child)
    }

    pub fn has_children(&self, point: &GridPoint) -> bool
    {
        (0..self.num_inputs).any(|dim| self.has_child(point, dim))
    }

    ///
    /// Sequence numbers of the stored points that have `point` as a child: the
    /// parent in every direction with level > 1, and both boundary points in
    /// every direction with level 1.
    ///
    pub fn parents_of(&self, point: &GridPoint) -> Vec<usize>
    {
        let mut parents = Vec::with_capacity(self.num_inputs);
        let mut scratch = point.clone();
        for dim in 0..self.num_inputs
        {
            let (level, index) = point.get(dim);
            match level
            {
                0 => {}
                1 =>
                {
                    for boundary in 0..2
                    {
                        scratch.set(dim, 0, boundary);
                        parents.extend(self.find(&scratch));
                    }
                }
                _ =>
                {
                    scratch.parent(dim);
                    parents.extend(self.find(&scratch));
                }
            }
            scratch.set(dim, level, index);
        }
        parents
    }

    ///
    /// Clear the leaf flag of every stored point that has `point` as a child.
    ///
    pub fn mark_parents_non_leaf(&mut self, point: &GridPoint)
    {
        for seq in self.parents_of(point)
        {
            if let Some(parent) = self.map.get_index_mut2(seq)
            {
                parent.set_is_leaf(false);
            }
        }
    }

    ///
    /// Recompute every leaf flag from the points currently stored.
    ///
    pub fn recalc_leaf_property(&mut self)
    {
        let leaves: Vec<bool> = self.map.iter().map(|point| !self.has_children(point)).collect();
        for (seq, is_leaf) in leaves.into_iter().enumerate()
        {
            if let Some(point) = self.map.get_index_mut2(seq)
            {
                point.set_is_leaf(is_leaf);
            }
        }
    }

    ///
    /// Number of points that are missing at least one child in some direction.
    /// Points on [`MAX_LEVEL`](crate::grid_point::MAX_LEVEL) cannot be refined in that direction.
    ///
    pub fn num_refinable_points(&self) -> usize
    {
        self.map.iter().filter(|&point|
        {
            (0..self.num_inputs).any(|dim|
            {
                let mut child = point.clone();
                if !child.left_child(dim)
                {
                    return false;
                }
                if !self.contains(&child)
                {
                    return true;
                }
                child = point.clone();
                child.right_child(dim);
                !self.contains(&child)
            })
        }).count()
    }

    pub fn num_inner_points(&self) -> usize
    {
        self.map.iter().filter(|point| point.is_inner_point()).count()
    }

    pub fn max_level(&self) -> LevelType
    {
        self.map.iter().map(|point| point.level_max()).max().unwrap_or(0)
    }

    ///
    /// Flat level and index arrays (`seq * dimension + dim`) in sequence order,
    /// the layout evaluation kernels consume.
    ///
    pub fn level_index_arrays(&self) -> (Vec<LevelType>, Vec<IndexType>)
    {
        let mut levels = Vec::with_capacity(self.len() * self.num_inputs);
        let mut indices = Vec::with_capacity(self.len() * self.num_inputs);
        for point in self.map.iter()
        {
            levels.extend_from_slice(point.levels());
            indices.extend_from_slice(point.indices());
        }
        (levels, indices)
    }

    /// Write data to path
    pub fn write(&self, path: &str, format: SerializationFormat) -> Result<(), SGError>
    {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_|SGError::FileIOError)?);
        let buffer = self.write_buffer(format)?;
        file.write_all(&buffer).map_err(|_|SGError::WriteBufferFailed)?;
        file.flush().map_err(|_|SGError::WriteBufferFailed)?;
        Ok(())
    }

    pub fn write_buffer(&self, format: SerializationFormat) -> Result<Vec<u8>, SGError>
    {
        serialization::serialize(self, format)
    }

    pub fn read_buffer(buffer: &[u8], format: SerializationFormat) -> Result<Self, SGError>
    {
        let data: StorageData = serialization::deserialize(buffer, format)?;
        GridStorage::try_from(data)
    }

    pub fn read<Reader: std::io::Read>(mut reader: Reader, format: SerializationFormat) -> Result<Self, SGError>
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_|SGError::ReadBufferFailed)?;
        Self::read_buffer(&bytes, format)
    }
}

pub struct NodeIterator<'a> {
    storage: &'a GridStorage,
    current_seq: usize,
}
impl<'a> NodeIterator<'a>
{
    pub fn new(storage: &'a GridStorage) -> Self
    {
        Self { storage, current_seq: 0 }
    }
}

impl<'a> Iterator for NodeIterator<'a> {
    type Item = GridPointRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.storage.node(self.current_seq)?;
        self.current_seq += 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.storage.len().saturating_sub(self.current_seq);
        (remaining, Some(remaining))
    }
}
impl ExactSizeIterator for NodeIterator<'_> {}
