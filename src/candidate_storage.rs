use std::{cmp::Ordering, collections::BTreeMap};
use rustc_hash::FxHashMap;

use crate::grid_point::GridPoint;

///
/// Ordering key of a candidate: larger error first, then earlier insertion.
///
#[derive(Clone, Copy, Debug)]
struct Rank
{
    error: f64,
    ticket: u64,
}

impl PartialEq for Rank
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Rank {}

impl PartialOrd for Rank
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank
{
    fn cmp(&self, other: &Self) -> Ordering {
        // the maximum of the ranking is the last element, so an older ticket must compare greater
        self.error.total_cmp(&other.error).then_with(|| other.ticket.cmp(&self.ticket))
    }
}

///
/// Points that are not yet part of the grid, each annotated with an error
/// value. The hash map answers membership queries, the ordered ranking answers
/// "largest error" queries, and both are updated together on every change.
///
#[derive(Clone, Debug, Default)]
pub struct CandidateStore
{
    entries: FxHashMap<GridPoint, Rank>,
    ranking: BTreeMap<Rank, GridPoint>,
    next_ticket: u64,
}

impl CandidateStore
{
    pub fn new() -> Self
    {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, point: &GridPoint) -> bool
    {
        self.entries.contains_key(point)
    }

    pub fn error(&self, point: &GridPoint) -> Option<f64>
    {
        self.entries.get(point).map(|rank| rank.error)
    }

    ///
    /// Insert `point` with `error`. A point that is already a candidate has its
    /// error replaced, not accumulated, and keeps its insertion position for tie
    /// breaking. Returns the replaced error.
    ///
    pub fn insert_or_merge(&mut self, point: GridPoint, error: f64) -> Option<f64>
    {
        if let Some(rank) = self.entries.get_mut(&point)
        {
            let previous = *rank;
            let updated = Rank { error, ticket: previous.ticket };
            *rank = updated;
            if let Some(stored) = self.ranking.remove(&previous)
            {
                self.ranking.insert(updated, stored);
            }
            return Some(previous.error);
        }
        let rank = Rank { error, ticket: self.next_ticket };
        self.next_ticket += 1;
        self.ranking.insert(rank, point.clone());
        self.entries.insert(point, rank);
        None
    }

    pub fn peek_max(&self) -> Option<(&GridPoint, f64)>
    {
        self.ranking.last_key_value().map(|(rank, point)| (point, rank.error))
    }

    pub fn pop_max(&mut self) -> Option<(GridPoint, f64)>
    {
        let (rank, point) = self.ranking.pop_last()?;
        self.entries.remove(&point);
        Some((point, rank.error))
    }

    pub fn remove(&mut self, point: &GridPoint) -> Option<f64>
    {
        let rank = self.entries.remove(point)?;
        self.ranking.remove(&rank);
        Some(rank.error)
    }

    ///
    /// Absorb all candidates of `other`, in the order they were inserted there.
    ///
    pub fn merge_all(&mut self, other: CandidateStore)
    {
        let mut incoming: Vec<(Rank, GridPoint)> = other.ranking.into_iter().collect();
        incoming.sort_by_key(|(rank, _)| rank.ticket);
        for (rank, point) in incoming
        {
            self.insert_or_merge(point, rank.error);
        }
    }

    ///
    /// Candidates ordered from largest to smallest error.
    ///
    pub fn iter(&self) -> impl Iterator<Item = (&GridPoint, f64)> + '_
    {
        self.ranking.iter().rev().map(|(rank, point)| (point, rank.error))
    }

    pub fn clear(&mut self)
    {
        self.entries.clear();
        self.ranking.clear();
    }
}
