use log::{debug, trace, warn};

use crate::{candidate_storage::CandidateStore, errors::SGError, grid_point::{GridPoint, LevelType, MAX_LEVEL}, storage::GridStorage};

#[derive(Default, Debug, Clone)]
pub struct RefinementOptions
{
    /// Maximum level per direction. Children beyond the limit are never candidates.
    pub level_limits: Option<Vec<LevelType>>,
}

impl RefinementOptions
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_level_limits(mut self, level_limits: Vec<LevelType>) -> Self
    {
        self.level_limits = Some(level_limits);
        self
    }
}

///
/// Parameters shared by every refinement criterion: which values qualify for
/// insertion and how many points one step may add.
///
pub trait RefinementIndicator
{
    ///
    /// Candidates whose absolute error is below the threshold are not inserted.
    ///
    fn threshold(&self) -> f64;

    ///
    /// Candidates must have an error strictly greater than this value.
    ///
    fn start(&self) -> f64
    {
        0.0
    }

    ///
    /// Maximum number of points inserted by a single refinement step.
    ///
    fn budget_per_step(&self) -> usize;
}

///
/// A criterion able to score points that are not part of the grid yet. Only
/// these can drive [`AdaptiveRefiner`], which ranks candidates before inserting
/// them.
///
pub trait CandidateIndicator : RefinementIndicator
{
    fn evaluate(&self, candidate: &GridPoint, storage: &GridStorage) -> f64;
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinerState
{
    #[default]
    Uninitialized,
    /// Scanning every stored point for candidates (first call only).
    FirstPass,
    /// Scanning only the children of the points added by the previous step.
    SteadyState,
}

///
/// Dimension-adaptive refinement driven by an error indicator.
///
/// A point becomes a candidate once it is admissible, meaning its parent in every
/// direction is stored. Candidates are scored once and remembered across steps;
/// each step inserts the best ones up to the indicator's budget. After the first
/// step only the children of the points inserted by the previous step are
/// examined, since no other point can have become admissible.
///
#[derive(Debug, Default)]
pub struct AdaptiveRefiner
{
    options: RefinementOptions,
    state: RefinerState,
    num_inputs: Option<usize>,
    candidates: CandidateStore,
    added_in_last_step: Vec<GridPoint>,
    steps: usize,
}

fn is_admissible(storage: &GridStorage, candidate: &GridPoint) -> bool
{
    let mut parent = candidate.clone();
    for dim in 0..candidate.dimension()
    {
        let (level, index) = candidate.get(dim);
        if level > 1
        {
            parent.parent(dim);
            if !storage.contains(&parent)
            {
                return false;
            }
            parent.set(dim, level, index);
        }
    }
    true
}

///
/// Insert `point` and clear the leaf flag of every point that gains it as a child.
///
fn insert_point(storage: &mut GridStorage, mut point: GridPoint) -> usize
{
    point.set_is_leaf(!storage.has_children(&point));
    storage.mark_parents_non_leaf(&point);
    storage.insert(point)
}

///
/// Insert `point` after all of its missing hierarchical parents, so that the
/// grid stays closed under taking parents. Level 1 points need no boundary
/// parents. New sequence numbers are appended to `created` in insertion order.
///
fn create_point(storage: &mut GridStorage, point: GridPoint, created: &mut Vec<usize>)
{
    let mut parent = point.clone();
    for dim in 0..point.dimension()
    {
        let (level, index) = point.get(dim);
        if level > 1
        {
            parent.parent(dim);
            if !storage.contains(&parent)
            {
                create_point(storage, parent.clone(), created);
            }
            parent.set(dim, level, index);
        }
    }
    created.push(insert_point(storage, point));
}

///
/// Insert both children of the point `seq` in direction `dim`, together with
/// any hierarchical parents they are missing. Returns the sequence numbers of
/// all points created. A point on [`MAX_LEVEL`] has no children to add.
///
pub fn refine_point_1d(storage: &mut GridStorage, seq: usize, dim: usize) -> Result<Vec<usize>, SGError>
{
    if dim >= storage.dimension()
    {
        return Err(SGError::DimensionMismatch);
    }
    let point = storage.point(seq).ok_or(SGError::InvalidIndex)?;
    let mut created = Vec::new();
    let mut child = point.clone();
    if child.left_child(dim) && !storage.contains(&child)
    {
        create_point(storage, child, &mut created);
    }
    let mut child = point;
    if child.right_child(dim) && !storage.contains(&child)
    {
        create_point(storage, child, &mut created);
    }
    trace!("refined point {} in direction {}: {} points created", seq, dim, created.len());
    Ok(created)
}

///
/// Refine the point `seq` in every direction.
///
pub fn refine_point(storage: &mut GridStorage, seq: usize) -> Result<Vec<usize>, SGError>
{
    let mut created = Vec::new();
    for dim in 0..storage.dimension()
    {
        created.extend(refine_point_1d(storage, seq, dim)?);
    }
    Ok(created)
}

impl AdaptiveRefiner
{
    pub fn new(options: RefinementOptions) -> Self
    {
        Self { options, ..Default::default() }
    }

    #[inline]
    pub fn state(&self) -> RefinerState
    {
        self.state
    }

    #[inline]
    pub fn options(&self) -> &RefinementOptions
    {
        &self.options
    }

    ///
    /// Scored points waiting for insertion.
    ///
    #[inline]
    pub fn candidates(&self) -> &CandidateStore
    {
        &self.candidates
    }

    ///
    /// Points inserted by the most recent step, in insertion order.
    ///
    #[inline]
    pub fn added_in_last_step(&self) -> &[GridPoint]
    {
        &self.added_in_last_step
    }

    /// Number of completed refinement steps.
    #[inline]
    pub fn steps(&self) -> usize
    {
        self.steps
    }

    ///
    /// Forget all candidates. The next call to [`AdaptiveRefiner::refine`] scans
    /// the whole grid again, which is required after the storage was modified
    /// by anything other than this refiner.
    ///
    pub fn reset(&mut self)
    {
        self.state = RefinerState::Uninitialized;
        self.num_inputs = None;
        self.candidates.clear();
        self.added_in_last_step.clear();
        self.steps = 0;
    }

    fn validate(&self, storage: &GridStorage) -> Result<(), SGError>
    {
        if storage.is_empty()
        {
            return Err(SGError::EmptyStorage);
        }
        if self.num_inputs.is_some_and(|num_inputs| num_inputs != storage.dimension())
        {
            return Err(SGError::DimensionMismatch);
        }
        if let Some(level_limits) = self.options.level_limits.as_ref()
        {
            if level_limits.len() != storage.dimension()
            {
                return Err(SGError::InvalidLevelLimits);
            }
        }
        Ok(())
    }

    ///
    /// Perform one refinement step and return the sequence numbers of the
    /// inserted points.
    ///
    /// Fails without touching the storage if it is empty, if its dimension
    /// differs from the one seen on earlier steps or if the level limits do
    /// not match it.
    ///
    pub fn refine<I: CandidateIndicator + ?Sized>(&mut self, storage: &mut GridStorage, indicator: &I) -> Result<Vec<usize>, SGError>
    {
        self.validate(storage)?;

        let discovered = if self.state == RefinerState::SteadyState
        {
            self.discover(storage, indicator, self.added_in_last_step.iter())
        }
        else
        {
            self.state = RefinerState::FirstPass;
            self.num_inputs = Some(storage.dimension());
            storage.recalc_leaf_property();
            self.discover(storage, indicator, storage.nodes().map(|node| node.point()))
        };
        let pass = self.state;
        let num_discovered = discovered.len();
        self.candidates.merge_all(discovered);

        let inserted = self.insert_best(storage, indicator);
        self.state = RefinerState::SteadyState;
        self.steps += 1;
        debug!("refinement step {} ({:?}): {} new candidates, {} points inserted, {} candidates pending, grid size {}",
            self.steps, pass, num_discovered, inserted.len(), self.candidates.len(), storage.len());
        Ok(inserted)
    }

    ///
    /// Refine up to `max_iterations` times, stopping early once a step inserts
    /// nothing. Returns the sequence numbers of all inserted points.
    ///
    pub fn refine_iterations<I: CandidateIndicator + ?Sized>(&mut self, storage: &mut GridStorage, indicator: &I, max_iterations: usize) -> Result<Vec<usize>, SGError>
    {
        let mut inserted = Vec::new();
        for _ in 0..max_iterations
        {
            let step = self.refine(storage, indicator)?;
            if step.is_empty()
            {
                break;
            }
            inserted.extend(step);
        }
        Ok(inserted)
    }

    fn exceeds_level_limit(&self, level: LevelType, dim: usize) -> bool
    {
        level > MAX_LEVEL || self.options.level_limits.as_ref().is_some_and(|limits| level > limits[dim])
    }

    ///
    /// Collect the admissible children of `sources` that are neither stored nor
    /// already candidates.
    ///
    fn discover<'p, I, S>(&self, storage: &GridStorage, indicator: &I, sources: S) -> CandidateStore
    where I: CandidateIndicator + ?Sized, S: IntoIterator<Item = &'p GridPoint>
    {
        let mut discovered = CandidateStore::new();
        for source in sources
        {
            let mut child = source.clone();
            for dim in 0..storage.dimension()
            {
                let (level, index) = source.get(dim);
                if self.exceeds_level_limit(level.saturating_add(1), dim)
                {
                    continue;
                }
                child.left_child(dim);
                self.consider(storage, indicator, &child, &mut discovered);
                // a boundary point has a single child
                if level > 0
                {
                    child.set(dim, level, index);
                    child.right_child(dim);
                    self.consider(storage, indicator, &child, &mut discovered);
                }
                child.set(dim, level, index);
            }
        }
        discovered
    }

    fn consider<I: CandidateIndicator + ?Sized>(&self, storage: &GridStorage, indicator: &I, child: &GridPoint, discovered: &mut CandidateStore)
    {
        if storage.contains(child) || self.candidates.contains(child) || discovered.contains(child)
        {
            return;
        }
        if !is_admissible(storage, child)
        {
            return;
        }
        let error = indicator.evaluate(child, storage);
        if error.is_nan()
        {
            warn!("indicator returned NaN for candidate {}, ignoring it", child);
            return;
        }
        let mut candidate = child.clone();
        candidate.set_is_leaf(true);
        discovered.insert_or_merge(candidate, error);
    }

    fn insert_best<I: CandidateIndicator + ?Sized>(&mut self, storage: &mut GridStorage, indicator: &I) -> Vec<usize>
    {
        let budget = indicator.budget_per_step();
        let start = indicator.start();
        let threshold = indicator.threshold();

        let mut added = Vec::new();
        let mut inserted = Vec::new();
        while added.len() < budget
        {
            let accepted = matches!(self.candidates.peek_max(), Some((_, error)) if error > start && error.abs() >= threshold);
            if !accepted
            {
                break;
            }
            let Some((point, error)) = self.candidates.pop_max() else { break };
            let seq = insert_point(storage, point.clone());
            trace!("inserted {} with error {} as point {}", point, error, seq);
            inserted.push(seq);
            added.push(point);
        }
        self.added_in_last_step = added;
        inserted
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::refinement::user_defined::UserDefinedIndicator;

    fn root_storage(num_inputs: usize) -> GridStorage
    {
        let mut storage = GridStorage::new(num_inputs);
        storage.insert(GridPoint::root(num_inputs));
        storage
    }

    struct ConstantIndicator
    {
        value: f64,
        threshold: f64,
        start: f64,
        budget: usize,
    }

    impl RefinementIndicator for ConstantIndicator
    {
        fn threshold(&self) -> f64 {
            self.threshold
        }
        fn start(&self) -> f64 {
            self.start
        }
        fn budget_per_step(&self) -> usize {
            self.budget
        }
    }

    impl CandidateIndicator for ConstantIndicator
    {
        fn evaluate(&self, _candidate: &GridPoint, _storage: &GridStorage) -> f64 {
            self.value
        }
    }

    fn constant(value: f64, threshold: f64, start: f64, budget: usize) -> ConstantIndicator
    {
        ConstantIndicator { value, threshold, start, budget }
    }

    fn varying(candidate: &GridPoint) -> f64
    {
        let x = candidate.unit_coordinates();
        let weights = [3.0, 1.0, 0.5];
        let sum: f64 = x.iter().zip(weights.iter()).map(|(x, w)| w * x).sum();
        sum / candidate.level_sum() as f64
    }

    fn assert_leaf_flags(storage: &GridStorage)
    {
        for node in storage.nodes()
        {
            assert_eq!(node.is_leaf(), !storage.has_children(node.point()), "leaf flag of {}", node.point());
        }
    }

    fn assert_parents_predate(storage: &GridStorage, inserted: &[usize], size_before: usize)
    {
        for &seq in inserted
        {
            let point = storage.point(seq).unwrap();
            for dim in 0..storage.dimension()
            {
                if point.level(dim) > 1
                {
                    let mut parent = point.clone();
                    parent.parent(dim);
                    let parent_seq = storage.find(&parent).unwrap();
                    assert!(parent_seq < size_before, "parent {} of {} was inserted in the same step", parent, point);
                }
            }
        }
    }

    #[test]
    fn first_pass_on_two_dimensional_root()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::default();
        assert_eq!(refiner.state(), RefinerState::Uninitialized);
        let inserted = refiner.refine(&mut storage, &constant(1.0, 0.0, -1.0, 2)).unwrap();

        assert_eq!(inserted, vec![1, 2]);
        assert_eq!(refiner.state(), RefinerState::SteadyState);
        assert_eq!(storage.point(1).unwrap(), GridPoint::new(&[2, 1], &[1, 1], true));
        assert_eq!(storage.point(2).unwrap(), GridPoint::new(&[2, 1], &[3, 1], true));
        assert_eq!(refiner.added_in_last_step(), &[storage.point(1).unwrap(), storage.point(2).unwrap()]);

        // four candidates were found, two remain
        let pending: Vec<GridPoint> = refiner.candidates().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(pending, vec![GridPoint::new(&[1, 2], &[1, 1], true), GridPoint::new(&[1, 2], &[1, 3], true)]);

        assert!(!storage.node(0).unwrap().is_leaf());
        assert!(storage.node(1).unwrap().is_leaf());
        assert!(storage.node(2).unwrap().is_leaf());
    }

    #[test]
    fn remembered_candidates_are_inserted_before_newer_ones()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::default();
        let indicator = constant(1.0, 0.0, -1.0, 2);
        refiner.refine(&mut storage, &indicator).unwrap();
        let inserted = refiner.refine(&mut storage, &indicator).unwrap();
        assert_eq!(inserted, vec![3, 4]);
        assert_eq!(storage.point(3).unwrap(), GridPoint::new(&[1, 2], &[1, 1], true));
        assert_eq!(storage.point(4).unwrap(), GridPoint::new(&[1, 2], &[1, 3], true));
        // children along x of the level 2 points, mixed children are not yet admissible
        assert_eq!(refiner.candidates().len(), 4);
        assert!(!refiner.candidates().contains(&GridPoint::new(&[2, 2], &[1, 1], true)));

        // now (2,1)x(2,1) has both parents and is found through the new points
        refiner.refine(&mut storage, &indicator).unwrap();
        let mixed = GridPoint::new(&[2, 2], &[1, 1], true);
        assert!(refiner.candidates().contains(&mixed) || storage.contains(&mixed));
        assert_leaf_flags(&storage);
    }

    #[test]
    fn invariants_hold_over_many_steps()
    {
        let mut storage = root_storage(3);
        let mut refiner = AdaptiveRefiner::default();
        let indicator = UserDefinedIndicator { fun_eval: &varying, threshold: 0.0, start: 0.0, budget: 5 };
        for _ in 0..15
        {
            let size_before = storage.len();
            let inserted = refiner.refine(&mut storage, &indicator).unwrap();
            assert!(inserted.len() <= 5);
            assert_eq!(inserted, (size_before..storage.len()).collect::<Vec<_>>());
            assert_parents_predate(&storage, &inserted, size_before);
            for (candidate, _) in refiner.candidates().iter()
            {
                assert!(!storage.contains(candidate), "{} is both stored and a candidate", candidate);
            }
            assert_leaf_flags(&storage);
        }
        assert_eq!(storage.len(), 1 + 15 * 5);
        assert_eq!(refiner.steps(), 15);
    }

    #[test]
    fn identical_runs_are_identical()
    {
        let indicator = UserDefinedIndicator { fun_eval: &varying, threshold: 0.0, start: 0.0, budget: 3 };
        let run = ||
        {
            let mut storage = root_storage(3);
            let mut refiner = AdaptiveRefiner::default();
            let mut steps = Vec::new();
            for _ in 0..10
            {
                refiner.refine(&mut storage, &indicator).unwrap();
                steps.push(refiner.added_in_last_step().to_vec());
            }
            (storage.level_index_arrays(), steps)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn empty_storage_is_rejected()
    {
        let mut storage = GridStorage::new(2);
        let mut refiner = AdaptiveRefiner::default();
        assert_eq!(refiner.refine(&mut storage, &constant(1.0, 0.0, -1.0, 2)), Err(SGError::EmptyStorage));
        assert_eq!(refiner.state(), RefinerState::Uninitialized);
    }

    #[test]
    fn dimension_must_not_change()
    {
        let mut refiner = AdaptiveRefiner::default();
        let indicator = constant(1.0, 0.0, -1.0, 1);
        refiner.refine(&mut root_storage(2), &indicator).unwrap();
        assert_eq!(refiner.refine(&mut root_storage(3), &indicator), Err(SGError::DimensionMismatch));
        refiner.reset();
        assert!(refiner.refine(&mut root_storage(3), &indicator).is_ok());
    }

    #[test]
    fn threshold_and_start_filter_candidates()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::default();
        assert!(refiner.refine(&mut storage, &constant(0.5, 1.0, -1.0, 4)).unwrap().is_empty());
        assert_eq!(refiner.candidates().len(), 4);
        assert_eq!(storage.len(), 1);

        // candidates keep their score of 0.5, a lower threshold accepts them
        let inserted = refiner.refine(&mut storage, &constant(0.5, 0.0, 0.4, 4)).unwrap();
        assert_eq!(inserted.len(), 4);

        let mut storage = root_storage(1);
        let mut refiner = AdaptiveRefiner::default();
        assert!(refiner.refine(&mut storage, &constant(-0.5, 0.0, 0.0, 4)).unwrap().is_empty());
        let mut refiner = AdaptiveRefiner::default();
        assert_eq!(refiner.refine(&mut storage, &constant(-0.5, 0.0, -1.0, 4)).unwrap().len(), 2);
    }

    #[test]
    fn zero_budget_inserts_nothing()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::default();
        assert!(refiner.refine(&mut storage, &constant(1.0, 0.0, -1.0, 0)).unwrap().is_empty());
        assert_eq!(refiner.candidates().len(), 4);
        assert!(refiner.added_in_last_step().is_empty());
    }

    #[test]
    fn nan_errors_are_dropped()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::default();
        assert!(refiner.refine(&mut storage, &constant(f64::NAN, 0.0, -1.0, 4)).unwrap().is_empty());
        assert!(refiner.candidates().is_empty());
    }

    #[test]
    fn level_limits_bound_the_grid()
    {
        let mut storage = root_storage(2);
        let mut refiner = AdaptiveRefiner::new(RefinementOptions::new().with_level_limits(vec![3, 1]));
        let inserted = refiner.refine_iterations(&mut storage, &constant(1.0, 0.0, -1.0, 2), 20).unwrap();
        // only direction 0 may be refined: 7 points on levels 1..=3
        assert_eq!(inserted.len(), 6);
        assert_eq!(storage.len(), 7);
        assert!(storage.nodes().all(|node| node.level(0) <= 3 && node.level(1) == 1));
        assert!(refiner.candidates().is_empty());

        let mut refiner = AdaptiveRefiner::new(RefinementOptions::new().with_level_limits(vec![3]));
        assert_eq!(refiner.refine(&mut storage, &constant(1.0, 0.0, -1.0, 2)), Err(SGError::InvalidLevelLimits));
        assert_eq!(storage.len(), 7);
    }

    #[test]
    fn boundary_grid_keeps_leaf_flags()
    {
        let mut storage = GridStorage::new(2);
        for (level, index) in [([0, 0], [0, 0]), ([0, 0], [1, 0]), ([0, 0], [0, 1]), ([0, 0], [1, 1])]
        {
            storage.insert(GridPoint::new(&level, &index, true));
        }
        let mut refiner = AdaptiveRefiner::default();
        let indicator = UserDefinedIndicator { fun_eval: &|p: &GridPoint| 1.0 / (1.0 + p.level_sum() as f64), threshold: 0.0, start: 0.0, budget: 3 };
        for _ in 0..6
        {
            refiner.refine(&mut storage, &indicator).unwrap();
            assert_leaf_flags(&storage);
        }
        assert!(storage.contains(&GridPoint::new(&[1, 0], &[1, 0], true)));
        assert!(!storage.node(0).unwrap().is_leaf());
    }

    #[test]
    fn reset_rescans_the_whole_grid()
    {
        let mut storage = root_storage(1);
        let mut refiner = AdaptiveRefiner::default();
        let indicator = constant(1.0, 0.0, -1.0, 1);
        refiner.refine(&mut storage, &indicator).unwrap();
        assert_eq!(storage.len(), 2);

        storage.insert(GridPoint::new(&[3], &[1], true));
        refiner.reset();
        assert_eq!(refiner.state(), RefinerState::Uninitialized);
        let inserted = refiner.refine(&mut storage, &indicator).unwrap();
        assert_eq!(inserted.len(), 1);
        // (2,3) was inserted; (3,3) and both children of (3,1) remain
        assert_eq!(storage.point(inserted[0]).unwrap(), GridPoint::new(&[2], &[3], true));
        assert_eq!(refiner.candidates().len(), 3);
        assert_leaf_flags(&storage);
    }

    #[test]
    fn deep_refinement_stops_at_max_level()
    {
        let mut storage = root_storage(1);
        let mut refiner = AdaptiveRefiner::default();
        let indicator = UserDefinedIndicator { fun_eval: &|p: &GridPoint| p.level_sum() as f64 + p.unit_coordinate(0), threshold: 0.0, start: 0.0, budget: 1 };
        let inserted = refiner.refine_iterations(&mut storage, &indicator, 40).unwrap();
        assert_eq!(inserted.len(), 40);
        assert_eq!(storage.max_level(), MAX_LEVEL);
        assert!(storage.contains(&GridPoint::new(&[MAX_LEVEL], &[u32::MAX], true)));
        assert!(refiner.candidates().iter().all(|(p, _)| p.level(0) <= MAX_LEVEL));
        assert_leaf_flags(&storage);
    }

    fn regular_grid_2d(level: LevelType) -> GridStorage
    {
        let mut storage = GridStorage::new(2);
        for l0 in 1..=level
        {
            for l1 in 1..=(level + 1 - l0)
            {
                for i0 in (1..(1_u32 << l0)).step_by(2)
                {
                    for i1 in (1..(1_u32 << l1)).step_by(2)
                    {
                        storage.insert(GridPoint::new(&[l0, l1], &[i0, i1], true));
                    }
                }
            }
        }
        storage.recalc_leaf_property();
        storage
    }

    #[test]
    fn refine_single_point_per_direction()
    {
        let mut storage = regular_grid_2d(3);
        assert_eq!(storage.len(), 17);
        let point = GridPoint::new(&[2, 2], &[1, 3], true);
        let seq = storage.find(&point).unwrap();
        assert!(storage.node(seq).unwrap().is_leaf());

        let created = refine_point_1d(&mut storage, seq, 0).unwrap();
        assert_eq!(created, vec![17, 18]);
        assert_eq!(storage.len(), 19);
        for (dim, present) in [(0, true), (1, false)]
        {
            let mut child = point.clone();
            child.left_child(dim);
            assert_eq!(storage.contains(&child), present);
            let mut child = point.clone();
            child.right_child(dim);
            assert_eq!(storage.contains(&child), present);
        }
        assert!(!storage.node(seq).unwrap().is_leaf());

        refine_point_1d(&mut storage, seq, 1).unwrap();
        assert_eq!(storage.len(), 21);
        assert!(storage.contains(&GridPoint::new(&[2, 3], &[1, 5], true)));
        assert!(storage.contains(&GridPoint::new(&[2, 3], &[1, 7], true)));
        // children exist already
        assert!(refine_point_1d(&mut storage, seq, 1).unwrap().is_empty());
        assert_leaf_flags(&storage);
    }

    #[test]
    fn refining_a_point_creates_missing_parents()
    {
        let mut storage = root_storage(2);
        storage.insert(GridPoint::new(&[2, 1], &[1, 1], true));
        storage.insert(GridPoint::new(&[1, 2], &[1, 1], true));
        storage.recalc_leaf_property();

        let created = refine_point_1d(&mut storage, 1, 1).unwrap();
        assert_eq!(created, vec![3, 4, 5]);
        assert_eq!(storage.point(3).unwrap(), GridPoint::new(&[2, 2], &[1, 1], true));
        assert_eq!(storage.point(4).unwrap(), GridPoint::new(&[1, 2], &[1, 3], true));
        assert_eq!(storage.point(5).unwrap(), GridPoint::new(&[2, 2], &[1, 3], true));
        let leaves: Vec<bool> = storage.nodes().map(|node| node.is_leaf()).collect();
        assert_eq!(leaves, vec![false, false, false, true, false, true]);
        assert_leaf_flags(&storage);
    }

    #[test]
    fn refine_point_in_every_direction()
    {
        let mut storage = root_storage(2);
        assert_eq!(refine_point(&mut storage, 0).unwrap(), vec![1, 2, 3, 4]);
        assert!(!storage.node(0).unwrap().is_leaf());
        assert_eq!(refine_point_1d(&mut storage, 9, 0), Err(SGError::InvalidIndex));
        assert_eq!(refine_point_1d(&mut storage, 0, 2), Err(SGError::DimensionMismatch));

        let mut deep = GridStorage::new(1);
        deep.insert(GridPoint::new(&[MAX_LEVEL], &[1], true));
        assert!(refine_point(&mut deep, 0).unwrap().is_empty());
        assert_eq!(deep.len(), 1);
    }
}
