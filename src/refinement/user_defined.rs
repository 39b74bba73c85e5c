use crate::algorithms::refinement::{CandidateIndicator, RefinementIndicator};
use crate::grid_point::GridPoint;
use crate::storage::GridStorage;

///
/// A function that scores a candidate point.
///
/// # Arguments
/// - candidate: Point that is not yet part of the grid.
///
pub type CandidateFunction = dyn Fn(&GridPoint) -> f64 + Send + Sync;

pub struct UserDefinedIndicator<'a>
{
    pub fun_eval: &'a CandidateFunction,
    pub threshold: f64,
    pub start: f64,
    pub budget: usize,
}

impl RefinementIndicator for UserDefinedIndicator<'_>
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

impl CandidateIndicator for UserDefinedIndicator<'_>
{
    fn evaluate(&self, candidate: &GridPoint, _storage: &GridStorage) -> f64 {
        (self.fun_eval)(candidate)
    }
}
