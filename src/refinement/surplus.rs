use crate::algorithms::refinement::{CandidateIndicator, RefinementIndicator};
use crate::grid_point::GridPoint;
use crate::storage::GridStorage;

///
/// Scores a candidate by the largest absolute hierarchical surplus among its
/// stored parents. `alpha` holds `num_outputs` surpluses per stored point, laid
/// out in sequence order.
///
pub struct SurplusIndicator<'a>
{
    pub alpha: &'a [f64],
    pub num_outputs: usize,
    pub threshold: f64,
    pub budget: usize,
}

impl RefinementIndicator for SurplusIndicator<'_>
{
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn budget_per_step(&self) -> usize {
        self.budget
    }
}

impl CandidateIndicator for SurplusIndicator<'_>
{
    fn evaluate(&self, candidate: &GridPoint, storage: &GridStorage) -> f64 {
        let n = self.num_outputs;
        storage.parents_of(candidate).into_iter().fold(-1.0_f64, |max, seq|
        {
            self.alpha.get(seq * n..(seq + 1) * n)
                .map_or(max, |surplus| surplus.iter().fold(max, |max, &val| max.max(val.abs())))
        })
    }
}
