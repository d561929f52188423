//! The external `Calculator` contract (§4.5): `CalculateDiffs(ctx, grouping,
//! additionalDigests) -> err`. Must be restartable — partial progress must
//! not produce duplicate rows under the store's primary key — but that
//! restart-safety is the calculator implementation's responsibility, not
//! the dispatcher's.

use async_trait::async_trait;
use sched_lib::model::GroupingId;
use std::collections::BTreeMap;

pub type Params = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error("calculator failed: {0}")]
    Failed(String),
    #[error("canceled")]
    Canceled,
}

#[async_trait]
pub trait DiffCalculator: Send + Sync {
    async fn calculate_diffs(
        &self,
        grouping: &Params,
        additional_digests: &[String],
    ) -> Result<(), CalcError>;

    /// Expands an opaque `GroupingId` into its underlying key/value params.
    /// A real implementation resolves this from the grouping's content
    /// store; the in-memory LRU cache in [`crate::dispatcher::Dispatcher`]
    /// sits in front of this call.
    async fn expand_grouping(&self, grouping_id: &GroupingId) -> Result<Params, CalcError>;
}

/// A no-op calculator for tests and for driving the dispatcher loop without
/// a real diff-computation backend wired up.
#[derive(Debug, Default)]
pub struct NullCalculator;

#[async_trait]
impl DiffCalculator for NullCalculator {
    async fn calculate_diffs(
        &self,
        _grouping: &Params,
        _additional_digests: &[String],
    ) -> Result<(), CalcError> {
        Ok(())
    }

    async fn expand_grouping(&self, grouping_id: &GroupingId) -> Result<Params, CalcError> {
        let mut params = Params::new();
        params.insert("grouping_id".into(), grouping_id.0.clone());
        Ok(params)
    }
}
