//! Pluggable commit/rollback policy.

use crate::error::StrategyResult;
use crate::model::CompletionContext;

/// Performs the physical commit or rollback of a consumed resource.
///
/// The handler invokes strategies concurrently for distinct resources and never
/// retries a call; bounding the duration of each call is the strategy's concern.
pub trait CommitRollbackStrategy<R>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Make the consumption of `resource` durable (archive, delete, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the commit action could not be completed.
    fn commit(&self, resource: &R, context: &CompletionContext) -> StrategyResult<()>;

    /// Leave `resource` recoverable after failed processing or a failed commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback action could not be completed.
    fn rollback(&self, resource: &R, context: &CompletionContext) -> StrategyResult<()>;
}
