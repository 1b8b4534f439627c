//! One collection cycle: collect, merge into history, persist.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::session::{Collector, SessionProvider};
use crate::store::HistoryStore;

/// What a cycle did. `new == 0` is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    /// Valid listings extracted from the page.
    pub collected: usize,
    /// Listings appended to the store.
    pub new: usize,
}

/// Runs a full cycle against `store`.
///
/// # Errors
///
/// [`PipelineError::Acquisition`] when no session could be opened and
/// [`PipelineError::Persistence`] when the store could not be read or
/// written. In both cases the store on disk is unchanged.
pub async fn run_cycle(
    collector: &Collector,
    provider: &dyn SessionProvider,
    store: &HistoryStore,
) -> Result<CycleOutcome, PipelineError> {
    let records = collector.run(provider).await.map_err(|e| {
        error!(stage = %e.stage(), error = %e, "Could not open a collection session");
        PipelineError::Acquisition(e)
    })?;

    let collected = records.len();
    if collected == 0 {
        warn!("Collection returned 0 results, nothing to save");
        return Ok(CycleOutcome { collected, new: 0 });
    }

    let new = store.append(records).map_err(|e| {
        error!(path = %store.path().display(), error = %e, "Save error");
        PipelineError::Persistence(e)
    })?;

    info!(collected, new, "Collection cycle finished");
    Ok(CycleOutcome { collected, new })
}
