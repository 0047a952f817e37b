//! SMT fetch-thread selection policies.
//!
//! Each cycle the fetch engine asks the configured policy for the thread
//! to fetch. Count-based policies favor the thread putting the least
//! pressure on the backend, using the occupancy numbers carried on the IEW
//! backward wire.

use serde::Deserialize;

/// Fetch-thread selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SmtFetchPolicy {
    /// Rotate through ready threads, moving the chosen one to the back.
    #[default]
    RoundRobin,
    /// Always fetch thread 0.
    SingleThread,
    /// Fetch the ready thread with the fewest instruction-queue entries.
    IqCount,
    /// Fetch the ready thread with the fewest load/store-queue entries.
    LsqCount,
    /// Fetch the ready thread with the fewest outstanding branches.
    BranchCount,
}
