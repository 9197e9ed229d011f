//! Commit log entry model.

use crate::model::version::VersionRecord;
use serde::{Deserialize, Serialize};

/// Position in the commit log; strictly increasing in apply order.
pub type CommitSequence = u64;

/// One applied version, in the order the store accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub sequence: CommitSequence,
    #[serde(flatten)]
    pub record: VersionRecord,
}
