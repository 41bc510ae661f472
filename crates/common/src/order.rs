//! Pull-order configuration for the background download queue.

use serde::{Deserialize, Serialize};

/// Order in which pending download jobs are handed to workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullOrder {
    #[default]
    Alphabetic,
    OldestFirst,
    NewestFirst,
    SmallestFirst,
    LargestFirst,
}
