//! Group model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A group namespace joined by a 6-digit code
///
/// Groups are never mutated after creation. `expires_at` records the policy
/// end of the group's season when one is configured; expired groups are
/// retained rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
