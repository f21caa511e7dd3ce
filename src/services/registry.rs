//! Group registry service
//!
//! Issues and validates the short join codes that identify groups. Codes
//! are random 6-digit strings; generation retries on collision a bounded
//! number of times before giving up.

use crate::config::PresenceConfig;
use crate::db::repositories::GroupRepository;
use crate::models::Group;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;

static JOIN_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").unwrap());

/// Check whether a string has the shape of a join code
pub fn is_valid_join_code(code: &str) -> bool {
    JOIN_CODE_RE.is_match(code)
}

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum GroupRegistryError {
    /// Every generation attempt collided with an existing code
    #[error("Could not generate an unused join code")]
    CodeGenerationExhausted,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Group registry service
pub struct GroupRegistry {
    groups: Arc<dyn GroupRepository>,
    code_attempts: u32,
    group_lifetime_days: Option<u32>,
}

impl GroupRegistry {
    /// Create a new registry with the given repository
    pub fn new(groups: Arc<dyn GroupRepository>, config: &PresenceConfig) -> Self {
        Self {
            groups,
            code_attempts: config.code_attempts,
            group_lifetime_days: config.group_lifetime_days,
        }
    }

    /// Create a new group under a fresh join code
    ///
    /// The code's uniqueness is enforced by the storage layer; a collision
    /// simply retries with a new random code, up to the configured number
    /// of attempts.
    pub async fn create_group(&self) -> Result<Group, GroupRegistryError> {
        for _ in 0..self.code_attempts.max(1) {
            let now = Utc::now();
            let group = Group {
                code: generate_join_code(),
                created_at: now,
                expires_at: self
                    .group_lifetime_days
                    .map(|days| now + Duration::days(i64::from(days))),
            };

            if self.groups.insert(&group).await? {
                tracing::info!("Created group {}", group.code);
                return Ok(group);
            }

            tracing::debug!("Join code collision on {}, retrying", group.code);
        }

        Err(GroupRegistryError::CodeGenerationExhausted)
    }

    /// Get a group by join code
    ///
    /// Malformed codes short-circuit to `None` without hitting storage.
    pub async fn find(&self, code: &str) -> Result<Option<Group>, GroupRegistryError> {
        if !is_valid_join_code(code) {
            return Ok(None);
        }
        Ok(self.groups.find(code).await?)
    }

    /// Check whether a join code refers to an existing group
    pub async fn exists(&self, code: &str) -> Result<bool, GroupRegistryError> {
        Ok(self.find(code).await?.is_some())
    }
}

/// Produce a random 6-digit join code, zero-padded
fn generate_join_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
