use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{Result, SyncError};

/// The account whose weight history is synchronized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub display_name: String,
    pub user_id: String,
    /// Raw profile record the identity was built from.
    #[serde(default)]
    pub source_profile: Value,
}

impl UserIdentity {
    pub fn new(display_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            user_id: user_id.into(),
            source_profile: Value::Null,
        }
    }
}

/// A profile record scraped from a logged-in page, not yet trusted.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCandidate {
    #[validate(required, length(min = 1))]
    pub display_name: Option<String>,
    #[validate(required, length(min = 1))]
    pub full_name: Option<String>,
    #[validate(required)]
    pub profile_id: Option<i64>,
    #[serde(skip)]
    pub raw: Value,
}

impl ProfileCandidate {
    /// Read a candidate out of an arbitrary JSON value. Returns `None` when
    /// the value is not an object or its known fields have the wrong types.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let mut candidate: ProfileCandidate = serde_json::from_value(value.clone()).ok()?;
        candidate.raw = value;
        Some(candidate)
    }

    /// Check the required-field shape and turn the candidate into an identity.
    pub fn into_identity(self) -> Result<UserIdentity> {
        self.validate()
            .map_err(|e| SyncError::Validation(format!("Invalid profile candidate: {e}")))?;

        match (self.display_name, self.profile_id) {
            (Some(display_name), Some(profile_id)) => Ok(UserIdentity {
                display_name,
                user_id: profile_id.to_string(),
                source_profile: self.raw,
            }),
            _ => Err(SyncError::Validation(
                "Profile candidate is missing required fields".to_string(),
            )),
        }
    }
}

/// Personal information returned by the remote profile endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub display_name: String,
    pub birth_date: NaiveDate,
}
