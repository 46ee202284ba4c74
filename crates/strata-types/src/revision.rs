//! Deployment revisions
//!
//! Each deploy-path update appends one revision. At most one revision per
//! deployment is active when a transaction commits; the rest are history.

use crate::{DeploymentId, RevisionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::deployment::UnknownStatus;

/// One rollout generation of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRevision {
    pub id: RevisionId,
    pub deployment_id: DeploymentId,
    pub status: RevisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRevision {
    pub fn is_active(&self) -> bool {
        self.status == RevisionStatus::Active
    }
}

/// Revision status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    Active,
    Inactive,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Active => "active",
            RevisionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RevisionStatus::Active),
            "inactive" => Ok(RevisionStatus::Inactive),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
