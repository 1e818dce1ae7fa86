//! Build information reported by `fnplane version` and `GET /version`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version record for this binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
    /// Set at compile time from `FNPLANE_GIT_COMMIT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// Set at compile time from `FNPLANE_BUILD_DATE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
    /// When the serving process started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: option_env!("FNPLANE_GIT_COMMIT").map(str::to_string),
            build_date: option_env!("FNPLANE_BUILD_DATE").map(str::to_string),
            started_at: None,
        }
    }

    /// Stamp the record with the current time
    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }
}
