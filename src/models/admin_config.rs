//! Admin configuration file model (`admin.toml`).

use crate::models::policy::PolicySection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminFile {
    #[serde(default)]
    pub xray: XraySection,
    #[serde(default)]
    pub policy: PolicySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XraySection {
    /// Path of the daemon config holding the account records.
    #[serde(default)]
    pub config_path: Option<String>,
}
