//! Hosting profile records kept in the relational store.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Status assigned to freshly created profiles.
pub const DEFAULT_STATUS: &str = "pending";

/// A stored tenant profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub ssh_port: u16,
    pub cpu_percent: u32,
    pub ram_mb: u32,
    pub password: String,
    /// `YYYY-MM-DD`
    pub expires_at: String,
    pub bandwidth_limit_tb: f64,
    pub bandwidth_used_tb: f64,
    pub restore_link: Option<String>,
    pub status: String,
    pub container_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing row: a profile plus values derived at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(flatten)]
    pub profile: Profile,
    pub remaining_days: i64,
    pub remaining_bandwidth_tb: f64,
}

/// Input for creating a profile.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub domain: String,
    pub ssh_port: u16,
    pub cpu_percent: u32,
    pub ram_mb: u32,
    pub password: Zeroizing<String>,
    pub expires_at: String,
    pub bandwidth_limit_tb: f64,
    pub restore_link: Option<String>,
}
