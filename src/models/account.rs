use serde::{Deserialize, Serialize};

/// One credential record as read back from the daemon config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    pub expiry: String,
    #[serde(rename = "id")]
    pub identifier: String,
}
