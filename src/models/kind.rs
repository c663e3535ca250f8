//! Credential kinds and the line grammar each one uses inside the daemon config.
//!
//! A record is always two lines: a comment line `<prefix> <name> <expiry>`
//! followed by an entry line `<entry_prefix><json fragment>`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""id":\s*"([^"]+)""#).expect("ID_FIELD is a compile-time constant")
});

static PASSWORD_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""password":\s*"([^"]+)""#).expect("PASSWORD_FIELD is a compile-time constant")
});

/// Inbound protocol whose clients are stored as marker-delimited records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Vmess,
    Vless,
    Trojan,
}

/// Static grammar constants for one kind.
#[derive(Debug)]
pub struct MarkerGrammar {
    pub anchor: &'static str,
    pub comment_prefix: &'static str,
    pub entry_prefix: &'static str,
    pub identifier_field: &'static str,
    /// Fixed fields rendered between the identifier and the email.
    fixed_fields: &'static str,
    identifier_pattern: &'static LazyLock<Regex>,
}

static VMESS: MarkerGrammar = MarkerGrammar {
    anchor: "#vmess",
    comment_prefix: "###",
    entry_prefix: "},{",
    identifier_field: "id",
    fixed_fields: "\"alterId\": 0,",
    identifier_pattern: &ID_FIELD,
};

static VLESS: MarkerGrammar = MarkerGrammar {
    anchor: "#vless",
    comment_prefix: "#&",
    entry_prefix: "},{",
    identifier_field: "id",
    fixed_fields: "",
    identifier_pattern: &ID_FIELD,
};

static TROJAN: MarkerGrammar = MarkerGrammar {
    anchor: "#trojanws",
    comment_prefix: "#!",
    entry_prefix: "},{",
    identifier_field: "password",
    fixed_fields: "",
    identifier_pattern: &PASSWORD_FIELD,
};

impl CredentialKind {
    pub const ALL: [CredentialKind; 3] = [
        CredentialKind::Vmess,
        CredentialKind::Vless,
        CredentialKind::Trojan,
    ];

    pub fn grammar(self) -> &'static MarkerGrammar {
        match self {
            CredentialKind::Vmess => &VMESS,
            CredentialKind::Vless => &VLESS,
            CredentialKind::Trojan => &TROJAN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::Vmess => "vmess",
            CredentialKind::Vless => "vless",
            CredentialKind::Trojan => "trojan",
        }
    }

    /// Whether identifiers of this kind are UUIDs (as opposed to passwords).
    pub fn uses_uuid(self) -> bool {
        matches!(self, CredentialKind::Vmess | CredentialKind::Vless)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown kind '{}' (use vmess|vless|trojan)", s))
    }
}

impl MarkerGrammar {
    pub fn is_anchor(&self, line: &str) -> bool {
        line.trim() == self.anchor
    }

    pub fn is_comment(&self, line: &str) -> bool {
        line.starts_with(self.comment_prefix)
    }

    /// Entry lines may be indented; only leading whitespace is ignored.
    pub fn is_entry(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.entry_prefix)
    }

    /// Second whitespace-separated token of a comment line of this kind.
    pub fn comment_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        if !self.is_comment(line) {
            return None;
        }
        line.split_whitespace().nth(1)
    }

    /// Third whitespace-separated token of a comment line of this kind.
    pub fn comment_expiry<'a>(&self, line: &'a str) -> Option<&'a str> {
        if !self.is_comment(line) {
            return None;
        }
        line.split_whitespace().nth(2)
    }

    /// Case-insensitive name match on a comment line.
    pub fn matches_name(&self, line: &str, name: &str) -> bool {
        self.comment_name(line)
            .map(|found| found.to_lowercase() == name.to_lowercase())
            .unwrap_or(false)
    }

    pub fn comment_line(&self, name: &str, expiry: &str) -> String {
        format!("{} {} {}", self.comment_prefix, name, expiry)
    }

    pub fn entry_line(&self, identifier: &str, name: &str) -> String {
        format!(
            "{}\"{}\": \"{}\",{}\"email\": \"{}\"",
            self.entry_prefix, self.identifier_field, identifier, self.fixed_fields, name
        )
    }

    pub fn extract_identifier<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.identifier_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}
