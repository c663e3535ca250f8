//! Line-level surgery on the account records embedded in the daemon config.
//!
//! Every function here is pure: it takes the current lines and returns the
//! new lines together with the list of changes. Callers decide whether to
//! persist. Lines that are not part of a matched record are carried over
//! verbatim and in their original order.
//!
//! Writers trust the comment/entry adjacency they produce themselves.
//! Readers (delete, list, check) re-verify that the line after a comment
//! really is an entry line before treating the two as a pair.

use crate::error::AccountError;
use crate::models::account::AccountEntry;
use crate::models::kind::{CredentialKind, MarkerGrammar};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One positional change, indexed against the original lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Inserted { at: usize, lines: Vec<String> },
    Removed { at: usize, lines: Vec<String> },
    Rewritten { at: usize, before: String, after: String },
}

/// Result of a mutating operation: the full new document plus what changed.
#[derive(Debug, Clone)]
pub struct Edit {
    pub lines: Vec<String>,
    pub changes: Vec<Change>,
}

/// Per-kind findings produced by [`check`].
#[derive(Debug, Clone, Default)]
pub struct KindReport {
    pub anchors: usize,
    pub records: usize,
    /// 1-based line numbers of comment lines with no entry line after them.
    pub unpaired: Vec<usize>,
    /// Names (lowercased) that appear on more than one comment line.
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub kinds: Vec<(CredentialKind, KindReport)>,
}

/// Require a single non-empty token that the record grammar can round-trip.
pub fn validate_token(field: &'static str, value: &str) -> Result<(), AccountError> {
    if value.is_empty() {
        return Err(AccountError::MissingField(field));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(AccountError::InvalidField {
            field,
            reason: "whitespace not allowed",
        });
    }
    if value.contains('"') {
        return Err(AccountError::InvalidField {
            field,
            reason: "double quotes not allowed",
        });
    }
    Ok(())
}

fn parse_record(lines: &[String], index: usize, grammar: &MarkerGrammar) -> AccountEntry {
    let comment = &lines[index];
    let name = grammar.comment_name(comment).unwrap_or("").to_string();
    let expiry = grammar.comment_expiry(comment).unwrap_or("").to_string();
    let identifier = lines
        .get(index + 1)
        .filter(|next| grammar.is_entry(next))
        .and_then(|next| grammar.extract_identifier(next))
        .unwrap_or("")
        .to_string();
    AccountEntry {
        name,
        expiry,
        identifier,
    }
}

/// Lookup names only need to survive whitespace tokenizing; records written
/// by hand may carry characters [`validate_token`] refuses for new records.
pub fn validate_lookup(name: &str) -> Result<(), AccountError> {
    if name.is_empty() {
        return Err(AccountError::MissingField("name"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AccountError::InvalidField {
            field: "name",
            reason: "whitespace not allowed",
        });
    }
    Ok(())
}

/// Carriage return to append so new lines match the CRLF style of `line`.
fn line_ending_of(line: &str) -> &'static str {
    if line.ends_with('\r') {
        "\r"
    } else {
        ""
    }
}

/// Locate the first record of `kind` named `name` (case-insensitive).
pub fn find(lines: &[String], kind: CredentialKind, name: &str) -> Option<(usize, AccountEntry)> {
    let grammar = kind.grammar();
    lines
        .iter()
        .position(|line| grammar.matches_name(line, name))
        .map(|index| (index, parse_record(lines, index, grammar)))
}

pub fn exists(lines: &[String], kind: CredentialKind, name: &str) -> bool {
    let grammar = kind.grammar();
    lines.iter().any(|line| grammar.matches_name(line, name))
}

/// All records of `kind` in file order. Malformed records degrade to empty
/// fields instead of failing.
pub fn list(lines: &[String], kind: CredentialKind) -> Vec<AccountEntry> {
    let grammar = kind.grammar();
    let mut out = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if grammar.is_anchor(line) || !grammar.is_comment(line) {
            continue;
        }
        let entry = parse_record(lines, index, grammar);
        if entry.identifier.is_empty() {
            warn!(kind = %kind, line = index + 1, "record has no readable identifier");
        }
        out.push(entry);
    }
    out
}

/// Insert a new record directly below the kind's anchor line.
pub fn add(
    lines: &[String],
    kind: CredentialKind,
    name: &str,
    identifier: &str,
    expiry: &str,
) -> Result<Edit, AccountError> {
    validate_token("name", name)?;
    validate_token("identifier", identifier)?;
    validate_token("expiry", expiry)?;

    if exists(lines, kind, name) {
        return Err(AccountError::AlreadyExists {
            kind,
            name: name.to_string(),
        });
    }

    let grammar = kind.grammar();
    let anchor = lines
        .iter()
        .position(|line| grammar.is_anchor(line))
        .ok_or(AccountError::AnchorNotFound {
            kind,
            anchor: grammar.anchor,
        })?;

    let eol = line_ending_of(&lines[anchor]);
    let record = vec![
        format!("{}{}", grammar.comment_line(name, expiry), eol),
        format!("{}{}", grammar.entry_line(identifier, name), eol),
    ];
    let mut out = Vec::with_capacity(lines.len() + record.len());
    out.extend_from_slice(&lines[..=anchor]);
    out.extend(record.iter().cloned());
    out.extend_from_slice(&lines[anchor + 1..]);

    debug!(kind = %kind, anchor_line = anchor + 1, "inserted record below anchor");
    Ok(Edit {
        lines: out,
        changes: vec![Change::Inserted {
            at: anchor + 1,
            lines: record,
        }],
    })
}

/// Remove every record of `kind` named `name`. The line after a matched
/// comment is removed only when it is an entry line of the same kind.
pub fn delete(lines: &[String], kind: CredentialKind, name: &str) -> Result<Edit, AccountError> {
    validate_lookup(name)?;

    let grammar = kind.grammar();
    let mut out = Vec::with_capacity(lines.len());
    let mut changes = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        if grammar.matches_name(line, name) {
            let mut removed = vec![line.clone()];
            match lines.get(i + 1) {
                Some(next) if grammar.is_entry(next) => removed.push(next.clone()),
                _ => warn!(kind = %kind, line = i + 1, "comment line has no paired entry; removing comment only"),
            }
            let width = removed.len();
            changes.push(Change::Removed { at: i, lines: removed });
            i += width;
            continue;
        }
        out.push(line.clone());
        i += 1;
    }

    if changes.is_empty() {
        return Err(AccountError::NotFound {
            kind,
            name: name.to_string(),
        });
    }
    Ok(Edit { lines: out, changes })
}

/// Replace the expiry on matching comment lines, keeping the stored name casing.
pub fn renew(
    lines: &[String],
    kind: CredentialKind,
    name: &str,
    new_expiry: &str,
) -> Result<Edit, AccountError> {
    validate_lookup(name)?;
    validate_token("expiry", new_expiry)?;

    let grammar = kind.grammar();
    let mut changes = Vec::new();
    let out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| match grammar.comment_name(line) {
            Some(stored) if stored.to_lowercase() == name.to_lowercase() => {
                let after = format!(
                    "{}{}",
                    grammar.comment_line(stored, new_expiry),
                    line_ending_of(line)
                );
                changes.push(Change::Rewritten {
                    at: index,
                    before: line.clone(),
                    after: after.clone(),
                });
                after
            }
            _ => line.clone(),
        })
        .collect();

    if changes.is_empty() {
        return Err(AccountError::NotFound {
            kind,
            name: name.to_string(),
        });
    }
    Ok(Edit { lines: out, changes })
}

/// Structural health of every kind's records. Never fails.
pub fn check(lines: &[String]) -> DocumentReport {
    let kinds = CredentialKind::ALL
        .into_iter()
        .map(|kind| {
            let grammar = kind.grammar();
            let mut report = KindReport::default();
            let mut seen: HashMap<String, usize> = HashMap::new();
            for (index, line) in lines.iter().enumerate() {
                if grammar.is_anchor(line) {
                    report.anchors += 1;
                    continue;
                }
                if !grammar.is_comment(line) {
                    continue;
                }
                report.records += 1;
                if !lines.get(index + 1).is_some_and(|next| grammar.is_entry(next)) {
                    report.unpaired.push(index + 1);
                }
                if let Some(name) = grammar.comment_name(line) {
                    *seen.entry(name.to_lowercase()).or_default() += 1;
                }
            }
            let mut duplicates: Vec<String> = seen
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|(name, _)| name)
                .collect();
            duplicates.sort();
            report.duplicates = duplicates;
            (kind, report)
        })
        .collect();
    DocumentReport { kinds }
}
