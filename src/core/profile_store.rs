//! SQLite-backed store for hosting profiles.

use crate::error::ProfileError;
use crate::models::profile::{NewProfile, Profile, ProfileSummary, DEFAULT_STATUS};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE COLLATE NOCASE,
    domain TEXT NOT NULL,
    ssh_port INTEGER NOT NULL,
    cpu_percent INTEGER NOT NULL,
    ram_mb INTEGER NOT NULL,
    password TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    bandwidth_limit_tb REAL NOT NULL,
    bandwidth_used_tb REAL DEFAULT 0,
    restore_link TEXT,
    status TEXT DEFAULT 'pending',
    container_name TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TRIGGER IF NOT EXISTS trg_profiles_updated
AFTER UPDATE ON profiles
BEGIN
    UPDATE profiles
    SET updated_at = datetime('now')
    WHERE id = NEW.id;
END;
";

const COLUMNS: &str = "id, name, domain, ssh_port, cpu_percent, ram_mb, password, expires_at, \
     bandwidth_limit_tb, bandwidth_used_tb, restore_link, status, container_name, \
     created_at, updated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct ProfileStore {
    conn: Connection,
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        domain: row.get(2)?,
        ssh_port: row.get(3)?,
        cpu_percent: row.get(4)?,
        ram_mb: row.get(5)?,
        password: row.get(6)?,
        expires_at: row.get(7)?,
        bandwidth_limit_tb: row.get(8)?,
        bandwidth_used_tb: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
        restore_link: row.get(10)?,
        status: row
            .get::<_, Option<String>>(11)?
            .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        container_name: row.get(12)?,
        created_at: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
    })
}

fn parse_date(value: &str) -> Result<NaiveDate, ProfileError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ProfileError::InvalidDate {
        value: value.to_string(),
    })
}

fn require(field: &'static str, value: &str) -> Result<(), ProfileError> {
    if value.trim().is_empty() {
        return Err(ProfileError::MissingField(field));
    }
    Ok(())
}

/// New expiry after adding `days`, counted from today when already expired.
/// `None` when the result falls outside the representable date range.
pub fn extended_expiry(current: NaiveDate, today: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|delta| current.max(today).checked_add_signed(delta))
}

impl ProfileStore {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, ProfileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ProfileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        let store = Self { conn };
        store.init()?;
        debug!(path = %path.display(), "opened profile database");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, ProfileError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    /// Create the schema. Idempotent.
    pub fn init(&self) -> Result<(), ProfileError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn create(&self, new: &NewProfile) -> Result<Profile, ProfileError> {
        require("name", &new.name)?;
        require("domain", &new.domain)?;
        require("password", &new.password)?;
        parse_date(&new.expires_at)?;
        if !(0.0..).contains(&new.bandwidth_limit_tb) {
            return Err(ProfileError::InvalidField {
                field: "bandwidth_limit_tb",
                reason: "must not be negative".to_string(),
            });
        }

        let inserted = self.conn.execute(
            "INSERT INTO profiles
                (name, domain, ssh_port, cpu_percent, ram_mb, password, expires_at,
                 bandwidth_limit_tb, bandwidth_used_tb, restore_link, status, container_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0.0, ?9, ?10, NULL)",
            params![
                new.name,
                new.domain,
                new.ssh_port,
                new.cpu_percent,
                new.ram_mb,
                new.password.as_str(),
                new.expires_at,
                new.bandwidth_limit_tb,
                new.restore_link,
                DEFAULT_STATUS,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(ProfileError::AlreadyExists(new.name.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        info!(profile = %new.name, "created profile");
        self.get(&new.name)
    }

    /// All profiles ordered by name, with remaining days and bandwidth.
    pub fn list(&self) -> Result<Vec<ProfileSummary>, ProfileError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS},
                    CAST((julianday(expires_at) - julianday('now')) AS INTEGER) AS remaining_days,
                    bandwidth_limit_tb - bandwidth_used_tb AS remaining_bandwidth_tb
             FROM profiles
             ORDER BY name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ProfileSummary {
                profile: row_to_profile(row)?,
                remaining_days: row.get::<_, Option<i64>>(15)?.unwrap_or(0),
                remaining_bandwidth_tb: row.get::<_, Option<f64>>(16)?.unwrap_or(0.0),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get(&self, name: &str) -> Result<Profile, ProfileError> {
        require("name", name)?;
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM profiles WHERE name = ?1 COLLATE NOCASE"),
                params![name],
                row_to_profile,
            )
            .optional()?
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    pub fn delete(&self, name: &str) -> Result<(), ProfileError> {
        require("name", name)?;
        let affected = self.conn.execute(
            "DELETE FROM profiles WHERE name = ?1 COLLATE NOCASE",
            params![name],
        )?;
        if affected == 0 {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        info!(profile = %name, "deleted profile");
        Ok(())
    }

    pub fn extend_days(&self, name: &str, days: i64) -> Result<Profile, ProfileError> {
        let profile = self.get(name)?;
        let current = parse_date(&profile.expires_at)?;
        let new_expiry = extended_expiry(current, Utc::now().date_naive(), days).ok_or_else(|| {
            ProfileError::InvalidField {
                field: "days",
                reason: format!("{} days is out of range", days),
            }
        })?;
        self.conn.execute(
            "UPDATE profiles SET expires_at = ?1 WHERE id = ?2",
            params![new_expiry.format(DATE_FORMAT).to_string(), profile.id],
        )?;
        info!(profile = %profile.name, expires_at = %new_expiry, "extended profile expiry");
        self.get(name)
    }

    pub fn extend_bandwidth(&self, name: &str, increment_tb: f64) -> Result<Profile, ProfileError> {
        let profile = self.get(name)?;
        let new_limit = profile.bandwidth_limit_tb + increment_tb;
        self.conn.execute(
            "UPDATE profiles SET bandwidth_limit_tb = ?1 WHERE id = ?2",
            params![new_limit, profile.id],
        )?;
        info!(profile = %profile.name, limit_tb = new_limit, "extended profile bandwidth");
        self.get(name)
    }

    /// Set the status; the container name is only replaced when given.
    pub fn update_status(
        &self,
        name: &str,
        status: &str,
        container_name: Option<&str>,
    ) -> Result<(), ProfileError> {
        require("name", name)?;
        require("status", status)?;
        let affected = self.conn.execute(
            "UPDATE profiles
             SET status = ?1, container_name = COALESCE(?2, container_name)
             WHERE name = ?3 COLLATE NOCASE",
            params![status, container_name, name],
        )?;
        if affected == 0 {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn update_usage(&self, name: &str, used_tb: f64) -> Result<(), ProfileError> {
        require("name", name)?;
        let affected = self.conn.execute(
            "UPDATE profiles SET bandwidth_used_tb = ?1 WHERE name = ?2 COLLATE NOCASE",
            params![used_tb, name],
        )?;
        if affected == 0 {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        Ok(())
    }
}
