//! Database layer: session kinds, connection settings, and the bounded
//! session pool protocol handlers draw from.

mod pool;
mod session;

pub use pool::{DbPool, PooledSession};
pub use session::{format_rows, DbSession, SqlValue};

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{ExtError, Result};

/// The closed set of session kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    MySql,
    Odbc,
    Sqlite,
}

impl DbKind {
    /// Parse the config `Type` value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim();
        if v.eq_ignore_ascii_case("mysql") {
            Some(DbKind::MySql)
        } else if v.eq_ignore_ascii_case("odbc") {
            Some(DbKind::Odbc)
        } else if v.eq_ignore_ascii_case("sqlite") {
            Some(DbKind::Sqlite)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::MySql => "MySQL",
            DbKind::Odbc => "ODBC",
            DbKind::Sqlite => "SQLite",
        }
    }
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved settings for one session pool.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub kind: DbKind,
    pub connection_str: String,
    pub min_sessions: usize,
    pub max_sessions: usize,
    pub idle: Duration,
}

/// Default idle lifetime when `idleTime` is unset.
const DEFAULT_IDLE_SECS: u64 = 600;

impl DbSettings {
    /// Resolve a named config section into pool settings.
    ///
    /// `default_max` bounds the pool when `maxSessions` is unset or invalid;
    /// callers pass the worker-pool size so DB concurrency tracks worker
    /// concurrency.
    pub fn from_config(
        settings: &Settings,
        section: &str,
        default_max: usize,
    ) -> Result<Self> {
        let kind_raw = settings
            .get(section, "Type")
            .ok_or_else(|| ExtError::NoConfigOption(section.to_string()))?;
        let kind = DbKind::parse(kind_raw)
            .ok_or_else(|| ExtError::UnknownDatabaseType(kind_raw.to_string()))?;

        let name = require(settings, section, "Name")?;

        let min_sessions = get_int(settings, section, "minSessions")
            .unwrap_or(1)
            .max(1) as usize;
        let max_from_config = get_int(settings, section, "maxSessions").unwrap_or(0);
        let mut max_sessions = if max_from_config > 0 {
            max_from_config as usize
        } else {
            default_max.max(1)
        };
        max_sessions = max_sessions.max(min_sessions);

        let idle_secs = get_int(settings, section, "idleTime")
            .filter(|&v| v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_IDLE_SECS);

        let connection_str = match kind {
            DbKind::Sqlite => sqlite_path(settings, &name).to_string_lossy().into_owned(),
            DbKind::MySql | DbKind::Odbc => {
                let mut conn = format!(
                    "host={};port={};user={};password={};db={};auto-reconnect=true",
                    require(settings, section, "IP")?,
                    require(settings, section, "Port")?,
                    require(settings, section, "Username")?,
                    require(settings, section, "Password")?,
                    name,
                );
                let compress = settings
                    .get(section, "Compress")
                    .map(|v| v.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                if compress {
                    conn.push_str(";compress=true");
                }
                conn
            }
        };

        Ok(Self {
            kind,
            connection_str,
            min_sessions,
            max_sessions,
            idle: Duration::from_secs(idle_secs),
        })
    }
}

/// SQLite databases live under `extDB/sqlite/<name>` beside the logs.
fn sqlite_path(settings: &Settings, name: &str) -> PathBuf {
    settings.base_dir.join("extDB").join("sqlite").join(name)
}

fn require(settings: &Settings, section: &str, key: &str) -> Result<String> {
    settings
        .get(section, key)
        .map(|v| v.to_string())
        .ok_or_else(|| ExtError::NoConfigOption(format!("{}.{}", section, key)))
}

fn get_int(settings: &Settings, section: &str, key: &str) -> Option<i64> {
    settings
        .get(section, key)
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn settings(text: &str) -> Settings {
        Settings::parse_str(text, Path::new("/srv/game")).unwrap()
    }

    #[test]
    fn test_kind_parse_case_insensitive() {
        assert_eq!(DbKind::parse("mysql"), Some(DbKind::MySql));
        assert_eq!(DbKind::parse("MySQL"), Some(DbKind::MySql));
        assert_eq!(DbKind::parse("SQLITE"), Some(DbKind::Sqlite));
        assert_eq!(DbKind::parse("odbc"), Some(DbKind::Odbc));
        assert_eq!(DbKind::parse("postgres"), None);
    }

    #[test]
    fn test_mysql_connection_string() {
        let s = settings(
            "[DB]\nType = MySQL\nName = altis\nUsername = arma\nPassword = secret\nIP = 127.0.0.1\nPort = 3306\nminSessions = 2\nmaxSessions = 8\nidleTime = 60\n",
        );
        let cfg = DbSettings::from_config(&s, "DB", 4).unwrap();
        assert_eq!(cfg.kind, DbKind::MySql);
        assert_eq!(
            cfg.connection_str,
            "host=127.0.0.1;port=3306;user=arma;password=secret;db=altis;auto-reconnect=true"
        );
        assert_eq!(cfg.min_sessions, 2);
        assert_eq!(cfg.max_sessions, 8);
        assert_eq!(cfg.idle, Duration::from_secs(60));
    }

    #[test]
    fn test_compress_appended() {
        let s = settings(
            "[DB]\nType = MySQL\nName = altis\nUsername = arma\nPassword = p\nIP = h\nPort = 3306\nCompress = true\n",
        );
        let cfg = DbSettings::from_config(&s, "DB", 4).unwrap();
        assert!(cfg.connection_str.ends_with(";compress=true"));
    }

    #[test]
    fn test_sqlite_path_under_base_dir() {
        let s = settings("[DB]\nType = SQLite\nName = stats.db\n");
        let cfg = DbSettings::from_config(&s, "DB", 4).unwrap();
        assert_eq!(
            Path::new(&cfg.connection_str),
            Path::new("/srv/game/extDB/sqlite/stats.db")
        );
    }

    #[test]
    fn test_session_bound_defaults() {
        // maxSessions unset: falls back to the worker count
        let s = settings("[DB]\nType = SQLite\nName = a.db\nminSessions = 0\n");
        let cfg = DbSettings::from_config(&s, "DB", 6).unwrap();
        assert_eq!(cfg.min_sessions, 1);
        assert_eq!(cfg.max_sessions, 6);
        assert_eq!(cfg.idle, Duration::from_secs(DEFAULT_IDLE_SECS));

        // max below min is raised to min
        let s = settings("[DB]\nType = SQLite\nName = a.db\nminSessions = 5\nmaxSessions = 2\n");
        let cfg = DbSettings::from_config(&s, "DB", 6).unwrap();
        assert_eq!(cfg.max_sessions, 5);
    }

    #[test]
    fn test_missing_section_and_keys() {
        let s = settings("[DB]\nType = MySQL\nName = altis\n");
        assert!(matches!(
            DbSettings::from_config(&s, "Nope", 4),
            Err(ExtError::NoConfigOption(_))
        ));
        // MySQL without credentials
        assert!(matches!(
            DbSettings::from_config(&s, "DB", 4),
            Err(ExtError::NoConfigOption(_))
        ));
        let s = settings("[DB]\nType = Oracle\nName = x\n");
        assert!(matches!(
            DbSettings::from_config(&s, "DB", 4),
            Err(ExtError::UnknownDatabaseType(_))
        ));
    }
}
