//! Named protocol handlers.
//!
//! A protocol converts a request string into a response string. Handlers
//! are registered at runtime under a caller-chosen name via the admin
//! channel (`9:ADD:<kind>:<name>[:<init>]`) and looked up by that name on
//! every call. The kind set is closed; adding a kind means extending
//! [`ProtocolKind`] and its factory.

mod db_basic;
mod db_custom;
mod db_procedure;
mod db_raw;
mod log;
mod misc;

pub use db_basic::DbBasic;
pub use db_custom::DbCustom;
pub use db_procedure::DbProcedure;
pub use db_raw::DbRaw;
pub use log::LogFile;
pub use misc::Misc;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::db::DbPool;
use crate::error::{ExtError, Result};

/// A named, initialized request handler.
///
/// `init` runs once at registration; a handler that fails it is never
/// retained. `call` must be safe to run concurrently from several worker
/// threads.
pub trait Protocol: Send + Sync {
    fn init(&mut self, ctx: &Context, init_data: &str) -> Result<()>;
    fn call(&self, ctx: &Context, data: &str) -> Result<String>;
}

/// Shared state handlers may reach: the database pool, the configured API
/// key, and the loaded configuration. Logging is ambient through `tracing`.
pub struct Context {
    settings: Settings,
    db: RwLock<Option<Arc<DbPool>>>,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            db: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api_key(&self) -> &str {
        &self.settings.api_key
    }

    /// The connected pool, or an error when `9:DATABASE` has not run yet.
    pub fn db(&self) -> Result<Arc<DbPool>> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| ExtError::Database("no database connected".to_string()))
    }

    pub fn has_db(&self) -> bool {
        self.db.read().is_some()
    }

    pub fn set_db(&self, pool: Arc<DbPool>) {
        *self.db.write() = Some(pool);
    }

    pub fn clear_db(&self) {
        *self.db.write() = None;
    }
}

/// The closed set of registerable handler kinds. Kinds without a `_V2`
/// suffix are deprecated: they work, but registration logs a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Misc,
    Log,
    DbBasic,
    DbBasicV2,
    DbProcedure,
    DbProcedureV2,
    DbRaw,
    DbRawV2,
    DbRawNoExtraQuotes,
    DbRawNoExtraQuotesV2,
    DbCustomV2,
}

impl ProtocolKind {
    /// Parse the wire token, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        const TABLE: &[(&str, ProtocolKind)] = &[
            ("MISC", ProtocolKind::Misc),
            ("LOG", ProtocolKind::Log),
            ("DB_BASIC", ProtocolKind::DbBasic),
            ("DB_BASIC_V2", ProtocolKind::DbBasicV2),
            ("DB_PROCEDURE", ProtocolKind::DbProcedure),
            ("DB_PROCEDURE_V2", ProtocolKind::DbProcedureV2),
            ("DB_RAW", ProtocolKind::DbRaw),
            ("DB_RAW_V2", ProtocolKind::DbRawV2),
            ("DB_RAW_NO_EXTRA_QUOTES", ProtocolKind::DbRawNoExtraQuotes),
            ("DB_RAW_NO_EXTRA_QUOTES_V2", ProtocolKind::DbRawNoExtraQuotesV2),
            ("DB_CUSTOM_V2", ProtocolKind::DbCustomV2),
        ];
        TABLE
            .iter()
            .find(|(name, _)| token.eq_ignore_ascii_case(name))
            .map(|&(_, kind)| kind)
    }

    /// Whether this is a pre-V2 kind kept for old mission scripts.
    pub fn is_deprecated(&self) -> bool {
        matches!(
            self,
            ProtocolKind::DbBasic
                | ProtocolKind::DbProcedure
                | ProtocolKind::DbRaw
                | ProtocolKind::DbRawNoExtraQuotes
        )
    }

    pub fn wire_token(&self) -> &'static str {
        match self {
            ProtocolKind::Misc => "MISC",
            ProtocolKind::Log => "LOG",
            ProtocolKind::DbBasic => "DB_BASIC",
            ProtocolKind::DbBasicV2 => "DB_BASIC_V2",
            ProtocolKind::DbProcedure => "DB_PROCEDURE",
            ProtocolKind::DbProcedureV2 => "DB_PROCEDURE_V2",
            ProtocolKind::DbRaw => "DB_RAW",
            ProtocolKind::DbRawV2 => "DB_RAW_V2",
            ProtocolKind::DbRawNoExtraQuotes => "DB_RAW_NO_EXTRA_QUOTES",
            ProtocolKind::DbRawNoExtraQuotesV2 => "DB_RAW_NO_EXTRA_QUOTES_V2",
            ProtocolKind::DbCustomV2 => "DB_CUSTOM_V2",
        }
    }

    /// Construct an uninitialized handler of this kind.
    pub fn construct(&self) -> Box<dyn Protocol> {
        match self {
            ProtocolKind::Misc => Box::new(Misc::new()),
            ProtocolKind::Log => Box::new(LogFile::new()),
            ProtocolKind::DbBasic | ProtocolKind::DbBasicV2 => Box::new(DbBasic::new()),
            ProtocolKind::DbProcedure | ProtocolKind::DbProcedureV2 => {
                Box::new(DbProcedure::new())
            }
            ProtocolKind::DbRaw | ProtocolKind::DbRawV2 => Box::new(DbRaw::quoted()),
            ProtocolKind::DbRawNoExtraQuotes | ProtocolKind::DbRawNoExtraQuotesV2 => {
                Box::new(DbRaw::unquoted())
            }
            ProtocolKind::DbCustomV2 => Box::new(DbCustom::new()),
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_token())
    }
}

/// Name-keyed table of live handlers. Re-registering a name replaces the
/// previous binding; a failed registration leaves it untouched.
#[derive(Default)]
pub struct ProtocolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Protocol>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct, initialize and bind a handler.
    pub fn add(
        &self,
        ctx: &Context,
        kind_token: &str,
        name: &str,
        init_data: &str,
    ) -> Result<()> {
        let kind = ProtocolKind::parse(kind_token).ok_or(ExtError::UnknownProtocol)?;
        let mut handler = kind.construct();
        handler.init(ctx, init_data).map_err(|e| {
            debug!(kind = %kind, name, error = %e, "protocol init failed");
            ExtError::ProtocolLoadFailed(e.to_string())
        })?;
        if kind.is_deprecated() {
            warn!(
                "{} is deprecated, update mission code to {}_V2",
                kind.wire_token(),
                kind.wire_token()
            );
        }
        self.handlers.write().insert(name.to_string(), Arc::from(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}
