//! Guarded single-statement protocol.
//!
//! The conservative cousin of the raw protocol for mission scripts that
//! interpolate player-controlled text: only the first `;`-separated
//! statement runs, and input carrying quote characters is rejected
//! outright.

use crate::db::format_rows;
use crate::error::{ExtError, Result};

use super::{Context, Protocol};

#[derive(Debug, Default)]
pub struct DbBasic;

impl DbBasic {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for DbBasic {
    fn init(&mut self, ctx: &Context, _init_data: &str) -> Result<()> {
        ctx.db().map(|_| ())
    }

    fn call(&self, ctx: &Context, data: &str) -> Result<String> {
        if data.contains('\'') || data.contains('"') {
            return Err(ExtError::Database(
                "quote characters are not allowed".to_string(),
            ));
        }
        let statement = data.split(';').next().unwrap_or_default().trim();
        if statement.is_empty() {
            return Err(ExtError::Database("empty statement".to_string()));
        }
        let pool = ctx.db()?;
        let mut session = pool.acquire()?;
        let rows = session.query(statement)?;
        Ok(format_rows(&rows, true))
    }
}
