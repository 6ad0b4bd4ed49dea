//! Raw SQL protocol.
//!
//! Passes the request straight through to the database and formats the
//! rows. Two flavours differ only in whether text cells are double-quoted
//! in the output.

use crate::db::format_rows;
use crate::error::Result;

use super::{Context, Protocol};

#[derive(Debug)]
pub struct DbRaw {
    quote_text: bool,
}

impl DbRaw {
    /// Text cells wrapped in double quotes.
    pub fn quoted() -> Self {
        Self { quote_text: true }
    }

    /// Text cells emitted bare.
    pub fn unquoted() -> Self {
        Self { quote_text: false }
    }
}

impl Protocol for DbRaw {
    fn init(&mut self, ctx: &Context, _init_data: &str) -> Result<()> {
        // a pool must be connected before SQL handlers come up
        ctx.db().map(|_| ())
    }

    fn call(&self, ctx: &Context, data: &str) -> Result<String> {
        let pool = ctx.db()?;
        let mut session = pool.acquire()?;
        let rows = session.query(data)?;
        Ok(format_rows(&rows, self.quote_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{DbKind, DbPool, DbSettings};
    use std::time::Duration;

    fn ctx_with_db(dir: &std::path::Path) -> Context {
        let ctx = Context::new(Settings::parse_str("[Main]\n", dir).unwrap());
        let pool = DbPool::connect(&DbSettings {
            kind: DbKind::Sqlite,
            connection_str: dir.join("raw.db").to_string_lossy().into_owned(),
            min_sessions: 1,
            max_sessions: 2,
            idle: Duration::from_secs(600),
        })
        .unwrap();
        ctx.set_db(pool);
        ctx
    }

    #[test]
    fn test_init_requires_database() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(Settings::parse_str("[Main]\n", dir.path()).unwrap());
        assert!(DbRaw::quoted().init(&ctx, "").is_err());
    }

    #[test]
    fn test_query_and_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_db(dir.path());
        let quoted = DbRaw::quoted();
        let bare = DbRaw::unquoted();

        quoted
            .call(&ctx, "CREATE TABLE players (id INTEGER, name TEXT)")
            .unwrap();
        quoted
            .call(&ctx, "INSERT INTO players VALUES (1,'dea'), (2,'fox')")
            .unwrap();

        assert_eq!(
            quoted
                .call(&ctx, "SELECT id, name FROM players ORDER BY id")
                .unwrap(),
            "[[1,\"dea\"],[2,\"fox\"]]"
        );
        assert_eq!(
            bare.call(&ctx, "SELECT id, name FROM players ORDER BY id")
                .unwrap(),
            "[[1,dea],[2,fox]]"
        );
    }

    #[test]
    fn test_sql_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_db(dir.path());
        assert!(DbRaw::quoted().call(&ctx, "SELECT nope FROM nowhere").is_err());
    }
}
