//! Config-templated SQL protocol.
//!
//! `init_data` names an INI section in the main config whose keys map call
//! names to SQL templates with `?` placeholders:
//!
//! ```ini
//! [playerSql]
//! getPlayer = SELECT * FROM players WHERE uid = ?
//! setScore  = UPDATE players SET score = ? WHERE uid = ?
//! ```
//!
//! Call input is `callname:arg1:arg2:…`; arguments are single-quote-escaped
//! and substituted positionally. Argument count must match the placeholder
//! count exactly.

use std::collections::HashMap;

use crate::db::format_rows;
use crate::error::{ExtError, Result};

use super::{Context, Protocol};

#[derive(Debug, Default)]
pub struct DbCustom {
    statements: HashMap<String, String>,
}

impl DbCustom {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Substitute `args` into the `?` placeholders of `template`.
fn substitute(template: &str, args: &[&str]) -> Result<String> {
    let parts: Vec<&str> = template.split('?').collect();
    if parts.len() - 1 != args.len() {
        return Err(ExtError::Database(format!(
            "expected {} arguments, got {}",
            parts.len() - 1,
            args.len()
        )));
    }
    let mut out = String::with_capacity(template.len());
    for (i, part) in parts.iter().enumerate() {
        out.push_str(part);
        if let Some(arg) = args.get(i) {
            out.push('\'');
            out.push_str(&arg.replace('\'', "''"));
            out.push('\'');
        }
    }
    Ok(out)
}

impl Protocol for DbCustom {
    fn init(&mut self, ctx: &Context, init_data: &str) -> Result<()> {
        ctx.db()?;
        let section = init_data.trim();
        let entries = ctx
            .settings()
            .section_entries(section)
            .ok_or_else(|| ExtError::NoConfigOption(section.to_string()))?;
        if entries.is_empty() {
            return Err(ExtError::Config(format!(
                "section {} defines no statements",
                section
            )));
        }
        self.statements = entries.into_iter().collect();
        Ok(())
    }

    fn call(&self, ctx: &Context, data: &str) -> Result<String> {
        let (name, args) = match data.split_once(':') {
            Some((name, rest)) => (name, rest.split(':').collect::<Vec<_>>()),
            None => (data, Vec::new()),
        };
        let template = self
            .statements
            .get(name)
            .ok_or_else(|| ExtError::Database(format!("unknown call: {:?}", name)))?;
        let statement = substitute(template, &args)?;
        let pool = ctx.db()?;
        let mut session = pool.acquire()?;
        let rows = session.query(&statement)?;
        Ok(format_rows(&rows, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{DbKind, DbPool, DbSettings};
    use std::time::Duration;

    const CONF: &str = "\
[Main]

[playerSql]
makeTable = CREATE TABLE players (uid TEXT, score INTEGER)
addPlayer = INSERT INTO players VALUES (?, ?)
getScore = SELECT score FROM players WHERE uid = ?
";

    fn ctx_with_db(dir: &std::path::Path) -> Context {
        let ctx = Context::new(Settings::parse_str(CONF, dir).unwrap());
        let pool = DbPool::connect(&DbSettings {
            kind: DbKind::Sqlite,
            connection_str: dir.join("custom.db").to_string_lossy().into_owned(),
            min_sessions: 1,
            max_sessions: 2,
            idle: Duration::from_secs(600),
        })
        .unwrap();
        ctx.set_db(pool);
        ctx
    }

    #[test]
    fn test_substitute() {
        assert_eq!(
            substitute("SELECT * FROM t WHERE a = ? AND b = ?", &["1", "x"]).unwrap(),
            "SELECT * FROM t WHERE a = '1' AND b = 'x'"
        );
        assert_eq!(substitute("SELECT 1", &[]).unwrap(), "SELECT 1");
        assert!(substitute("? ?", &["only-one"]).is_err());
        assert!(substitute("none", &["extra"]).is_err());
    }

    #[test]
    fn test_substitute_escapes() {
        assert_eq!(
            substitute("SELECT ?", &["o'brien"]).unwrap(),
            "SELECT 'o''brien'"
        );
    }

    #[test]
    fn test_init_requires_section() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_db(dir.path());
        let mut p = DbCustom::new();
        assert!(p.init(&ctx, "missingSection").is_err());
        assert!(p.init(&ctx, "playerSql").is_ok());
    }

    #[test]
    fn test_templated_calls() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_db(dir.path());
        let mut p = DbCustom::new();
        p.init(&ctx, "playerSql").unwrap();

        p.call(&ctx, "makeTable").unwrap();
        p.call(&ctx, "addPlayer:765611:42").unwrap();
        assert_eq!(p.call(&ctx, "getScore:765611").unwrap(), "[[42]]");
        assert!(p.call(&ctx, "dropEverything").is_err());
        // wrong arity
        assert!(p.call(&ctx, "getScore").is_err());
    }
}
