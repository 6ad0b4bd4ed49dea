//! Stored-procedure protocol.
//!
//! Input is `name:arg1:arg2:…`. The name is restricted to identifier
//! characters; arguments are single-quote-escaped and passed positionally
//! as `CALL name('a1','a2',…)`.

use crate::db::format_rows;
use crate::error::{ExtError, Result};

use super::{Context, Protocol};

#[derive(Debug, Default)]
pub struct DbProcedure;

impl DbProcedure {
    pub fn new() -> Self {
        Self
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compose the CALL statement. Exposed for tests.
fn compose(data: &str) -> Result<String> {
    let (name, args) = match data.split_once(':') {
        Some((name, rest)) => (name, rest.split(':').collect::<Vec<_>>()),
        None => (data, Vec::new()),
    };
    if !valid_name(name) {
        return Err(ExtError::Database(format!(
            "invalid procedure name: {:?}",
            name
        )));
    }
    let quoted: Vec<String> = args
        .iter()
        .map(|a| format!("'{}'", a.replace('\'', "''")))
        .collect();
    Ok(format!("CALL {}({})", name, quoted.join(",")))
}

impl Protocol for DbProcedure {
    fn init(&mut self, ctx: &Context, _init_data: &str) -> Result<()> {
        ctx.db().map(|_| ())
    }

    fn call(&self, ctx: &Context, data: &str) -> Result<String> {
        let statement = compose(data)?;
        let pool = ctx.db()?;
        let mut session = pool.acquire()?;
        let rows = session.query(&statement)?;
        Ok(format_rows(&rows, true))
    }
}
