//! A single database session, one enum over the supported drivers.
//!
//! Sessions are owned and mutable; sharing happens at the pool level. Every
//! query funnels into `Vec<Vec<SqlValue>>` so protocol handlers format rows
//! without caring which driver produced them.

use std::time::Duration;

#[cfg(feature = "odbc")]
use once_cell::sync::Lazy;

use mysql::prelude::Queryable;

use crate::error::{ExtError, Result};

use super::DbKind;

#[cfg(feature = "odbc")]
static ODBC_ENV: Lazy<odbc_api::Environment> =
    Lazy::new(|| odbc_api::Environment::new().expect("ODBC environment"));

/// One cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    /// Numeric cell, rendered bare
    Number(String),
    /// Textual cell, quoted or not depending on the protocol kind
    Text(String),
}

impl SqlValue {
    /// Render the cell for the game-script array output.
    pub fn render(&self, quote_text: bool) -> String {
        match self {
            SqlValue::Null => {
                if quote_text {
                    "\"\"".to_string()
                } else {
                    String::new()
                }
            }
            SqlValue::Number(n) => n.clone(),
            SqlValue::Text(t) => {
                if quote_text {
                    format!("\"{}\"", t)
                } else {
                    t.clone()
                }
            }
        }
    }
}

/// Format rows as a game-script array literal: `[[a,b],[c,d]]`.
pub fn format_rows(rows: &[Vec<SqlValue>], quote_text: bool) -> String {
    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|v| v.render(quote_text)).collect();
            format!("[{}]", cells.join(","))
        })
        .collect();
    format!("[{}]", rendered.join(","))
}

/// An open session of one of the supported kinds.
pub enum DbSession {
    MySql(Box<mysql::Conn>),
    Sqlite(rusqlite::Connection),
    #[cfg(feature = "odbc")]
    Odbc(odbc_api::Connection<'static>),
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbSession::MySql(_) => f.write_str("DbSession::MySql"),
            DbSession::Sqlite(_) => f.write_str("DbSession::Sqlite"),
            #[cfg(feature = "odbc")]
            DbSession::Odbc(_) => f.write_str("DbSession::Odbc"),
        }
    }
}

impl DbSession {
    /// Open a session of `kind` from the canonical connection string.
    pub fn connect(kind: DbKind, connection_str: &str) -> Result<Self> {
        match kind {
            DbKind::Sqlite => Ok(DbSession::Sqlite(rusqlite::Connection::open(
                connection_str,
            )?)),
            DbKind::MySql => {
                let opts = mysql_opts(connection_str)?;
                Ok(DbSession::MySql(Box::new(mysql::Conn::new(opts)?)))
            }
            #[cfg(feature = "odbc")]
            DbKind::Odbc => {
                let conn = ODBC_ENV.connect_with_connection_string(
                    connection_str,
                    odbc_api::ConnectionOptions::default(),
                )?;
                Ok(DbSession::Odbc(conn))
            }
            #[cfg(not(feature = "odbc"))]
            DbKind::Odbc => Err(ExtError::UnknownDatabaseType(
                "ODBC support not compiled in".to_string(),
            )),
        }
    }

    /// Best-effort per-session tuning; drivers without the knob are left
    /// as-is.
    pub fn customize(&mut self) {
        match self {
            DbSession::Sqlite(conn) => {
                // lock-retry budget analogous to the server drivers'
                // reconnect attempts
                let _ = conn.busy_timeout(Duration::from_millis(100));
            }
            DbSession::MySql(_) => {}
            #[cfg(feature = "odbc")]
            DbSession::Odbc(_) => {}
        }
    }

    /// Cheap liveness probe.
    pub fn ping(&mut self) -> bool {
        match self {
            DbSession::Sqlite(conn) => conn.execute_batch("SELECT 1").is_ok(),
            DbSession::MySql(conn) => conn.query_drop("SELECT 1").is_ok(),
            #[cfg(feature = "odbc")]
            DbSession::Odbc(conn) => conn.execute("SELECT 1", ()).is_ok(),
        }
    }

    /// Run one SQL statement, returning all rows. Statements without a
    /// result set return an empty row list.
    pub fn query(&mut self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        match self {
            DbSession::Sqlite(conn) => {
                let mut stmt = conn.prepare(sql)?;
                let columns = stmt.column_count();
                let mut out = Vec::new();
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let mut cells = Vec::with_capacity(columns);
                    for i in 0..columns {
                        cells.push(sqlite_value(row.get_ref(i)?));
                    }
                    out.push(cells);
                }
                Ok(out)
            }
            DbSession::MySql(conn) => {
                let result = conn.query_iter(sql)?;
                let mut out = Vec::new();
                for row in result {
                    let row = row?;
                    let mut cells = Vec::with_capacity(row.len());
                    for i in 0..row.len() {
                        let value = row.as_ref(i).cloned().unwrap_or(mysql::Value::NULL);
                        cells.push(mysql_value(value));
                    }
                    out.push(cells);
                }
                Ok(out)
            }
            #[cfg(feature = "odbc")]
            DbSession::Odbc(conn) => {
                let mut out = Vec::new();
                if let Some(mut cursor) = conn.execute(sql, ())? {
                    use odbc_api::Cursor;
                    let columns = cursor.num_result_cols()?.max(0) as usize;
                    let mut buf = Vec::new();
                    while let Some(mut row) = cursor.next_row()? {
                        let mut cells = Vec::with_capacity(columns);
                        for col in 1..=columns {
                            buf.clear();
                            let present = row.get_text(col as u16, &mut buf)?;
                            if present {
                                cells.push(SqlValue::Text(
                                    String::from_utf8_lossy(&buf).into_owned(),
                                ));
                            } else {
                                cells.push(SqlValue::Null);
                            }
                        }
                        out.push(cells);
                    }
                }
                Ok(out)
            }
        }
    }
}

fn sqlite_value(value: rusqlite::types::ValueRef<'_>) -> SqlValue {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Number(i.to_string()),
        ValueRef::Real(f) => SqlValue::Number(f.to_string()),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

fn mysql_value(value: mysql::Value) -> SqlValue {
    use mysql::Value;
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        Value::Int(i) => SqlValue::Number(i.to_string()),
        Value::UInt(u) => SqlValue::Number(u.to_string()),
        Value::Float(f) => SqlValue::Number(f.to_string()),
        Value::Double(d) => SqlValue::Number(d.to_string()),
        Value::Date(y, m, d, h, mi, s, _) => SqlValue::Text(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            y, m, d, h, mi, s
        )),
        Value::Time(neg, days, h, mi, s, _) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}",
            if neg { "-" } else { "" },
            u32::from(days) * 24 + u32::from(h),
            mi,
            s
        )),
    }
}

/// Parse the canonical `key=value;key=value` connection string into driver
/// options.
fn mysql_opts(connection_str: &str) -> Result<mysql::Opts> {
    let mut builder = mysql::OptsBuilder::new();
    for pair in connection_str.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "host" => builder = builder.ip_or_hostname(Some(value.to_string())),
            "port" => {
                let port: u16 = value.parse().map_err(|_| {
                    ExtError::Database(format!("invalid port: {}", value))
                })?;
                builder = builder.tcp_port(port);
            }
            "user" => builder = builder.user(Some(value.to_string())),
            "password" => builder = builder.pass(Some(value.to_string())),
            "db" => builder = builder.db_name(Some(value.to_string())),
            "compress" if value.eq_ignore_ascii_case("true") => {
                builder = builder.compress(Some(mysql::Compression::default()));
            }
            // auto-reconnect and anything unrecognised: the driver manages
            // reconnects itself
            _ => {}
        }
    }
    Ok(mysql::Opts::from(builder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_quoting() {
        assert_eq!(SqlValue::Number("42".into()).render(true), "42");
        assert_eq!(SqlValue::Text("abc".into()).render(true), "\"abc\"");
        assert_eq!(SqlValue::Text("abc".into()).render(false), "abc");
        assert_eq!(SqlValue::Null.render(true), "\"\"");
        assert_eq!(SqlValue::Null.render(false), "");
    }

    #[test]
    fn test_format_rows() {
        let rows = vec![
            vec![SqlValue::Number("1".into()), SqlValue::Text("alpha".into())],
            vec![SqlValue::Number("2".into()), SqlValue::Null],
        ];
        assert_eq!(format_rows(&rows, true), "[[1,\"alpha\"],[2,\"\"]]");
        assert_eq!(format_rows(&rows, false), "[[1,alpha],[2,]]");
        assert_eq!(format_rows(&[], true), "[]");
    }

    #[test]
    fn test_sqlite_roundtrip() {
        let mut session = DbSession::Sqlite(
            rusqlite::Connection::open_in_memory().unwrap(),
        );
        session.customize();
        assert!(session.ping());
        session
            .query("CREATE TABLE t (id INTEGER, name TEXT, score REAL)")
            .unwrap();
        session
            .query("INSERT INTO t VALUES (1, 'alpha', 2.5), (2, NULL, 4.0)")
            .unwrap();
        let rows = session.query("SELECT id, name FROM t ORDER BY id").unwrap();
        assert_eq!(
            rows,
            vec![
                vec![SqlValue::Number("1".into()), SqlValue::Text("alpha".into())],
                vec![SqlValue::Number("2".into()), SqlValue::Null],
            ]
        );
    }

    #[test]
    fn test_sqlite_error_propagates() {
        let mut session = DbSession::Sqlite(
            rusqlite::Connection::open_in_memory().unwrap(),
        );
        assert!(session.query("SELECT * FROM missing_table").is_err());
    }

    #[test]
    fn test_mysql_opts_parse() {
        // exercises the key/value walk; no server connection involved
        let opts = mysql_opts(
            "host=db.example;port=3307;user=arma;password=pw;db=altis;auto-reconnect=true",
        )
        .unwrap();
        assert_eq!(opts.get_ip_or_hostname(), "db.example");
        assert_eq!(opts.get_tcp_port(), 3307);
        assert_eq!(opts.get_user(), Some("arma".into()));
        assert_eq!(opts.get_db_name(), Some("altis".into()));
    }

    #[test]
    fn test_mysql_opts_bad_port() {
        assert!(mysql_opts("host=h;port=notaport").is_err());
    }
}
