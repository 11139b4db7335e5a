/*!
Database access seam.

The engines talk to the database through [`DatabaseClient`] so the export,
import and restore logic stays independent of the wire client and fully
testable offline. [`MysqlClient`] is the production adapter;
[`MemoryDatabase`] is a lightweight fake understanding exactly the statement
shapes the engines emit.
*/

use std::collections::BTreeMap;

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Value};

use crate::config::DbCredentials;
use crate::{Result, VaultError};

/// Column names plus stringly-typed rows of one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryOutput {
    /// The first column of every row; the shape of `SHOW TABLES`.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned().flatten())
            .collect()
    }
}

/// Synchronous database client used by the export/import engines and the
/// restore orchestrator.
pub trait DatabaseClient {
    /// Run a statement that produces no result set.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a statement and collect its result set.
    fn query(&mut self, sql: &str) -> Result<QueryOutput>;
}

/// Quote a SQL identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Render a value as a SQL literal: `NULL`, or a single-quoted string with
/// backslash and quote characters escaped.
pub fn quote_literal(value: Option<&str>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(v) => format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")),
    }
}

/// MySQL adapter over the `mysql` client library.
pub struct MysqlClient {
    conn: Conn,
}

impl MysqlClient {
    /// Open a connection from the given credentials.
    pub fn connect(creds: &DbCredentials) -> Result<Self> {
        let mut opts = OptsBuilder::new()
            .ip_or_hostname(Some(creds.host.clone()))
            .user(Some(creds.user.clone()))
            .pass(Some(creds.password.clone()))
            .db_name(Some(creds.name.clone()));
        if let Some(port) = creds.port {
            opts = opts.tcp_port(port);
        }
        if let Some(socket) = &creds.socket {
            opts = opts.socket(Some(socket.clone()));
        }
        let conn = Conn::new(opts)?;
        Ok(Self { conn })
    }
}

impl DatabaseClient for MysqlClient {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.query_drop(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let mut result = self.conn.query_iter(sql)?;
        let columns = result
            .columns()
            .as_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        let mut rows = Vec::new();
        for row in result.by_ref() {
            let row = row?;
            rows.push(row.unwrap().into_iter().map(value_to_string).collect());
        }
        Ok(QueryOutput { columns, rows })
    }
}

/// Render a wire value as an optional string, the engine's universal cell
/// representation.
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Date(y, mo, d, h, mi, s, 0) => {
            Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        Value::Date(y, mo, d, h, mi, s, us) => Some(format!(
            "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
        )),
        Value::Time(neg, d, h, m, s, us) => {
            let sign = if neg { "-" } else { "" };
            let hours = u32::from(d) * 24 + u32::from(h);
            if us == 0 {
                Some(format!("{sign}{hours:02}:{m:02}:{s:02}"))
            } else {
                Some(format!("{sign}{hours:02}:{m:02}:{s:02}.{us:06}"))
            }
        }
    }
}

/// One table held by [`MemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub create_ddl: String,
}

/// In-memory stand-in for a database connection.
///
/// Understands the statement shapes the engines emit — `SHOW TABLES [LIKE]`,
/// `SHOW CREATE TABLE`, paged `SELECT *`, `CREATE TABLE`, `DROP TABLE IF
/// EXISTS` — and records every executed statement for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    pub tables: BTreeMap<String, MemoryTable>,
    pub executed: Vec<String>,
    /// Statements containing this substring fail with an error
    pub fail_on: Option<String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with columns and rows; a plausible DDL statement is
    /// synthesized for `SHOW CREATE TABLE`.
    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        let ddl = format!(
            "CREATE TABLE {} (\n  {}\n)",
            quote_identifier(name),
            columns
                .iter()
                .map(|c| format!("{} text", quote_identifier(c)))
                .collect::<Vec<_>>()
                .join(",\n  ")
        );
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                create_ddl: ddl,
            },
        );
        self
    }

    /// Make any statement containing the given fragment fail.
    pub fn failing_on<S: Into<String>>(mut self, fragment: S) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    fn like_prefix(pattern: &str) -> String {
        pattern
            .trim_matches('\'')
            .trim_end_matches('%')
            .replace("\\_", "_")
    }
}

impl DatabaseClient for MemoryDatabase {
    fn execute(&mut self, sql: &str) -> Result<()> {
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                self.executed.push(sql.to_string());
                return Err(VaultError::validation(format!(
                    "memory database refusing statement containing {fragment:?}"
                )));
            }
        }
        self.executed.push(sql.to_string());

        let upper = sql.trim_start().to_ascii_uppercase();
        if upper.starts_with("CREATE TABLE") {
            if let Some(name) = parse_backticked_name(sql) {
                self.tables.entry(name).or_default();
            }
        } else if upper.starts_with("DROP TABLE") {
            if let Some(name) = parse_backticked_name(sql) {
                self.tables.remove(&name);
            }
        }
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let trimmed = sql.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.starts_with("SHOW TABLES") {
            let names: Vec<String> = if let Some(idx) = upper.find("LIKE") {
                let prefix = Self::like_prefix(trimmed[idx + 4..].trim());
                self.tables
                    .keys()
                    .filter(|t| t.starts_with(&prefix))
                    .cloned()
                    .collect()
            } else {
                self.tables.keys().cloned().collect()
            };
            return Ok(QueryOutput {
                columns: vec!["Tables_in_db".to_string()],
                rows: names.into_iter().map(|n| vec![Some(n)]).collect(),
            });
        }

        if upper.starts_with("SHOW CREATE TABLE") {
            let name = parse_backticked_name(trimmed)
                .ok_or_else(|| VaultError::validation("missing table name"))?;
            let table = self
                .tables
                .get(&name)
                .ok_or_else(|| VaultError::validation(format!("no such table {name}")))?;
            return Ok(QueryOutput {
                columns: vec!["Table".to_string(), "Create Table".to_string()],
                rows: vec![vec![Some(name), Some(table.create_ddl.clone())]],
            });
        }

        if upper.starts_with("SELECT") {
            let name = parse_backticked_name(trimmed)
                .ok_or_else(|| VaultError::validation("missing table name"))?;
            let table = self
                .tables
                .get(&name)
                .ok_or_else(|| VaultError::validation(format!("no such table {name}")))?;
            let limit = parse_clause_number(&upper, trimmed, "LIMIT").unwrap_or(table.rows.len());
            let offset = parse_clause_number(&upper, trimmed, "OFFSET").unwrap_or(0);
            let rows = table.rows.iter().skip(offset).take(limit).cloned().collect();
            return Ok(QueryOutput {
                columns: table.columns.clone(),
                rows,
            });
        }

        Err(VaultError::validation(format!(
            "memory database cannot answer query: {trimmed}"
        )))
    }
}

/// Extract the first backtick-quoted identifier from a statement.
fn parse_backticked_name(sql: &str) -> Option<String> {
    let start = sql.find('`')? + 1;
    let end = start + sql[start..].find('`')?;
    Some(sql[start..end].to_string())
}

fn parse_clause_number(upper: &str, original: &str, clause: &str) -> Option<usize> {
    let idx = upper.find(clause)? + clause.len();
    original[idx..]
        .split_whitespace()
        .next()?
        .trim_end_matches(';')
        .parse()
        .ok()
}
