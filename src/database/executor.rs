/*!
 * Statement runner over a SQLite connection
 *
 * Splits input into statements, routes each through the special-command
 * registry first, and falls back to raw SQL on `CommandError::NotFound`.
 * Also hosts the catalog queries the completion refresher feeds on.
 */

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;

use crate::special::{
    parse_special_command, CommandContext, CommandError, ResultTuple, SessionState,
    SpecialRegistry,
};

/// Commands usable before a database is opened.
const NOT_CONNECTED_ALLOWED: &[&str] = &[
    ".open", "use", "\\u", "\\?", "?", "help", "\\q", "exit", "quit",
];

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Not connected to a database. Use .open to connect.")]
    NotConnected,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// One result set plus its rendering orientation.
#[derive(Debug)]
pub struct StatementResult {
    pub result: ResultTuple,
    pub vertical: bool,
}

/// Everything a run produced. Statements before a failing one have
/// already executed, so their results are kept alongside the error.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<StatementResult>,
    pub error: Option<ExecuteError>,
}

impl RunOutcome {
    fn ok(results: Vec<StatementResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    fn fail(results: Vec<StatementResult>, error: ExecuteError) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }
}

pub struct SqlExecutor {
    conn: Option<Connection>,
    path: Option<String>,
}

impl SqlExecutor {
    pub fn new(path: Option<&str>) -> Result<Self, rusqlite::Error> {
        let mut executor = Self {
            conn: None,
            path: None,
        };
        if let Some(path) = path {
            executor.connect(path)?;
        }
        Ok(executor)
    }

    pub fn connect(&mut self, path: &str) -> Result<(), rusqlite::Error> {
        let conn = Connection::open(path)?;
        self.conn = Some(conn);
        self.path = Some(path.to_string());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn conn(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// In-memory databases exist only on this connection, so a background
    /// refresh cannot see them.
    pub fn is_memory(&self) -> bool {
        matches!(self.path.as_deref(), Some(":memory:") | Some(""))
    }

    /// Display name for the prompt.
    pub fn dbname(&self) -> String {
        match self.path.as_deref() {
            Some(":memory:") | Some("") => ":memory:".to_string(),
            Some(path) => std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string()),
            None => "(none)".to_string(),
        }
    }

    /// Run one line of input: special commands first, raw SQL on a miss.
    /// A failing statement stops the run but keeps what came before it.
    pub fn run(
        &mut self,
        registry: &SpecialRegistry,
        session: &mut SessionState,
        input: &str,
    ) -> RunOutcome {
        let input = input.trim();
        if input.is_empty() {
            return RunOutcome::ok(Vec::new());
        }

        if self.conn.is_none() {
            let (key, _, _) = parse_special_command(input);
            let lowered = key.to_lowercase();
            if !NOT_CONNECTED_ALLOWED.contains(&lowered.as_str()) {
                return RunOutcome::fail(Vec::new(), ExecuteError::NotConnected);
            }
        }

        // A trailing \G flips the final result to vertical rendering; strip
        // it before tokenizing, the backslash is not SQL.
        let (body, vertical_last) = match input.strip_suffix("\\G") {
            Some(rest) => (rest.trim_end(), true),
            None => (input, false),
        };

        // \fs saves its remainder verbatim, semicolons included.
        let statements = if body.starts_with("\\fs") {
            vec![body.to_string()]
        } else {
            split_statements(body)
        };

        let count = statements.len();
        let mut outputs = Vec::new();
        for (i, statement) in statements.iter().enumerate() {
            let vertical = vertical_last && i + 1 == count;
            let sql = statement.trim_end_matches(';').trim();
            if sql.is_empty() {
                continue;
            }

            let mut ctx = CommandContext {
                conn: self.conn.as_ref(),
                session: &mut *session,
            };
            match registry.execute(&mut ctx, sql) {
                Ok(results) => {
                    outputs.extend(results.into_iter().map(|result| StatementResult {
                        result,
                        vertical,
                    }));
                }
                Err(CommandError::NotFound) => {
                    let Some(conn) = self.conn.as_ref() else {
                        return RunOutcome::fail(outputs, ExecuteError::NotConnected);
                    };
                    match run_query(conn, sql) {
                        Ok(result) => outputs.push(StatementResult { result, vertical }),
                        Err(e) => return RunOutcome::fail(outputs, e.into()),
                    }
                }
                Err(e) => return RunOutcome::fail(outputs, ExecuteError::Command(e)),
            }
        }
        RunOutcome::ok(outputs)
    }
}

/// Execute one SQL statement and collect its result set.
pub fn run_query(conn: &Connection, sql: &str) -> Result<ResultTuple, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok(ResultTuple::status(format!(
            "Query OK, {} row{} affected",
            affected,
            if affected == 1 { "" } else { "s" }
        )));
    }

    let headers: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let column_count = headers.len();

    let mut collected = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(format_value(row.get_ref(i)?));
        }
        collected.push(values);
    }

    let status = format!(
        "{} row{} in set",
        collected.len(),
        if collected.len() == 1 { "" } else { "s" }
    );
    Ok(ResultTuple::table(headers, collected, Some(status)))
}

fn format_value(value: ValueRef) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Split input into statements at top-level semicolons, respecting quoted
/// strings and comments. Input the tokenizer cannot handle is returned
/// whole.
pub fn split_statements(text: &str) -> Vec<String> {
    let dialect = SQLiteDialect {};
    let tokens = match Tokenizer::new(&dialect, text).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!("Statement tokenizer fallback: {e}");
            return vec![text.to_string()];
        }
    };

    let mut statements = Vec::new();
    let mut current = String::new();
    for token in tokens {
        match token {
            Token::SemiColon => {
                current.push(';');
                if !current.trim().is_empty() {
                    statements.push(current.trim().to_string());
                }
                current.clear();
            }
            other => current.push_str(&other.to_string()),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}

const RELATION_FILTER: &str = "NOT LIKE 'sqlite_%' AND m.name NOT LIKE 'sqlean_%'";

fn names(conn: &Connection, sql: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

pub fn table_names(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    names(
        conn,
        &format!(
            "SELECT m.name FROM sqlite_master m
             WHERE m.type = 'table' AND m.name {}
             ORDER BY m.name",
            RELATION_FILTER
        ),
    )
}

pub fn view_names(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    names(
        conn,
        &format!(
            "SELECT m.name FROM sqlite_master m
             WHERE m.type = 'view' AND m.name {}
             ORDER BY m.name",
            RELATION_FILTER
        ),
    )
}

fn columns(conn: &Connection, relation_type: &str) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT m.name, p.name FROM sqlite_master m
         JOIN pragma_table_info(m.name) p
         WHERE m.type = ?1 AND m.name {}
         ORDER BY m.name, p.cid",
        RELATION_FILTER
    ))?;
    let rows = stmt.query_map([relation_type], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

pub fn table_columns(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    columns(conn, "table")
}

pub fn view_columns(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    columns(conn, "view")
}

pub fn database_names(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    names(conn, "SELECT name FROM pragma_database_list ORDER BY seq")
}

/// User-defined and extension functions; the built-in vocabulary is
/// static.
pub fn function_names(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    names(
        conn,
        "SELECT DISTINCT name FROM pragma_function_list
         WHERE builtin = 0 ORDER BY name",
    )
}
