/*!
 * Catalog and database-management commands
 *
 * `.tables`, `.schema`, `describe` and friends read sqlite_master and the
 * PRAGMA tables; `.open`/`use` and `rehash` queue session actions for the
 * statement runner.
 */

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::{
    ArgType, CommandArgs, CommandContext, CommandError, ResultTuple, SessionAction,
    SpecialCommand, SpecialRegistry, Verbosity,
};

pub fn register_all(registry: &mut SpecialRegistry) {
    registry.register_with_aliases(
        ".tables",
        &["\\dt"],
        SpecialCommand {
            handler: list_tables,
            syntax: ".tables",
            description: "List tables.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        ".views",
        SpecialCommand {
            handler: list_views,
            syntax: ".views",
            description: "List views.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        ".databases",
        &["\\l"],
        SpecialCommand {
            handler: list_databases,
            syntax: ".databases",
            description: "List attached databases.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        ".indexes",
        &["\\di"],
        SpecialCommand {
            handler: list_indexes,
            syntax: ".indexes [tablename]",
            description: "List indexes.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        ".schema",
        SpecialCommand {
            handler: show_schema,
            syntax: ".schema [tablename]",
            description: "Show the CREATE statements.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        "describe",
        &["desc", "\\d"],
        SpecialCommand {
            handler: describe,
            syntax: "\\d [tablename]",
            description: "Describe a table.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: false,
        },
    );
    registry.register_with_aliases(
        ".status",
        &["\\s"],
        SpecialCommand {
            handler: status,
            syntax: ".status",
            description: "Show the current session status.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        ".import",
        SpecialCommand {
            handler: import_csv,
            syntax: ".import filename table",
            description: "Import data from a CSV file into a table.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        ".load",
        SpecialCommand {
            handler: load_extension,
            syntax: ".load path",
            description: "Load an extension library.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        ".open",
        &["use", "\\u"],
        SpecialCommand {
            handler: open_database,
            syntax: ".open database",
            description: "Open and connect to a database file.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: false,
        },
    );
    registry.register_with_aliases(
        "rehash",
        &["\\#"],
        SpecialCommand {
            handler: rehash,
            syntax: "rehash",
            description: "Refresh the auto-completion metadata.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: false,
        },
    );
    registry.register_with_aliases(
        ".read",
        &["\\.", "source"],
        SpecialCommand {
            handler: read_script,
            syntax: ".read filename",
            description: "Execute commands from a file.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
}

/// Collect the first column of every result row.
fn select_names(conn: &Connection, sql: &str) -> Result<Vec<Vec<String>>, CommandError> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().map(|n| vec![n]).collect())
}

fn list_tables(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let rows = select_names(
        conn,
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'sqlean_%'
         ORDER BY name",
    )?;
    Ok(vec![ResultTuple::table(vec!["name".to_string()], rows, None)])
}

fn list_views(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let rows = select_names(
        conn,
        "SELECT name FROM sqlite_master
         WHERE type = 'view' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    Ok(vec![ResultTuple::table(vec!["name".to_string()], rows, None)])
}

fn list_databases(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(vec![
                row.get::<_, i64>(0)?.to_string(),
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vec![ResultTuple::table(
        vec!["seq".to_string(), "name".to_string(), "file".to_string()],
        rows,
        None,
    )])
}

fn list_indexes(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let table = args.text().trim();
    let rows = if table.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT name, tbl_name FROM sqlite_master
             WHERE type = 'index' AND name NOT LIKE 'sqlite_%'
             ORDER BY tbl_name, name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(vec![row.get::<_, String>(0)?, row.get::<_, String>(1)?])
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    } else {
        let mut stmt = conn.prepare(
            "SELECT name, tbl_name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1
             ORDER BY name",
        )?;
        let rows = stmt
            .query_map([table], |row| {
                Ok(vec![row.get::<_, String>(0)?, row.get::<_, String>(1)?])
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    Ok(vec![ResultTuple::table(
        vec!["name".to_string(), "table".to_string()],
        rows,
        None,
    )])
}

fn show_schema(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let table = args.text().trim();
    let sql_rows: Vec<Vec<String>> = if table.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
             ORDER BY tbl_name, type DESC, name",
        )?;
        let sqls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        sqls.into_iter().map(|sql| vec![sql]).collect()
    } else {
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master
             WHERE sql IS NOT NULL AND (name = ?1 OR tbl_name = ?1)
             ORDER BY type DESC, name",
        )?;
        let sqls = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        sqls.into_iter().map(|sql| vec![sql]).collect()
    };
    if sql_rows.is_empty() && !table.is_empty() {
        return Err(CommandError::Argument(format!(
            "Table {} was not found",
            table
        )));
    }
    Ok(vec![ResultTuple::table(vec!["sql".to_string()], sql_rows, None)])
}

fn describe(
    registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let table = args.text().trim().to_string();
    if table.is_empty() {
        return list_tables(registry, ctx, CommandArgs::None, verbosity);
    }

    let conn = ctx.require_conn()?;
    let mut stmt = conn.prepare(&format!(
        "PRAGMA table_info({})",
        quote_identifier(&table)
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(vec![
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?.to_string(),
                row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                row.get::<_, i64>(5)?.to_string(),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Err(CommandError::Argument(format!(
            "Table {} was not found",
            table
        )));
    }
    Ok(vec![ResultTuple::table(
        vec![
            "name".to_string(),
            "type".to_string(),
            "notnull".to_string(),
            "default".to_string(),
            "pk".to_string(),
        ],
        rows,
        None,
    )])
}

fn status(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let database = match ctx.conn {
        Some(conn) => match conn.path() {
            Some("") | None => ":memory:".to_string(),
            Some(path) => path.to_string(),
        },
        None => "(not connected)".to_string(),
    };
    let rows = vec![
        vec!["Current database".to_string(), database],
        vec![
            "Table format".to_string(),
            ctx.session.table_format.clone(),
        ],
        vec![
            "Output to".to_string(),
            ctx.session.sinks.describe(),
        ],
        vec![
            "Pager".to_string(),
            ctx.session.pager.clone().unwrap_or_else(|| "off".to_string()),
        ],
        vec![
            "SQLite version".to_string(),
            rusqlite::version().to_string(),
        ],
    ];
    Ok(vec![ResultTuple::table(Vec::new(), rows, None)])
}

fn import_csv(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let mut parts = args.text().split_whitespace();
    let (Some(filename), Some(table)) = (parts.next(), parts.next()) else {
        return Err(CommandError::Argument(
            "Usage: .import filename table".to_string(),
        ));
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_path(filename)
        .map_err(|e| CommandError::Argument(format!("Cannot read {}: {}", filename, e)))?;

    let tx = conn.unchecked_transaction()?;
    let mut imported = 0u64;
    {
        let mut insert = None;
        for record in reader.records() {
            let record =
                record.map_err(|e| CommandError::Argument(format!("CSV error: {}", e)))?;
            if insert.is_none() {
                let placeholders = vec!["?"; record.len()].join(", ");
                insert = Some(tx.prepare(&format!(
                    "INSERT INTO {} VALUES ({})",
                    quote_identifier(table),
                    placeholders
                ))?);
            }
            if let Some(stmt) = insert.as_mut() {
                stmt.execute(rusqlite::params_from_iter(record.iter()))?;
                imported += 1;
            }
        }
    }
    tx.commit()?;

    Ok(vec![ResultTuple::status(format!(
        "Imported {} rows into {}",
        imported, table
    ))])
}

fn load_extension(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let conn = ctx.require_conn()?;
    let path = args.text().trim();
    if path.is_empty() {
        return Err(CommandError::Argument("Usage: .load path".to_string()));
    }
    unsafe {
        let _guard = rusqlite::LoadExtensionGuard::new(conn)?;
        conn.load_extension(Path::new(path), None)?;
    }
    Ok(vec![ResultTuple::status(format!("Loaded {}", path))])
}

fn open_database(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let database = args.text().trim();
    if database.is_empty() {
        return Err(CommandError::Argument(
            "Usage: .open database".to_string(),
        ));
    }
    ctx.session
        .queue(SessionAction::ChangeDatabase(database.to_string()));
    Ok(Vec::new())
}

fn rehash(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    ctx.session
        .queue(SessionAction::RefreshCompletions { reset: false });
    Ok(Vec::new())
}

fn read_script(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let path = args.text().trim();
    if path.is_empty() {
        return Err(CommandError::Argument(
            "Usage: .read filename".to_string(),
        ));
    }
    if !Path::new(path).is_file() {
        return Err(CommandError::Argument(format!(
            "File {} does not exist",
            path
        )));
    }
    ctx.session
        .queue(SessionAction::ExecuteScript(PathBuf::from(path)));
    Ok(Vec::new())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::super::{default_registry, SessionState};
    use super::*;
    use crate::special::favorites::FavoriteStore;
    use std::io::Write;

    fn setup() -> (Connection, SessionState) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
             CREATE TABLE orders (id INTEGER, user_id INTEGER);
             CREATE INDEX idx_orders_user ON orders (user_id);
             CREATE VIEW active_users AS SELECT * FROM users;",
        )
        .unwrap();
        (conn, SessionState::new(FavoriteStore::in_memory()))
    }

    fn run(conn: &Connection, session: &mut SessionState, text: &str) -> Vec<ResultTuple> {
        let registry = default_registry();
        let mut ctx = CommandContext {
            conn: Some(conn),
            session,
        };
        registry.execute(&mut ctx, text).unwrap()
    }

    #[test]
    fn tables_lists_only_tables() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, ".tables");
        assert_eq!(
            results[0].rows,
            vec![vec!["orders".to_string()], vec!["users".to_string()]]
        );
    }

    #[test]
    fn views_lists_only_views() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, ".views");
        assert_eq!(results[0].rows, vec![vec!["active_users".to_string()]]);
    }

    #[test]
    fn describe_shows_column_details() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, "describe users");
        let rows = &results[0].rows;
        assert_eq!(rows[0][0], "id");
        assert_eq!(rows[1][0], "email");
        assert_eq!(rows[1][2], "1");
    }

    #[test]
    fn describe_without_argument_lists_tables() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, "\\d");
        assert!(results[0].rows.contains(&vec!["users".to_string()]));
    }

    #[test]
    fn describe_unknown_table_errors() {
        let (conn, mut session) = setup();
        let registry = default_registry();
        let mut ctx = CommandContext {
            conn: Some(&conn),
            session: &mut session,
        };
        let err = registry.execute(&mut ctx, "describe nosuch").unwrap_err();
        assert!(matches!(err, CommandError::Argument(_)));
    }

    #[test]
    fn indexes_can_filter_by_table() {
        let (conn, mut session) = setup();
        let all = run(&conn, &mut session, ".indexes");
        assert!(all[0].rows.iter().any(|r| r[0] == "idx_orders_user"));

        let filtered = run(&conn, &mut session, ".indexes users");
        assert!(filtered[0].rows.is_empty());
    }

    #[test]
    fn schema_shows_create_statements() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, ".schema users");
        assert!(results[0].rows[0][0].starts_with("CREATE TABLE users"));
    }

    #[test]
    fn schema_without_argument_dumps_everything() {
        let (conn, mut session) = setup();
        let results = run(&conn, &mut session, ".schema");
        let rows = &results[0].rows;
        assert!(rows.iter().any(|r| r[0].starts_with("CREATE TABLE users")));
        assert!(rows.iter().any(|r| r[0].starts_with("CREATE VIEW active_users")));
        assert!(rows.iter().any(|r| r[0].starts_with("CREATE INDEX idx_orders_user")));
    }

    #[test]
    fn open_queues_database_change() {
        let (conn, mut session) = setup();
        run(&conn, &mut session, ".open other.db");
        assert_eq!(
            session.actions,
            vec![SessionAction::ChangeDatabase("other.db".to_string())]
        );
    }

    #[test]
    fn use_alias_routes_to_open() {
        let (conn, mut session) = setup();
        run(&conn, &mut session, "use other.db");
        assert_eq!(
            session.actions,
            vec![SessionAction::ChangeDatabase("other.db".to_string())]
        );
    }

    #[test]
    fn rehash_queues_refresh() {
        let (conn, mut session) = setup();
        run(&conn, &mut session, "rehash");
        assert_eq!(
            session.actions,
            vec![SessionAction::RefreshCompletions { reset: false }]
        );
    }

    #[test]
    fn import_loads_csv_rows() {
        let (conn, mut session) = setup();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,a@example.com").unwrap();
        writeln!(file, "2,b@example.com").unwrap();

        let text = format!(".import {} users", file.path().display());
        let results = run(&conn, &mut session, &text);
        assert_eq!(
            results[0].status.as_deref(),
            Some("Imported 2 rows into users")
        );

        let count: i64 = conn
            .query_row("SELECT count(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn commands_without_connection_error() {
        let registry = default_registry();
        let mut session = SessionState::new(FavoriteStore::in_memory());
        let mut ctx = CommandContext {
            conn: None,
            session: &mut session,
        };
        let err = registry.execute(&mut ctx, ".tables").unwrap_err();
        assert!(matches!(err, CommandError::Argument(_)));
    }
}
