/*!
 * Favorite queries
 *
 * Named queries persisted as a flat TOML table in the user config
 * directory. `\f name args` substitutes positional `$1..$N` markers or
 * `?` placeholders (never both) and runs the result; `\fs` saves, `\fd`
 * deletes.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use regex::Regex;

use super::{
    ArgType, CommandArgs, CommandContext, CommandError, ResultTuple, SpecialCommand,
    SpecialRegistry, Verbosity,
};
use crate::database;

/// Persistent name -> query map.
pub struct FavoriteStore {
    path: Option<PathBuf>,
    queries: BTreeMap<String, String>,
}

impl FavoriteStore {
    /// Store without a backing file. Used when no config directory exists
    /// and in tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            queries: BTreeMap::new(),
        }
    }

    /// Load the store from `path`, starting empty when the file is missing
    /// or unreadable.
    pub fn load(path: PathBuf) -> Self {
        let queries = fs::read_to_string(&path)
            .ok()
            .and_then(|text| match toml::from_str::<BTreeMap<String, String>>(&text) {
                Ok(queries) => Some(queries),
                Err(e) => {
                    tracing::error!("Cannot parse favorites file {:?}: {e}", path);
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path: Some(path),
            queries,
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlite-cli").join("favorites.toml"))
    }

    pub fn names(&self) -> Vec<String> {
        self.queries.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(|s| s.as_str())
    }

    pub fn save(&mut self, name: &str, query: &str) -> Result<(), CommandError> {
        self.queries.insert(name.to_string(), query.to_string());
        self.persist()
    }

    pub fn delete(&mut self, name: &str) -> Result<(), CommandError> {
        if self.queries.remove(name).is_none() {
            return Err(CommandError::Argument(format!(
                "No favorite query: {}",
                name
            )));
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), CommandError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(&self.queries)
            .map_err(|e| CommandError::Argument(format!("Cannot save favorites: {}", e)))?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Substitute invocation arguments into a favorite query.
///
/// `$1..$N` markers and `?` placeholders are mutually exclusive; the
/// argument count must match exactly. A query with neither runs verbatim
/// and accepts no arguments.
pub fn expand(query: &str, args: &str) -> Result<String, String> {
    let args: Vec<&str> = args.split_whitespace().collect();

    let marker = Regex::new(r"\$(\d+)").map_err(|e| e.to_string())?;
    let max_positional = marker
        .captures_iter(query)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    let question_count = query.matches('?').count();

    if max_positional > 0 && question_count > 0 {
        return Err("Invalid favorite query: cannot mix $1 markers and ? placeholders".to_string());
    }

    if max_positional > 0 {
        if args.len() != max_positional {
            return Err(format!(
                "query expects {} arguments, got {}",
                max_positional,
                args.len()
            ));
        }
        // Highest first so $10 is not clobbered by $1.
        let mut expanded = query.to_string();
        for (i, arg) in args.iter().enumerate().rev() {
            expanded = expanded.replace(&format!("${}", i + 1), arg);
        }
        return Ok(expanded);
    }

    if question_count > 0 {
        if args.len() != question_count {
            return Err(format!(
                "query expects {} arguments, got {}",
                question_count,
                args.len()
            ));
        }
        let mut expanded = query.to_string();
        for arg in args {
            expanded = expanded.replacen('?', arg, 1);
        }
        return Ok(expanded);
    }

    if !args.is_empty() {
        return Err("query does not take arguments".to_string());
    }
    Ok(query.to_string())
}

pub fn register_all(registry: &mut SpecialRegistry) {
    registry.register(
        "\\f",
        SpecialCommand {
            handler: execute_favorite,
            syntax: "\\f [name [args..]]",
            description: "List or execute favorite queries.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "\\fs",
        SpecialCommand {
            handler: save_favorite,
            syntax: "\\fs name query",
            description: "Save a favorite query.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "\\fd",
        SpecialCommand {
            handler: delete_favorite,
            syntax: "\\fd name",
            description: "Delete a favorite query.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
}

fn execute_favorite(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let arg = args.text().trim();
    if arg.is_empty() {
        return list_favorites(ctx);
    }

    let (name, rest) = match arg.find(char::is_whitespace) {
        Some(i) => (&arg[..i], arg[i + 1..].trim()),
        None => (arg, ""),
    };
    let query = ctx
        .session
        .favorites
        .get(name)
        .ok_or_else(|| CommandError::Argument(format!("No favorite query: {}", name)))?
        .to_string();
    let expanded = expand(&query, rest).map_err(CommandError::Argument)?;

    let conn = ctx.require_conn()?;
    let mut results = Vec::new();
    for statement in database::split_statements(&expanded) {
        let sql = statement.trim_end_matches(';').trim();
        if sql.is_empty() {
            continue;
        }
        let mut result = database::run_query(conn, sql)?;
        result.title = Some(format!("> {}", sql));
        results.push(result);
    }
    Ok(results)
}

fn list_favorites(ctx: &mut CommandContext) -> Result<Vec<ResultTuple>, CommandError> {
    let rows: Vec<Vec<String>> = ctx
        .session
        .favorites
        .names()
        .into_iter()
        .map(|name| {
            let query = ctx.session.favorites.get(&name).unwrap_or("").to_string();
            vec![name, query]
        })
        .collect();
    if rows.is_empty() {
        return Ok(vec![ResultTuple::status(
            "No favorite queries found. Use \\fs to save one.",
        )]);
    }
    Ok(vec![ResultTuple::table(
        vec!["Name".to_string(), "Query".to_string()],
        rows,
        None,
    )])
}

fn save_favorite(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let arg = args.text().trim();
    let Some(i) = arg.find(char::is_whitespace) else {
        return Err(CommandError::Argument(
            "Usage: \\fs name query".to_string(),
        ));
    };
    let (name, query) = (&arg[..i], arg[i + 1..].trim());
    if query.is_empty() {
        return Err(CommandError::Argument(
            "Usage: \\fs name query".to_string(),
        ));
    }
    ctx.session.favorites.save(name, query)?;
    Ok(vec![ResultTuple::status("Saved.")])
}

fn delete_favorite(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let name = args.text().trim();
    if name.is_empty() {
        return Err(CommandError::Argument("Usage: \\fd name".to_string()));
    }
    ctx.session.favorites.delete(name)?;
    Ok(vec![ResultTuple::status(format!("{}: Deleted", name))])
}

#[cfg(test)]
mod tests {
    use super::super::{default_registry, SessionState};
    use super::*;
    use rusqlite::Connection;

    fn run(
        conn: &Connection,
        session: &mut SessionState,
        text: &str,
    ) -> Result<Vec<ResultTuple>, CommandError> {
        let registry = default_registry();
        let mut ctx = CommandContext {
            conn: Some(conn),
            session,
        };
        registry.execute(&mut ctx, text)
    }

    #[test]
    fn expand_replaces_positional_markers() {
        assert_eq!(
            expand("select * from t where a = $1 and b = $2", "x y").unwrap(),
            "select * from t where a = x and b = y"
        );
    }

    #[test]
    fn expand_replaces_question_placeholders() {
        assert_eq!(
            expand("select * from t limit ?", "5").unwrap(),
            "select * from t limit 5"
        );
    }

    #[test]
    fn expand_rejects_mixed_markers() {
        let err = expand("select $1 from t where x = ?", "a b").unwrap_err();
        assert!(err.contains("mix"));
    }

    #[test]
    fn expand_rejects_argument_count_mismatch() {
        assert!(expand("select $1, $2", "only_one").is_err());
        assert!(expand("select ?", "a b").is_err());
        assert!(expand("select 1", "stray").is_err());
    }

    #[test]
    fn expand_runs_plain_queries_verbatim() {
        assert_eq!(expand("select 1", "").unwrap(), "select 1");
    }

    #[test]
    fn store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.toml");

        let mut store = FavoriteStore::load(path.clone());
        store.save("signups", "select count(*) from users").unwrap();

        let reloaded = FavoriteStore::load(path);
        assert_eq!(
            reloaded.get("signups"),
            Some("select count(*) from users")
        );
    }

    #[test]
    fn store_delete_reports_missing_names() {
        let mut store = FavoriteStore::in_memory();
        assert!(store.delete("nosuch").is_err());
    }

    #[test]
    fn favorite_executes_each_statement() {
        let conn = Connection::open_in_memory().unwrap();
        let mut session = SessionState::new(FavoriteStore::in_memory());
        session
            .favorites
            .save("two", "select 1; select 2")
            .unwrap();

        let results = run(&conn, &mut session, "\\f two").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title.as_deref(), Some("> select 1"));
        assert_eq!(results[0].rows, vec![vec!["1".to_string()]]);
        assert_eq!(results[1].rows, vec![vec!["2".to_string()]]);
    }

    #[test]
    fn favorite_with_arguments_substitutes_before_running() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x); INSERT INTO t VALUES (1), (2), (3);")
            .unwrap();
        let mut session = SessionState::new(FavoriteStore::in_memory());
        session
            .favorites
            .save("limited", "select x from t limit $1")
            .unwrap();

        let results = run(&conn, &mut session, "\\f limited 2").unwrap();
        assert_eq!(results[0].rows.len(), 2);
    }

    #[test]
    fn invalid_substitution_is_reported_not_run() {
        let conn = Connection::open_in_memory().unwrap();
        let mut session = SessionState::new(FavoriteStore::in_memory());
        session.favorites.save("bad", "select $1 where ?").unwrap();

        let err = run(&conn, &mut session, "\\f bad x").unwrap_err();
        assert!(matches!(err, CommandError::Argument(_)));
    }

    #[test]
    fn save_and_list_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let mut session = SessionState::new(FavoriteStore::in_memory());

        run(&conn, &mut session, "\\fs one select 1").unwrap();
        let results = run(&conn, &mut session, "\\f").unwrap();
        assert_eq!(
            results[0].rows,
            vec![vec!["one".to_string(), "select 1".to_string()]]
        );

        run(&conn, &mut session, "\\fd one").unwrap();
        let results = run(&conn, &mut session, "\\f").unwrap();
        assert!(results[0].status.is_some());
    }
}
