/*!
 * Interactive shell loop
 *
 * Owns the executor, the special-command registry, the shared completer
 * and the refresher. Reads lines through rustyline, buffers multi-line SQL
 * until a terminator, dispatches, renders, and applies the session actions
 * commands queued (reconnect, refresh, run a script).
 */

use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::{history::DefaultHistory, CompletionType, Config, Editor};

use crate::commands::query;
use crate::completion::scope::{is_destructive, queries_start_with};
use crate::completion::{
    CompleterOptions, CompletionRefresher, KeywordCasing, SqlCompleter, SqliteHelper,
};
use crate::database::{ExecuteError, SqlExecutor};
use crate::special::{
    default_registry, favorites::FavoriteStore, parse_special_command, CommandError,
    SessionAction, SessionState, SpecialRegistry,
};

/// One executed input, kept for `\e` recall.
pub struct Query {
    pub text: String,
    pub successful: bool,
    pub mutating: bool,
}

pub struct Cli {
    executor: SqlExecutor,
    registry: SpecialRegistry,
    session: SessionState,
    completer: Arc<Mutex<SqlCompleter>>,
    refresher: CompletionRefresher,
    keyword_casing: KeywordCasing,
    query_history: Vec<Query>,
    /// Interrupt handle for the statement currently executing, if any.
    /// The SIGINT handler fires it so Ctrl-C aborts the statement
    /// instead of the shell.
    interrupt: Arc<Mutex<Option<rusqlite::InterruptHandle>>>,
}

impl Cli {
    pub fn new(database: Option<&str>, keyword_casing: KeywordCasing) -> Result<Self> {
        let executor = SqlExecutor::new(database)?;
        let registry = default_registry();
        let favorites = match FavoriteStore::default_path() {
            Some(path) => FavoriteStore::load(path),
            None => FavoriteStore::in_memory(),
        };
        let session = SessionState::new(favorites);
        let completer = Arc::new(Mutex::new(SqlCompleter::new(
            query::supported_formats(),
            keyword_casing,
        )));

        let mut cli = Self {
            executor,
            registry,
            session,
            completer,
            refresher: CompletionRefresher::new(),
            keyword_casing,
            query_history: Vec::new(),
            interrupt: Arc::new(Mutex::new(None)),
        };
        cli.refresh_completions();
        Ok(cli)
    }

    pub fn run(&mut self) -> Result<()> {
        println!("sqlite-cli");
        println!("Type 'help' or '\\?' for help; end SQL statements with ';' or '\\G'.");
        println!();

        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .edit_mode(rustyline::EditMode::Emacs)
            .build();
        let mut editor: Editor<SqliteHelper, DefaultHistory> = Editor::with_config(config)?;
        editor.set_helper(Some(SqliteHelper::new(Arc::clone(&self.completer))));

        // While rustyline owns the terminal Ctrl-C comes back as
        // `ReadlineError::Interrupted`; during execution it arrives as
        // SIGINT and aborts the in-flight statement.
        let interrupt = Arc::clone(&self.interrupt);
        if let Err(e) = ctrlc::set_handler(move || {
            if let Ok(slot) = interrupt.lock() {
                if let Some(handle) = slot.as_ref() {
                    handle.interrupt();
                }
            }
        }) {
            tracing::debug!("Interrupt handler not installed: {e}");
        }

        let history_path = dirs::data_dir().map(|dir| dir.join("sqlite-cli").join("history"));
        if let Some(path) = &history_path {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = editor.load_history(path);
        }

        let mut buffer = String::new();
        loop {
            let prompt = if !buffer.is_empty() {
                "   ...> ".to_string()
            } else if self.refresher.is_refreshing() {
                format!("{} (refreshing)> ", self.executor.dbname())
            } else {
                format!("{}> ", self.executor.dbname())
            };

            match editor.readline(&prompt) {
                Ok(line) => {
                    let Some(input) = self.collect_input(&mut buffer, line.trim()) else {
                        continue;
                    };
                    if is_destructive(&input) && !confirm_destructive(&mut editor) {
                        println!("Wise choice!");
                        continue;
                    }
                    if !self.execute_input(&input)? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    buffer.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &history_path {
            let _ = editor.save_history(path);
        }
        Ok(())
    }

    /// One-shot execution for `-e`.
    pub fn run_once(&mut self, text: &str) -> Result<()> {
        self.execute_input(text)?;
        Ok(())
    }

    /// Fold a line into the multi-line buffer; returns the full input once
    /// a terminator arrives. Special commands dispatch without one.
    fn collect_input(&mut self, buffer: &mut String, line: &str) -> Option<String> {
        if buffer.is_empty() {
            if line.is_empty() {
                return None;
            }
            if line.starts_with("\\e") {
                return self.edited_input(line);
            }
            let (key, _, _) = parse_special_command(line);
            if line.starts_with('.')
                || line.starts_with('\\')
                || self.registry.contains(&key)
                || is_terminated(line)
            {
                return Some(strip_terminator_whitespace(line));
            }
            buffer.push_str(line);
            return None;
        }

        buffer.push('\n');
        buffer.push_str(line);
        if is_terminated(line) {
            return Some(std::mem::take(buffer));
        }
        None
    }

    /// `\e [query]`: round-trip through $EDITOR, echo the result, run it.
    fn edited_input(&mut self, line: &str) -> Option<String> {
        let arg = line["\\e".len()..].trim();
        let seed = if arg.is_empty() {
            self.query_history
                .last()
                .map(|q| q.text.clone())
                .unwrap_or_default()
        } else {
            arg.to_string()
        };

        match edit_in_external_editor(&seed) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    println!("{}", text);
                    Some(text)
                }
            }
            Err(e) => {
                println!("Error: {}", e);
                None
            }
        }
    }

    /// Run one complete input. Returns false when the session should end.
    fn execute_input(&mut self, input: &str) -> Result<bool> {
        let start = Instant::now();
        if let Ok(mut slot) = self.interrupt.lock() {
            *slot = self.executor.conn().map(|conn| conn.get_interrupt_handle());
        }
        let outcome = self.executor.run(&self.registry, &mut self.session, input);
        if let Ok(mut slot) = self.interrupt.lock() {
            *slot = None;
        }
        let successful = outcome.error.is_none();

        // Statements that completed before an error still render.
        let any = !outcome.results.is_empty();
        for statement in &outcome.results {
            let text = query::render(
                &statement.result,
                &self.session.table_format,
                statement.vertical,
            );
            print!("{}", text);
            if let Err(e) = self.session.sinks.write(text.trim_end_matches('\n')) {
                println!("Error writing output: {}", e);
            }
        }
        if self.session.sinks.has_once() {
            if let Err(e) = self.session.sinks.finish_once() {
                println!("Error writing output: {}", e);
            }
        }

        match outcome.error {
            None => {
                if any {
                    println!("Time: {:.3}s", start.elapsed().as_secs_f64());
                }
            }
            Some(ExecuteError::Command(CommandError::Quit)) => {
                println!("Goodbye!");
                return Ok(false);
            }
            Some(ExecuteError::Command(CommandError::NotImplemented)) => {
                println!("Not yet implemented.");
            }
            Some(e) => {
                println!("{}", e);
            }
        }

        let record = Query {
            text: input.to_string(),
            successful,
            mutating: is_destructive(input)
                || queries_start_with(input, &["insert", "update", "replace"]),
        };
        tracing::debug!(
            successful = record.successful,
            mutating = record.mutating,
            "input finished"
        );
        self.query_history.push(record);

        self.apply_session_actions();

        // DDL changes the catalog the completer indexes. Database switches
        // refresh through their session action instead.
        if successful && queries_start_with(input, &["alter", "create", "drop"]) {
            let message = self.refresh_completions();
            tracing::debug!("{}", message);
        }

        Ok(true)
    }

    fn apply_session_actions(&mut self) {
        let actions = std::mem::take(&mut self.session.actions);
        for action in actions {
            match action {
                SessionAction::ChangeDatabase(path) => match self.executor.connect(&path) {
                    Ok(()) => {
                        println!("You are now connected to database \"{}\"", path);
                        if let Ok(mut completer) = self.completer.lock() {
                            completer.reset_completions();
                        }
                        self.refresh_completions();
                    }
                    Err(e) => println!("{}", e),
                },
                SessionAction::RefreshCompletions { reset } => {
                    if reset {
                        if let Ok(mut completer) = self.completer.lock() {
                            completer.reset_completions();
                        }
                    }
                    let message = self.refresh_completions();
                    println!("{}", message);
                }
                SessionAction::ExecuteScript(path) => match fs::read_to_string(&path) {
                    Ok(script) => {
                        if let Err(e) = self.execute_input(&script) {
                            println!("{}", e);
                        }
                    }
                    Err(e) => println!("Cannot read {}: {}", path.display(), e),
                },
            }
        }
    }

    fn refresh_completions(&mut self) -> &'static str {
        let options = CompleterOptions {
            supported_formats: query::supported_formats(),
            keyword_casing: self.keyword_casing,
            special_commands: self.registry.command_names(),
            favorite_names: self.session.favorites.names(),
        };
        let shared = Arc::clone(&self.completer);
        self.refresher.refresh(
            &self.executor,
            options,
            Box::new(move |new_completer| {
                if let Ok(mut completer) = shared.lock() {
                    *completer = new_completer;
                }
            }),
        )
    }
}

fn confirm_destructive(editor: &mut Editor<SqliteHelper, DefaultHistory>) -> bool {
    println!("You're about to run a destructive command.");
    loop {
        match editor.readline("Do you want to proceed? (y/n): ") {
            Ok(answer) => match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => continue,
            },
            Err(_) => return false,
        }
    }
}

fn is_terminated(line: &str) -> bool {
    let line = line.trim_end();
    line.ends_with(';') || line.ends_with("\\G")
}

fn strip_terminator_whitespace(line: &str) -> String {
    line.trim_end().to_string()
}

fn edit_in_external_editor(seed: &str) -> Result<String> {
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let mut file = tempfile::Builder::new().suffix(".sql").tempfile()?;
    file.write_all(seed.as_bytes())?;
    file.flush()?;

    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("{} {}", editor, file.path().display()))
        .status()?;
    if !status.success() {
        anyhow::bail!("editor exited with {}", status);
    }
    Ok(fs::read_to_string(file.path())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli::new(Some(":memory:"), KeywordCasing::Auto).unwrap()
    }

    #[test]
    fn terminators_end_a_statement() {
        assert!(is_terminated("select 1;"));
        assert!(is_terminated("select * from t\\G"));
        assert!(!is_terminated("select 1"));
    }

    #[test]
    fn special_commands_dispatch_without_terminator() {
        let mut cli = cli();
        let mut buffer = String::new();
        assert_eq!(
            cli.collect_input(&mut buffer, ".tables"),
            Some(".tables".to_string())
        );
        assert_eq!(
            cli.collect_input(&mut buffer, "help"),
            Some("help".to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn sql_buffers_until_semicolon() {
        let mut cli = cli();
        let mut buffer = String::new();
        assert_eq!(cli.collect_input(&mut buffer, "select 1,"), None);
        assert_eq!(
            cli.collect_input(&mut buffer, "2;"),
            Some("select 1,\n2;".to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn ddl_triggers_a_completion_refresh() {
        let mut cli = cli();
        assert!(cli.execute_input("create table fresh (id integer);").unwrap());

        let text = "SELECT * FROM ";
        let completer = cli.completer.lock().unwrap();
        let names: Vec<String> = completer
            .get_completions(text, text.len())
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert!(names.contains(&"fresh".to_string()));
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut cli = cli();
        assert!(!cli.execute_input("quit").unwrap());
    }

    #[test]
    fn earlier_statements_survive_a_later_failure() {
        let mut cli = cli();
        cli.execute_input("create table t (x);").unwrap();
        assert!(cli
            .execute_input("insert into t values (1); select * from nosuch;")
            .unwrap());

        let count: i64 = cli
            .executor
            .conn()
            .unwrap()
            .query_row("select count(*) from t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(!cli.query_history.last().unwrap().successful);
    }

    #[test]
    fn history_records_success_and_mutation() {
        let mut cli = cli();
        cli.execute_input("create table t (x);").unwrap();
        cli.execute_input("insert into t values (1);").unwrap();
        cli.execute_input("select * from nosuch;").unwrap();

        assert!(cli.query_history[0].successful);
        assert!(cli.query_history[1].mutating);
        assert!(!cli.query_history[2].successful);
    }

    #[test]
    fn open_reconnects_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("next.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE remote (id integer)")
            .unwrap();

        let mut cli = cli();
        let input = format!(".open {}", path.display());
        cli.execute_input(&input).unwrap();
        assert_eq!(cli.executor.path(), Some(path.to_str().unwrap()));
    }

    #[test]
    fn read_script_executes_its_statements() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("setup.sql");
        fs::write(&script, "create table scripted (id integer);").unwrap();

        let mut cli = cli();
        cli.execute_input(&format!(".read {}", script.display()))
            .unwrap();

        let count: i64 = cli
            .executor
            .conn()
            .unwrap()
            .query_row(
                "select count(*) from sqlite_master where name = 'scripted'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
