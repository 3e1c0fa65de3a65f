/*!
 * Metadata refresh coordinator
 *
 * Builds a fresh `SqlCompleter` from the database catalog and hands it to a
 * callback that swaps it into the session. File-backed databases refresh on
 * a background thread with their own connection; in-memory databases are
 * invisible to other connections, so they refresh synchronously on the
 * caller's. At most one worker runs at a time; a refresh requested while
 * one is running makes the worker restart from the first step instead of
 * spawning a second.
 */

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use rusqlite::Connection;

use super::engine::{KeywordCasing, RelKind, SqlCompleter};
use crate::database::{self, SqlExecutor};

/// Session inputs a rebuilt completer needs beyond the catalog.
#[derive(Clone)]
pub struct CompleterOptions {
    pub supported_formats: Vec<String>,
    pub keyword_casing: KeywordCasing,
    pub special_commands: Vec<String>,
    pub favorite_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Refreshing { restart_requested: bool },
}

pub type RefreshCallback = Box<dyn FnOnce(SqlCompleter) + Send + 'static>;

pub struct CompletionRefresher {
    state: Arc<Mutex<RefreshState>>,
}

impl Default for CompletionRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionRefresher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RefreshState::Idle)),
        }
    }

    /// Whether a refresh pass is currently running.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Start (or restart) a refresh. Returns the status message for the
    /// prompt.
    pub fn refresh(
        &self,
        executor: &SqlExecutor,
        options: CompleterOptions,
        callback: RefreshCallback,
    ) -> &'static str {
        {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Refreshing { restart_requested } => {
                    *restart_requested = true;
                    return "Auto-completion refresh restarted.";
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        restart_requested: false,
                    };
                }
            }
        }

        if executor.is_memory() || !executor.is_connected() {
            let completer = self.build(executor.conn(), &options);
            callback(completer);
            return "Auto-completion refresh completed.";
        }

        let path = executor.path().unwrap_or_default().to_string();
        let worker = CompletionRefresher {
            state: Arc::clone(&self.state),
        };
        thread::spawn(move || {
            let conn = match Connection::open(&path) {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::error!("Completion refresh cannot open {path}: {e}");
                    None
                }
            };
            let completer = worker.build(conn.as_ref(), &options);
            callback(completer);
        });
        "Auto-completion refresh started in the background."
    }

    /// Run the refresh steps in order, restarting from the top whenever a
    /// restart was requested mid-run.
    fn build(&self, conn: Option<&Connection>, options: &CompleterOptions) -> SqlCompleter {
        'rebuild: loop {
            let mut completer = SqlCompleter::new(
                options.supported_formats.clone(),
                options.keyword_casing,
            );

            if let Some(conn) = conn {
                completer.extend_database_names(database::database_names(conn));
                if self.take_restart() {
                    continue 'rebuild;
                }

                completer.set_dbname("main");
                completer.extend_schemata("main");
                if self.take_restart() {
                    continue 'rebuild;
                }

                completer.extend_relations(database::table_names(conn), RelKind::Tables);
                completer.extend_columns(database::table_columns(conn), RelKind::Tables);
                completer.extend_relations(database::view_names(conn), RelKind::Views);
                completer.extend_columns(database::view_columns(conn), RelKind::Views);
                if self.take_restart() {
                    continue 'rebuild;
                }

                completer.extend_functions(database::function_names(conn));
                if self.take_restart() {
                    continue 'rebuild;
                }
            }

            completer.extend_special_commands(options.special_commands.clone());
            completer.extend_favorite_queries(options.favorite_names.clone());
            if self.take_restart() {
                continue 'rebuild;
            }

            *self.lock_state() = RefreshState::Idle;
            return completer;
        }
    }

    fn take_restart(&self) -> bool {
        let mut state = self.lock_state();
        match &mut *state {
            RefreshState::Refreshing { restart_requested } if *restart_requested => {
                *restart_requested = false;
                true
            }
            _ => false,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
