/*!
 * Special (non-SQL) command registry and dispatcher
 *
 * Commands start with `.` or `\` (a few bare words like `use` and `help`
 * also qualify). Each command module registers its handlers into an
 * explicit `SpecialRegistry` built once at startup; dispatch resolves the
 * first token, shapes the arguments per the declared `ArgType`, and calls
 * the handler. A miss is reported as `CommandError::NotFound` so the
 * caller can fall through to raw SQL.
 */

pub mod dbcommands;
pub mod favorites;
pub mod iocommands;
pub mod llm;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use self::favorites::FavoriteStore;
use self::iocommands::OutputSinks;

/// `+`/`-` suffix on the command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Normal,
    Verbose,
    Succinct,
}

/// How the dispatcher shapes the text after the command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Arguments are ignored.
    NoArgs,
    /// The remainder after the command token, trimmed.
    Parsed,
    /// The full input line, command token included.
    Raw,
}

/// Argument payload matching the command's declared `ArgType`.
#[derive(Debug, Clone)]
pub enum CommandArgs {
    None,
    Parsed(String),
    Raw(String),
}

impl CommandArgs {
    /// The textual argument, empty for `None`.
    pub fn text(&self) -> &str {
        match self {
            CommandArgs::None => "",
            CommandArgs::Parsed(s) | CommandArgs::Raw(s) => s,
        }
    }
}

/// One result set, shared between special commands and raw SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTuple {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub status: Option<String>,
}

impl ResultTuple {
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            status: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn table(headers: Vec<String>, rows: Vec<Vec<String>>, status: Option<String>) -> Self {
        Self {
            title: None,
            headers,
            rows,
            status,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    /// Not a registered command; the input should be run as SQL.
    #[error("command not found")]
    NotFound,
    /// The user asked to leave the shell.
    #[error("quit")]
    Quit,
    #[error("not implemented")]
    NotImplemented,
    #[error("{0}")]
    Argument(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Session effects a handler cannot apply itself; the statement runner
/// drains these after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    ChangeDatabase(String),
    RefreshCompletions { reset: bool },
    ExecuteScript(PathBuf),
}

/// Mutable per-session state shared with command handlers.
pub struct SessionState {
    pub favorites: FavoriteStore,
    pub table_format: String,
    pub pager: Option<String>,
    pub actions: Vec<SessionAction>,
    pub sinks: OutputSinks,
}

impl SessionState {
    pub fn new(favorites: FavoriteStore) -> Self {
        Self {
            favorites,
            table_format: "ascii".to_string(),
            pager: None,
            actions: Vec::new(),
            sinks: OutputSinks::default(),
        }
    }

    pub fn queue(&mut self, action: SessionAction) {
        self.actions.push(action);
    }
}

/// What a handler sees: the live connection (if any) and the session.
pub struct CommandContext<'a> {
    pub conn: Option<&'a rusqlite::Connection>,
    pub session: &'a mut SessionState,
}

impl<'a> CommandContext<'a> {
    /// Commands touching the database require a connection.
    pub fn require_conn(&self) -> Result<&'a rusqlite::Connection, CommandError> {
        self.conn
            .ok_or_else(|| CommandError::Argument("Not connected to a database".to_string()))
    }
}

pub type Handler = fn(
    &SpecialRegistry,
    &mut CommandContext,
    CommandArgs,
    Verbosity,
) -> Result<Vec<ResultTuple>, CommandError>;

#[derive(Clone)]
pub struct SpecialCommand {
    pub handler: Handler,
    pub syntax: &'static str,
    pub description: &'static str,
    pub arg_type: ArgType,
    pub hidden: bool,
    pub case_sensitive: bool,
}

/// Name -> command map. Aliases are separate entries registered hidden so
/// `help` lists each command once.
#[derive(Default)]
pub struct SpecialRegistry {
    commands: BTreeMap<String, SpecialCommand>,
}

impl SpecialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, command: SpecialCommand) {
        self.commands.insert(name.to_string(), command);
    }

    pub fn register_with_aliases(
        &mut self,
        name: &str,
        aliases: &[&str],
        command: SpecialCommand,
    ) {
        for alias in aliases {
            self.commands.insert(
                alias.to_string(),
                SpecialCommand {
                    hidden: true,
                    ..command.clone()
                },
            );
        }
        self.commands.insert(name.to_string(), command);
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Whether `name` would resolve to a command, honoring case rules.
    pub fn contains(&self, name: &str) -> bool {
        if self.commands.contains_key(name) {
            return true;
        }
        match self.commands.get(&name.to_lowercase()) {
            Some(command) => !command.case_sensitive,
            None => false,
        }
    }

    pub fn execute(
        &self,
        ctx: &mut CommandContext,
        text: &str,
    ) -> Result<Vec<ResultTuple>, CommandError> {
        let (key, verbosity, arg) = parse_special_command(text);

        let command = match self.commands.get(&key) {
            Some(command) => command,
            None => {
                // Case-insensitive fallback, unless the command opted out.
                match self.commands.get(&key.to_lowercase()) {
                    Some(command) if !command.case_sensitive => command,
                    _ => return Err(CommandError::NotFound),
                }
            }
        };

        let args = match command.arg_type {
            ArgType::NoArgs => CommandArgs::None,
            ArgType::Parsed => CommandArgs::Parsed(arg.to_string()),
            ArgType::Raw => CommandArgs::Raw(text.to_string()),
        };

        tracing::debug!("Dispatching special command {:?}", key);
        (command.handler)(self, ctx, args, verbosity)
    }
}

/// Split the command token off and read its verbosity suffix. `+` means
/// verbose, `-` succinct; both are stripped from the lookup key.
pub fn parse_special_command(text: &str) -> (String, Verbosity, &str) {
    let text = text.trim();
    let (command, arg) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i + 1..].trim()),
        None => (text, ""),
    };

    let verbosity = if command.contains('+') {
        Verbosity::Verbose
    } else if command.contains('-') {
        Verbosity::Succinct
    } else {
        Verbosity::Normal
    };
    let key = command.trim_matches(|c| c == '+' || c == '-').to_string();

    (key, verbosity, arg)
}

/// Build the full registry. Command modules register themselves; the
/// shell-level built-ins (`help`, `quit`) live here.
pub fn default_registry() -> SpecialRegistry {
    let mut registry = SpecialRegistry::new();

    registry.register_with_aliases(
        "help",
        &["\\?", "?"],
        SpecialCommand {
            handler: show_help,
            syntax: "\\?",
            description: "Show this help.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: false,
        },
    );
    registry.register_with_aliases(
        "quit",
        &["exit", "\\q"],
        SpecialCommand {
            handler: quit,
            syntax: "\\q",
            description: "Quit.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );

    dbcommands::register_all(&mut registry);
    iocommands::register_all(&mut registry);
    favorites::register_all(&mut registry);
    llm::register_all(&mut registry);

    registry
}

fn show_help(
    registry: &SpecialRegistry,
    _ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let rows = registry
        .commands
        .values()
        .filter(|c| !c.hidden)
        .map(|c| vec![c.syntax.to_string(), c.description.to_string()])
        .collect();
    Ok(vec![ResultTuple::table(
        vec!["Command".to_string(), "Description".to_string()],
        rows,
        None,
    )])
}

fn quit(
    _registry: &SpecialRegistry,
    _ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    Err(CommandError::Quit)
}
