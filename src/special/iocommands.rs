/*!
 * Input/output commands
 *
 * Output redirection (`tee`, `.once`, `\pipe_once`), shell escape
 * (`system`), table-format switching (`.mode`) and the pager toggles. The
 * editor (`\e`) and vertical-output (`\G`) entries are registered for help
 * and completion; the statement runner intercepts both before dispatch.
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{
    ArgType, CommandArgs, CommandContext, CommandError, ResultTuple, SpecialCommand,
    SpecialRegistry, Verbosity,
};
use crate::commands::query;

/// Where rendered output is copied besides the terminal.
#[derive(Default)]
pub struct OutputSinks {
    tee: Option<TeeSink>,
    once: Option<OnceSink>,
}

struct TeeSink {
    path: PathBuf,
    file: File,
}

enum OnceSink {
    File { file: File },
    Pipe { command: String, buffer: String },
}

impl OutputSinks {
    pub fn set_tee(&mut self, path: &str, overwrite: bool) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!overwrite)
            .truncate(overwrite)
            .open(path)?;
        self.tee = Some(TeeSink {
            path: PathBuf::from(path),
            file,
        });
        Ok(())
    }

    pub fn close_tee(&mut self) {
        self.tee = None;
    }

    pub fn set_once(&mut self, path: &str) -> io::Result<()> {
        let file = File::create(path)?;
        self.once = Some(OnceSink::File { file });
        Ok(())
    }

    pub fn set_pipe_once(&mut self, command: &str) {
        self.once = Some(OnceSink::Pipe {
            command: command.to_string(),
            buffer: String::new(),
        });
    }

    /// Copy one rendered result to the active sinks.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        if let Some(tee) = self.tee.as_mut() {
            tee.file.write_all(text.as_bytes())?;
            tee.file.write_all(b"\n")?;
            tee.file.flush()?;
        }
        match self.once.as_mut() {
            Some(OnceSink::File { file }) => {
                file.write_all(text.as_bytes())?;
                file.write_all(b"\n")?;
            }
            Some(OnceSink::Pipe { buffer, .. }) => {
                buffer.push_str(text);
                buffer.push('\n');
            }
            None => {}
        }
        Ok(())
    }

    /// Close the one-shot sink after a statement's output, flushing a pipe
    /// sink through its subprocess.
    pub fn finish_once(&mut self) -> io::Result<()> {
        match self.once.take() {
            Some(OnceSink::Pipe { command, buffer }) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(&command)
                    .stdin(Stdio::piped())
                    .spawn()?;
                if let Some(stdin) = child.stdin.as_mut() {
                    stdin.write_all(buffer.as_bytes())?;
                }
                child.wait()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn has_once(&self) -> bool {
        self.once.is_some()
    }

    pub fn describe(&self) -> String {
        match &self.tee {
            Some(tee) => tee.path.display().to_string(),
            None => "stdout".to_string(),
        }
    }
}

pub fn register_all(registry: &mut SpecialRegistry) {
    registry.register_with_aliases(
        ".mode",
        &["\\T"],
        SpecialCommand {
            handler: set_table_format,
            syntax: ".mode format",
            description: "Change the table output format.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        "tee",
        &[".output", "\\o"],
        SpecialCommand {
            handler: set_tee,
            syntax: "tee [-o] filename",
            description: "Append all results to a file. -o overwrites.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "notee",
        SpecialCommand {
            handler: close_tee,
            syntax: "notee",
            description: "Stop writing results to a file.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        ".once",
        &["\\once"],
        SpecialCommand {
            handler: set_once,
            syntax: ".once filename",
            description: "Write the next result to a file.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        "\\pipe_once",
        &["\\|"],
        SpecialCommand {
            handler: set_pipe_once,
            syntax: "\\pipe_once command",
            description: "Pipe the next result through a shell command.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "system",
        SpecialCommand {
            handler: run_system,
            syntax: "system command",
            description: "Execute a system shell command.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        "pager",
        &["\\P"],
        SpecialCommand {
            handler: set_pager,
            syntax: "pager [command]",
            description: "Set PAGER. Print the query results via PAGER.",
            arg_type: ArgType::Parsed,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register_with_aliases(
        "nopager",
        &["\\n"],
        SpecialCommand {
            handler: disable_pager,
            syntax: "nopager",
            description: "Disable pager, print to stdout.",
            arg_type: ArgType::NoArgs,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "\\e",
        SpecialCommand {
            handler: stub_not_implemented,
            syntax: "\\e [query]",
            description: "Edit the query with an external editor.",
            arg_type: ArgType::Raw,
            hidden: false,
            case_sensitive: true,
        },
    );
    registry.register(
        "\\G",
        SpecialCommand {
            handler: stub_not_implemented,
            syntax: "\\G",
            description: "Display results vertically.",
            arg_type: ArgType::Raw,
            hidden: true,
            case_sensitive: true,
        },
    );
}

fn set_table_format(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let format = args.text().trim();
    if !query::is_supported_format(format) {
        return Err(CommandError::Argument(format!(
            "Table format {} not recognized. Allowed formats: {}",
            format,
            query::SUPPORTED_FORMATS.join(", ")
        )));
    }
    ctx.session.table_format = format.to_string();
    Ok(vec![ResultTuple::status(format!(
        "Changed table format to {}",
        format
    ))])
}

fn set_tee(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let mut arg = args.text().trim();
    let overwrite = arg.starts_with("-o ") || arg == "-o";
    if overwrite {
        arg = arg[2..].trim();
    }
    if arg.is_empty() {
        return Err(CommandError::Argument(
            "Usage: tee [-o] filename".to_string(),
        ));
    }
    ctx.session.sinks.set_tee(arg, overwrite)?;
    Ok(vec![ResultTuple::status(format!("Writing to {}", arg))])
}

fn close_tee(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    ctx.session.sinks.close_tee();
    Ok(Vec::new())
}

fn set_once(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let path = args.text().trim();
    if path.is_empty() {
        return Err(CommandError::Argument(
            "Usage: .once filename".to_string(),
        ));
    }
    ctx.session.sinks.set_once(path)?;
    Ok(Vec::new())
}

fn set_pipe_once(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let command = args.text().trim();
    if command.is_empty() {
        return Err(CommandError::Argument(
            "Usage: \\pipe_once command".to_string(),
        ));
    }
    ctx.session.sinks.set_pipe_once(command);
    Ok(Vec::new())
}

fn run_system(
    _registry: &SpecialRegistry,
    _ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let command = args.text().trim();
    if command.is_empty() {
        return Err(CommandError::Argument(
            "Usage: system command".to_string(),
        ));
    }
    let output = Command::new("sh").arg("-c").arg(command).output()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let rows = text.lines().map(|line| vec![line.to_string()]).collect();
    Ok(vec![ResultTuple::table(Vec::new(), rows, None)])
}

fn set_pager(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    let arg = args.text().trim();
    let pager = if arg.is_empty() {
        std::env::var("PAGER").unwrap_or_default()
    } else {
        arg.to_string()
    };
    if pager.is_empty() {
        return Err(CommandError::Argument(
            "No pager given and PAGER is not set".to_string(),
        ));
    }
    let status = format!("PAGER set to {}", pager);
    ctx.session.pager = Some(pager);
    Ok(vec![ResultTuple::status(status)])
}

fn disable_pager(
    _registry: &SpecialRegistry,
    ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    ctx.session.pager = None;
    Ok(vec![ResultTuple::status("Pager disabled.")])
}

fn stub_not_implemented(
    _registry: &SpecialRegistry,
    _ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    Err(CommandError::NotImplemented)
}
