use clap::{Arg, Command};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod completion;
mod database;
mod special;

use cli::Cli;
use completion::KeywordCasing;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("sqlite-cli-rust")
        .version("0.1.0")
        .about("A SQLite shell with context-aware auto-completion")
        .arg(
            Arg::new("database")
                .value_name("DATABASE")
                .help("Database file to open, or :memory:")
                .index(1),
        )
        .arg(
            Arg::new("execute")
                .short('e')
                .long("execute")
                .value_name("SQL")
                .help("Execute the command(s) and exit"),
        )
        .arg(
            Arg::new("keyword-casing")
                .long("keyword-casing")
                .value_name("CASING")
                .help("Casing for completed keywords: upper, lower or auto")
                .default_value("auto"),
        )
        .get_matches();

    let database = matches.get_one::<String>("database").map(|s| s.as_str());
    let casing = matches
        .get_one::<String>("keyword-casing")
        .map(|s| KeywordCasing::parse(s))
        .unwrap_or(KeywordCasing::Auto);
    let mut cli = Cli::new(database, casing)?;

    if let Some(sql) = matches.get_one::<String>("execute") {
        cli.run_once(sql)?;
        return Ok(());
    }

    cli.run()
}
