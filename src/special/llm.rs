//! `\llm` assistant command. Registered so help and completion know about
//! it; execution is not wired up yet.

use super::{
    ArgType, CommandArgs, CommandContext, CommandError, ResultTuple, SpecialCommand,
    SpecialRegistry, Verbosity,
};

const TOP_LEVEL: &[&str] = &[
    "prompt", "templates", "template", "models", "keys", "logs", "--continue", "--model",
];

/// Subcommand candidates for the token position after `\llm`.
pub fn completion_candidates(tokens: &[&str]) -> Vec<String> {
    let next: &[&str] = match tokens.first() {
        None => TOP_LEVEL,
        Some(&"models") => &["default", "list"],
        Some(&"keys") => &["list", "set"],
        Some(&"templates") => &["list", "show"],
        Some(_) => &[],
    };
    next.iter().map(|s| s.to_string()).collect()
}

pub fn register_all(registry: &mut SpecialRegistry) {
    registry.register_with_aliases(
        "\\llm",
        &["\\ai", ".llm", ".ai"],
        SpecialCommand {
            handler: not_wired,
            syntax: "\\llm [prompt]",
            description: "Ask an LLM to write SQL for you.",
            arg_type: ArgType::Raw,
            hidden: false,
            case_sensitive: true,
        },
    );
}

fn not_wired(
    _registry: &SpecialRegistry,
    _ctx: &mut CommandContext,
    _args: CommandArgs,
    _verbosity: Verbosity,
) -> Result<Vec<ResultTuple>, CommandError> {
    Err(CommandError::NotImplemented)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_offered_first() {
        assert!(completion_candidates(&[]).contains(&"prompt".to_string()));
    }

    #[test]
    fn known_subcommands_narrow_the_set() {
        assert_eq!(
            completion_candidates(&["models"]),
            vec!["default".to_string(), "list".to_string()]
        );
        assert!(completion_candidates(&["prompt"]).is_empty());
    }
}
