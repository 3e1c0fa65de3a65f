/*!
 * Suggestion type inference
 *
 * Maps the cursor's lexical scope to the kinds of completion candidates
 * worth offering there. Partial or broken SQL always produces a best-effort
 * answer; ambiguity widens the request set instead of failing.
 */

use super::scope::{self, extract_tables, last_word, TableRef, Token, WordPolicy};

/// A typed intent describing what kind of candidates are wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionRequest {
    Column {
        tables: Vec<TableRef>,
        drop_unique: bool,
    },
    Table {
        schema: Option<String>,
    },
    View {
        schema: Option<String>,
    },
    Function {
        schema: Option<String>,
    },
    Alias {
        aliases: Vec<String>,
    },
    Database,
    Keyword,
    Special,
    FavoriteQuery,
    TableFormat,
    FileName,
    Llm,
}

/// Strip a surrounding double-quote or backtick pair.
pub fn unquote(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'`' && bytes[bytes.len() - 1] == b'`'))
    {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

/// Context keywords a backward scan stops at.
const CONTEXT_KEYWORDS: &[&str] = &[
    "select", "from", "join", "where", "having", "by", "distinct", "and", "or", "not", "on",
    "using", "use", "set", "update", "into", "table", "describe", "desc", "database", "limit",
    "offset", "in", "like", "between", "when", "then", "else", "values", "union", "intersect",
    "except",
];

/// Commands whose next argument is a path.
const FILE_ARG_COMMANDS: &[&str] = &[
    ".open", ".read", "\\.", "source", ".load", ".output", "tee", ".once", "\\o", "\\once",
];

/// Infer the suggestion requests for the cursor position.
///
/// `full_text` is the whole input buffer, `before` the part up to the
/// cursor.
pub fn suggest_type(full_text: &str, before: &str) -> Vec<SuggestionRequest> {
    let stripped = before.trim_start();

    if stripped.is_empty() {
        return vec![SuggestionRequest::Keyword, SuggestionRequest::Special];
    }

    if stripped.starts_with('.') || stripped.starts_with('\\') {
        return suggest_special(before, stripped);
    }

    let word = last_word(before, WordPolicy::Many);
    if word.contains('.') {
        return suggest_qualified(full_text, word);
    }

    let head = &before[..before.len() - word.len()];
    let trimmed = head.trim_end();
    if trimmed.is_empty() {
        // First token of the statement.
        return vec![SuggestionRequest::Keyword, SuggestionRequest::Special];
    }

    suggest_for_context(full_text, trimmed)
}

/// Argument grammars of the special commands that take completable
/// arguments.
fn suggest_special(before: &str, stripped: &str) -> Vec<SuggestionRequest> {
    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    let in_new_arg = before.ends_with(|c: char| c.is_whitespace());

    let Some(&command) = tokens.first() else {
        return vec![SuggestionRequest::Keyword, SuggestionRequest::Special];
    };

    if tokens.len() == 1 && !in_new_arg {
        // Still typing the command token itself.
        return vec![SuggestionRequest::Keyword, SuggestionRequest::Special];
    }

    let command = command.trim_end_matches(['+', '-']);
    match command {
        "\\f" => vec![SuggestionRequest::FavoriteQuery],
        ".import" => {
            // `.import <path> <table>`
            let arg_index = if in_new_arg { tokens.len() } else { tokens.len() - 1 };
            match arg_index {
                1 => vec![SuggestionRequest::FileName],
                2 => vec![SuggestionRequest::Table { schema: None }],
                _ => vec![],
            }
        }
        _ if FILE_ARG_COMMANDS.contains(&command) => vec![SuggestionRequest::FileName],
        ".mode" | "\\T" => vec![SuggestionRequest::TableFormat],
        "\\llm" | "\\ai" | ".llm" | ".ai" => vec![SuggestionRequest::Llm],
        "\\u" => vec![SuggestionRequest::Database],
        _ => vec![],
    }
}

/// `alias.partial`, `table.partial` or `schema.partial`.
fn suggest_qualified(full_text: &str, word: &str) -> Vec<SuggestionRequest> {
    let parent_raw = &word[..word.rfind('.').unwrap_or(0)];
    let parent = unquote(parent_raw).to_string();
    let tables = extract_tables(full_text);

    let scoped: Vec<TableRef> = tables
        .iter()
        .filter(|t| t.alias.as_deref() == Some(parent.as_str()) || t.name == parent)
        .cloned()
        .collect();
    let scoped = if scoped.is_empty() {
        vec![TableRef::new(None, &parent, None)]
    } else {
        scoped
    };

    vec![
        SuggestionRequest::Column {
            tables: scoped,
            drop_unique: false,
        },
        SuggestionRequest::Table {
            schema: Some(parent.clone()),
        },
        SuggestionRequest::View {
            schema: Some(parent.clone()),
        },
        SuggestionRequest::Function {
            schema: Some(parent),
        },
    ]
}

/// Walk the tokens before the word being typed and classify the clause.
fn suggest_for_context(full_text: &str, trimmed: &str) -> Vec<SuggestionRequest> {
    let tokens = scope::tokenize(trimmed);

    for token in tokens.iter().rev() {
        match token {
            Token::Punct(_) => continue,
            Token::Word(w) => {
                let lower = w.to_lowercase();
                if !CONTEXT_KEYWORDS.contains(&lower.as_str()) {
                    continue;
                }
                return dispatch_keyword(full_text, &lower);
            }
        }
    }

    vec![SuggestionRequest::Keyword]
}

fn dispatch_keyword(full_text: &str, keyword: &str) -> Vec<SuggestionRequest> {
    match keyword {
        "on" => {
            let tables = extract_tables(full_text);
            if tables.is_empty() {
                vec![SuggestionRequest::Table { schema: None }]
            } else {
                vec![SuggestionRequest::Alias {
                    aliases: scope::scope_aliases(&tables),
                }]
            }
        }
        "from" | "join" => vec![
            SuggestionRequest::Table { schema: None },
            SuggestionRequest::View { schema: None },
        ],
        "into" | "update" | "table" | "describe" | "desc" => {
            vec![SuggestionRequest::Table { schema: None }]
        }
        "use" | "database" => vec![SuggestionRequest::Database],
        "using" => vec![SuggestionRequest::Column {
            tables: extract_tables(full_text),
            drop_unique: true,
        }],
        "select" | "where" | "having" | "by" | "distinct" | "and" | "or" | "not" | "in"
        | "like" | "between" | "when" | "then" | "else" | "limit" | "offset" | "set" => {
            vec![
                SuggestionRequest::Column {
                    tables: extract_tables(full_text),
                    drop_unique: false,
                },
                SuggestionRequest::Function { schema: None },
                SuggestionRequest::Keyword,
            ]
        }
        _ => vec![SuggestionRequest::Keyword],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggest(text: &str) -> Vec<SuggestionRequest> {
        suggest_type(text, text)
    }

    #[test]
    fn empty_input_offers_keywords_and_specials() {
        assert_eq!(
            suggest(""),
            vec![SuggestionRequest::Keyword, SuggestionRequest::Special]
        );
    }

    #[test]
    fn first_word_offers_keywords_and_specials() {
        assert_eq!(
            suggest("SEL"),
            vec![SuggestionRequest::Keyword, SuggestionRequest::Special]
        );
        assert_eq!(
            suggest(".tab"),
            vec![SuggestionRequest::Keyword, SuggestionRequest::Special]
        );
    }

    #[test]
    fn from_clause_wants_relations() {
        assert_eq!(
            suggest("SELECT * FROM "),
            vec![
                SuggestionRequest::Table { schema: None },
                SuggestionRequest::View { schema: None },
            ]
        );
    }

    #[test]
    fn select_clause_wants_columns_functions_keywords() {
        let result = suggest("SELECT ");
        assert!(matches!(
            result[0],
            SuggestionRequest::Column { drop_unique: false, .. }
        ));
        assert_eq!(result[1], SuggestionRequest::Function { schema: None });
        assert_eq!(result[2], SuggestionRequest::Keyword);
    }

    #[test]
    fn where_clause_sees_statement_tables() {
        let result = suggest("SELECT * FROM users WHERE ");
        match &result[0] {
            SuggestionRequest::Column { tables, .. } => {
                assert_eq!(tables, &vec![TableRef::new(None, "users", None)]);
            }
            other => panic!("expected column request, got {:?}", other),
        }
    }

    #[test]
    fn dotted_identifier_scopes_columns() {
        let text = "SELECT u. FROM users u";
        let result = suggest_type(text, "SELECT u.");
        match &result[0] {
            SuggestionRequest::Column { tables, .. } => {
                assert_eq!(tables, &vec![TableRef::new(None, "users", Some("u"))]);
            }
            other => panic!("expected column request, got {:?}", other),
        }
        assert!(result.contains(&SuggestionRequest::Function {
            schema: Some("u".to_string())
        }));
    }

    #[test]
    fn on_clause_wants_aliases() {
        let text = "SELECT * FROM users u JOIN orders o ON ";
        assert_eq!(
            suggest(text),
            vec![SuggestionRequest::Alias {
                aliases: vec!["o".to_string(), "u".to_string()],
            }]
        );
    }

    #[test]
    fn on_clause_right_side_of_equals() {
        let text = "SELECT * FROM users u JOIN orders o ON o.user_id = ";
        assert_eq!(
            suggest(text),
            vec![SuggestionRequest::Alias {
                aliases: vec!["o".to_string(), "u".to_string()],
            }]
        );
    }

    #[test]
    fn using_paren_drops_unique_columns() {
        let text = "SELECT * FROM orders o JOIN customers c USING (";
        let result = suggest(text);
        match &result[0] {
            SuggestionRequest::Column { drop_unique, tables } => {
                assert!(*drop_unique);
                assert_eq!(tables.len(), 2);
            }
            other => panic!("expected column request, got {:?}", other),
        }
    }

    #[test]
    fn use_statement_wants_databases() {
        assert_eq!(suggest("use "), vec![SuggestionRequest::Database]);
    }

    #[test]
    fn favorite_shortcut_wants_query_names() {
        assert_eq!(suggest("\\f "), vec![SuggestionRequest::FavoriteQuery]);
        assert_eq!(suggest("\\f si"), vec![SuggestionRequest::FavoriteQuery]);
    }

    #[test]
    fn import_positional_arguments() {
        assert_eq!(suggest(".import "), vec![SuggestionRequest::FileName]);
        assert_eq!(
            suggest(".import data.csv "),
            vec![SuggestionRequest::Table { schema: None }]
        );
        assert_eq!(suggest(".import data.csv t1 "), Vec::<SuggestionRequest>::new());
    }

    #[test]
    fn mode_wants_table_formats() {
        assert_eq!(suggest(".mode "), vec![SuggestionRequest::TableFormat]);
    }

    #[test]
    fn open_wants_file_names() {
        assert_eq!(suggest(".open "), vec![SuggestionRequest::FileName]);
        assert_eq!(suggest(".read sc"), vec![SuggestionRequest::FileName]);
    }

    #[test]
    fn llm_wants_subcommands() {
        assert_eq!(suggest("\\llm "), vec![SuggestionRequest::Llm]);
    }

    #[test]
    fn unknown_context_falls_back_to_keywords() {
        assert_eq!(suggest("vacuum int"), vec![SuggestionRequest::Keyword]);
    }

    #[test]
    fn unquote_strips_pairs() {
        assert_eq!(unquote("\"users\""), "users");
        assert_eq!(unquote("`users`"), "users");
        assert_eq!(unquote("users"), "users");
        assert_eq!(unquote("\"users"), "\"users");
    }
}
