/*!
 * Lexical scope resolution for partial SQL
 *
 * Tokenizes possibly malformed statement text so the suggestion layer can
 * classify the cursor position. Everything here is tolerant: unterminated
 * quotes, trailing commas and half-typed identifiers must never error.
 */

use regex::Regex;
use std::sync::OnceLock;

/// Word-boundary policy used when extracting the token under the cursor.
///
/// `Most` treats a dot as a boundary (general SQL text). `Many` keeps
/// leading backslash/dot markers so `\d` or `.tables` match as whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordPolicy {
    Most,
    Many,
}

fn most_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^.():,\s]+)$").unwrap())
}

fn many_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^():,\s]+)$").unwrap())
}

/// Last word of `text` under the given boundary policy. Empty when the text
/// ends in whitespace.
pub fn last_word(text: &str, policy: WordPolicy) -> &str {
    if text.is_empty() || text.ends_with(|c: char| c.is_whitespace()) {
        return "";
    }
    let re = match policy {
        WordPolicy::Most => most_re(),
        WordPolicy::Many => many_re(),
    };
    re.find(text).map(|m| m.as_str()).unwrap_or("")
}

/// A relation reference appearing in the statement scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str, alias: Option<&str>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: alias.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Punct(char),
}

impl Token {
    fn word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Punct(_) => None,
        }
    }

    fn is_punct(&self, c: char) -> bool {
        matches!(self, Token::Punct(p) if *p == c)
    }
}

/// Lossy tokenizer for partial SQL. Quoted identifiers and string literals
/// come back unquoted; an unterminated quote swallows the rest of the input
/// instead of failing.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' || c == '\'' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            chars.next();
            let mut word = String::new();
            for q in chars.by_ref() {
                if q == close {
                    break;
                }
                word.push(q);
            }
            tokens.push(Token::Word(word));
        } else if c.is_alphanumeric() || c == '_' || c == '$' || c == '*' || c == '\\' {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_alphanumeric() || w == '_' || w == '$' || w == '*' || w == '\\' {
                    word.push(w);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else {
            tokens.push(Token::Punct(c));
            chars.next();
        }
    }

    tokens
}

const CLAUSE_STARTERS: &[&str] = &["from", "join", "update", "into", "table", "describe"];

const REF_TERMINATORS: &[&str] = &[
    "on", "using", "where", "group", "order", "having", "limit", "offset", "union", "intersect",
    "except", "join", "inner", "left", "right", "full", "outer", "cross", "natural", "set",
    "values", "select", "when", "then", "else", "end",
];

fn is_terminator(word: &str) -> bool {
    REF_TERMINATORS.contains(&word.to_lowercase().as_str())
}

/// Extract the `(schema, name, alias)` relation references from a statement.
///
/// Scans FROM/JOIN/UPDATE/INSERT INTO clauses once; subqueries are skipped
/// wholesale. Works on incomplete statements, returning whatever references
/// are resolvable so far.
pub fn extract_tables(sql: &str) -> Vec<TableRef> {
    let tokens = tokenize(sql);
    let mut refs = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let starter = tokens[i]
            .word()
            .map(|w| CLAUSE_STARTERS.contains(&w.to_lowercase().as_str()))
            .unwrap_or(false);
        i += 1;
        if !starter {
            continue;
        }

        // Parse comma-separated references until a clause keyword.
        loop {
            // Subquery in place of a relation: skip the balanced parens and
            // its alias, which names no real table.
            if i < tokens.len() && tokens[i].is_punct('(') {
                let mut depth = 0;
                while i < tokens.len() {
                    if tokens[i].is_punct('(') {
                        depth += 1;
                    } else if tokens[i].is_punct(')') {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    i += 1;
                }
                if let Some(w) = tokens.get(i).and_then(Token::word) {
                    if w.eq_ignore_ascii_case("as") {
                        i += 1;
                    }
                }
                if let Some(w) = tokens.get(i).and_then(Token::word) {
                    if !is_terminator(w) {
                        i += 1;
                    }
                }
                if tokens.get(i).map(|t| t.is_punct(',')).unwrap_or(false) {
                    i += 1;
                    continue;
                }
                break;
            }

            let name = match tokens.get(i).and_then(Token::word) {
                Some(w) if !is_terminator(w) => w.to_string(),
                _ => break,
            };
            i += 1;

            let (schema, name) = if tokens.get(i).map(|t| t.is_punct('.')).unwrap_or(false) {
                i += 1;
                match tokens.get(i).and_then(Token::word) {
                    Some(w) => {
                        let n = w.to_string();
                        i += 1;
                        (Some(name), n)
                    }
                    // `schema.` with the name still being typed
                    None => (Some(name), String::new()),
                }
            } else {
                (None, name)
            };

            let mut alias = None;
            if let Some(w) = tokens.get(i).and_then(Token::word) {
                if w.eq_ignore_ascii_case("as") {
                    i += 1;
                    if let Some(a) = tokens.get(i).and_then(Token::word) {
                        alias = Some(a.to_string());
                        i += 1;
                    }
                } else if !is_terminator(w) {
                    alias = Some(w.to_string());
                    i += 1;
                }
            }

            if !name.is_empty() {
                refs.push(TableRef {
                    schema,
                    name,
                    alias,
                });
            }

            if tokens.get(i).map(|t| t.is_punct(',')).unwrap_or(false) {
                i += 1;
            } else {
                break;
            }
        }
    }

    refs
}

/// Aliases (falling back to relation names) declared in the statement,
/// sorted for stable suggestion output.
pub fn scope_aliases(tables: &[TableRef]) -> Vec<String> {
    let mut aliases: Vec<String> = tables
        .iter()
        .map(|t| t.alias.clone().unwrap_or_else(|| t.name.clone()))
        .collect();
    aliases.sort();
    aliases.dedup();
    aliases
}

fn first_token(query: &str) -> Option<String> {
    for line in query.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("--") {
            continue;
        }
        return line.split_whitespace().next().map(|t| t.to_lowercase());
    }
    None
}

/// True when the statement's first significant token is one of `prefixes`.
pub fn query_starts_with(query: &str, prefixes: &[&str]) -> bool {
    first_token(query)
        .map(|t| prefixes.contains(&t.trim_end_matches(';')))
        .unwrap_or(false)
}

/// True when any of the `;`-separated statements starts with one of
/// `prefixes`.
pub fn queries_start_with(sql: &str, prefixes: &[&str]) -> bool {
    sql.split(';')
        .any(|query| query_starts_with(query, prefixes))
}

/// True when the text contains a statement that can destroy data.
pub fn is_destructive(sql: &str) -> bool {
    queries_start_with(sql, &["drop", "shutdown", "delete", "truncate", "alter"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(sql: &str) -> Vec<TableRef> {
        extract_tables(sql)
    }

    fn r(schema: Option<&str>, name: &str, alias: Option<&str>) -> TableRef {
        TableRef::new(schema, name, alias)
    }

    #[test]
    fn empty_string_has_no_tables() {
        assert!(extract_tables("").is_empty());
    }

    #[test]
    fn simple_select_single_table() {
        assert_eq!(refs("select * from abc"), vec![r(None, "abc", None)]);
    }

    #[test]
    fn simple_select_schema_qualified() {
        assert_eq!(refs("select * from abc.def"), vec![r(Some("abc"), "def", None)]);
    }

    #[test]
    fn simple_select_multiple_tables() {
        let mut t = refs("select * from abc, def");
        t.sort();
        assert_eq!(t, vec![r(None, "abc", None), r(None, "def", None)]);
    }

    #[test]
    fn multiple_tables_schema_qualified() {
        let mut t = refs("select * from abc.def, ghi.jkl");
        t.sort();
        assert_eq!(t, vec![r(Some("abc"), "def", None), r(Some("ghi"), "jkl", None)]);
    }

    #[test]
    fn select_with_hanging_comma() {
        assert_eq!(refs("select a, from abc"), vec![r(None, "abc", None)]);
        let mut t = refs("select a, from abc, def");
        t.sort();
        assert_eq!(t, vec![r(None, "abc", None), r(None, "def", None)]);
    }

    #[test]
    fn hanging_period_keeps_aliases() {
        let mut t = refs("SELECT t1. FROM tabl1 t1, tabl2 t2");
        t.sort();
        assert_eq!(t, vec![r(None, "tabl1", Some("t1")), r(None, "tabl2", Some("t2"))]);
    }

    #[test]
    fn insert_single_table() {
        assert_eq!(
            refs("insert into abc (id, name) values (1, \"def\")"),
            vec![r(None, "abc", None)]
        );
    }

    #[test]
    fn update_table() {
        assert_eq!(refs("update abc set id = 1"), vec![r(None, "abc", None)]);
        assert_eq!(refs("update abc.def set id = 1"), vec![r(Some("abc"), "def", None)]);
    }

    #[test]
    fn join_tables_with_aliases() {
        let mut t = refs("SELECT * FROM abc a JOIN def d ON a.id = d.num");
        t.sort();
        assert_eq!(t, vec![r(None, "abc", Some("a")), r(None, "def", Some("d"))]);
    }

    #[test]
    fn join_tables_schema_qualified() {
        assert_eq!(
            refs("SELECT * FROM abc.def x JOIN ghi.jkl y ON x.id = y.num"),
            vec![r(Some("abc"), "def", Some("x")), r(Some("ghi"), "jkl", Some("y"))]
        );
    }

    #[test]
    fn join_with_as_alias() {
        assert_eq!(
            refs("SELECT * FROM my_table AS m WHERE m.a > 5"),
            vec![r(None, "my_table", Some("m"))]
        );
    }

    #[test]
    fn subquery_is_skipped() {
        assert_eq!(
            refs("select * from (select 1 from x) q join abc on q.a = abc.a"),
            vec![r(None, "abc", None)]
        );
    }

    #[test]
    fn last_word_policies() {
        assert_eq!(last_word("select foo", WordPolicy::Most), "foo");
        assert_eq!(last_word("select foo ", WordPolicy::Most), "");
        assert_eq!(last_word("select u.id", WordPolicy::Most), "id");
        assert_eq!(last_word("select u.id", WordPolicy::Many), "u.id");
        assert_eq!(last_word(r"\d", WordPolicy::Many), r"\d");
        assert_eq!(last_word(".tables", WordPolicy::Many), ".tables");
        assert_eq!(last_word("", WordPolicy::Most), "");
    }

    #[test]
    fn starts_with_skips_comments() {
        assert!(query_starts_with("USE test;", &["use"]));
        assert!(!query_starts_with("DROP DATABASE test;", &["use"]));
        assert!(query_starts_with("# comment\nUSE test;", &["use"]));
    }

    #[test]
    fn queries_start_with_any_statement() {
        let sql = "# comment\nshow databases;use foo;";
        assert!(queries_start_with(sql, &["show", "select"]));
        assert!(queries_start_with(sql, &["use", "drop"]));
        assert!(!queries_start_with(sql, &["delete", "update"]));
    }

    #[test]
    fn destructive_statements() {
        assert!(is_destructive("use test;\nshow databases;\ndrop database foo;"));
        assert!(!is_destructive("select * from foo;"));
    }
}
