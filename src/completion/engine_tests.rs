use super::*;

type Source<T> = Result<T, String>;

fn completer() -> SqlCompleter {
    let mut c = SqlCompleter::new(
        vec!["ascii".to_string(), "csv".to_string(), "vertical".to_string()],
        KeywordCasing::Auto,
    );
    c.set_dbname("main");
    c.extend_schemata("main");
    c.extend_relations(
        Source::Ok(vec![
            "users".to_string(),
            "orders".to_string(),
            "user_roles".to_string(),
            "select".to_string(),
        ]),
        RelKind::Tables,
    );
    c.extend_columns(
        Source::Ok(vec![
            ("users".to_string(), "id".to_string()),
            ("users".to_string(), "email".to_string()),
            ("users".to_string(), "full name".to_string()),
            ("orders".to_string(), "id".to_string()),
            ("orders".to_string(), "user_id".to_string()),
            ("select".to_string(), "id".to_string()),
        ]),
        RelKind::Tables,
    );
    c
}

fn texts(completions: &[SqlCompletion]) -> Vec<&str> {
    completions.iter().map(|c| c.text.as_str()).collect()
}

#[test]
fn escape_name_quotes_reserved_and_invalid() {
    let c = completer();
    assert_eq!(c.escape_name("users"), "users");
    assert_eq!(c.escape_name("select"), "`select`");
    assert_eq!(c.escape_name("MAX"), "`MAX`");
    assert_eq!(c.escape_name("full name"), "`full name`");
    assert_eq!(c.escape_name("1abc"), "`1abc`");
    assert_eq!(c.escape_name("order-items"), "`order-items`");
    assert_eq!(c.escape_name("_tmp$1"), "_tmp$1");
    assert_eq!(c.escape_name(""), "");
}

#[test]
fn fuzzy_match_requires_subsequence() {
    let tables = vec!["users", "user_roles", "orders"];
    let matched = SqlCompleter::find_matches("usr", tables, false, true, None, WordPolicy::Most);
    // Equal spans tie-break on the candidate name.
    assert_eq!(texts(&matched), vec!["user_roles", "users"]);
}

#[test]
fn fuzzy_match_ranks_tighter_spans_first() {
    let items = vec!["america", "arm", "alarm"];
    let matched = SqlCompleter::find_matches("am", items, false, true, None, WordPolicy::Most);
    // "america" matches "am" at offset 0 with span 2; the others spread the
    // characters over a wider window.
    assert_eq!(texts(&matched)[0], "america");
}

#[test]
fn prefix_match_honors_start_only() {
    let matched =
        SqlCompleter::find_matches("SEL", KEYWORDS, true, false, None, WordPolicy::Many);
    assert_eq!(texts(&matched), vec!["SELECT"]);

    let substring =
        SqlCompleter::find_matches("LECT", KEYWORDS, false, false, None, WordPolicy::Many);
    assert!(texts(&substring).contains(&"SELECT"));
    let start_only =
        SqlCompleter::find_matches("LECT", KEYWORDS, true, false, None, WordPolicy::Many);
    assert!(start_only.is_empty());
}

#[test]
fn auto_casing_follows_last_typed_char() {
    let lower =
        SqlCompleter::find_matches("sel", KEYWORDS, true, false, Some(KeywordCasing::Auto), WordPolicy::Many);
    assert_eq!(texts(&lower), vec!["select"]);
    let upper =
        SqlCompleter::find_matches("SEl", KEYWORDS, true, false, Some(KeywordCasing::Auto), WordPolicy::Many);
    assert_eq!(texts(&upper), vec!["select"]);
    let upper =
        SqlCompleter::find_matches("SEL", KEYWORDS, true, false, Some(KeywordCasing::Auto), WordPolicy::Many);
    assert_eq!(texts(&upper), vec!["SELECT"]);
}

#[test]
fn keyword_completion_at_statement_start() {
    let c = completer();
    let text = "SEL";
    let matched = c.get_completions(text, text.len());
    assert!(texts(&matched).contains(&"SELECT"));
    assert_eq!(matched[0].span, 3);
}

#[test]
fn tables_offered_after_from() {
    let c = completer();
    let text = "SELECT * FROM ";
    let matched = c.get_completions(text, text.len());
    let names = texts(&matched);
    assert!(names.contains(&"users"));
    assert!(names.contains(&"orders"));
    // Reserved-word table names surface in their escaped form.
    assert!(names.contains(&"`select`"));
}

#[test]
fn alias_dot_scopes_columns_to_one_table() {
    let c = completer();
    let text = "SELECT u. FROM users u";
    let matched = c.get_completions(text, 9);
    let names = texts(&matched);
    assert!(names.contains(&"id"));
    assert!(names.contains(&"email"));
    assert!(names.contains(&"`full name`"));
    assert!(!names.contains(&"user_id"));
}

#[test]
fn escaped_table_resolves_scoped_columns() {
    let c = completer();
    let text = "SELECT `select`. FROM `select`";
    let matched = c.get_completions(text, 16);
    assert!(texts(&matched).contains(&"id"));
}

#[test]
fn using_offers_only_shared_columns() {
    let c = completer();
    let text = "SELECT * FROM users u JOIN orders o USING (";
    let matched = c.get_completions(text, text.len());
    let names = texts(&matched);
    assert!(names.contains(&"id"));
    assert!(!names.contains(&"email"));
    assert!(!names.contains(&"user_id"));
    assert!(!names.contains(&"*"));
}

#[test]
fn on_clause_offers_aliases() {
    let c = completer();
    let text = "SELECT * FROM users u JOIN orders o ON ";
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec!["o", "u"]);
}

#[test]
fn failing_source_degrades_to_empty() {
    let mut c = SqlCompleter::new(Vec::new(), KeywordCasing::Auto);
    c.set_dbname("main");
    c.extend_schemata("main");
    c.extend_relations(Source::Err("no database".to_string()), RelKind::Tables);
    c.extend_columns(
        Err::<Vec<(String, String)>, _>("no database".to_string()),
        RelKind::Tables,
    );
    c.extend_functions(Source::Err("no database".to_string()));

    let text = "SELECT * FROM ";
    assert!(c.get_completions(text, text.len()).is_empty());
}

#[test]
fn reset_drops_metadata_but_keeps_vocabulary() {
    let mut c = completer();
    c.reset_completions();

    let text = "SELECT * FROM ";
    assert!(c.get_completions(text, text.len()).is_empty());

    let keyword = "SEL";
    assert!(!c.get_completions(keyword, keyword.len()).is_empty());

    // Extending after a reset works against the new schema, with no
    // leakage from the dropped metadata.
    c.set_dbname("main");
    c.extend_schemata("main");
    c.extend_relations(Source::Ok(vec!["fresh".to_string()]), RelKind::Tables);
    c.extend_columns(
        Source::Ok(vec![("fresh".to_string(), "a".to_string())]),
        RelKind::Tables,
    );
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec!["fresh"]);
    let cols = c.populate_scoped_cols(&[TableRef::new(None, "fresh", None)]);
    assert_eq!(cols, vec!["*".to_string(), "a".to_string()]);
}

#[test]
fn special_commands_offered_with_prefix_match() {
    let mut c = completer();
    c.extend_special_commands(vec![
        ".tables".to_string(),
        ".schema".to_string(),
        "\\d".to_string(),
    ]);
    let text = ".ta";
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec![".tables"]);
    // The leading dot stays part of the word, so the span covers it.
    assert_eq!(matched[0].span, 3);
}

#[test]
fn table_formats_offered_after_mode() {
    let c = completer();
    let text = ".mode c";
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec!["csv"]);
}

#[test]
fn favorite_names_offered_after_f() {
    let mut c = completer();
    c.extend_favorite_queries(vec!["signups".to_string(), "churn".to_string()]);
    let text = "\\f si";
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec!["signups"]);
}

#[test]
fn views_tracked_separately_from_tables() {
    let mut c = completer();
    c.extend_relations(Source::Ok(vec!["active_users".to_string()]), RelKind::Views);
    c.extend_columns(
        Source::Ok(vec![("active_users".to_string(), "last_seen".to_string())]),
        RelKind::Views,
    );

    let text = "SELECT * FROM act";
    let matched = c.get_completions(text, text.len());
    assert!(texts(&matched).contains(&"active_users"));

    // View columns resolve through the scoped-column fallback.
    let cols = c.populate_scoped_cols(&[TableRef::new(None, "active_users", None)]);
    assert!(cols.contains(&"last_seen".to_string()));
}

#[test]
fn database_names_offered_after_use() {
    let mut c = completer();
    c.extend_database_names(Source::Ok(vec!["main".to_string(), "aux".to_string()]));
    let text = "use a";
    let matched = c.get_completions(text, text.len());
    assert_eq!(texts(&matched), vec!["aux", "main"]);
}

#[test]
fn empty_word_matches_everything_alphabetically() {
    let items = vec!["b", "a", "c"];
    let matched = SqlCompleter::find_matches("", items, false, true, None, WordPolicy::Most);
    assert_eq!(texts(&matched), vec!["a", "b", "c"]);
    assert!(matched.iter().all(|m| m.span == 0));
}
