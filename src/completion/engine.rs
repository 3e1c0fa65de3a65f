/*!
 * Completion candidate engine
 *
 * Owns the metadata index (databases, tables, views, columns, functions,
 * special commands, favorite queries) and turns suggestion requests into
 * ranked candidate strings. An instance is built from scratch by the
 * refresher and swapped into the session whole; it is never mutated while
 * live.
 */

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::Path;

use super::scope::{last_word, TableRef, WordPolicy};
use super::suggestion::{suggest_type, SuggestionRequest};
use crate::special::llm;

/// SQLite keywords offered for keyword completion. Multi-word entries are
/// split when building the reserved-word set used by `escape_name`.
pub const KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "ATTACH",
    "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BIGINT", "BLOB", "BOOLEAN", "BY", "CASCADE",
    "CASE", "CAST", "CHARACTER", "CHECK", "CLOB", "COLLATE", "COLUMN", "COMMIT", "CONFLICT",
    "CONSTRAINT", "CREATE", "CROSS", "CURRENT", "CURRENT_DATE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "DATABASE", "DATE", "DATETIME", "DECIMAL", "DEFAULT", "DEFERRABLE",
    "DEFERRED", "DELETE", "DETACH", "DISTINCT", "DO", "DOUBLE PRECISION", "DOUBLE", "DROP",
    "EACH", "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FLOAT", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GLOB", "GROUP", "HAVING",
    "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED", "INITIALLY", "INNER", "INSERT",
    "INSTEAD", "INT", "INT2", "INT8", "INTEGER", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LEFT", "LIKE", "LIMIT", "MATCH", "MEDIUMINT", "NATIVE CHARACTER", "NATURAL",
    "NCHAR", "NO", "NOT", "NOTHING", "NULL", "NULLS FIRST", "NULLS LAST", "NUMERIC", "NVARCHAR",
    "OF", "OFFSET", "ON", "OR", "ORDER BY", "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA",
    "PRECEDING", "PRIMARY", "QUERY", "RAISE", "RANGE", "REAL", "RECURSIVE", "REFERENCES",
    "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RIGHT", "ROLLBACK", "ROW",
    "ROWS", "SAVEPOINT", "SELECT", "SET", "SMALLINT", "TABLE", "TEMP", "TEMPORARY", "TEXT",
    "THEN", "TINYINT", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED", "UNION", "UNIQUE",
    "UNSIGNED BIG INT", "UPDATE", "USING", "VACUUM", "VALUES", "VARCHAR", "VARYING CHARACTER",
    "VIEW", "VIRTUAL", "WHEN", "WHERE", "WINDOW", "WITH", "WITHOUT",
];

/// Built-in SQLite function names. Offered with prefix matching only, and
/// only when no schema qualifier precedes the cursor.
pub const FUNCTIONS: &[&str] = &[
    "ABS", "AVG", "CHANGES", "CHAR", "COALESCE", "COUNT", "CUME_DIST", "DATE", "DATETIME",
    "DENSE_RANK", "GLOB", "GROUP_CONCAT", "HEX", "IFNULL", "INSTR", "JSON", "JSON_ARRAY",
    "JSON_ARRAY_LENGTH", "JSON_EACH", "JSON_EXTRACT", "JSON_GROUP_ARRAY", "JSON_GROUP_OBJECT",
    "JSON_INSERT", "JSON_OBJECT", "JSON_PATCH", "JSON_QUOTE", "JSON_REMOVE", "JSON_REPLACE",
    "JSON_SET", "JSON_TREE", "JSON_TYPE", "JSON_VALID", "JULIANDAY", "LAG", "LAST_INSERT_ROWID",
    "LENGTH", "LIKELIHOOD", "LIKELY", "LOAD_EXTENSION", "LOWER", "LTRIM", "MAX", "MIN", "NTILE",
    "NULLIF", "PERCENT_RANK", "PRINTF", "QUOTE", "RANDOM", "RANDOMBLOB", "RANK", "REPLACE",
    "ROUND", "ROW_NUMBER", "RTRIM", "SOUNDEX", "SQLITE_COMPILEOPTION_GET",
    "SQLITE_COMPILEOPTION_USED", "SQLITE_OFFSET", "SQLITE_SOURCE_ID", "SQLITE_VERSION",
    "STRFTIME", "SUBSTR", "SUM", "TIME", "TOTAL", "TOTAL_CHANGES", "TRIM",
];

/// Output casing for keyword-like candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordCasing {
    Upper,
    Lower,
    /// Follow the user's typing: lower if the last typed character is
    /// lowercase, upper otherwise.
    Auto,
}

impl KeywordCasing {
    pub fn parse(value: &str) -> Self {
        match value {
            "upper" => KeywordCasing::Upper,
            "lower" => KeywordCasing::Lower,
            _ => KeywordCasing::Auto,
        }
    }
}

/// A ranked completion candidate. `span` is the number of characters at the
/// end of the input the candidate replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCompletion {
    pub text: String,
    pub span: usize,
}

impl SqlCompletion {
    fn new(text: impl Into<String>, span: usize) -> Self {
        Self { text: text.into(), span }
    }
}

/// Which relation map an extend call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Tables,
    Views,
}

type RelationMap = HashMap<String, HashMap<String, Vec<String>>>;

/// The completion index plus matching/ranking logic.
pub struct SqlCompleter {
    reserved_words: HashSet<String>,
    name_pattern: Regex,
    keyword_casing: KeywordCasing,
    special_commands: Vec<String>,
    table_formats: Vec<String>,
    favorite_names: Vec<String>,
    databases: Vec<String>,
    dbname: String,
    tables: RelationMap,
    views: RelationMap,
    functions: HashMap<String, Vec<String>>,
    all_completions: HashSet<String>,
}

impl SqlCompleter {
    pub fn new(supported_formats: Vec<String>, keyword_casing: KeywordCasing) -> Self {
        let mut reserved_words = HashSet::new();
        for keyword in KEYWORDS {
            for part in keyword.split_whitespace() {
                reserved_words.insert(part.to_string());
            }
        }

        let mut completer = Self {
            reserved_words,
            name_pattern: Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9$]*$").unwrap(),
            keyword_casing,
            special_commands: Vec::new(),
            table_formats: supported_formats,
            favorite_names: Vec::new(),
            databases: Vec::new(),
            dbname: String::new(),
            tables: HashMap::new(),
            views: HashMap::new(),
            functions: HashMap::new(),
            all_completions: HashSet::new(),
        };
        completer.reset_completions();
        completer
    }

    /// Wrap an identifier in backticks when it would be syntactically
    /// invalid or ambiguous unquoted.
    pub fn escape_name(&self, name: &str) -> String {
        let upper = name.to_uppercase();
        if !name.is_empty()
            && (!self.name_pattern.is_match(name)
                || self.reserved_words.contains(&upper)
                || FUNCTIONS.contains(&upper.as_str()))
        {
            format!("`{}`", name)
        } else {
            name.to_string()
        }
    }

    fn escaped_names(&self, names: &[String]) -> Vec<String> {
        names.iter().map(|n| self.escape_name(n)).collect()
    }

    /// Special commands can only appear at the start of a line, so they are
    /// kept out of `all_completions`.
    pub fn extend_special_commands(&mut self, commands: Vec<String>) {
        self.special_commands.extend(commands);
    }

    pub fn extend_favorite_queries(&mut self, names: Vec<String>) {
        self.favorite_names.extend(names);
    }

    pub fn extend_database_names<E: Display>(&mut self, databases: Result<Vec<String>, E>) {
        let databases = databases.unwrap_or_else(|e| {
            tracing::error!("Failed to get database names: {e}");
            Vec::new()
        });
        self.databases.extend(databases);
    }

    pub fn extend_schemata(&mut self, schema: &str) {
        self.tables.entry(schema.to_string()).or_default();
        self.views.entry(schema.to_string()).or_default();
        self.functions.entry(schema.to_string()).or_default();
        self.all_completions.insert(schema.to_string());
    }

    /// Add table or view names under the current schema. The row source may
    /// fail (e.g. no database connected); that degrades to an empty batch.
    pub fn extend_relations<E: Display>(&mut self, data: Result<Vec<String>, E>, kind: RelKind) {
        let data = data.unwrap_or_else(|e| {
            tracing::error!("Failed to get relation names: {e}");
            Vec::new()
        });
        let data = self.escaped_names(&data);

        let dbname = self.dbname.clone();
        let metadata = match kind {
            RelKind::Tables => &mut self.tables,
            RelKind::Views => &mut self.views,
        };
        for relname in data {
            match metadata.get_mut(&dbname) {
                // Every relation starts with an asterisk column.
                Some(schema) => {
                    schema.insert(relname.clone(), vec!["*".to_string()]);
                }
                None => {
                    tracing::error!(
                        "{:?} {:?} listed in unrecognized schema {:?}",
                        kind,
                        relname,
                        dbname
                    );
                }
            }
            self.all_completions.insert(relname);
        }
    }

    /// Add `(relation, column)` pairs under the current schema.
    pub fn extend_columns<E: Display>(
        &mut self,
        column_data: Result<Vec<(String, String)>, E>,
        kind: RelKind,
    ) {
        let column_data = column_data.unwrap_or_else(|e| {
            tracing::error!("Failed to get column names: {e}");
            Vec::new()
        });

        let escaped: Vec<(String, String)> = column_data
            .into_iter()
            .map(|(rel, col)| (self.escape_name(&rel), self.escape_name(&col)))
            .collect();

        let dbname = self.dbname.clone();
        let metadata = match kind {
            RelKind::Tables => &mut self.tables,
            RelKind::Views => &mut self.views,
        };
        for (relname, column) in escaped {
            if let Some(columns) = metadata
                .get_mut(&dbname)
                .and_then(|schema| schema.get_mut(&relname))
            {
                columns.push(column.clone());
            }
            self.all_completions.insert(column);
        }
    }

    pub fn extend_functions<E: Display>(&mut self, func_data: Result<Vec<String>, E>) {
        let func_data = func_data.unwrap_or_else(|e| {
            tracing::error!("Failed to get function names: {e}");
            Vec::new()
        });
        let func_data = self.escaped_names(&func_data);

        for func in func_data {
            self.functions
                .entry(self.dbname.clone())
                .or_default()
                .push(func.clone());
            self.all_completions.insert(func);
        }
    }

    pub fn set_dbname(&mut self, dbname: &str) {
        self.dbname = dbname.to_string();
    }

    /// Drop all metadata, keeping only the keyword and built-in function
    /// vocabularies. Used when switching databases.
    pub fn reset_completions(&mut self) {
        self.databases = Vec::new();
        self.dbname = String::new();
        self.tables = HashMap::new();
        self.views = HashMap::new();
        self.functions = HashMap::new();
        self.all_completions = KEYWORDS
            .iter()
            .chain(FUNCTIONS.iter())
            .map(|s| s.to_string())
            .collect();
    }

    /// Find completion matches for the last word of `text` within
    /// `collection`.
    ///
    /// Fuzzy mode requires the input characters as a subsequence and ranks
    /// by (match span, match start); prefix mode requires a literal
    /// substring, at position 0 when `start_only` is set. Ties break by the
    /// candidate's natural sort order.
    pub fn find_matches<I, S>(
        text: &str,
        collection: I,
        start_only: bool,
        fuzzy: bool,
        casing: Option<KeywordCasing>,
        policy: WordPolicy,
    ) -> Vec<SqlCompletion>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let last = last_word(text, policy);
        let needle = last.to_lowercase();
        let span = last.chars().count();

        let mut sorted: Vec<String> = collection
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        sorted.sort();

        let mut ranked: Vec<(usize, usize, String)> = Vec::new();

        if fuzzy {
            let pattern: String = needle
                .chars()
                .map(|c| regex::escape(&c.to_string()))
                .collect::<Vec<_>>()
                .join(".*?");
            // The needle characters must appear in order; the tighter and
            // earlier the match, the better the rank.
            if let Ok(pat) = Regex::new(&format!("({pattern})")) {
                for item in sorted {
                    if let Some(m) = pat.find(&item.to_lowercase()) {
                        ranked.push((m.end() - m.start(), m.start(), item));
                    }
                }
            }
        } else {
            for item in sorted {
                let lowered = item.to_lowercase();
                let found = if start_only {
                    if lowered.starts_with(&needle) { Some(0) } else { None }
                } else {
                    lowered.find(&needle)
                };
                if let Some(point) = found {
                    ranked.push((needle.len(), point, item));
                }
            }
        }

        ranked.sort();

        let casing = match casing {
            Some(KeywordCasing::Auto) => {
                if last.chars().last().map(|c| c.is_lowercase()).unwrap_or(false) {
                    Some(KeywordCasing::Lower)
                } else {
                    Some(KeywordCasing::Upper)
                }
            }
            other => other,
        };

        ranked
            .into_iter()
            .map(|(_, _, item)| {
                let text = match casing {
                    Some(KeywordCasing::Upper) => item.to_uppercase(),
                    Some(KeywordCasing::Lower) => item.to_lowercase(),
                    _ => item,
                };
                SqlCompletion::new(text, span)
            })
            .collect()
    }

    /// Ranked completions for the cursor position.
    ///
    /// Never errors: metadata gaps and unresolvable references contribute no
    /// candidates instead of failing.
    pub fn get_completions(&self, text: &str, pos: usize) -> Vec<SqlCompletion> {
        let before = text.get(..pos).unwrap_or(text);
        let word = word_before_cursor(before);
        let mut completions = Vec::new();

        for suggestion in suggest_type(text, before) {
            tracing::debug!("Suggestion type: {:?}", suggestion);
            match suggestion {
                SuggestionRequest::Column { tables, drop_unique } => {
                    let mut scoped = self.populate_scoped_cols(&tables);
                    if drop_unique {
                        // Only columns appearing in more than one of the
                        // joined tables make sense inside USING (...).
                        let mut counts: HashMap<&String, usize> = HashMap::new();
                        for col in &scoped {
                            *counts.entry(col).or_insert(0) += 1;
                        }
                        let mut shared: Vec<String> = counts
                            .into_iter()
                            .filter(|(col, count)| *count > 1 && col.as_str() != "*")
                            .map(|(col, _)| col.clone())
                            .collect();
                        shared.sort();
                        scoped = shared;
                    }
                    completions.extend(Self::find_matches(
                        word, &scoped, false, true, None, WordPolicy::Most,
                    ));
                }
                SuggestionRequest::Function { schema } => {
                    // User-defined functions use fuzzy matching.
                    let funcs = self.populate_functions(schema.as_deref());
                    completions.extend(Self::find_matches(
                        word, &funcs, false, true, None, WordPolicy::Most,
                    ));
                    // Built-ins use prefix matching, and only without a
                    // schema qualifier: `u.` denotes a table, not a schema.
                    if schema.is_none() {
                        completions.extend(Self::find_matches(
                            word,
                            FUNCTIONS,
                            true,
                            false,
                            Some(self.keyword_casing),
                            WordPolicy::Most,
                        ));
                    }
                }
                SuggestionRequest::Table { schema } => {
                    let names = self.populate_schema_objects(schema.as_deref(), RelKind::Tables);
                    completions.extend(Self::find_matches(
                        word, &names, false, true, None, WordPolicy::Most,
                    ));
                }
                SuggestionRequest::View { schema } => {
                    let names = self.populate_schema_objects(schema.as_deref(), RelKind::Views);
                    completions.extend(Self::find_matches(
                        word, &names, false, true, None, WordPolicy::Most,
                    ));
                }
                SuggestionRequest::Alias { aliases } => {
                    completions.extend(Self::find_matches(
                        word, &aliases, false, true, None, WordPolicy::Most,
                    ));
                }
                SuggestionRequest::Database => {
                    completions.extend(Self::find_matches(
                        word,
                        &self.databases,
                        false,
                        true,
                        None,
                        WordPolicy::Most,
                    ));
                }
                SuggestionRequest::Keyword => {
                    completions.extend(Self::find_matches(
                        word,
                        KEYWORDS,
                        true,
                        false,
                        Some(self.keyword_casing),
                        WordPolicy::Many,
                    ));
                }
                SuggestionRequest::Special => {
                    completions.extend(Self::find_matches(
                        word,
                        &self.special_commands,
                        true,
                        false,
                        None,
                        WordPolicy::Many,
                    ));
                }
                SuggestionRequest::FavoriteQuery => {
                    completions.extend(Self::find_matches(
                        word,
                        &self.favorite_names,
                        false,
                        true,
                        None,
                        WordPolicy::Most,
                    ));
                }
                SuggestionRequest::TableFormat => {
                    completions.extend(Self::find_matches(
                        word,
                        &self.table_formats,
                        true,
                        false,
                        None,
                        WordPolicy::Most,
                    ));
                }
                SuggestionRequest::FileName => {
                    completions.extend(find_files(word));
                }
                SuggestionRequest::Llm => {
                    let tokens: Vec<&str> = if word.is_empty() {
                        text.split_whitespace().skip(1).collect()
                    } else {
                        let all: Vec<&str> = text.split_whitespace().skip(1).collect();
                        all[..all.len().saturating_sub(1)].to_vec()
                    };
                    let entries = llm::completion_candidates(&tokens);
                    completions.extend(Self::find_matches(
                        word, &entries, false, true, None, WordPolicy::Most,
                    ));
                }
            }
        }

        completions
    }

    /// All columns of the scoped relations. Tables are tried before views,
    /// under both the raw and the escaped relation name; unresolved
    /// references contribute nothing.
    pub fn populate_scoped_cols(&self, scoped_tbls: &[TableRef]) -> Vec<String> {
        let mut columns = Vec::new();

        for tbl in scoped_tbls {
            let schema = tbl.schema.as_deref().unwrap_or(&self.dbname);
            let relname = tbl.name.as_str();
            let escaped = self.escape_name(relname);

            if let Some(cols) = self
                .tables
                .get(schema)
                .and_then(|s| s.get(relname).or_else(|| s.get(&escaped)))
            {
                columns.extend(cols.iter().cloned());
                continue;
            }
            if let Some(cols) = self
                .views
                .get(schema)
                .and_then(|s| s.get(relname).or_else(|| s.get(&escaped)))
            {
                columns.extend(cols.iter().cloned());
            }
        }

        columns
    }

    fn populate_schema_objects(&self, schema: Option<&str>, kind: RelKind) -> Vec<String> {
        let schema = schema.unwrap_or(&self.dbname);
        let metadata = match kind {
            RelKind::Tables => &self.tables,
            RelKind::Views => &self.views,
        };
        metadata
            .get(schema)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn populate_functions(&self, schema: Option<&str>) -> Vec<String> {
        let schema = schema.unwrap_or(&self.dbname);
        self.functions.get(schema).cloned().unwrap_or_default()
    }
}

/// The whitespace-delimited word immediately before the cursor.
fn word_before_cursor(before: &str) -> &str {
    match before
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
    {
        Some((i, c)) => &before[i + c.len_utf8()..],
        None => before,
    }
}

/// Directory-scan completion for path arguments. The span covers only the
/// final path component, so earlier components are kept as typed.
fn find_files(word: &str) -> Vec<SqlCompletion> {
    let (dir, partial) = match word.rfind('/') {
        Some(i) => (&word[..i + 1], &word[i + 1..]),
        None => ("", word),
    };

    let search_dir = if dir.is_empty() {
        Path::new(".").to_path_buf()
    } else if let Some(rest) = dir.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => Path::new(dir).to_path_buf(),
        }
    } else {
        Path::new(dir).to_path_buf()
    };

    let Ok(entries) = std::fs::read_dir(&search_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(partial) {
                return None;
            }
            if entry.file_type().ok()?.is_dir() {
                name.push('/');
            }
            Some(name)
        })
        .collect();
    names.sort();

    let span = partial.chars().count();
    names
        .into_iter()
        .map(|name| SqlCompletion::new(name, span))
        .collect()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
