/*!
 * Rustyline integration
 *
 * Bridges the completion engine into rustyline's Completer, Hinter,
 * Highlighter and Validator traits. The engine candidates carry per-item
 * replacement spans; rustyline wants a single start position, so shorter
 * spans are padded with the line text they keep.
 */

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use regex::Regex;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::{self, MatchingBracketValidator, Validator};
use rustyline::Context;

use super::engine::{SqlCompleter, SqlCompletion, KEYWORDS};

pub struct SqliteHelper {
    completer: Arc<Mutex<SqlCompleter>>,
    keyword_pattern: Regex,
    highlighter: MatchingBracketHighlighter,
    validator: MatchingBracketValidator,
    hinter: HistoryHinter,
}

impl SqliteHelper {
    pub fn new(completer: Arc<Mutex<SqlCompleter>>) -> Self {
        let words: Vec<String> = KEYWORDS
            .iter()
            .filter(|k| !k.contains(' '))
            .map(|k| regex::escape(k))
            .collect();
        // Case-sensitive: only keywords the user typed in uppercase are
        // bolded.
        let keyword_pattern = Regex::new(&format!(r"\b({})\b", words.join("|")))
            .unwrap_or_else(|_| Regex::new(r"\bSELECT\b").unwrap());

        Self {
            completer,
            keyword_pattern,
            highlighter: MatchingBracketHighlighter::new(),
            validator: MatchingBracketValidator::new(),
            hinter: HistoryHinter::new(),
        }
    }

    fn completions(&self, line: &str, pos: usize) -> Vec<SqlCompletion> {
        match self.completer.lock() {
            Ok(completer) => completer.get_completions(line, pos),
            Err(_) => Vec::new(),
        }
    }
}

/// Byte index `n` characters before `pos`.
fn char_back(line: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    line[..pos]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl Completer for SqliteHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let completions = self.completions(line, pos);
        let max_span = completions.iter().map(|c| c.span).max().unwrap_or(0);
        let start = char_back(line, pos, max_span);

        let pairs = completions
            .into_iter()
            .map(|c| {
                let candidate_start = char_back(line, pos, c.span);
                let replacement = format!("{}{}", &line[start..candidate_start], c.text);
                Pair {
                    display: c.text,
                    replacement,
                }
            })
            .collect();

        Ok((start, pairs))
    }
}

impl Hinter for SqliteHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if let Some(history_hint) = self.hinter.hint(line, pos, ctx) {
            return Some(history_hint);
        }
        if pos < line.len() || line.trim().is_empty() {
            return None;
        }

        let completions = self.completions(line, pos);
        let top = completions.first()?;
        if top.span == 0 {
            return None;
        }

        let start = char_back(line, pos, top.span);
        let typed = &line[start..pos];
        if top.text.to_lowercase().starts_with(&typed.to_lowercase()) {
            top.text
                .get(typed.len()..)
                .filter(|rest| !rest.is_empty())
                .map(|rest| rest.to_string())
        } else {
            None
        }
    }
}

impl Highlighter for SqliteHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        match self
            .keyword_pattern
            .replace_all(line, "\x1b[1m$1\x1b[0m")
        {
            Cow::Borrowed(_) => Cow::Borrowed(line),
            Cow::Owned(highlighted) => Cow::Owned(highlighted),
        }
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        Cow::Borrowed(prompt)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{}\x1b[0m", hint))
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: bool) -> bool {
        self.highlighter.highlight_char(line, pos, forced)
    }
}

impl Validator for SqliteHelper {
    fn validate(
        &self,
        ctx: &mut validate::ValidationContext,
    ) -> Result<validate::ValidationResult, ReadlineError> {
        self.validator.validate(ctx)
    }

    fn validate_while_typing(&self) -> bool {
        self.validator.validate_while_typing()
    }
}

impl rustyline::Helper for SqliteHelper {}
