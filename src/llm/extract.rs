//! Structured-output extraction from free-form model replies
//!
//! Models are asked for list literals but wrap them in prose, code fences or
//! `<think>` blocks, and they write Python-style literals (single quotes,
//! trailing commas, `None`). Every stage goes through [`extract_or_default`]:
//! locate the expected shape, parse it, and fall back to the stage's default
//! when either step fails.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Literal value recovered from model output
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Literal>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar as text; nested lists are flattened and comma-joined
    pub fn to_text(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => String::new(),
            Literal::List(items) => items
                .iter()
                .map(Literal::to_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// List of lists of text, the shape most stages ask for
    pub fn into_rows(self) -> Option<Vec<Vec<String>>> {
        match self {
            Literal::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Literal::List(cells) => Some(cells.iter().map(Literal::to_text).collect()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Literal::Null,
            serde_json::Value::Bool(b) => Literal::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Literal::Int(i),
                None => Literal::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Literal::Str(s),
            serde_json::Value::Array(items) => Literal::List(items.into_iter().map(Literal::from_json).collect()),
            serde_json::Value::Object(_) => Literal::Str(value.to_string()),
        }
    }
}

/// Shape a stage expects to find in the reply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// `[[...], [...]]` anywhere in the text
    ListOfLists,
    /// `["tag", [...], ...]` or `["tag"]`: a list whose head is a string
    TaggedList,
    /// Strict JSON array, optionally surrounded by prose
    JsonArray,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no {0:?} structure found in model output")]
    NotFound(Shape),

    #[error("malformed literal at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("parsed value does not have the expected {0:?} shape")]
    WrongShape(Shape),
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block pattern"))
}

fn nested_list_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\s*\[").expect("valid nested-list pattern"))
}

/// Remove `<think>...</think>` reasoning blocks
pub fn strip_think_block(text: &str) -> String {
    think_block().replace_all(text, "").trim().to_string()
}

/// Remove every triple-backtick fence marker, keeping the fenced content
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```python", "").replace("```", "")
}

/// Locate and parse `shape` in `text`
pub fn extract(text: &str, shape: Shape) -> Result<Literal, ExtractError> {
    let cleaned = strip_code_fences(&strip_think_block(text));
    match shape {
        Shape::ListOfLists => extract_list_of_lists(&cleaned),
        Shape::TaggedList => extract_tagged_list(&cleaned),
        Shape::JsonArray => extract_json_array(&cleaned),
    }
}

/// [`extract`] then `convert`, falling back to `T::default()` with a warning
pub fn extract_or_default<T, F>(stage: &'static str, text: &str, shape: Shape, convert: F) -> T
where
    T: Default,
    F: FnOnce(Literal) -> Option<T>,
{
    match extract(text, shape).and_then(|lit| convert(lit).ok_or(ExtractError::WrongShape(shape))) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(stage, error = %e, "Error parsing LLM output, continuing with empty result");
            T::default()
        }
    }
}

fn extract_list_of_lists(text: &str) -> Result<Literal, ExtractError> {
    let mut last_error = ExtractError::NotFound(Shape::ListOfLists);
    for start in nested_list_start().find_iter(text).map(|m| m.start()) {
        let Some(span) = balanced_span(text, start) else {
            continue;
        };
        match parse_literal(span) {
            Ok(lit @ Literal::List(_)) if lit.as_list().is_some_and(|items| items.iter().all(|i| i.as_list().is_some())) => {
                return Ok(lit)
            }
            Ok(_) => last_error = ExtractError::WrongShape(Shape::ListOfLists),
            Err(e) => last_error = shift(e, start),
        }
    }
    Err(last_error)
}

fn extract_tagged_list(text: &str) -> Result<Literal, ExtractError> {
    let mut last_error = ExtractError::NotFound(Shape::TaggedList);
    for (start, _) in text.match_indices('[') {
        let Some(span) = balanced_span(text, start) else {
            continue;
        };
        match parse_literal(span) {
            Ok(lit) if lit.as_list().and_then(|items| items.first()).and_then(Literal::as_str).is_some() => {
                return Ok(lit)
            }
            Ok(_) => last_error = ExtractError::WrongShape(Shape::TaggedList),
            Err(e) => last_error = shift(e, start),
        }
    }
    Err(last_error)
}

fn extract_json_array(text: &str) -> Result<Literal, ExtractError> {
    let trimmed = text.trim();
    // A reply that is valid JSON but not an array is an answer of the wrong
    // shape, not prose around an array
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value @ serde_json::Value::Array(_)) => return Ok(Literal::from_json(value)),
        Ok(_) => return Err(ExtractError::WrongShape(Shape::JsonArray)),
        Err(_) => {}
    }
    let start = trimmed.find('[').ok_or(ExtractError::NotFound(Shape::JsonArray))?;
    let span = balanced_span(trimmed, start).ok_or(ExtractError::NotFound(Shape::JsonArray))?;
    match serde_json::from_str::<serde_json::Value>(span) {
        Ok(value @ serde_json::Value::Array(_)) => Ok(Literal::from_json(value)),
        Ok(_) => Err(ExtractError::WrongShape(Shape::JsonArray)),
        Err(e) => Err(ExtractError::Malformed {
            offset: start + e.column().saturating_sub(1),
            reason: e.to_string(),
        }),
    }
}

fn shift(err: ExtractError, by: usize) -> ExtractError {
    match err {
        ExtractError::Malformed { offset, reason } => ExtractError::Malformed {
            offset: offset + by,
            reason,
        },
        other => other,
    }
}

/// Slice from the bracket at `start` to its matching close, skipping quoted text
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a complete Python/JSON literal (lists, tuples, strings, numbers,
/// booleans, None/null). Trailing commas are accepted.
pub fn parse_literal(src: &str) -> Result<Literal, ExtractError> {
    let mut parser = LiteralParser { src, pos: 0, depth: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != src.len() {
        return Err(parser.error("trailing characters after literal"));
    }
    Ok(value)
}

/// Lists nested deeper than this are rejected instead of recursed into
const MAX_NESTING: usize = 64;

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn error(&self, reason: impl Into<String>) -> ExtractError {
        ExtractError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn value(&mut self) -> Result<Literal, ExtractError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(']'),
            Some('(') => self.sequence(')'),
            Some(q @ ('"' | '\'')) => self.string(q),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(c) => Err(self.error(format!("unexpected character {:?}", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Literal, ExtractError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let items = self.items(close);
        self.depth -= 1;
        items
    }

    fn items(&mut self, close: char) -> Result<Literal, ExtractError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Literal::List(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Literal::List(items)),
                Some(c) => return Err(self.error(format!("expected ',' or {:?}, found {:?}", close, c))),
                None => return Err(self.error("unterminated list")),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<Literal, ExtractError> {
        let mut out = String::new();
        // Adjacent literals concatenate, as in Python: 'a' "b" == 'ab'
        let mut next_quote = Some(quote);
        while let Some(quote) = next_quote {
            self.bump();
            loop {
                match self.bump() {
                    Some('\\') => match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some('u') => out.push(self.unicode_escape()?),
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated escape")),
                    },
                    Some(c) if c == quote => break,
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                }
            }
            self.skip_ws();
            next_quote = match self.peek() {
                Some(q @ ('"' | '\'')) => Some(q),
                _ => None,
            };
        }
        Ok(Literal::Str(out))
    }

    fn unicode_escape(&mut self) -> Result<char, ExtractError> {
        let end = self.pos + 4;
        let hex = self.src.get(self.pos..end).ok_or_else(|| self.error("short \\u escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid \\u escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> Result<Literal, ExtractError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.bump();
        }
        let text = self.src[start..self.pos].replace('_', "");
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Literal::Int(i));
        }
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| ExtractError::Malformed {
                offset: start,
                reason: format!("invalid number {:?}", text),
            })
    }

    fn keyword(&mut self) -> Result<Literal, ExtractError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "None" | "null" => Ok(Literal::Null),
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            other => Err(ExtractError::Malformed {
                offset: start,
                reason: format!("unexpected identifier {:?}", other),
            }),
        }
    }
}
