//! ServerQuery line codec
//!
//! Every line is a list of records separated by `|`; each record is a list
//! of `key=value` pairs separated by spaces. Values are escaped so they
//! never contain a literal space, pipe or newline.

use idlewarden_session::SessionError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors decoding a server reply
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{key}': {value:?}")]
    InvalidField { key: String, value: String },
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

/// Escape a value for sending
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            ' ' => out.push_str("\\s"),
            '|' => out.push_str("\\p"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c => out.push(c),
        }
    }
    out
}

/// Undo [`escape`]. Unknown escape sequences are kept as they are.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('s') => out.push(' '),
            Some('p') => out.push('|'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// One `key=value` record with values already unescaped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    /// Parse a single record. Keys without `=` get an empty value.
    pub fn parse(text: &str) -> Self {
        let fields = text
            .split(' ')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), unescape(value)),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, CodecError> {
        self.get(key)
            .ok_or_else(|| CodecError::MissingField(key.to_string()))
    }

    /// Parse a required field
    pub fn parse_field<T: FromStr>(&self, key: &str) -> Result<T, CodecError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| CodecError::InvalidField {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Parse an optional field; absent, empty and malformed values are all `None`
    pub fn parse_optional<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse().ok())
    }
}

/// Split a data line into its records
pub fn parse_records(line: &str) -> Vec<Record> {
    line.split('|').map(Record::parse).collect()
}

/// The `error id=.. msg=..` line ending every reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLine {
    pub id: u32,
    pub message: String,
}

impl ErrorLine {
    pub fn is_ok(&self) -> bool {
        self.id == 0
    }
}

impl FromStr for ErrorLine {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let rest = line
            .strip_prefix("error")
            .ok_or_else(|| CodecError::MissingField("error".into()))?;
        let record = Record::parse(rest);

        Ok(Self {
            id: record.parse_field("id")?,
            message: record.get("msg").unwrap_or_default().to_string(),
        })
    }
}

/// A classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Terminates the reply to the current command
    Error(ErrorLine),
    /// Unsolicited event, e.g. `notifytextmessage`
    Notification { name: String, record: Record },
    /// Part of the reply to the current command
    Data(Vec<Record>),
}

impl Line {
    pub fn classify(line: &str) -> Result<Self, CodecError> {
        if line == "error" || line.starts_with("error ") {
            return line.parse().map(Line::Error);
        }

        if line.starts_with("notify") {
            let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
            return Ok(Line::Notification {
                name: name.to_string(),
                record: Record::parse(rest),
            });
        }

        Ok(Line::Data(parse_records(line)))
    }
}

/// An outbound command
#[derive(Debug, Clone)]
pub struct Command {
    name: &'static str,
    args: Vec<(&'static str, String)>,
    options: Vec<&'static str>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn arg(mut self, key: &'static str, value: impl ToString) -> Self {
        self.args.push((key, value.to_string()));
        self
    }

    /// Add a `-flag` option
    pub fn option(mut self, option: &'static str) -> Self {
        self.options.push(option);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wire form, newline-terminated
    pub fn to_line(&self) -> String {
        let mut line = self.name.to_string();
        for (key, value) in &self.args {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&escape(value));
        }
        for option in &self.options {
            line.push(' ');
            line.push_str(option);
        }
        line.push('\n');
        line
    }
}

/// Argument values are left out so credentials never reach the logs
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, _) in &self.args {
            write!(f, " {key}=…")?;
        }
        for option in &self.options {
            write!(f, " {option}")?;
        }
        Ok(())
    }
}
