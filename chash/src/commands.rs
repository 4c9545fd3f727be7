//! Command file loading.
//!
//! One operation per line:
//!
//! ```text
//! INSERT,<name>,<salary>,<priority>
//! DELETE,<name>,<priority>
//! SEARCH,<name>,<priority>
//! PRINT,<priority>
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. The whole load fails on
//! the first malformed line.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::store::MAX_NAME_LEN;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unable to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read commands: {0}")]
    Read(#[from] io::Error),
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Insert { name: String, salary: u32 },
    Delete { name: String },
    Search { name: String },
    Print,
}

/// A parsed operation. `priority` only labels log and output lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub priority: u32,
}

impl Command {
    pub fn insert(name: impl Into<String>, salary: u32, priority: u32) -> Self {
        Self {
            kind: CommandKind::Insert {
                name: name.into(),
                salary,
            },
            priority,
        }
    }

    pub fn delete(name: impl Into<String>, priority: u32) -> Self {
        Self {
            kind: CommandKind::Delete { name: name.into() },
            priority,
        }
    }

    pub fn search(name: impl Into<String>, priority: u32) -> Self {
        Self {
            kind: CommandKind::Search { name: name.into() },
            priority,
        }
    }

    pub fn print(priority: u32) -> Self {
        Self {
            kind: CommandKind::Print,
            priority,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self.kind {
            CommandKind::Insert { .. } => "INSERT",
            CommandKind::Delete { .. } => "DELETE",
            CommandKind::Search { .. } => "SEARCH",
            CommandKind::Print => "PRINT",
        }
    }

}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Insert { name, salary } => {
                write!(f, "INSERT,{},{},{}", name, salary, self.priority)
            }
            CommandKind::Delete { name } => write!(f, "DELETE,{},{}", name, self.priority),
            CommandKind::Search { name } => write!(f, "SEARCH,{},{}", name, self.priority),
            CommandKind::Print => write!(f, "PRINT,{}", self.priority),
        }
    }
}

/// Load every command from the file at `path`.
pub fn load_commands(path: impl AsRef<Path>) -> Result<Vec<Command>, CommandError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CommandError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_commands(BufReader::new(file))
}

/// Parse commands from any line source.
pub fn parse_commands(reader: impl BufRead) -> Result<Vec<Command>, CommandError> {
    let mut commands = Vec::new();
    for (index, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let parsed = std::str::from_utf8(&raw)
            .map_err(|_| "Invalid UTF-8".to_string())
            .and_then(parse_line)
            .map_err(|reason| CommandError::Parse {
                line: index + 1,
                reason,
            })?;
        if let Some(command) = parsed {
            commands.push(command);
        }
    }
    Ok(commands)
}

/// Parse one line; `Ok(None)` for blank and comment lines.
fn parse_line(raw: &str) -> Result<Option<Command>, String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    // Consecutive separators collapse and anything past the fourth field is ignored.
    let tokens: Vec<&str> = line
        .split(',')
        .filter(|token| !token.is_empty())
        .map(str::trim)
        .take(4)
        .collect();
    let Some(verb) = tokens.first() else {
        return Err("Missing command token".to_string());
    };

    let command = match verb.to_ascii_uppercase().as_str() {
        "INSERT" => {
            expect_tokens("INSERT", &tokens, 4)?;
            Command::insert(
                parse_name(tokens[1])?,
                parse_number(tokens[2], "salary")?,
                parse_number(tokens[3], "priority")?,
            )
        }
        "DELETE" => {
            expect_tokens("DELETE", &tokens, 3)?;
            Command::delete(parse_name(tokens[1])?, parse_number(tokens[2], "priority")?)
        }
        "SEARCH" => {
            expect_tokens("SEARCH", &tokens, 3)?;
            Command::search(parse_name(tokens[1])?, parse_number(tokens[2], "priority")?)
        }
        "PRINT" => {
            expect_tokens("PRINT", &tokens, 2)?;
            Command::print(parse_number(tokens[1], "priority")?)
        }
        _ => return Err(format!("Unknown command '{}'", verb)),
    };
    Ok(Some(command))
}

fn expect_tokens(verb: &str, tokens: &[&str], expected: usize) -> Result<(), String> {
    if tokens.len() < expected {
        return Err(format!("{} expects {} tokens", verb, expected));
    }
    Ok(())
}

fn parse_name(token: &str) -> Result<&str, String> {
    if token.len() > MAX_NAME_LEN {
        return Err(format!("Name exceeds {} characters", MAX_NAME_LEN));
    }
    Ok(token)
}

fn parse_number(token: &str, field: &str) -> Result<u32, String> {
    token
        .parse::<u32>()
        .map_err(|_| format!("Invalid {} value", field))
}
