//! The stored value type.

use std::fmt;

/// Longest name a record may carry, in bytes.
pub const MAX_NAME_LEN: usize = 50;

/// A single directory entry.
///
/// `name` is the identity; `key` is derived from it and only decides where the
/// record sits in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: u32,
    pub name: String,
    pub salary: u32,
}

impl Record {
    pub fn new(key: u32, name: impl Into<String>, salary: u32) -> Self {
        Self {
            key,
            name: name.into(),
            salary,
        }
    }
}

/// Renders `<key>,<name>,<salary>`, the line format used by search and print output.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.key, self.name, self.salary)
    }
}
