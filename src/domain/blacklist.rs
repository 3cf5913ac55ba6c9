//! Root Blacklist
//!
//! Roots to leave out of the object graph. The text format has one entry per
//! line:
//!
//! ```text
//! # comment
//! Java_stack, java.lang.String
//! Static, java.lang.System, out
//! ```
//!
//! `Java_stack` drops stack-frame roots whose object (or array element) type
//! matches. `Static` drops the named static field of the named class.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("line {line}: unknown blacklist entry kind {kind:?}")]
    UnknownKind { line: usize, kind: String },
    #[error("line {line}: expected {expected}, found {text:?}")]
    Malformed {
        line: usize,
        expected: &'static str,
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    stack_types: HashSet<String>,
    statics: HashMap<String, HashSet<String>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_stack_type(&mut self, type_name: impl Into<String>) {
        self.stack_types.insert(type_name.into());
    }

    pub fn block_static(&mut self, class_name: impl Into<String>, field: impl Into<String>) {
        self.statics
            .entry(class_name.into())
            .or_default()
            .insert(field.into());
    }

    pub fn blocks_stack_type(&self, type_name: &str) -> bool {
        self.stack_types.contains(type_name)
    }

    pub fn blocks_static(&self, class_name: &str, field: &str) -> bool {
        self.statics
            .get(class_name)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn len(&self) -> usize {
        self.stack_types.len() + self.statics.values().map(HashSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for Blacklist {
    type Err = BlacklistError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut blacklist = Blacklist::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.trim();
            if content.is_empty() || content.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = content.split(',').map(str::trim).collect();
            match parts[0] {
                "Java_stack" => match parts.as_slice() {
                    [_, ty] if !ty.is_empty() => blacklist.block_stack_type(*ty),
                    _ => {
                        return Err(BlacklistError::Malformed {
                            line,
                            expected: "`Java_stack, <type>`",
                            text: content.to_string(),
                        })
                    }
                },
                "Static" => match parts.as_slice() {
                    [_, class, field] if !class.is_empty() && !field.is_empty() => {
                        blacklist.block_static(*class, *field)
                    }
                    _ => {
                        return Err(BlacklistError::Malformed {
                            line,
                            expected: "`Static, <type>, <field>`",
                            text: content.to_string(),
                        })
                    }
                },
                other => {
                    return Err(BlacklistError::UnknownKind {
                        line,
                        kind: other.to_string(),
                    })
                }
            }
        }

        Ok(blacklist)
    }
}
