//! Name-based access gate in front of the recording session.

use std::{collections::HashSet, fmt};

use crate::error::{Error, Result};

/// Identity of the person being recorded, always in canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims surrounding whitespace and lower-cases.
pub fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Clone, Debug)]
pub struct AccessGate {
    allowed: HashSet<String>,
}

impl AccessGate {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: names
                .into_iter()
                .map(|name| canonicalize(name.as_ref()))
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Checks `input` against the allow-list. There is no attempt limit.
    pub fn unlock(&self, input: &str) -> Result<Owner> {
        let name = canonicalize(input);
        if self.allowed.contains(&name) {
            log::info!("access granted to {name}");
            Ok(Owner(name))
        } else {
            log::warn!("access denied for {name:?}");
            Err(Error::AccessDenied { name })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
