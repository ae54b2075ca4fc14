//! Read-only management surface.
//!
//! Components render one-line summaries ([`Info`]) and key/value listings
//! ([`InfoList`]) for the daemon's inspection endpoints. Formatting only; no
//! semantic guarantees attach to any of it.

use std::fmt;

/// A single free-form summary line.
#[derive(Debug, Default)]
pub struct Info {
    buf: String,
}

impl Info {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, value: impl fmt::Display) -> &mut Self {
        use fmt::Write as _;
        let _ = write!(self.buf, "{value}");
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

/// A named listing of summary values.
#[derive(Debug, Default)]
pub struct InfoList {
    entries: Vec<(String, String)>,
}

impl InfoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.entries.push((name.into(), value.to_string()));
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Anything that can report itself to the management surface.
pub trait Manageable {
    fn describe(&self, target: &mut Info);
    fn inspect(&self, target: &mut InfoList);
}
