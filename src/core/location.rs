// This module tracks the generation site that newly emitted instructions are attributed to.
// A Location is an immutable (label, line, column) triple; LocationStack keeps an explicit
// stack of them on top of a permanent "Unknown" root, so the current location is always
// defined. The compilation context pushes "<builtin>::<phase>" around every builtin phase
// invocation and pops it once the phase returns, whatever its outcome, and stamps the current
// location as a DWARF line entry on every instruction emitted while it is on top.

//! Diagnostic location stack.

use std::fmt;

/// Label of the root location.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A generation site: what was being emitted and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    label: String,
    line: u32,
    column: u32,
}

impl Location {
    pub fn new(label: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            label: label.into(),
            line,
            column,
        }
    }

    /// The root location used before anything is pushed.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LABEL, 1, 1)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.label, self.line, self.column)
    }
}

/// Stack of nested generation sites.
#[derive(Debug)]
pub struct LocationStack {
    root: Location,
    frames: Vec<Location>,
}

impl LocationStack {
    /// Create a stack rooted at the given location.
    pub fn new(root: Location) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Make a new location current; the previous one becomes its parent.
    pub fn push(&mut self, label: impl Into<String>, line: u32, column: u32) {
        let location = Location::new(label, line, column);
        log::trace!("enter {}", location);
        self.frames.push(location);
    }

    /// Restore the parent of the current location.
    ///
    /// Returns the location that was left, or `None` when only the root
    /// remains; the root itself is never popped.
    pub fn pop(&mut self) -> Option<Location> {
        let location = self.frames.pop()?;
        log::trace!("leave {}", location);
        Some(location)
    }

    pub fn current(&self) -> &Location {
        self.frames.last().unwrap_or(&self.root)
    }

    /// Number of locations pushed above the root.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for LocationStack {
    fn default() -> Self {
        Self::new(Location::unknown())
    }
}
