//! Change tracking for the optimization pipeline.
//!
//! Passes record what they changed in an [`EventLog`]. The log is purely informational:
//! nothing in the pipeline reads it back, so callers may inspect it for debugging or
//! ignore it.
//!
//! # Example
//!
//! ```rust
//! use portflow::compiler::{EventKind, EventLog};
//!
//! let mut log = EventLog::new();
//! log.record(EventKind::ConstantFolded).message("2 * 3 -> 6");
//! log.info("starting pass");
//!
//! assert_eq!(log.count_kind(EventKind::ConstantFolded), 1);
//! println!("{}", log.summary());
//! ```

use std::{collections::BTreeMap, fmt};

use crate::graph::{BlockId, MethodId};

/// Categories of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// A method's graph was built.
    MethodParsed,
    /// A method could not be translated and was marked unparseable.
    MethodUnparseable,
    /// An output was replaced by a constant.
    ConstantFolded,
    /// A conditional branch or switch was replaced by a jump.
    BranchSimplified,
    /// An unreachable block was removed.
    BlockRemoved,
    /// Two blocks joined by a jump were fused.
    BlocksFused,
    /// Nodes whose results were unused were removed.
    NodesPruned,
    /// A call was replaced by its result.
    CallInlined,

    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MethodParsed => "method parsed",
            Self::MethodUnparseable => "method unparseable",
            Self::ConstantFolded => "constant folded",
            Self::BranchSimplified => "branch simplified",
            Self::BlockRemoved => "block removed",
            Self::BlocksFused => "blocks fused",
            Self::NodesPruned => "nodes pruned",
            Self::CallInlined => "call inlined",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns true if this event represents a change to a graph.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ConstantFolded
                | Self::BranchSimplified
                | Self::BlockRemoved
                | Self::BlocksFused
                | Self::NodesPruned
                | Self::CallInlined
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method the event concerns, if known.
    pub method: Option<MethodId>,
    /// The block the event concerns, if any.
    pub block: Option<BlockId>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(method) = self.method {
            write!(f, " {method}")?;
        }
        if let Some(block) = self.block {
            write!(f, " {block}")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Builder for one event, created by [`EventLog::record`].
///
/// The event is added to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a mut EventLog,
    kind: EventKind,
    method: Option<MethodId>,
    block: Option<BlockId>,
    message: Option<String>,
}

impl EventBuilder<'_> {
    /// Sets the method.
    pub fn method(mut self, method: MethodId) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the block.
    pub fn block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets a custom message; the kind's description is used otherwise.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());
        self.log.events.push(Event {
            kind: self.kind,
            method: self.method,
            block: self.block,
            message,
        });
    }
}

/// Ordered collection of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&mut self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            kind,
            method: None,
            block: None,
            message: None,
        }
    }

    /// Records an informational message.
    pub fn info(&mut self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Appends every event of `other`.
    pub fn merge(&mut self, other: &EventLog) {
        self.events.extend(other.events.iter().cloned());
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Iterates over events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Iterates over events concerning one method.
    pub fn filter_method(&self, method: MethodId) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter(move |e| e.method == Some(method))
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind.is_transformation())
            .count()
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// One line per event kind with its count.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.events.is_empty() {
            return "no events".to_string();
        }
        self.count_by_kind()
            .into_iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Removes and returns every event.
    pub fn take(&mut self) -> EventLog {
        std::mem::take(self)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.record(EventKind::ConstantFolded)
            .method(MethodId::new(2))
            .block(BlockId::new(5))
            .message("x * 0 -> 0");
        log.record(EventKind::BlockRemoved).method(MethodId::new(2));
        log.warn("class Missing not found");

        assert_eq!(log.len(), 3);
        assert!(log.has(EventKind::Warning));
        assert_eq!(log.transformation_count(), 2);
        assert_eq!(log.filter_method(MethodId::new(2)).count(), 2);

        let removed: Vec<_> = log.filter_kind(EventKind::BlockRemoved).collect();
        assert_eq!(removed[0].message, "block removed");
    }

    #[test]
    fn test_summary_and_take() {
        let mut log = EventLog::new();
        log.record(EventKind::CallInlined);
        log.record(EventKind::CallInlined);
        log.info("done");
        assert_eq!(log.summary(), "call inlined: 2\ninfo: 1");

        let taken = log.take();
        assert!(log.is_empty());
        assert_eq!(taken.len(), 3);

        let mut merged = EventLog::new();
        merged.merge(&taken);
        assert_eq!(merged.count_kind(EventKind::CallInlined), 2);
    }
}
