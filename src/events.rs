//! Structured progress events.
//!
//! Conversion steps never print. They hand leveled events to an injected
//! [`EventSink`], which a host routes wherever it wants: the `log` facade,
//! a GUI status pane, or a test buffer.

use std::fmt;
use std::sync::Mutex;

use crate::error::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => f.write_str("info"),
            Level::Warning => f.write_str("warning"),
            Level::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: Level,
    pub step: Step,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl Event {
    pub fn new(level: Level, step: Step, message: impl Into<String>) -> Self {
        Event {
            level,
            step,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

pub trait EventSink {
    fn emit(&self, event: Event);

    fn info(&self, step: Step, message: &str) {
        self.emit(Event::new(Level::Info, step, message));
    }

    fn warning(&self, step: Step, message: &str) {
        self.emit(Event::new(Level::Warning, step, message));
    }
}

/// Forwards events to the `log` facade under the `wineeg::<step>` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        let level = match event.level {
            Level::Info => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error => log::Level::Error,
        };
        let target = format!("wineeg::{}", event.step);
        log::log!(target: &target, level, "{}", event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.info(Step::Analyze, "frames counted");
        sink.emit(Event::new(Level::Warning, Step::ComputeWindow, "data truncated").with("lost_s", 12.5));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(sink.count(Level::Warning), 1);
        assert_eq!(events[1].field("lost_s"), Some("12.5"));
        assert_eq!(events[1].to_string(), "[compute_window] data truncated lost_s=12.5");
    }

    #[test]
    fn test_levels_order() {
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
    }
}
