//! Bounded, append-only log trace shown while a scan or audit run is active.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTrace {
    capacity: usize,
    lines: VecDeque<String>,
}

impl LogTrace {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a line, dropping the oldest once full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_lines() {
        let mut trace = LogTrace::new(8);
        for i in 0..11 {
            trace.push(format!("line {i}"));
        }

        assert_eq!(trace.len(), 8);
        assert_eq!(trace.lines().next(), Some("line 3"));
        assert_eq!(trace.last(), Some("line 10"));
    }

    #[test]
    fn zero_capacity_still_holds_the_latest_line() {
        let mut trace = LogTrace::new(0);
        trace.push("a");
        trace.push("b");
        assert_eq!(trace.lines().collect::<Vec<_>>(), vec!["b"]);
    }
}
