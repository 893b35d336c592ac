use std::collections::{BTreeMap, VecDeque};
use std::time::SystemTime;

use crate::colorize::{self, Fragment};
use crate::project::ProjectKey;

/// One colorized output chunk
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub at: SystemTime,
    pub fragments: Vec<Fragment>,
}

impl LogEntry {
    pub fn text(&self) -> String {
        colorize::plain_text(&self.fragments)
    }
}

/// Per-project capped log buffers
#[derive(Debug)]
pub struct LogStore {
    pub cap: usize,
    per_project: BTreeMap<ProjectKey, VecDeque<LogEntry>>,
}

impl LogStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            per_project: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, key: &ProjectKey, fragments: Vec<Fragment>) {
        let q = self.per_project.entry(key.clone()).or_default();
        q.push_back(LogEntry {
            at: SystemTime::now(),
            fragments,
        });
        while q.len() > self.cap {
            q.pop_front();
        }
    }

    pub fn entries(&self, key: &ProjectKey) -> impl Iterator<Item = &LogEntry> + '_ {
        self.per_project.get(key).into_iter().flatten()
    }

    pub fn is_empty(&self, key: &ProjectKey) -> bool {
        self.per_project.get(key).is_none_or(VecDeque::is_empty)
    }

    /// Whole log as markup, newlines turned into line breaks
    pub fn markup(&self, key: &ProjectKey) -> String {
        self.entries(key)
            .map(|e| colorize::line_breaks(&colorize::to_markup(&e.fragments)))
            .collect()
    }

    pub fn clear(&mut self, key: &ProjectKey) {
        self.per_project.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.per_project.clear();
    }
}
