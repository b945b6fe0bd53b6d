use crate::split::LogicalRecord;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Ordered mapping logical path → content.
///
/// Iteration follows the ordinal of each path's first occurrence. A path that
/// occurs again keeps that position but takes the later content (last wins).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogicalFileStore {
    entries: Vec<(String, String)>,
    by_path: HashMap<String, usize>,
    duplicates: u64,
}

impl LogicalFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content replaced by `record`, if its path was already present.
    pub fn insert(&mut self, record: LogicalRecord) -> Option<String> {
        let path = record.path.clone();
        let content = record.into_content();
        match self.by_path.get(&path) {
            Some(&i) => {
                self.duplicates += 1;
                tracing::debug!(path = %path, "duplicate path; later content wins");
                Some(std::mem::replace(&mut self.entries[i].1, content))
            }
            None => {
                self.by_path.insert(path.clone(), self.entries.len());
                self.entries.push((path, content));
                None
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(|&i| self.entries[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records that replaced an earlier occurrence of their path.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c.len() as u64).sum()
    }

    pub fn into_map(self) -> Vec<(String, String)> {
        self.entries
    }
}

impl Serialize for LogicalFileStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, content) in &self.entries {
            map.serialize_entry(path, content)?;
        }
        map.end()
    }
}
