// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Operation history ring buffer.
//!
//! Diagnostic only: records are kept in memory, newest last, and the oldest
//! record is dropped once the buffer holds [`HISTORY_CAPACITY`] entries.
//! Nothing here is ever written to a backend.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Number of records retained.
pub const HISTORY_CAPACITY: usize = 100;

/// Which facade operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Set,
    Get,
    Remove,
    Clear,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Set => "set",
            OperationKind::Get => "get",
            OperationKind::Remove => "remove",
            OperationKind::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// One completed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub key: String,
    pub operation: OperationKind,
    pub timestamp_millis: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fixed-capacity history shared by the retry executor and the facade.
#[derive(Debug)]
pub struct OperationHistory {
    capacity: usize,
    records: Mutex<VecDeque<OperationRecord>>,
}

impl OperationHistory {
    /// A history holding at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn push(&self, record: OperationRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Oldest-first copy of the buffer.
    pub fn snapshot(&self) -> Vec<OperationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: i64) -> OperationRecord {
        OperationRecord {
            key: format!("k{i}"),
            operation: OperationKind::Set,
            timestamp_millis: i,
            success: true,
            error: None,
        }
    }

    #[test]
    fn test_ring_buffer_keeps_newest() {
        let history = OperationHistory::default();
        for i in 0..150 {
            history.push(record(i));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), HISTORY_CAPACITY);
        assert_eq!(snapshot.first().map(|r| r.timestamp_millis), Some(50));
        assert_eq!(snapshot.last().map(|r| r.timestamp_millis), Some(149));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let history = OperationHistory::default();
        history.push(record(1));
        let snapshot = history.snapshot();
        history.push(record(2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_serializes_lowercase_operation() {
        let json = serde_json::to_value(record(7)).unwrap();
        assert_eq!(json["operation"], "set");
        assert!(json.get("error").is_none());
    }
}
