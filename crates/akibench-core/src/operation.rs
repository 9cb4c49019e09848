//! Units of work issued against the target system.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One operation produced by a workload and executed by a transport.
///
/// Operations are immutable once built; the scheduler hands ownership to the worker that
/// executes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Point read by document id.
    Read { id: u64 },
    /// Insert a new document.
    Insert { id: u64, payload: Bytes },
    /// Overwrite an existing document.
    Update { id: u64, payload: Bytes },
    /// Free-form query with named parameters.
    Query {
        text: String,
        params: Vec<(String, String)>,
    },
    /// Insert many documents in one request.
    BulkInsert { items: Vec<(u64, Bytes)> },
    /// Nearest-neighbour search.
    VectorSearch {
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<String>,
    },
}

impl Operation {
    /// Returns the payload-free discriminant of this operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Read { .. } => OperationKind::Read,
            Self::Insert { .. } => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Query { .. } => OperationKind::Query,
            Self::BulkInsert { .. } => OperationKind::BulkInsert,
            Self::VectorSearch { .. } => OperationKind::VectorSearch,
        }
    }

    /// Approximate number of bytes this operation puts on the wire, excluding framing.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        let len = match self {
            Self::Read { .. } => std::mem::size_of::<u64>(),
            Self::Insert { payload, .. } | Self::Update { payload, .. } => {
                std::mem::size_of::<u64>() + payload.len()
            }
            Self::Query { text, params } => {
                text.len() + params.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
            }
            Self::BulkInsert { items } => items
                .iter()
                .map(|(_, payload)| std::mem::size_of::<u64>() + payload.len())
                .sum(),
            Self::VectorSearch { vector, filter, .. } => {
                vector.len() * std::mem::size_of::<f32>()
                    + std::mem::size_of::<u32>()
                    + filter.as_ref().map_or(0, String::len)
            }
        };
        len as u64
    }
}

/// Discriminant of [`Operation`], used for labels and workload mixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Insert,
    Update,
    Query,
    BulkInsert,
    VectorSearch,
}

impl OperationKind {
    /// Stable lowercase label, used for metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Query => "query",
            Self::BulkInsert => "bulk_insert",
            Self::VectorSearch => "vector_search",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
