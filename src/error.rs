use crate::graph::ChipId;
use thiserror::Error;

/// Errors produced while baking a graph, reconstructing an evaluator from
/// stored metadata, or registering a composite chip type.
#[derive(Debug, Error)]
pub enum BakeError {
    /// A feedback loop made only of feedthrough chips.
    #[error("Cycle detected among chips: {}", join_ids(.chips))]
    Cycle { chips: Vec<ChipId> },
    /// A chip type name that is not in the registry.
    #[error("unknown chip type: {0}")]
    UnknownChipType(String),
    /// A path that names a missing chip, a port out of range, or a socket
    /// that is already driven.
    #[error("invalid wiring: {0}")]
    InvalidWiring(String),
    /// Stored metadata that does not describe a runnable circuit.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("unsupported metadata version: expected {expected}, got {got}")]
    UnsupportedVersion { expected: u32, got: u32 },
    #[error("chip type already registered: {0}")]
    DuplicateChipType(String),
    #[error("metadata json: {0}")]
    Json(#[from] serde_json::Error),
}

impl BakeError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, BakeError::Cycle { .. })
    }
}

fn join_ids(ids: &[ChipId]) -> String {
    let mut buf = String::new();
    for (idx, id) in ids.iter().enumerate() {
        if idx > 0 {
            buf.push_str(", ");
        }
        buf.push_str(id.as_str());
    }
    buf
}
