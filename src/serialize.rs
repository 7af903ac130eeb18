//! # Serializer / Reconstructor
//!
//! [`BakeMetadata`] is plain serde data. This module moves it to and from
//! JSON, gives it a content id, and rebuilds an independent evaluator from
//! it without re-running graph analysis.
//!
//! The content id is the hex BLAKE3 digest of the compact JSON encoding.
//! Maps in the metadata are ordered, so equal metadata always has equal
//! bytes and an equal id.

use crate::bake::{BakeMetadata, Baked};
use crate::error::BakeError;
use crate::registry::ChipTypeRegistry;
use crate::runtime::Program;
use serde_json::Value;
use tracing::debug;

/// Hex-encoded BLAKE3 of the canonical metadata bytes.
pub type ContentId = String;

impl BakeMetadata {
    pub fn to_json(&self) -> Result<String, BakeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, BakeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, BakeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_value(&self) -> Result<Value, BakeError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self, BakeError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, BakeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn content_id(&self) -> Result<ContentId, BakeError> {
        let canon = self.canonical_bytes()?;
        Ok(hex::encode(blake3::hash(&canon).as_bytes()))
    }
}

/// Rebuild an evaluator from stored metadata.
///
/// The new evaluator starts at tick 0 with fresh state and shares nothing
/// with the evaluator the metadata came from.
pub fn reconstruct_from_metadata(
    metadata: BakeMetadata,
    registry: &ChipTypeRegistry,
) -> Result<Baked, BakeError> {
    let program = Program::resolve(metadata, registry)?;
    debug!(
        chips = program.metadata().chips.len(),
        inputs = program.input_count(),
        outputs = program.output_count(),
        "reconstructed evaluator"
    );
    Ok(Baked::from_program(program))
}

pub fn reconstruct_from_json(text: &str, registry: &ChipTypeRegistry) -> Result<Baked, BakeError> {
    reconstruct_from_metadata(BakeMetadata::from_json(text)?, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::bake_graph;
    use crate::graph::Graph;
    use crate::registry::{INPUT_CP, OUTPUT_CP};

    fn feedback_graph(registry: &ChipTypeRegistry) -> Graph {
        // out = in + previous(out)
        let mut graph = Graph::new();
        let input = graph.add_chip(registry, INPUT_CP).unwrap();
        let add = graph.add_chip(registry, "offset").unwrap();
        let mem = graph.add_chip(registry, "memory").unwrap();
        let out = graph.add_chip(registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 0, &add, 0);
        graph.connect(&mem, 0, &add, 1);
        graph.connect(&add, 0, &mem, 0);
        graph.connect(&add, 0, &out, 0);
        graph
    }

    #[test]
    fn accumulator_survives_json() {
        let registry = ChipTypeRegistry::new();
        let mut original = bake_graph(&feedback_graph(&registry), &registry).unwrap();
        let text = original.metadata().to_json().unwrap();
        let mut rebuilt = reconstruct_from_json(&text, &registry).unwrap();
        let inputs = [10.0, 20.0, 30.0, 50.0, -90.0];
        let a: Vec<_> = inputs.iter().map(|v| original.evaluate(&[*v])).collect();
        let b: Vec<_> = inputs.iter().map(|v| rebuilt.evaluate(&[*v])).collect();
        assert_eq!(a, b);
        assert_eq!(
            a,
            vec![vec![10.0], vec![30.0], vec![60.0], vec![100.0], vec![10.0]]
        );
    }

    #[test]
    fn json_is_byte_stable() {
        let registry = ChipTypeRegistry::new();
        let baked = bake_graph(&feedback_graph(&registry), &registry).unwrap();
        let text = baked.metadata().to_json().unwrap();
        let back = BakeMetadata::from_json(&text).unwrap();
        assert_eq!(&back, baked.metadata());
        assert_eq!(back.to_json().unwrap(), text);
        assert_eq!(
            back.content_id().unwrap(),
            baked.metadata().content_id().unwrap()
        );
    }

    #[test]
    fn state_is_not_shared() {
        let registry = ChipTypeRegistry::new();
        let mut original = bake_graph(&feedback_graph(&registry), &registry).unwrap();
        original.evaluate(&[40.0]);
        original.evaluate(&[40.0]);
        let mut rebuilt =
            reconstruct_from_metadata(original.metadata().clone(), &registry).unwrap();
        assert_eq!(rebuilt.evaluate(&[5.0]), vec![5.0]);
        assert_eq!(original.evaluate(&[5.0]), vec![85.0]);
    }

    #[test]
    fn unknown_type_on_reconstruct() {
        let registry = ChipTypeRegistry::new();
        let baked = bake_graph(&feedback_graph(&registry), &registry).unwrap();
        let mut value = baked.metadata().to_value().unwrap();
        value["chips"]["memory-2"]["type"] = Value::String("ghost".into());
        let meta = BakeMetadata::from_value(value).unwrap();
        assert!(matches!(
            reconstruct_from_metadata(meta, &registry),
            Err(BakeError::UnknownChipType(name)) if name == "ghost"
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let registry = ChipTypeRegistry::new();
        assert!(matches!(
            reconstruct_from_json("{\"version\": 1", &registry),
            Err(BakeError::Json(_))
        ));
    }
}
