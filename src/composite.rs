//! # Hierarchical Composition
//!
//! A baked circuit can be registered as a chip kind of its own. The new
//! kind has one socket per input connection point and one plug per output
//! connection point; every instance owns a nested [`Evaluator`] that runs
//! one tick each time the instance does.
//!
//! The outer compiler only sees port counts and one flag: whether any
//! output reacts to an input within the same tick. If none does, the
//! composite breaks feedback loops just like `memory`.

use crate::bake::BakeMetadata;
use crate::error::BakeError;
use crate::registry::{ChipState, ChipType, ChipTypeDefinition, ChipTypeRegistry, PortDescriptor};
use crate::runtime::{Evaluator, Program};
use crate::signal::{Signal, NEUTRAL};
use std::sync::Arc;
use tracing::info;

/// A baked circuit used as a chip kind.
#[derive(Debug)]
pub struct CompositeType {
    name: String,
    program: Arc<Program>,
}

impl CompositeType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &BakeMetadata {
        self.program.metadata()
    }

    /// Advance the nested evaluator by one tick.
    pub(crate) fn step(&self, state: &mut ChipState, inputs: &[Signal]) -> Vec<Signal> {
        self.nested(state).evaluate(inputs)
    }

    /// This tick's outputs for neutral inputs, leaving the real state alone.
    pub(crate) fn peek(&self, state: &mut ChipState) -> Vec<Signal> {
        let mut probe = self.nested(state).clone();
        probe.evaluate(&vec![NEUTRAL; self.program.input_count()])
    }

    fn nested<'a>(&self, state: &'a mut ChipState) -> &'a mut Evaluator {
        if !matches!(state, ChipState::Nested(_)) {
            *state = ChipState::Nested(Box::new(Evaluator::new(Arc::clone(&self.program))));
        }
        match state {
            ChipState::Nested(evaluator) => evaluator,
            _ => unreachable!("nested evaluator installed above"),
        }
    }
}

impl ChipTypeRegistry {
    /// Register baked metadata as a new chip kind called `name`.
    ///
    /// The metadata is resolved against this registry now, so composites
    /// may nest other composites registered earlier.
    pub fn register_composite(
        &mut self,
        name: &str,
        metadata: BakeMetadata,
    ) -> Result<Arc<ChipTypeDefinition>, BakeError> {
        if self.contains(name) {
            return Err(BakeError::DuplicateChipType(name.to_string()));
        }
        let program = Program::resolve(metadata, self)?;
        let feedthrough = program.has_feedthrough();
        let def = ChipTypeDefinition {
            name: name.to_string(),
            sockets: (0..program.input_count())
                .map(|i| PortDescriptor::socket(format!("in{}", i)))
                .collect(),
            plugs: (0..program.output_count())
                .map(|i| PortDescriptor::plug(format!("out{}", i)))
                .collect(),
            stateful: true,
            feedthrough,
            default_params: Default::default(),
            kind: ChipType::Composite(Arc::new(CompositeType {
                name: name.to_string(),
                program: Arc::new(program),
            })),
        };
        info!(
            chip_type = name,
            sockets = def.socket_count(),
            plugs = def.plug_count(),
            feedthrough,
            "registered composite chip type"
        );
        self.register(def)?;
        self.lookup(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::bake_graph;
    use crate::graph::Graph;
    use crate::registry::{INPUT_CP, OUTPUT_CP};

    fn adder(registry: &ChipTypeRegistry) -> BakeMetadata {
        let mut graph = Graph::new();
        let a = graph.add_chip(registry, INPUT_CP).unwrap();
        let b = graph.add_chip(registry, INPUT_CP).unwrap();
        let sum = graph.add_chip(registry, "offset").unwrap();
        let out = graph.add_chip(registry, OUTPUT_CP).unwrap();
        graph.connect(&a, 0, &sum, 0);
        graph.connect(&b, 0, &sum, 1);
        graph.connect(&sum, 0, &out, 0);
        bake_graph(&graph, registry).unwrap().metadata().clone()
    }

    fn delay(registry: &ChipTypeRegistry) -> BakeMetadata {
        let mut graph = Graph::new();
        let a = graph.add_chip(registry, INPUT_CP).unwrap();
        let mem = graph.add_chip(registry, "memory").unwrap();
        let out = graph.add_chip(registry, OUTPUT_CP).unwrap();
        graph.connect(&a, 0, &mem, 0);
        graph.connect(&mem, 0, &out, 0);
        bake_graph(&graph, registry).unwrap().metadata().clone()
    }

    #[test]
    fn ports_follow_connection_points() {
        let mut registry = ChipTypeRegistry::new();
        let meta = adder(&registry);
        let def = registry.register_composite("adder", meta).unwrap();
        assert_eq!(def.socket_count(), 2);
        assert_eq!(def.plug_count(), 1);
        assert!(def.stateful);
        assert!(def.feedthrough);

        let meta = delay(&registry);
        let def = registry.register_composite("delay", meta).unwrap();
        assert!(!def.feedthrough);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = ChipTypeRegistry::new();
        let meta = adder(&registry);
        assert!(matches!(
            registry.register_composite("offset", meta),
            Err(BakeError::DuplicateChipType(_))
        ));
    }

    #[test]
    fn nested_delay_breaks_outer_loop() {
        let mut registry = ChipTypeRegistry::new();
        let meta = delay(&registry);
        registry.register_composite("delay", meta).unwrap();

        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let add = graph.add_chip(&registry, "offset").unwrap();
        let d = graph.add_chip(&registry, "delay").unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 0, &add, 0);
        graph.connect(&d, 0, &add, 1);
        graph.connect(&add, 0, &d, 0);
        graph.connect(&add, 0, &out, 0);
        let mut baked = bake_graph(&graph, &registry).unwrap();
        let outs: Vec<Signal> = [10.0, 10.0, 10.0]
            .iter()
            .map(|v| baked.evaluate(&[*v])[0])
            .collect();
        assert_eq!(outs, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn instances_keep_separate_state() {
        let mut registry = ChipTypeRegistry::new();
        let meta = delay(&registry);
        registry.register_composite("delay", meta).unwrap();

        let mut graph = Graph::new();
        let a = graph.add_chip(&registry, INPUT_CP).unwrap();
        let b = graph.add_chip(&registry, INPUT_CP).unwrap();
        let da = graph.add_chip(&registry, "delay").unwrap();
        let db = graph.add_chip(&registry, "delay").unwrap();
        let oa = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        let ob = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&a, 0, &da, 0);
        graph.connect(&b, 0, &db, 0);
        graph.connect(&da, 0, &oa, 0);
        graph.connect(&db, 0, &ob, 0);
        let mut baked = bake_graph(&graph, &registry).unwrap();
        assert_eq!(baked.evaluate(&[1.0, 2.0]), vec![0.0, 0.0]);
        assert_eq!(baked.evaluate(&[3.0, 4.0]), vec![1.0, 2.0]);
    }
}
