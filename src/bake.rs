//! # Baking Compiler
//!
//! Turns an editable [`Graph`] into [`BakeMetadata`] (plain data: evaluation
//! order, per-chip configuration, declared input/output counts) and a live
//! [`Evaluator`] over it.
//!
//! ```rust
//! use chip_bake::{bake_graph, ChipTypeRegistry, Graph};
//!
//! let registry = ChipTypeRegistry::new();
//! let mut graph = Graph::new();
//! let a = graph.add_chip(&registry, "input").unwrap();
//! let b = graph.add_chip(&registry, "input").unwrap();
//! let sum = graph.add_chip(&registry, "offset").unwrap();
//! let out = graph.add_chip(&registry, "output").unwrap();
//! graph.connect(&a, 0, &sum, 0);
//! graph.connect(&b, 0, &sum, 1);
//! graph.connect(&sum, 0, &out, 0);
//!
//! let mut baked = bake_graph(&graph, &registry).unwrap();
//! assert_eq!(baked.evaluate(&[30.0, 40.0]), vec![70.0]);
//! assert_eq!(baked.evaluate(&[80.0, 80.0]), vec![100.0]);
//! ```

use crate::analyzer::analyze;
use crate::error::BakeError;
use crate::graph::{ChipId, Graph, Params};
use crate::registry::ChipTypeRegistry;
use crate::runtime::{Evaluator, Program};
use crate::signal::{Signal, NEUTRAL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Version of the metadata layout. Bump when the shape changes.
pub const FORMAT_VERSION: u32 = 1;

/// Where a socket takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SocketSource {
    /// The given plug of another chip.
    Wired { chip: ChipId, plug: usize },
    /// Unconnected: a fixed value.
    Default { value: Signal },
}

/// Baked configuration of one chip instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipConfig {
    #[serde(rename = "type")]
    pub chip_type: String,
    #[serde(default)]
    pub params: Params,
    pub sockets: Vec<SocketSource>,
    pub plugs: usize,
}

/// Everything needed to rebuild an evaluator, as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeMetadata {
    pub version: u32,
    /// Chip ids in evaluation order.
    pub order: Vec<ChipId>,
    pub chips: BTreeMap<ChipId, ChipConfig>,
    /// Input connection points by declared position.
    pub inputs: Vec<ChipId>,
    /// Output connection points by declared position.
    pub outputs: Vec<ChipId>,
    pub input_count: usize,
    pub output_count: usize,
}

/// The product of a bake: metadata plus an evaluator that owns fresh state.
#[derive(Debug, Clone)]
pub struct Baked {
    evaluator: Evaluator,
}

impl Baked {
    pub(crate) fn from_program(program: Program) -> Self {
        Baked {
            evaluator: Evaluator::new(Arc::new(program)),
        }
    }

    /// Run one tick.
    pub fn evaluate(&mut self, inputs: &[Signal]) -> Vec<Signal> {
        self.evaluator.evaluate(inputs)
    }

    pub fn metadata(&self) -> &BakeMetadata {
        self.evaluator.metadata()
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }

    pub fn into_evaluator(self) -> Evaluator {
        self.evaluator
    }
}

/// Validate, order and compile a graph.
pub fn bake_graph(graph: &Graph, registry: &ChipTypeRegistry) -> Result<Baked, BakeError> {
    let analysis = analyze(graph, registry)?;

    let mut chips = BTreeMap::new();
    for (chip, drivers) in graph.chips().zip(&analysis.drivers) {
        let sockets = drivers
            .iter()
            .map(|driver| match driver {
                Some(port) => SocketSource::Wired {
                    chip: port.chip.clone(),
                    plug: port.index,
                },
                None => SocketSource::Default { value: NEUTRAL },
            })
            .collect();
        chips.insert(
            chip.id.clone(),
            ChipConfig {
                chip_type: chip.chip_type.clone(),
                params: chip.params.clone(),
                sockets,
                plugs: chip.plugs,
            },
        );
    }
    let inputs: Vec<ChipId> = graph.input_cps().map(|c| c.id.clone()).collect();
    let outputs: Vec<ChipId> = graph.output_cps().map(|c| c.id.clone()).collect();
    let metadata = BakeMetadata {
        version: FORMAT_VERSION,
        order: analysis.order,
        chips,
        input_count: inputs.len(),
        output_count: outputs.len(),
        inputs,
        outputs,
    };

    debug!(
        chips = metadata.chips.len(),
        paths = graph.paths().len(),
        inputs = metadata.input_count,
        outputs = metadata.output_count,
        "baked graph"
    );
    let program = Program::resolve(metadata, registry)?;
    Ok(Baked::from_program(program))
}
