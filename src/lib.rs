//! # chip_bake
//!
//! **Chip circuits, baked into replayable tick-by-tick evaluators.**
//!
//! Small signal-processing chips are wired plug-to-socket into a [`Graph`].
//! Baking checks the wiring, rejects feedback loops that no `memory` chip
//! breaks, fixes a deterministic evaluation order, and returns both an
//! evaluator and [`BakeMetadata`]: plain data that can be stored, rebuilt
//! into an independent evaluator, or registered as a chip kind of its own.
//!
//! ## Quick Start
//!
//! ```rust
//! use chip_bake::{bake_graph, reconstruct_from_json, ChipTypeRegistry, Graph};
//!
//! let registry = ChipTypeRegistry::new();
//! let mut graph = Graph::new();
//! let input = graph.add_chip(&registry, "input").unwrap();
//! let delay = graph.add_chip(&registry, "memory").unwrap();
//! let output = graph.add_chip(&registry, "output").unwrap();
//! graph.connect(&input, 0, &delay, 0);
//! graph.connect(&delay, 0, &output, 0);
//!
//! let mut baked = bake_graph(&graph, &registry).unwrap();
//! assert_eq!(baked.evaluate(&[80.0]), vec![0.0]);
//! assert_eq!(baked.evaluate(&[50.0]), vec![80.0]);
//!
//! let saved = baked.metadata().to_json().unwrap();
//! let mut replay = reconstruct_from_json(&saved, &registry).unwrap();
//! assert_eq!(replay.evaluate(&[80.0]), vec![0.0]);
//! assert_eq!(replay.evaluate(&[50.0]), vec![80.0]);
//! ```
//!
//! ## Key Concepts
//!
//! - **Chip**: a unit with sockets (inputs) and plugs (outputs)
//! - **Path**: a wire from a plug to a socket
//! - **Connection point**: `input` / `output` chips, the circuit's external ports
//! - **Bake**: validate, order and compile a graph
//! - **Composite**: a baked circuit registered as a chip kind

pub mod analyzer;
pub mod bake;
pub mod composite;
pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod runtime;
pub mod serialize;
pub mod signal;
pub mod stress;

pub use bake::{bake_graph, BakeMetadata, Baked, ChipConfig, SocketSource};
pub use error::BakeError;
pub use graph::{ChipId, ChipInstance, Graph, ParamValue, Params, Path, PortRef, Side};
pub use registry::{BuiltinKind, ChipTypeDefinition, ChipTypeRegistry};
pub use runtime::Evaluator;
pub use serialize::{reconstruct_from_json, reconstruct_from_metadata};
pub use signal::Signal;
