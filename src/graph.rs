//! # Graph Model
//!
//! The editable circuit: chip instances keyed by [`ChipId`] and the paths
//! (wires) between their ports. The editor mutates a [`Graph`] freely; nothing
//! here is validated until the graph is baked.
//!
//! Chip insertion order is preserved and is meaningful: it fixes the
//! declared position of connection points and breaks ties when the baking
//! compiler orders chips.

use crate::error::BakeError;
use crate::registry::{BuiltinKind, ChipTypeRegistry, INPUT_CP, OUTPUT_CP};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a chip instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChipId(String);

impl ChipId {
    pub fn new(id: impl Into<String>) -> Self {
        ChipId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChipId {
    fn from(id: &str) -> Self {
        ChipId(id.to_string())
    }
}

impl From<String> for ChipId {
    fn from(id: String) -> Self {
        ChipId(id)
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a chip a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Input port.
    Socket,
    /// Output port.
    Plug,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Socket => f.write_str("socket"),
            Side::Plug => f.write_str("plug"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub chip: ChipId,
    pub index: usize,
    pub side: Side,
}

impl PortRef {
    pub fn plug(chip: impl Into<ChipId>, index: usize) -> Self {
        PortRef {
            chip: chip.into(),
            index,
            side: Side::Plug,
        }
    }

    pub fn socket(chip: impl Into<ChipId>, index: usize) -> Self {
        PortRef {
            chip: chip.into(),
            index,
            side: Side::Socket,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.chip, self.side, self.index)
    }
}

/// A wire from one chip's plug to another chip's socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub id: String,
    pub source: PortRef,
    pub target: PortRef,
}

/// A chip parameter value.
///
/// Numbers must be finite: JSON has no spelling for NaN or infinity, so such
/// a value would not survive a save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }
}

pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipInstance {
    pub id: ChipId,
    #[serde(rename = "type")]
    pub chip_type: String,
    #[serde(default)]
    pub params: Params,
    pub sockets: usize,
    pub plugs: usize,
}

impl ChipInstance {
    pub fn is_input_cp(&self) -> bool {
        self.chip_type == INPUT_CP
    }

    pub fn is_output_cp(&self) -> bool {
        self.chip_type == OUTPUT_CP
    }
}

/// The user's circuit: chips in insertion order plus the paths between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDoc", into = "GraphDoc")]
pub struct Graph {
    chips: IndexMap<ChipId, ChipInstance>,
    paths: Vec<Path>,
    next_path: u64,
}

/// On-disk shape of a graph: chips as a list so insertion order survives.
#[derive(Clone, Serialize, Deserialize)]
struct GraphDoc {
    chips: Vec<ChipInstance>,
    #[serde(default)]
    paths: Vec<Path>,
}

impl TryFrom<GraphDoc> for Graph {
    type Error = BakeError;

    fn try_from(doc: GraphDoc) -> Result<Self, Self::Error> {
        Graph::from_parts(doc.chips, doc.paths)
    }
}

impl From<Graph> for GraphDoc {
    fn from(graph: Graph) -> Self {
        GraphDoc {
            chips: graph.chips.into_values().collect(),
            paths: graph.paths,
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from chips (in insertion order) and paths.
    ///
    /// Fails if two chips share an id.
    pub fn from_parts(
        chips: impl IntoIterator<Item = ChipInstance>,
        paths: Vec<Path>,
    ) -> Result<Self, BakeError> {
        let mut by_id = IndexMap::new();
        for chip in chips {
            if by_id.contains_key(&chip.id) {
                return Err(BakeError::InvalidWiring(format!(
                    "chip id {} is used more than once",
                    chip.id
                )));
            }
            by_id.insert(chip.id.clone(), chip);
        }
        let next_path = paths.len() as u64;
        Ok(Graph {
            chips: by_id,
            paths,
            next_path,
        })
    }

    /// Add a chip of a registered type, with the type's port counts and
    /// default parameters. Ids are `"<type>-<n>"`.
    pub fn add_chip(
        &mut self,
        registry: &ChipTypeRegistry,
        chip_type: &str,
    ) -> Result<ChipId, BakeError> {
        let def = registry.lookup(chip_type)?;
        let mut n = self.chips.len();
        let id = loop {
            let candidate = ChipId(format!("{}-{}", chip_type, n));
            if !self.chips.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.chips.insert(
            id.clone(),
            ChipInstance {
                id: id.clone(),
                chip_type: chip_type.to_string(),
                params: def.default_params.clone(),
                sockets: def.socket_count(),
                plugs: def.plug_count(),
            },
        );
        Ok(id)
    }

    /// Insert or replace a chip. A replaced chip keeps its position.
    pub fn insert_chip(&mut self, chip: ChipInstance) -> Option<ChipInstance> {
        self.chips.insert(chip.id.clone(), chip)
    }

    /// Remove a chip and every path touching it.
    pub fn remove_chip(&mut self, id: &ChipId) -> Option<ChipInstance> {
        let removed = self.chips.shift_remove(id)?;
        self.paths
            .retain(|p| &p.source.chip != id && &p.target.chip != id);
        Some(removed)
    }

    /// Wire `from`'s plug to `to`'s socket. Checked at bake time.
    pub fn connect(&mut self, from: &ChipId, plug: usize, to: &ChipId, socket: usize) -> String {
        let id = loop {
            let candidate = format!("path-{}", self.next_path);
            self.next_path += 1;
            if !self.paths.iter().any(|p| p.id == candidate) {
                break candidate;
            }
        };
        self.paths.push(Path {
            id: id.clone(),
            source: PortRef::plug(from.clone(), plug),
            target: PortRef::socket(to.clone(), socket),
        });
        id
    }

    pub fn disconnect(&mut self, path_id: &str) -> Option<Path> {
        let pos = self.paths.iter().position(|p| p.id == path_id)?;
        Some(self.paths.remove(pos))
    }

    /// Set a parameter. Returns false if the chip is missing or the value is
    /// a non-finite number.
    pub fn set_param(&mut self, id: &ChipId, key: &str, value: ParamValue) -> bool {
        if matches!(value, ParamValue::Number(n) if !n.is_finite()) {
            return false;
        }
        match self.chips.get_mut(id) {
            Some(chip) => {
                chip.params.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn chip(&self, id: &ChipId) -> Option<&ChipInstance> {
        self.chips.get(id)
    }

    pub fn chips(&self) -> impl Iterator<Item = &ChipInstance> {
        self.chips.values()
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Insertion position of a chip.
    pub fn position(&self, id: &ChipId) -> Option<usize> {
        self.chips.get_index_of(id)
    }

    pub fn chip_at(&self, position: usize) -> Option<&ChipInstance> {
        self.chips.get_index(position).map(|(_, chip)| chip)
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Input connection points in declared-position order.
    pub fn input_cps(&self) -> impl Iterator<Item = &ChipInstance> {
        self.chips.values().filter(|c| c.is_input_cp())
    }

    /// Output connection points in declared-position order.
    pub fn output_cps(&self) -> impl Iterator<Item = &ChipInstance> {
        self.chips.values().filter(|c| c.is_output_cp())
    }
}

/// Build a random circuit out of built-in kinds.
///
/// Every socket gets at most one driver, but feedback loops are not avoided:
/// callers that need a bakeable graph must be ready for a cycle error.
pub fn random_graph<R: Rng>(
    rng: &mut R,
    registry: &ChipTypeRegistry,
    inputs: usize,
    outputs: usize,
    chips: usize,
    wire_per10k: u32,
) -> Result<Graph, BakeError> {
    let mut graph = Graph::new();
    for _ in 0..inputs {
        graph.add_chip(registry, INPUT_CP)?;
    }
    let kinds: Vec<BuiltinKind> = BuiltinKind::ALL
        .iter()
        .copied()
        .filter(|k| !k.is_connection_point())
        .collect();
    for _ in 0..chips {
        let kind = kinds[rng.gen_range(0..kinds.len())];
        let id = graph.add_chip(registry, kind.name())?;
        if kind == BuiltinKind::Constant {
            let value = rng.gen_range(-120..=120) as f64;
            graph.set_param(&id, "value", ParamValue::Number(value));
        }
    }
    for _ in 0..outputs {
        graph.add_chip(registry, OUTPUT_CP)?;
    }

    let mut plugs = Vec::new();
    let mut sockets = Vec::new();
    for chip in graph.chips() {
        for p in 0..chip.plugs {
            plugs.push((chip.id.clone(), p));
        }
        for s in 0..chip.sockets {
            sockets.push((chip.id.clone(), s));
        }
    }
    if plugs.is_empty() {
        return Ok(graph);
    }
    for (chip, socket) in sockets {
        // Output connection points are always driven so results are not all zero.
        let forced = graph.chip(&chip).is_some_and(|c| c.is_output_cp());
        if forced || rng.gen_range(0..10_000) < wire_per10k {
            let (from, plug) = plugs[rng.gen_range(0..plugs.len())].clone();
            graph.connect(&from, plug, &chip, socket);
        }
    }
    Ok(graph)
}
