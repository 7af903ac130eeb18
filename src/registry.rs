//! # Chip Type Registry
//!
//! Catalog of chip *kinds*. A kind describes its ports and how it turns the
//! values on its sockets into values on its plugs, once per tick.
//!
//! | kind        | sockets | plugs | behaviour                          |
//! |-------------|---------|-------|------------------------------------|
//! | `input`     | 0       | 1     | external input (connection point)  |
//! | `output`    | 1       | 0     | external output (connection point) |
//! | `constant`  | 0       | 1     | `clamp(params.value)`              |
//! | `offset`    | 2       | 1     | `clamp(a + b)`                     |
//! | `scale`     | 2       | 1     | `clamp(a * b / 100)`               |
//! | `threshold` | 2       | 1     | `+100` if `a >= b` else `-100`     |
//! | `memory`    | 1       | 1     | previous tick's input              |
//! | `duplicate` | 1       | 2     | `clamp(a)` on both plugs           |
//! | `max`       | 2       | 1     | `clamp(max(a, b))`                 |
//!
//! Baked sub-circuits join the catalog as composite kinds, see
//! [`crate::composite`].

use crate::composite::CompositeType;
use crate::error::BakeError;
use crate::graph::{ParamValue, Params};
use crate::runtime::Evaluator;
use crate::signal::{clamp_signal, Signal, NEUTRAL, SIGNAL_MAX, SIGNAL_MIN};
use indexmap::IndexMap;
use std::sync::Arc;

/// Type name of input connection points.
pub const INPUT_CP: &str = "input";
/// Type name of output connection points.
pub const OUTPUT_CP: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Input,
    Output,
    Constant,
    Offset,
    Scale,
    Threshold,
    Memory,
    Duplicate,
    Max,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 9] = [
        BuiltinKind::Input,
        BuiltinKind::Output,
        BuiltinKind::Constant,
        BuiltinKind::Offset,
        BuiltinKind::Scale,
        BuiltinKind::Threshold,
        BuiltinKind::Memory,
        BuiltinKind::Duplicate,
        BuiltinKind::Max,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Input => INPUT_CP,
            BuiltinKind::Output => OUTPUT_CP,
            BuiltinKind::Constant => "constant",
            BuiltinKind::Offset => "offset",
            BuiltinKind::Scale => "scale",
            BuiltinKind::Threshold => "threshold",
            BuiltinKind::Memory => "memory",
            BuiltinKind::Duplicate => "duplicate",
            BuiltinKind::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BuiltinKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn is_connection_point(self) -> bool {
        matches!(self, BuiltinKind::Input | BuiltinKind::Output)
    }

    fn socket_names(self) -> &'static [&'static str] {
        match self {
            BuiltinKind::Input | BuiltinKind::Constant => &[],
            BuiltinKind::Output | BuiltinKind::Memory | BuiltinKind::Duplicate => &["in"],
            BuiltinKind::Offset | BuiltinKind::Scale | BuiltinKind::Threshold | BuiltinKind::Max => {
                &["a", "b"]
            }
        }
    }

    fn plug_names(self) -> &'static [&'static str] {
        match self {
            BuiltinKind::Output => &[],
            BuiltinKind::Duplicate => &["out0", "out1"],
            _ => &["out"],
        }
    }

    fn stateful(self) -> bool {
        matches!(self, BuiltinKind::Memory)
    }

    fn default_params(self) -> Params {
        let mut params = Params::new();
        if self == BuiltinKind::Constant {
            params.insert("value".into(), ParamValue::Number(0.0));
        }
        params
    }

    /// Outputs of a combinational kind for the current tick's inputs.
    fn compute(self, inputs: &[Signal], params: &Params) -> Vec<Signal> {
        let a = arg(inputs, 0);
        let b = arg(inputs, 1);
        match self {
            BuiltinKind::Input => vec![NEUTRAL],
            BuiltinKind::Output => Vec::new(),
            BuiltinKind::Constant => {
                let value = params
                    .get("value")
                    .and_then(ParamValue::as_number)
                    .unwrap_or(NEUTRAL);
                vec![clamp_signal(value)]
            }
            BuiltinKind::Offset => vec![clamp_signal(a + b)],
            BuiltinKind::Scale => vec![clamp_signal(a * b / 100.0)],
            BuiltinKind::Threshold => vec![if a >= b { SIGNAL_MAX } else { SIGNAL_MIN }],
            BuiltinKind::Memory => vec![NEUTRAL],
            BuiltinKind::Duplicate => vec![clamp_signal(a); 2],
            BuiltinKind::Max => vec![clamp_signal(a.max(b))],
        }
    }
}

fn arg(inputs: &[Signal], idx: usize) -> Signal {
    inputs.get(idx).copied().unwrap_or(NEUTRAL)
}

/// How a kind evaluates: one of the built-ins, or a baked sub-circuit.
#[derive(Debug, Clone)]
pub enum ChipType {
    Builtin(BuiltinKind),
    Composite(Arc<CompositeType>),
}

/// Editor placement hint for a port. Ignored by evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortLayout {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub layout: PortLayout,
}

impl PortDescriptor {
    pub(crate) fn socket(name: impl Into<String>) -> Self {
        PortDescriptor {
            name: name.into(),
            layout: PortLayout::Left,
        }
    }

    pub(crate) fn plug(name: impl Into<String>) -> Self {
        PortDescriptor {
            name: name.into(),
            layout: PortLayout::Right,
        }
    }
}

/// Private per-instance memory, owned by one evaluator.
#[derive(Debug, Clone, Default)]
pub enum ChipState {
    /// Not touched yet. Every kind reads this as its initial state.
    #[default]
    Fresh,
    Memory { previous_input: Signal },
    Nested(Box<Evaluator>),
}

/// A registry entry.
///
/// `stateful` kinds own a [`ChipState`] slot that survives between ticks.
/// `feedthrough` kinds produce outputs that depend on the same tick's
/// inputs; the dependency analyzer only orders chips along wires that end
/// in a feedthrough chip, so a non-feedthrough chip is what breaks a loop.
#[derive(Debug, Clone)]
pub struct ChipTypeDefinition {
    pub name: String,
    pub sockets: Vec<PortDescriptor>,
    pub plugs: Vec<PortDescriptor>,
    pub stateful: bool,
    pub feedthrough: bool,
    pub default_params: Params,
    pub kind: ChipType,
}

impl ChipTypeDefinition {
    pub fn builtin(kind: BuiltinKind) -> Self {
        ChipTypeDefinition {
            name: kind.name().to_string(),
            sockets: kind
                .socket_names()
                .iter()
                .map(|n| PortDescriptor::socket(*n))
                .collect(),
            plugs: kind
                .plug_names()
                .iter()
                .map(|n| PortDescriptor::plug(*n))
                .collect(),
            stateful: kind.stateful(),
            feedthrough: !kind.stateful(),
            default_params: kind.default_params(),
            kind: ChipType::Builtin(kind),
        }
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn plug_count(&self) -> usize {
        self.plugs.len()
    }

    pub fn builtin_kind(&self) -> Option<BuiltinKind> {
        match &self.kind {
            ChipType::Builtin(kind) => Some(*kind),
            ChipType::Composite(_) => None,
        }
    }

    /// Run one full tick of this kind: compute outputs and advance state.
    pub fn transfer(
        &self,
        inputs: &[Signal],
        params: &Params,
        state: &mut ChipState,
        tick: u64,
    ) -> Vec<Signal> {
        if !self.feedthrough {
            let out = self.emit(params, state, tick);
            self.latch(inputs, params, state, tick);
            return out;
        }
        match &self.kind {
            ChipType::Builtin(kind) => kind.compute(inputs, params),
            ChipType::Composite(composite) => composite.step(state, inputs),
        }
    }

    /// Outputs for this tick that follow from state alone.
    ///
    /// For feedthrough kinds this is the response to neutral inputs.
    pub fn emit(&self, params: &Params, state: &mut ChipState, tick: u64) -> Vec<Signal> {
        match &self.kind {
            ChipType::Builtin(BuiltinKind::Memory) => match state {
                ChipState::Memory { previous_input } => vec![*previous_input],
                _ => vec![NEUTRAL],
            },
            ChipType::Composite(composite) => composite.peek(state),
            _ => {
                let neutral = vec![NEUTRAL; self.socket_count()];
                self.transfer(&neutral, params, state, tick)
            }
        }
    }

    /// Fold this tick's inputs into state. No-op for stateless kinds.
    pub fn latch(&self, inputs: &[Signal], _params: &Params, state: &mut ChipState, _tick: u64) {
        match &self.kind {
            ChipType::Builtin(BuiltinKind::Memory) => {
                *state = ChipState::Memory {
                    previous_input: arg(inputs, 0),
                };
            }
            ChipType::Composite(composite) => {
                composite.step(state, inputs);
            }
            ChipType::Builtin(_) => {}
        }
    }
}

/// Lookup table from type name to definition.
#[derive(Debug, Clone)]
pub struct ChipTypeRegistry {
    types: IndexMap<String, Arc<ChipTypeDefinition>>,
}

impl Default for ChipTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipTypeRegistry {
    /// A registry holding every built-in kind.
    pub fn new() -> Self {
        let types = BuiltinKind::ALL
            .iter()
            .map(|kind| {
                (
                    kind.name().to_string(),
                    Arc::new(ChipTypeDefinition::builtin(*kind)),
                )
            })
            .collect();
        ChipTypeRegistry { types }
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<ChipTypeDefinition>, BakeError> {
        self.types
            .get(name)
            .ok_or_else(|| BakeError::UnknownChipType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn default_params(&self, name: &str) -> Result<Params, BakeError> {
        Ok(self.lookup(name)?.default_params.clone())
    }

    /// Registered type names, built-ins first, then in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub(crate) fn register(&mut self, def: ChipTypeDefinition) -> Result<(), BakeError> {
        if self.types.contains_key(&def.name) {
            return Err(BakeError::DuplicateChipType(def.name));
        }
        self.types.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }
}
