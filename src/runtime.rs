//! # Evaluation Runtime
//!
//! A [`Program`] is baked metadata with every chip type resolved against a
//! registry: immutable, shareable, and free of per-tick state. An
//! [`Evaluator`] pairs a program with its own state store and runs it one
//! tick per [`Evaluator::evaluate`] call.
//!
//! Each tick:
//! 1. plug values from the previous tick are cleared to neutral,
//! 2. input connection points take the external inputs,
//! 3. chips run in baked order; feedthrough chips read their sockets and
//!    compute, other chips emit from their state,
//! 4. non-feedthrough chips latch their (now final) socket values,
//! 5. output connection points are read into the result vector.

use crate::bake::{BakeMetadata, SocketSource, FORMAT_VERSION};
use crate::error::BakeError;
use crate::graph::{ChipId, Params};
use crate::registry::{ChipState, ChipTypeDefinition, ChipTypeRegistry, INPUT_CP, OUTPUT_CP};
use crate::signal::{Signal, NEUTRAL};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Plug { step: usize, port: usize },
    Fixed(Signal),
}

#[derive(Debug)]
struct Step {
    id: ChipId,
    def: Arc<ChipTypeDefinition>,
    params: Params,
    sources: Vec<Source>,
    plugs: usize,
    input_slot: Option<usize>,
}

/// Baked metadata resolved against a registry.
#[derive(Debug)]
pub struct Program {
    metadata: BakeMetadata,
    steps: Vec<Step>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    latches: Vec<usize>,
}

impl Program {
    /// Resolve every chip type and check that the metadata describes a
    /// circuit this runtime can execute in its stored order.
    pub fn resolve(metadata: BakeMetadata, registry: &ChipTypeRegistry) -> Result<Self, BakeError> {
        if metadata.version != FORMAT_VERSION {
            return Err(BakeError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                got: metadata.version,
            });
        }
        if metadata.order.len() != metadata.chips.len() {
            return Err(BakeError::InvalidMetadata(format!(
                "order lists {} chips but {} are configured",
                metadata.order.len(),
                metadata.chips.len()
            )));
        }
        if metadata.inputs.len() != metadata.input_count
            || metadata.outputs.len() != metadata.output_count
        {
            return Err(BakeError::InvalidMetadata(format!(
                "declared {} inputs / {} outputs but lists {} / {}",
                metadata.input_count,
                metadata.output_count,
                metadata.inputs.len(),
                metadata.outputs.len()
            )));
        }

        let mut slots: HashMap<&ChipId, usize> = HashMap::with_capacity(metadata.order.len());
        for (idx, id) in metadata.order.iter().enumerate() {
            if !metadata.chips.contains_key(id) {
                return Err(BakeError::InvalidMetadata(format!(
                    "order names unconfigured chip {}",
                    id
                )));
            }
            if slots.insert(id, idx).is_some() {
                return Err(BakeError::InvalidMetadata(format!("chip {} ordered twice", id)));
            }
        }

        let mut steps = Vec::with_capacity(metadata.order.len());
        for (idx, id) in metadata.order.iter().enumerate() {
            let config = &metadata.chips[id];
            let def = Arc::clone(registry.lookup(&config.chip_type)?);
            if config.sockets.len() != def.socket_count() || config.plugs != def.plug_count() {
                return Err(BakeError::InvalidMetadata(format!(
                    "chip {} has {} sockets / {} plugs but type {} has {} / {}",
                    id,
                    config.sockets.len(),
                    config.plugs,
                    def.name,
                    def.socket_count(),
                    def.plug_count()
                )));
            }
            let mut sources = Vec::with_capacity(config.sockets.len());
            for (socket, source) in config.sockets.iter().enumerate() {
                let resolved = match source {
                    SocketSource::Default { value } => Source::Fixed(*value),
                    SocketSource::Wired { chip, plug } => {
                        let step = *slots.get(chip).ok_or_else(|| {
                            BakeError::InvalidWiring(format!(
                                "socket {} of {} reads missing chip {}",
                                socket, id, chip
                            ))
                        })?;
                        if *plug >= metadata.chips[chip].plugs {
                            return Err(BakeError::InvalidWiring(format!(
                                "socket {} of {} reads plug {} of {} which has {} plugs",
                                socket, id, plug, chip, metadata.chips[chip].plugs
                            )));
                        }
                        if def.feedthrough && step >= idx {
                            return Err(BakeError::InvalidMetadata(format!(
                                "{} reads {} before it is evaluated",
                                id, chip
                            )));
                        }
                        Source::Plug { step, port: *plug }
                    }
                };
                sources.push(resolved);
            }
            steps.push(Step {
                id: id.clone(),
                def,
                params: config.params.clone(),
                sources,
                plugs: config.plugs,
                input_slot: None,
            });
        }

        let inputs = connection_points(&metadata.inputs, &slots, &steps, INPUT_CP)?;
        let outputs = connection_points(&metadata.outputs, &slots, &steps, OUTPUT_CP)?;
        for (kind, listed) in [(INPUT_CP, inputs.len()), (OUTPUT_CP, outputs.len())] {
            let configured = steps.iter().filter(|s| s.def.name == kind).count();
            if configured != listed {
                return Err(BakeError::InvalidMetadata(format!(
                    "{} {} chips configured but {} listed",
                    configured, kind, listed
                )));
            }
        }
        for (slot, &step) in inputs.iter().enumerate() {
            steps[step].input_slot = Some(slot);
        }
        let latches = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.def.feedthrough)
            .map(|(idx, _)| idx)
            .collect();

        Ok(Program {
            metadata,
            steps,
            inputs,
            outputs,
            latches,
        })
    }

    pub fn metadata(&self) -> &BakeMetadata {
        &self.metadata
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Whether any output reacts to an input within the same tick.
    pub fn has_feedthrough(&self) -> bool {
        let mut reaches = vec![false; self.steps.len()];
        for (idx, step) in self.steps.iter().enumerate() {
            let reached = step.input_slot.is_some()
                || (step.def.feedthrough
                    && step.sources.iter().any(|s| match s {
                        Source::Plug { step, .. } => reaches[*step],
                        Source::Fixed(_) => false,
                    }));
            reaches[idx] = reached;
        }
        self.outputs.iter().any(|&idx| reaches[idx])
    }
}

fn connection_points(
    ids: &[ChipId],
    slots: &HashMap<&ChipId, usize>,
    steps: &[Step],
    kind: &str,
) -> Result<Vec<usize>, BakeError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let step = *slots.get(id).ok_or_else(|| {
            BakeError::InvalidMetadata(format!("{} connection point {} is not configured", kind, id))
        })?;
        if steps[step].def.name != kind {
            return Err(BakeError::InvalidMetadata(format!(
                "chip {} is listed as {} but has type {}",
                id, kind, steps[step].def.name
            )));
        }
        if out.contains(&step) {
            return Err(BakeError::InvalidMetadata(format!("connection point {} listed twice", id)));
        }
        out.push(step);
    }
    Ok(out)
}

/// A program plus the state it has accumulated so far.
///
/// Cloning an evaluator forks its state; evaluators never share state.
#[derive(Debug, Clone)]
pub struct Evaluator {
    program: Arc<Program>,
    state: Vec<ChipState>,
    plugs: Vec<Vec<Signal>>,
    tick: u64,
}

impl Evaluator {
    /// A fresh evaluator at tick 0.
    pub fn new(program: Arc<Program>) -> Self {
        let state = vec![ChipState::default(); program.steps.len()];
        let plugs = program
            .steps
            .iter()
            .map(|s| vec![NEUTRAL; s.plugs])
            .collect();
        Evaluator {
            program,
            state,
            plugs,
            tick: 0,
        }
    }

    /// Run one tick. The result always has one entry per output connection
    /// point; missing inputs read as neutral and extra inputs are ignored.
    pub fn evaluate(&mut self, inputs: &[Signal]) -> Vec<Signal> {
        let program = Arc::clone(&self.program);
        if inputs.len() != program.inputs.len() {
            warn!(
                expected = program.inputs.len(),
                got = inputs.len(),
                tick = self.tick,
                "input vector length differs from declared input count"
            );
        }
        for values in &mut self.plugs {
            values.fill(NEUTRAL);
        }
        let tick = self.tick;
        let mut gathered = Vec::new();

        for (idx, step) in program.steps.iter().enumerate() {
            if let Some(slot) = step.input_slot {
                if let Some(plug) = self.plugs[idx].first_mut() {
                    *plug = inputs.get(slot).copied().unwrap_or(NEUTRAL);
                }
                continue;
            }
            let produced = if step.def.feedthrough {
                gather(&self.plugs, &step.sources, &mut gathered);
                step.def
                    .transfer(&gathered, &step.params, &mut self.state[idx], tick)
            } else {
                step.def.emit(&step.params, &mut self.state[idx], tick)
            };
            for (plug, value) in self.plugs[idx].iter_mut().zip(produced) {
                *plug = value;
            }
        }

        for &idx in &program.latches {
            let step = &program.steps[idx];
            gather(&self.plugs, &step.sources, &mut gathered);
            step.def
                .latch(&gathered, &step.params, &mut self.state[idx], tick);
        }

        let result = program
            .outputs
            .iter()
            .map(|&idx| {
                program.steps[idx]
                    .sources
                    .first()
                    .map_or(NEUTRAL, |source| read(&self.plugs, *source))
            })
            .collect();
        self.tick += 1;
        result
    }

    /// Number of ticks evaluated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Drop all accumulated state and return to tick 0.
    pub fn reset(&mut self) {
        *self = Evaluator::new(Arc::clone(&self.program));
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn metadata(&self) -> &BakeMetadata {
        self.program.metadata()
    }

    pub fn input_count(&self) -> usize {
        self.program.input_count()
    }

    pub fn output_count(&self) -> usize {
        self.program.output_count()
    }

    /// Ids in evaluation order, for diagnostics.
    pub fn order(&self) -> impl Iterator<Item = &ChipId> {
        self.program.steps.iter().map(|s| &s.id)
    }
}

fn read(plugs: &[Vec<Signal>], source: Source) -> Signal {
    match source {
        Source::Plug { step, port } => plugs[step].get(port).copied().unwrap_or(NEUTRAL),
        Source::Fixed(value) => value,
    }
}

fn gather(plugs: &[Vec<Signal>], sources: &[Source], out: &mut Vec<Signal>) {
    out.clear();
    out.extend(sources.iter().map(|s| read(plugs, *s)));
}
