//! # Dependency Analyzer
//!
//! Checks the wiring of a [`Graph`] and orders its chips so that every
//! same-tick dependency is evaluated before its consumer.
//!
//! A path `U -> V` becomes a scheduling edge only when `V` is feedthrough.
//! Paths into a stateful, non-feedthrough chip (a `memory`) are not edges, so
//! a loop through one is legal. The order is Kahn's algorithm with the
//! lowest graph insertion position always taken first among ready chips,
//! which makes re-baking an unchanged graph reproduce the same order.

use crate::error::BakeError;
use crate::graph::{ChipId, Graph, Path, PortRef, Side};
use crate::registry::ChipTypeRegistry;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Result of a successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Chip ids in evaluation order.
    pub order: Vec<ChipId>,
    /// Driving plug of every socket, indexed by graph insertion position.
    pub drivers: Vec<Vec<Option<PortRef>>>,
}

pub fn analyze(graph: &Graph, registry: &ChipTypeRegistry) -> Result<Analysis, BakeError> {
    let n = graph.len();
    let mut feedthrough = Vec::with_capacity(n);
    let mut drivers: Vec<Vec<Option<PortRef>>> = Vec::with_capacity(n);
    for chip in graph.chips() {
        let def = registry.lookup(&chip.chip_type)?;
        if chip.sockets != def.socket_count() || chip.plugs != def.plug_count() {
            return Err(BakeError::InvalidWiring(format!(
                "chip {} declares {} sockets / {} plugs but type {} has {} / {}",
                chip.id,
                chip.sockets,
                chip.plugs,
                def.name,
                def.socket_count(),
                def.plug_count()
            )));
        }
        feedthrough.push(def.feedthrough);
        drivers.push(vec![None; chip.sockets]);
    }

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    for path in graph.paths() {
        let (from, to) = check_path(graph, path)?;
        let slot = &mut drivers[to][path.target.index];
        if let Some(existing) = slot {
            return Err(BakeError::InvalidWiring(format!(
                "socket {} is driven by both {} and {}",
                path.target, existing, path.source
            )));
        }
        *slot = Some(path.source.clone());
        if feedthrough[to] {
            edges[from].push(to);
            in_degree[to] += 1;
        }
    }

    match kahn_order(&edges, in_degree) {
        Ok(order) => Ok(Analysis {
            order: order.into_iter().map(|idx| chip_id(graph, idx)).collect(),
            drivers,
        }),
        Err(stuck) => Err(BakeError::Cycle {
            chips: stuck.into_iter().map(|idx| chip_id(graph, idx)).collect(),
        }),
    }
}

fn chip_id(graph: &Graph, position: usize) -> ChipId {
    graph
        .chip_at(position)
        .map(|c| c.id.clone())
        .unwrap_or_else(|| ChipId::new(format!("#{}", position)))
}

/// Validate one path and return the insertion positions of its ends.
fn check_path(graph: &Graph, path: &Path) -> Result<(usize, usize), BakeError> {
    if path.source.side != Side::Plug || path.target.side != Side::Socket {
        return Err(BakeError::InvalidWiring(format!(
            "path {} must run from a plug to a socket, got {} -> {}",
            path.id, path.source, path.target
        )));
    }
    let from = graph.position(&path.source.chip).ok_or_else(|| {
        BakeError::InvalidWiring(format!(
            "path {} reads from missing chip {}",
            path.id, path.source.chip
        ))
    })?;
    let to = graph.position(&path.target.chip).ok_or_else(|| {
        BakeError::InvalidWiring(format!(
            "path {} feeds missing chip {}",
            path.id, path.target.chip
        ))
    })?;
    let plugs = graph.chip_at(from).map_or(0, |c| c.plugs);
    if path.source.index >= plugs {
        return Err(BakeError::InvalidWiring(format!(
            "path {} reads {} but the chip has {} plugs",
            path.id, path.source, plugs
        )));
    }
    let sockets = graph.chip_at(to).map_or(0, |c| c.sockets);
    if path.target.index >= sockets {
        return Err(BakeError::InvalidWiring(format!(
            "path {} feeds {} but the chip has {} sockets",
            path.id, path.target, sockets
        )));
    }
    Ok((from, to))
}

/// Kahn's algorithm, smallest ready index first.
///
/// On failure returns the indices left on or between cycles, ascending.
fn kahn_order(edges: &[Vec<usize>], mut in_degree: Vec<usize>) -> Result<Vec<usize>, Vec<usize>> {
    let n = edges.len();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&idx| in_degree[idx] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        placed[idx] = true;
        for &next in &edges[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    if order.len() == n {
        return Ok(order);
    }
    Err(cycle_members(edges, &placed))
}

/// Drop chips that merely hang off a cycle downstream, leaving the ones
/// that feed back into the stuck set.
fn cycle_members(edges: &[Vec<usize>], placed: &[bool]) -> Vec<usize> {
    let n = edges.len();
    let mut alive: Vec<bool> = placed.iter().map(|p| !p).collect();
    let mut out_degree: Vec<usize> = (0..n)
        .map(|idx| {
            if alive[idx] {
                edges[idx].iter().filter(|&&t| alive[t]).count()
            } else {
                0
            }
        })
        .collect();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (from, targets) in edges.iter().enumerate() {
        if !alive[from] {
            continue;
        }
        for &to in targets {
            if alive[to] {
                incoming[to].push(from);
            }
        }
    }
    let mut sinks: VecDeque<usize> = (0..n)
        .filter(|&idx| alive[idx] && out_degree[idx] == 0)
        .collect();
    while let Some(idx) = sinks.pop_front() {
        alive[idx] = false;
        for &from in &incoming[idx] {
            if alive[from] {
                out_degree[from] -= 1;
                if out_degree[from] == 0 {
                    sinks.push_back(from);
                }
            }
        }
    }
    (0..n).filter(|&idx| alive[idx]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{INPUT_CP, OUTPUT_CP};

    fn ids(order: &[ChipId]) -> Vec<&str> {
        order.iter().map(ChipId::as_str).collect()
    }

    #[test]
    fn ties_follow_insertion_order() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        let off = graph.add_chip(&registry, "offset").unwrap();
        let a = graph.add_chip(&registry, INPUT_CP).unwrap();
        let b = graph.add_chip(&registry, INPUT_CP).unwrap();
        graph.connect(&b, 0, &off, 1);
        graph.connect(&a, 0, &off, 0);
        graph.connect(&off, 0, &out, 0);
        let analysis = analyze(&graph, &registry).unwrap();
        assert_eq!(
            ids(&analysis.order),
            vec!["input-2", "input-3", "offset-1", "output-0"]
        );
        assert_eq!(analysis.drivers[1][0], Some(PortRef::plug(a, 0)));
        assert_eq!(analysis.drivers[1][1], Some(PortRef::plug(b, 0)));
    }

    #[test]
    fn combinational_loop_is_a_cycle() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let a = graph.add_chip(&registry, "offset").unwrap();
        let b = graph.add_chip(&registry, "scale").unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 0, &a, 0);
        graph.connect(&a, 0, &b, 0);
        graph.connect(&b, 0, &a, 1);
        graph.connect(&b, 0, &out, 0);
        match analyze(&graph, &registry) {
            Err(BakeError::Cycle { chips }) => assert_eq!(ids(&chips), vec!["offset-1", "scale-2"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn memory_breaks_the_loop() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let add = graph.add_chip(&registry, "offset").unwrap();
        let mem = graph.add_chip(&registry, "memory").unwrap();
        graph.connect(&input, 0, &add, 0);
        graph.connect(&add, 0, &mem, 0);
        graph.connect(&mem, 0, &add, 1);
        let analysis = analyze(&graph, &registry).unwrap();
        assert_eq!(ids(&analysis.order), vec!["input-0", "memory-2", "offset-1"]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let max = graph.add_chip(&registry, "max").unwrap();
        graph.connect(&max, 0, &max, 0);
        let err = analyze(&graph, &registry).unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn wiring_errors() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 0, &out, 0);
        graph.connect(&input, 0, &out, 0);
        assert!(matches!(analyze(&graph, &registry), Err(BakeError::InvalidWiring(_))));

        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 1, &out, 0);
        assert!(matches!(analyze(&graph, &registry), Err(BakeError::InvalidWiring(_))));

        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        graph.connect(&input, 0, &ChipId::from("ghost"), 0);
        assert!(matches!(analyze(&graph, &registry), Err(BakeError::InvalidWiring(_))));

        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        graph.connect(&input, 0, &out, 1);
        assert!(matches!(analyze(&graph, &registry), Err(BakeError::InvalidWiring(_))));
    }

    #[test]
    fn paths_must_run_plug_to_socket() {
        let registry = ChipTypeRegistry::new();
        let mut graph = Graph::new();
        let input = graph.add_chip(&registry, INPUT_CP).unwrap();
        let out = graph.add_chip(&registry, OUTPUT_CP).unwrap();
        let chips: Vec<_> = graph.chips().cloned().collect();
        let reversed = Path {
            id: "p".into(),
            source: PortRef::socket(out, 0),
            target: PortRef {
                chip: input,
                index: 0,
                side: Side::Plug,
            },
        };
        let graph = Graph::from_parts(chips, vec![reversed]).unwrap();
        match analyze(&graph, &registry) {
            Err(BakeError::InvalidWiring(msg)) => assert!(msg.contains("from a plug to a socket")),
            other => panic!("expected invalid wiring, got {:?}", other),
        }

        let text = r#"{"chips":[
            {"id":"a","type":"input","sockets":0,"plugs":1},
            {"id":"b","type":"output","sockets":1,"plugs":0}
        ],"paths":[
            {"id":"p","source":{"chip":"a","index":0,"side":"plug"},
             "target":{"chip":"b","index":3,"side":"socket"}}
        ]}"#;
        let graph: Graph = serde_json::from_str(text).unwrap();
        match analyze(&graph, &registry) {
            Err(BakeError::InvalidWiring(msg)) => assert!(msg.contains("1 sockets")),
            other => panic!("expected invalid wiring, got {:?}", other),
        }
    }

    #[test]
    fn downstream_of_cycle_is_not_blamed() {
        let edges = vec![vec![1], vec![0, 2], vec![]];
        let placed = vec![false, false, false];
        assert_eq!(cycle_members(&edges, &placed), vec![0, 1]);
    }
}
