//! Project files for the `chip` command line.
//!
//! ```json
//! {
//!   "composites": [{ "name": "adder", "metadata": "adder.meta.json" }],
//!   "graph": "top.graph.json",
//!   "inputs": [[30, 40], [80, 80]]
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the project
//! file. Composites are registered in the listed order, so later entries
//! may use earlier ones.

use crate::bake::{bake_graph, BakeMetadata, Baked};
use crate::graph::Graph;
use crate::registry::ChipTypeRegistry;
use crate::serialize::reconstruct_from_metadata;
use crate::signal::Signal;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeEntry {
    pub name: String,
    pub metadata: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub composites: Vec<CompositeEntry>,
    /// Graph to bake. Takes precedence over `metadata`.
    #[serde(default)]
    pub graph: Option<PathBuf>,
    /// Previously baked metadata to reconstruct.
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    /// One input vector per tick.
    #[serde(default)]
    pub inputs: Vec<Vec<Signal>>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading project {}", path.display()))?;
        let mut config: ProjectConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing project {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Built-in kinds plus every composite listed in the project.
    pub fn registry(&self) -> Result<ChipTypeRegistry> {
        let mut registry = ChipTypeRegistry::new();
        for entry in &self.composites {
            let metadata = load_metadata(&self.resolve(&entry.metadata))?;
            registry
                .register_composite(&entry.name, metadata)
                .with_context(|| format!("registering composite {}", entry.name))?;
        }
        Ok(registry)
    }

    /// Bake the project's graph, or rebuild its stored metadata.
    pub fn build(&self, registry: &ChipTypeRegistry) -> Result<Baked> {
        if let Some(graph) = &self.graph {
            let graph = load_graph(&self.resolve(graph))?;
            return Ok(bake_graph(&graph, registry)?);
        }
        if let Some(metadata) = &self.metadata {
            let metadata = load_metadata(&self.resolve(metadata))?;
            return Ok(reconstruct_from_metadata(metadata, registry)?);
        }
        Err(anyhow!("project names neither a graph nor metadata"))
    }
}

pub fn load_graph(path: &Path) -> Result<Graph> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing graph {}", path.display()))
}

pub fn load_metadata(path: &Path) -> Result<BakeMetadata> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading metadata {}", path.display()))?;
    BakeMetadata::from_json(&text).with_context(|| format!("parsing metadata {}", path.display()))
}

/// Parse `name=path` as given to `--composite`.
pub fn parse_composite_arg(arg: &str) -> Result<CompositeEntry> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=PATH, got {}", arg))?;
    if name.is_empty() || path.is_empty() {
        return Err(anyhow!("expected NAME=PATH, got {}", arg));
    }
    Ok(CompositeEntry {
        name: name.to_string(),
        metadata: PathBuf::from(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{INPUT_CP, OUTPUT_CP};
    use tempfile::tempdir;

    #[test]
    fn project_with_composite_runs() {
        let dir = tempdir().unwrap();
        let base = ChipTypeRegistry::new();

        let mut inner = Graph::new();
        let a = inner.add_chip(&base, INPUT_CP).unwrap();
        let b = inner.add_chip(&base, INPUT_CP).unwrap();
        let s = inner.add_chip(&base, "scale").unwrap();
        let o = inner.add_chip(&base, OUTPUT_CP).unwrap();
        inner.connect(&a, 0, &s, 0);
        inner.connect(&b, 0, &s, 1);
        inner.connect(&s, 0, &o, 0);
        let meta = bake_graph(&inner, &base).unwrap().metadata().clone();
        fs::write(dir.path().join("scaler.json"), meta.to_json().unwrap()).unwrap();

        let project = serde_json::json!({
            "composites": [{ "name": "scaler", "metadata": "scaler.json" }],
            "graph": "top.json",
            "inputs": [[80, 50]]
        });
        fs::write(dir.path().join("project.json"), project.to_string()).unwrap();

        let config = ProjectConfig::load(&dir.path().join("project.json")).unwrap();
        let registry = config.registry().unwrap();

        let mut top = Graph::new();
        let x = top.add_chip(&registry, INPUT_CP).unwrap();
        let y = top.add_chip(&registry, INPUT_CP).unwrap();
        let c = top.add_chip(&registry, "scaler").unwrap();
        let out = top.add_chip(&registry, OUTPUT_CP).unwrap();
        top.connect(&x, 0, &c, 0);
        top.connect(&y, 0, &c, 1);
        top.connect(&c, 0, &out, 0);
        fs::write(dir.path().join("top.json"), serde_json::to_string(&top).unwrap()).unwrap();

        let mut baked = config.build(&registry).unwrap();
        assert_eq!(baked.evaluate(&config.inputs[0]), vec![40.0]);
    }

    #[test]
    fn composite_arg_parsing() {
        let entry = parse_composite_arg("adder=out/adder.json").unwrap();
        assert_eq!(entry.name, "adder");
        assert_eq!(entry.metadata, PathBuf::from("out/adder.json"));
        assert!(parse_composite_arg("adder").is_err());
        assert!(parse_composite_arg("=x").is_err());
    }

    #[test]
    fn empty_project_cannot_build() {
        let config = ProjectConfig::default();
        let registry = config.registry().unwrap();
        assert!(config.build(&registry).is_err());
    }
}
