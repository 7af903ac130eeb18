use anyhow::{anyhow, Result};
use chip_bake::bake::bake_graph;
use chip_bake::config::{load_graph, load_metadata, parse_composite_arg, CompositeEntry, ProjectConfig};
use chip_bake::graph::Graph;
use chip_bake::registry::{ChipTypeRegistry, INPUT_CP, OUTPUT_CP};
use chip_bake::serialize::reconstruct_from_metadata;
use chip_bake::signal::Signal;
use chip_bake::stress::{run_stress, StressConfig};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chip", version, about = "Bake and run chip circuits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake a small feedback circuit and print a few ticks
    Demo,
    /// Bake a graph file into metadata
    Bake {
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Register baked metadata as a chip kind first, as NAME=PATH
        #[arg(long)]
        composite: Vec<String>,
    },
    /// Run a graph, stored metadata, or project, one line per tick
    Run {
        #[arg(long, conflicts_with_all = ["metadata", "project"])]
        graph: Option<PathBuf>,
        #[arg(long, conflicts_with = "project")]
        metadata: Option<PathBuf>,
        #[arg(long)]
        project: Option<PathBuf>,
        /// JSON array of input vectors, e.g. '[[30,40],[80,80]]'
        #[arg(long)]
        inputs: Option<String>,
        #[arg(long)]
        composite: Vec<String>,
    },
    /// Print the content id of stored metadata
    Hash {
        #[arg(long)]
        metadata: PathBuf,
    },
    /// Check bake determinism and the JSON round trip on random circuits
    Stress {
        #[arg(long)]
        seed: u64,
        #[arg(long, default_value_t = 200)]
        n: usize,
        #[arg(long, default_value_t = 12)]
        chips: usize,
        #[arg(long, default_value_t = 32)]
        ticks: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Demo => demo()?,
        Commands::Bake {
            graph,
            out,
            composite,
        } => {
            let registry = registry_with(&parse_composites(&composite)?)?;
            let graph = load_graph(&graph)?;
            let baked = bake_graph(&graph, &registry)?;
            let metadata = baked.metadata();
            fs::write(&out, metadata.to_json_pretty()?)?;
            println!(
                "baked chips={} inputs={} outputs={} cid={}",
                metadata.chips.len(),
                metadata.input_count,
                metadata.output_count,
                metadata.content_id()?
            );
        }
        Commands::Run {
            graph,
            metadata,
            project,
            inputs,
            composite,
        } => {
            let mut config = match project {
                Some(path) => ProjectConfig::load(&path)?,
                None => ProjectConfig::default(),
            };
            config.composites.extend(parse_composites(&composite)?);
            if graph.is_some() {
                config.graph = graph;
            }
            if metadata.is_some() {
                config.metadata = metadata;
            }
            if let Some(text) = inputs {
                config.inputs = serde_json::from_str::<Vec<Vec<Signal>>>(&text)
                    .map_err(|e| anyhow!("--inputs must be a JSON array of arrays: {e}"))?;
            }
            let registry = config.registry()?;
            let mut baked = config.build(&registry)?;
            for (tick, vector) in config.inputs.iter().enumerate() {
                let out = baked.evaluate(vector);
                println!("tick={} in={:?} out={:?}", tick, vector, out);
            }
        }
        Commands::Hash { metadata } => {
            let metadata = load_metadata(&metadata)?;
            println!("{}", metadata.content_id()?);
        }
        Commands::Stress {
            seed,
            n,
            chips,
            ticks,
        } => {
            let config = StressConfig {
                seed,
                graphs: n,
                chips,
                ticks,
                ..StressConfig::default()
            };
            let report = run_stress(&config, &ChipTypeRegistry::new())?;
            println!(
                "stress seed={} graphs={} baked={} cycles={} ticks={} unstable={} divergent={}",
                seed,
                report.graphs,
                report.baked,
                report.cycles,
                report.ticks,
                report.unstable_bakes,
                report.divergent
            );
            if !report.ok() {
                return Err(anyhow!("stress run found mismatches"));
            }
        }
    }
    Ok(())
}

fn parse_composites(args: &[String]) -> Result<Vec<CompositeEntry>> {
    args.iter().map(|a| parse_composite_arg(a)).collect()
}

fn registry_with(composites: &[CompositeEntry]) -> Result<ChipTypeRegistry> {
    let mut registry = ChipTypeRegistry::new();
    for entry in composites {
        let metadata = load_metadata(&entry.metadata)?;
        registry.register_composite(&entry.name, metadata)?;
    }
    Ok(registry)
}

fn demo() -> Result<()> {
    // out = clamp(in + previous(out)): a running sum held by a memory chip.
    let registry = ChipTypeRegistry::new();
    let mut graph = Graph::new();
    let input = graph.add_chip(&registry, INPUT_CP)?;
    let add = graph.add_chip(&registry, "offset")?;
    let mem = graph.add_chip(&registry, "memory")?;
    let out = graph.add_chip(&registry, OUTPUT_CP)?;
    graph.connect(&input, 0, &add, 0);
    graph.connect(&mem, 0, &add, 1);
    graph.connect(&add, 0, &mem, 0);
    graph.connect(&add, 0, &out, 0);

    let mut baked = bake_graph(&graph, &registry)?;
    let order: Vec<&str> = baked.evaluator().order().map(|id| id.as_str()).collect();
    println!("order: {}", order.join(" -> "));
    println!("cid: {}", baked.metadata().content_id()?);
    let mut replay = reconstruct_from_metadata(baked.metadata().clone(), &registry)?;
    for (tick, value) in [10.0, 20.0, 30.0, 50.0, -90.0].into_iter().enumerate() {
        let live = baked.evaluate(&[value]);
        let again = replay.evaluate(&[value]);
        println!("tick={} in={} out={:?} replay={:?}", tick, value, live, again);
    }
    Ok(())
}
