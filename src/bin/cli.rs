// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Volmesh CLI
//!
//! Set `RUST_LOG` to control log output, e.g. `RUST_LOG=volmesh=debug`;
//! `-v` raises the default level to info, `-vv` to debug.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volmesh::config::MesherConfig;
use volmesh::domain::SubdomainId;
use volmesh::error::MeshError;
use volmesh::geometry::analyze;
use volmesh::kernel::{MeshSummary, Mesher};
use volmesh::mesher::{CellSize, RefinementCriteria};
use volmesh::{io, query};

#[derive(Parser)]
#[command(name = "volmesh")]
#[command(author, version, about = "Volmesh - Delaunay refinement tetrahedral mesher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./volmesh.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh a label volume (JSON file or directory of PNG slices)
    Image {
        input: PathBuf,

        /// Output mesh (.msh, .json or .stl)
        #[arg(short, long)]
        output: PathBuf,

        /// Sizing field JSON; cell size follows the field
        #[arg(long, value_name = "FILE")]
        sizing: Option<PathBuf>,

        #[command(flatten)]
        criteria: CriteriaArgs,
    },

    /// Mesh a set of closed STL surfaces
    Surfaces {
        /// Surface files, one per --pair
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Incident subdomains of each surface, as A:B
        #[arg(long = "pair", required = true, value_parser = parse_pair)]
        pairs: Vec<(SubdomainId, SubdomainId)>,

        /// Output mesh (.msh, .json or .stl)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        criteria: CriteriaArgs,
    },

    /// Check an STL surface for self-intersections
    Check { input: PathBuf },

    /// Print statistics of a JSON mesh
    Info { input: PathBuf },
}

#[derive(Args)]
struct CriteriaArgs {
    /// Minimum boundary facet angle (degrees)
    #[arg(long)]
    facet_angle: Option<f64>,

    /// Maximum surface Delaunay ball radius
    #[arg(long)]
    facet_size: Option<f64>,

    /// Maximum facet circumcenter to surface distance
    #[arg(long)]
    facet_distance: Option<f64>,

    /// Maximum cell radius-edge ratio
    #[arg(long)]
    radius_edge_ratio: Option<f64>,

    /// Maximum cell circumradius
    #[arg(long)]
    cell_size: Option<f64>,

    /// Run the sliver optimizer after refinement
    #[arg(long)]
    optimize: bool,

    /// Insertion budget
    #[arg(long)]
    max_insertions: Option<usize>,
}

impl CriteriaArgs {
    fn apply(&self, config: &mut MesherConfig) {
        let criteria = &mut config.criteria;
        if let Some(v) = self.facet_angle {
            criteria.facet_angle = v;
        }
        if let Some(v) = self.facet_size {
            criteria.facet_size = v;
        }
        if let Some(v) = self.facet_distance {
            criteria.facet_distance = v;
        }
        if let Some(v) = self.radius_edge_ratio {
            criteria.cell_radius_edge_ratio = v;
        }
        if let Some(v) = self.cell_size {
            criteria.cell_size = CellSize::Uniform(v);
        }
        if let Some(v) = self.max_insertions {
            config.max_insertions = v;
        }
        config.optimize |= self.optimize;
    }
}

fn parse_pair(s: &str) -> Result<(SubdomainId, SubdomainId), String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected A:B, got '{}'", s))?;
    let a = a.trim().parse().map_err(|e| format!("bad label '{}': {}", a, e))?;
    let b = b.trim().parse().map_err(|e| format!("bad label '{}': {}", b, e))?;
    Ok((a, b))
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "volmesh=info",
            _ => "volmesh=debug",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<MesherConfig> {
    match path {
        Some(path) => {
            let mut config = MesherConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => MesherConfig::load(),
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Image {
            input,
            output,
            sizing,
            criteria,
        } => image_command(&cli, input, output, sizing.as_deref(), criteria),
        Commands::Surfaces {
            inputs,
            pairs,
            output,
            criteria,
        } => surfaces_command(&cli, inputs, pairs, output, criteria),
        Commands::Check { input } => check_command(input),
        Commands::Info { input } => info_command(input),
    };

    if let Err(err) = result {
        eprintln!("\n{} {:#}", "❌ Error:".red().bold(), err);
        let code = err.downcast_ref::<MeshError>().map_or(1, MeshError::status_code);
        std::process::exit(code);
    }
    Ok(())
}

fn image_command(cli: &Cli, input: &Path, output: &Path, sizing: Option<&Path>, args: &CriteriaArgs) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    args.apply(&mut config);
    let criteria: RefinementCriteria = config.criteria;
    let optimize = config.optimize;
    let mesher = Mesher::new(config);

    let pb = spinner(format!("Meshing {}", input.display()));
    let summary = match sizing {
        Some(path) => {
            let field = io::read_sizing_field(path)?;
            mesher.mesh_image_with_sizing_field(input, output, &criteria, field, optimize)
        }
        None => mesher.mesh_image(input, output, &criteria, optimize),
    };
    pb.finish_and_clear();
    report(cli, &summary?)
}

fn surfaces_command(
    cli: &Cli,
    inputs: &[PathBuf],
    pairs: &[(SubdomainId, SubdomainId)],
    output: &Path,
    args: &CriteriaArgs,
) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    args.apply(&mut config);
    let criteria = config.criteria;
    let optimize = config.optimize;
    let mesher = Mesher::new(config);

    let pb = spinner(format!("Meshing {} surfaces", inputs.len()));
    let summary = mesher.mesh_surfaces(inputs, pairs, output, &criteria, optimize);
    pb.finish_and_clear();
    report(cli, &summary?)
}

fn check_command(input: &Path) -> Result<()> {
    let mesh = io::read_stl(input)?;
    if query::mesh_self_intersects(&mesh) {
        println!("{} {} is self-intersecting", "❌".red(), input.display().to_string().cyan());
        std::process::exit(1);
    }
    println!("{} {} has no self-intersections", "✅".green(), input.display().to_string().cyan());
    Ok(())
}

fn info_command(input: &Path) -> Result<()> {
    let mesh = io::read_mesh_json(input).with_context(|| format!("Failed to load mesh {}", input.display()))?;
    if mesh.is_empty() {
        bail!("mesh {} has no cells", input.display());
    }
    analyze(&mesh).print();
    Ok(())
}

fn report(cli: &Cli, summary: &MeshSummary) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let output = summary
        .output
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("\n{}", "━".repeat(60).bright_black());
    println!("{} {}", "Meshed:".bold(), output.cyan());
    println!("{}", "━".repeat(60).bright_black());
    println!("  {} {}", "Vertices:".bright_black(), summary.vertices.to_string().cyan());
    println!("  {} {}", "Tetrahedra:".bright_black(), summary.cells.to_string().cyan());
    println!("  {} {}", "Boundary facets:".bright_black(), summary.facets.to_string().cyan());
    println!("  {} {:?}", "Subdomains:".bright_black(), summary.subdomains);
    println!("  {} {:?}", "Patches:".bright_black(), summary.patches);
    println!(
        "  {} {}",
        "Min dihedral:".bright_black(),
        format!("{:.2}°", summary.min_dihedral_angle).yellow()
    );
    println!(
        "  {} {} ({} facet, {} cell)",
        "Insertions:".bright_black(),
        summary.refinement.insertions.to_string().cyan(),
        summary.refinement.facet_refinements,
        summary.refinement.cell_refinements
    );
    if let Some(opt) = &summary.optimization {
        println!("  {} {} accepted moves", "Optimizer:".bright_black(), opt.accepted().to_string().green());
    }
    println!("  {} {} ms", "Time:".bright_black(), summary.elapsed_ms.to_string().yellow());
    println!("{}", "━".repeat(60).bright_black());
    Ok(())
}
