//! cardiomesh CLI - stage, tetrahedralize, tag and merge cardiac meshes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cardiomesh::entry::{
    inspect_mesh, run_add_pericardium, run_batch_from_file, run_surface_to_tetra,
};
use cardiomesh::logging::init_logging;

#[derive(Parser)]
#[command(name = "cardiomesh")]
#[command(about = "Tetrahedral cardiac mesh tagging and merging pipeline", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every work item of the [batch] section
    Batch {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Surface meshes of one model to a tagged tetrahedral heart
    SurfaceToTetra {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        dataset: u32,
        #[arg(short, long, default_value_t = 0)]
        model: u32,
        /// Use the atlas template instead of a shooting model
        #[arg(long)]
        template: bool,
    },
    /// Add a tagged pericardium to the full-heart mesh of one model
    AddPericardium {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        dataset: u32,
        #[arg(short, long)]
        model: u32,
    },
    /// Print point/cell counts and the tag histogram of a VTK file
    Inspect {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Batch { config } => {
            let report = run_batch_from_file(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.ensure_success()?;
        }
        Commands::SurfaceToTetra {
            config,
            dataset,
            model,
            template,
        } => {
            let report = run_surface_to_tetra(&config, dataset, model, template)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::AddPericardium {
            config,
            dataset,
            model,
        } => {
            let report = run_add_pericardium(&config, dataset, model)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Inspect { file } => {
            let summary = inspect_mesh(&file)?;
            println!("points: {}", summary.points);
            println!("cells:  {}", summary.cells);
            if summary.tagged {
                for (tag, count) in &summary.cells_per_tag {
                    println!("  tag {:>3}: {} cells", tag, count);
                }
            } else {
                println!("  no elemTag array");
            }
            println!("tetrahedral volume: {:.6}", summary.tet_volume);
        }
    }

    Ok(())
}
