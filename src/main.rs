//! looptree Command Line Interface
//!
//! Usage:
//!   looptree [OPTIONS] <structure.json> <COMMAND>
//!   looptree --help
//!
//! Examples:
//!   looptree blur.json sections                           # Candidate sections per root
//!   looptree blur.json candidates --action tiling_3d      # Enumerate 3D tiling choices
//!   looptree blur.json apply --action tiling_3d \
//!       --params comp_blur:0,comp_blur:1,comp_blur:2,32,32,32   # Print the program

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use looptree::ir::IterationTree;
use looptree::transform::{Action, ActionType};
use std::path::PathBuf;

/// looptree - iteration-space trees and loop transformation actions
#[derive(Parser, Debug)]
#[command(name = "looptree")]
#[command(version)]
#[command(about = "Inspect loop nests and generate transformation programs", long_about = None)]
struct Cli {
    /// Program structure (JSON)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// What to do with the program
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the candidate sections of every root iterator
    Sections,

    /// Enumerate candidate iterators for an action type
    Candidates {
        /// Action type (tiling_2d, tiling_3d, interchange, parallelization, unrolling, reversal, fusion)
        #[arg(short, long)]
        action: ActionType,
    },

    /// Bind one action and print its program and signature
    Apply {
        /// Action type
        #[arg(short, long)]
        action: ActionType,

        /// Parameters: `name:level` iterators and integers, comma-separated
        #[arg(short, long, allow_hyphen_values = true)]
        params: String,

        /// Explicit target computations (comma-separated)
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        comps: Option<Vec<String>>,

        /// Also print the sections of the transformed tree
        #[arg(long)]
        show_tree: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("looptree v{}", looptree::VERSION);
    debug!("Input file: {:?}", cli.input);

    let tree = IterationTree::from_json_file(&cli.input)
        .with_context(|| format!("Failed to load program structure: {:?}", cli.input))?;
    info!(
        "Loaded {} iterators and {} computations",
        tree.iterator_count(),
        tree.computation_count()
    );

    match cli.command {
        Command::Sections => print_sections(&tree),
        Command::Candidates { action } => {
            for (root, candidates) in action.get_candidates(&tree) {
                println!("{}:", root);
                for candidate in candidates {
                    let ids: Vec<String> = candidate.iter().map(ToString::to_string).collect();
                    println!("  {}", ids.join(" "));
                }
            }
        }
        Command::Apply { action, params, comps, show_tree } => {
            let params = looptree::parse_params(&params).with_context(|| "Failed to parse --params")?;
            let mut action = Action::new(action, params, comps)?;
            action
                .initialize_action_for_tree(&tree)
                .with_context(|| format!("Failed to bind {}", action))?;

            println!("{}", action.signature()?);
            print!("{}", action.optim_str()?);
            if show_tree {
                if let Some(transformed) = action.tree() {
                    print_sections(transformed);
                }
            }
        }
    }

    Ok(())
}

fn print_sections(tree: &IterationTree) {
    for (root, sections) in tree.get_candidate_sections() {
        println!("{}:", root);
        for section in sections {
            let ids: Vec<String> = section.iter().map(ToString::to_string).collect();
            println!("  {}", ids.join(" -> "));
        }
    }
}
