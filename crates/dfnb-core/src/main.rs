//! `dfnb` command line: replay sessions and check saved notebooks

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use dfnb_core::{logging, replay, Coordinator, DataflowConfig, SavedNotebook, Session};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Command::new("dfnb")
        .version(dfnb_core::VERSION)
        .about("Dataflow notebook dependency tracking")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a recorded session and print the resulting notebook")
                .arg(
                    Arg::new("session")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Session JSON file"),
                )
                .arg(
                    Arg::new("conflicts")
                        .long("conflicts")
                        .action(ArgAction::SetTrue)
                        .help("Print unresolved references instead of the notebook"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check saved cell text against its persistent code")
                .arg(
                    Arg::new("notebook")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Saved notebook JSON file"),
                ),
        )
        .subcommand(
            Command::new("refresh")
                .about("Re-render every cell of a saved notebook and print it")
                .arg(
                    Arg::new("notebook")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Saved notebook JSON file"),
                ),
        );

    let matches = cli.get_matches();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DataflowConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DataflowConfig::default(),
    };
    logging::init(&config.logging)?;

    match matches.subcommand() {
        Some(("replay", args)) => {
            let path = required_path(args, "session")?;
            let session = Session::from_json(&read(path)?)
                .with_context(|| format!("parsing {}", path.display()))?;

            let mut coordinator = Coordinator::with_config(config);
            let summary = replay(&mut coordinator, &session)?;
            for rejected in &summary.rejected {
                eprintln!("rejected: {rejected}");
            }

            if args.get_flag("conflicts") {
                println!("{}", serde_json::to_string_pretty(&coordinator.conflicts())?);
            } else {
                let notebook = SavedNotebook {
                    cells: coordinator.snapshot(),
                };
                println!("{}", serde_json::to_string_pretty(&notebook)?);
            }
        }
        Some(("verify", args)) => {
            let coordinator = load_notebook(config, required_path(args, "notebook")?)?;
            let mismatches = coordinator.verify();
            for mismatch in &mismatches {
                println!("{}: expected {:?}, found {:?}", mismatch.cell, mismatch.expected, mismatch.found);
            }
            for conflict in coordinator.conflicts() {
                println!(
                    "{}: {}${} {:?}",
                    conflict.cell, conflict.name, conflict.reference, conflict.reason
                );
            }
            if !mismatches.is_empty() {
                std::process::exit(1);
            }
            println!("ok");
        }
        Some(("refresh", args)) => {
            let mut coordinator = load_notebook(config, required_path(args, "notebook")?)?;
            let report = coordinator.refresh_all();
            eprintln!(
                "{} patched, {} conflicts",
                report.patches.len(),
                report.conflicts.len()
            );
            let notebook = SavedNotebook {
                cells: coordinator.snapshot(),
            };
            println!("{}", serde_json::to_string_pretty(&notebook)?);
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

fn required_path<'a>(args: &'a clap::ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing <{name}>"))
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_notebook(config: DataflowConfig, path: &Path) -> Result<Coordinator> {
    let notebook: SavedNotebook = serde_json::from_str(&read(path)?)
        .with_context(|| format!("parsing {}", path.display()))?;
    let mut coordinator = Coordinator::with_config(config);
    coordinator.load(&notebook)?;
    Ok(coordinator)
}
