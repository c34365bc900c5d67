use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use libtamil99::Tamil99Config;
use tip_core::registration;
use tip_tools::FileRegistry;

#[derive(Parser, Debug)]
#[command(name = "tip-register")]
#[command(about = "Register the Tamil99 text input processor with a registry file")]
struct Args {
    /// Registry file (TOML); created on first write
    #[arg(short, long, default_value = "registry.toml")]
    registry: PathBuf,

    /// Tamil99 configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish server, profile and categories
    Register {
        #[arg(long)]
        module_path: String,
    },
    /// Withdraw everything `register` published
    Unregister {
        #[arg(long)]
        module_path: String,
    },
    /// Print the registry contents
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Print the manifest `register` would publish
    Manifest {
        #[arg(long)]
        module_path: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Tamil99Config::load_toml(path)?,
        None => Tamil99Config::default(),
    };

    match args.command {
        Command::Register { module_path } => {
            let manifest = libtamil99::manifest(&config, &module_path);
            let mut registry = FileRegistry::open(&args.registry)?;
            registration::register(&mut registry, &manifest)
                .with_context(|| format!("registering {}", manifest.profile.display_name))?;
            registry.commit()?;
            println!(
                "registered {} ({}) in {}",
                manifest.profile.display_name,
                manifest.service_id(),
                args.registry.display()
            );
        }
        Command::Unregister { module_path } => {
            let manifest = libtamil99::manifest(&config, &module_path);
            let mut registry = FileRegistry::open(&args.registry)?;
            let failures = registration::unregister(&mut registry, &manifest);
            registry.commit()?;
            for failure in &failures {
                eprintln!("  {}", failure);
            }
            if !failures.is_empty() {
                bail!("{} part(s) could not be unregistered", failures.len());
            }
            println!("unregistered {}", manifest.service_id());
        }
        Command::Show { json } => {
            let registry = FileRegistry::open(&args.registry)?;
            if json {
                println!("{}", serde_json::to_string_pretty(registry.registry())?);
            } else {
                print!("{}", toml::to_string_pretty(registry.registry())?);
            }
        }
        Command::Manifest { module_path, json } => {
            let manifest = libtamil99::manifest(&config, &module_path);
            if json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                print!("{}", toml::to_string_pretty(&manifest)?);
            }
        }
    }
    Ok(())
}
