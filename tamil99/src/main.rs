use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use libtamil99::{Tamil99Config, Tamil99Layout};
use tip_core::memory::MemoryThreadManager;
use tip_core::{
    ClientId, DocumentContext, EditMode, KeyCode, KeyMapper, KeyMetadata, ModuleLifetime,
    TextInputProcessor,
};

#[derive(Parser, Debug)]
#[command(name = "libtamil99")]
#[command(about = "Tamil99 keyboard layout on an in-memory host")]
struct Args {
    /// Tamil99 configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type keys into an empty document and print the result
    Type {
        /// Keycap letters to press, in order
        keys: String,

        /// Run each insertion before the key press returns
        #[arg(long)]
        sync: bool,

        /// Print each key decision
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the layout table
    Layout,
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Tamil99Config::load_toml(path)?,
        None => Tamil99Config::default(),
    };

    match args.command {
        Command::Type {
            keys,
            sync,
            verbose,
        } => {
            if sync {
                config.base_mut().edit_mode = EditMode::Sync;
            }
            let text = type_keys(&config, &keys, verbose)?;
            println!("{}", text);
        }
        Command::Layout => {
            let layout = Tamil99Layout::new();
            println!("{} ({} keys)", layout.name(), layout.len());
            for (key, ch) in layout.entries() {
                let cap = key.as_char().unwrap_or('?');
                println!("  {}  →  {}  U+{:04X}", cap, ch, ch as u32);
            }
        }
        Command::Config => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

/// Activate a service on a fresh in-memory host, press every key in `keys`,
/// drain the edit queue and return the document text.
fn type_keys(config: &Tamil99Config, keys: &str, verbose: bool) -> Result<String> {
    let host = MemoryThreadManager::new();
    let service = libtamil99::create_service(config, &ModuleLifetime::new());
    service.activate(host.clone(), ClientId(1))?;

    let doc = host.create_document("", 0);
    let context: Arc<dyn DocumentContext> = doc.clone();
    host.push_context(&context)?;
    host.set_focus(Some(doc.id()), None)?;

    for cap in keys.chars() {
        let Some(key) = KeyCode::from_char(cap) else {
            bail!("no key for {:?}", cap);
        };
        let eaten = host.press_key(Some(&context), key, KeyMetadata::press(0))?;
        if verbose {
            println!("{:?}: {}", key, if eaten { "eaten" } else { "passed through" });
        }
    }

    let ran = host.edit_queue().run_pending();
    tracing::debug!(ran, "edit queue drained");
    for (sequence, outcome) in service.interceptor().reap_completions() {
        if !outcome.is_completed() {
            eprintln!("insertion {} did not complete: {:?}", sequence, outcome);
        }
    }

    host.pop_context(&context)?;
    service.deactivate()?;
    Ok(doc.text())
}
