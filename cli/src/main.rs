mod commands;
mod terminal;

use std::collections::BTreeMap;

use anyhow::Context;
use commands::{CommandLine, Commands, describe, list, run};
use netprobe_common::PluginDescriptor;
use netprobe_common::catalog::Catalog;
use netprobe_core::registry::metadata;
use netprobe_core::{ExecutionContext, Registry};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    let cfg = commands.config();

    logging::init(cfg.quiet);
    print::banner(cfg.no_banner, cfg.quiet);

    let registry: Registry = load_registry(&commands)?;

    match commands.command {
        Commands::List => {
            print::header("available plugins", cfg.quiet);
            list::list(&registry);
            Ok(())
        }
        Commands::Describe { plugin, json } => describe::describe(&registry, &plugin, json, cfg.quiet),
        Commands::Run {
            plugin,
            params,
            params_json,
            tree,
        } => {
            let raw = run::collect_params(&params, params_json.as_deref())?;
            run::run(&registry, &plugin, raw, tree, cfg.quiet).await
        }
    }
}

fn load_registry(commands: &CommandLine) -> anyhow::Result<Registry> {
    let catalog: Catalog = match &commands.catalog {
        Some(path) => Catalog::from_path(path).with_context(|| format!("loading catalogue {}", path.display()))?,
        None => Catalog::builtin().context("loading built-in catalogue")?,
    };

    let overrides: BTreeMap<String, PluginDescriptor> = match &commands.metadata_dir {
        Some(dir) => metadata::load_dir(dir)?,
        None => BTreeMap::new(),
    };

    let context = ExecutionContext::new(commands.config(), catalog);
    Ok(netprobe_plugins::builtin_registry(context, &overrides)?)
}
