pub mod describe;
pub mod list;
pub mod run;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use netprobe_common::config::Config;

#[derive(Parser)]
#[command(name = "netprobe")]
#[command(about = "Network diagnostics through a catalogue of probe plugins.")]
#[command(version)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Upper bound on concurrent probes in a single run
    #[arg(long, global = true, default_value_t = 256)]
    pub max_concurrency: usize,

    /// Seconds granted to external tools beyond their own deadline
    #[arg(long, global = true, default_value_t = 5.0)]
    pub deadline_slack: f64,

    /// Less output: -q hides progress, -qq prints only the result
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,

    /// Do not print the banner
    #[arg(long, global = true)]
    pub no_banner: bool,

    /// JSON file replacing the built-in DNS server and port catalogue
    #[arg(long, global = true, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Directory of plugin metadata files overriding the embedded ones
    #[arg(long, global = true, value_name = "DIR")]
    pub metadata_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available plugins
    #[command(alias = "l")]
    List,
    /// Show a plugin's parameters
    #[command(alias = "d")]
    Describe {
        plugin: String,
        /// Print the raw descriptor as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a plugin and print its result
    #[command(alias = "r")]
    Run {
        plugin: String,
        /// Parameter as key=value; the value is read as JSON when it parses
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// All parameters as one JSON object; -p entries take precedence
        #[arg(long = "params", value_name = "JSON")]
        params_json: Option<String>,
        /// Render the result as a tree instead of JSON
        #[arg(long)]
        tree: bool,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config(&self) -> Config {
        Config {
            max_concurrency: self.max_concurrency,
            deadline_slack: Duration::from_secs_f64(self.deadline_slack.max(0.0)),
            quiet: self.quiet,
            no_banner: self.no_banner,
        }
    }
}
