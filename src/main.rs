use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod assembly;
pub mod cidr;
pub mod config;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod handles;
pub mod resources;
pub mod stack;
pub mod stacks;
pub mod template;
pub mod writer;

use crate::config::AppConfig;
use crate::deploy::Deployer;
use crate::error::{Error, Result};

/// Synthesize and deploy the PulseLogic stacks
#[derive(Parser, Debug)]
#[command(name = "pulse-logic-infra")]
#[command(version, about, long_about = None)]
struct Cli {
    /// App configuration file [default: ./config.yaml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target account, overrides the configuration file
    #[arg(long, global = true, env = "CDK_DEFAULT_ACCOUNT")]
    account: Option<String>,

    /// Target region, overrides the configuration file
    #[arg(long, global = true, env = "CDK_DEFAULT_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the stacks in assembly order
    List,

    /// Write the CloudFormation templates and manifest
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Deploy every stack in dependency order
    Deploy {
        /// Write the stack outputs to this JSON file
        #[arg(long)]
        outputs_file: Option<PathBuf>,
    },

    /// Delete every stack in reverse dependency order
    Destroy {
        #[arg(long)]
        force: bool,
    },

    /// Fetch the outputs of the deployed stacks
    Outputs {
        #[arg(long, default_value = "outputs.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?.with_environment(cli.account, cli.region);
    config::validate(&config)?;

    let app = stacks::app();

    match cli.command {
        Commands::List => {
            for unit in app.plan()?.order {
                println!("{} <- [{}]", unit.name, unit.depends_on.join(", "));
            }
        }
        Commands::Synth { out } => {
            let assembly = app.assemble(&config)?;
            let written = writer::write_assembly(&out, &assembly)?;
            tracing::info!(files = written.len(), out = %out.display(), "assembly written");
        }
        Commands::Deploy { outputs_file } => {
            let assembly = app.assemble(&config)?;
            let deployer = Deployer::new(&config.environment(), config.tags.clone()).await;
            let outputs = deployer.deploy(&assembly).await?;
            if let Some(path) = outputs_file {
                writer::write_outputs(&path, &outputs)?;
            }
        }
        Commands::Destroy { force } => {
            if !force {
                return Err(Error::Refused(String::from(
                    "Refusing to delete the stacks without --force",
                )));
            }
            let assembly = app.assemble(&config)?;
            let deployer = Deployer::new(&config.environment(), config.tags.clone()).await;
            deployer.destroy(&assembly).await?;
        }
        Commands::Outputs { file } => {
            let assembly = app.assemble(&config)?;
            let deployer = Deployer::new(&config.environment(), config.tags.clone()).await;
            let outputs = deployer.collect_outputs(&assembly).await?;
            writer::write_outputs(&file, &outputs)?;
        }
    }

    return Ok(());
}

const DEFAULT_CONFIG: &str = "./config.yaml";

/// Only a missing default configuration falls back to the built-in app
/// settings; a path given on the command line has to exist.
fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    match config::parse(path) {
        Ok(config) => Ok(config),
        Err(config::Error::FileNotFound(location)) if explicit.is_none() => {
            tracing::info!(path = %location, "no configuration file, using defaults");
            Ok(AppConfig::default())
        }
        Err(error) => Err(Error::from(error)),
    }
}
