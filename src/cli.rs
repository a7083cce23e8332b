use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::loader::load_flow_file;
use crate::logging;
use crate::node::NodeRegistry;

#[derive(Parser)]
#[command(name = "cauliflow")]
#[command(about = "Cauliflow - run flows of nodes described in YAML", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a flow file
    Run {
        /// Flow file (YAML)
        file: PathBuf,

        /// Override a macro, may be repeated
        #[arg(
            short = 'm',
            long = "macro",
            num_args = 2,
            value_names = ["KEY", "VALUE"],
            action = ArgAction::Append
        )]
        macros: Vec<String>,

        /// Log flowdata and blackboard after every node
        #[arg(long)]
        debug: bool,
    },

    /// List the available node types
    Nodes,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { file, macros, debug } => {
            let config = Config::builder()
                .config_path(cli.config)
                .debug(debug.then_some(true))
                .build()
                .context("Failed to load configuration")?;
            logging::init_tracing(config.effective_log_level());

            run_flow_file(&file, &macros, config.debug).await?;
        }

        Commands::Nodes => {
            let registry = NodeRegistry::builtin();
            for node_type in registry.node_types() {
                println!("{}", node_type);
            }
        }
    }

    Ok(())
}

/// Load `file`, apply the `KEY VALUE` macro overrides and run it to completion
pub async fn run_flow_file(file: &Path, macros: &[String], debug: bool) -> Result<()> {
    let registry = Arc::new(NodeRegistry::builtin());
    let flow_file = load_flow_file(file, &registry)
        .with_context(|| format!("Failed to load flow file {}", file.display()))?;

    let mut ctx = flow_file.context().with_debug(debug);
    ctx.macros = flow_file.macros.with_overrides(macro_overrides(macros));
    if debug {
        debug!(macros = %ctx.macros.as_value(), "macros");
    }

    info!(file = %file.display(), "running flows");
    flow_file
        .flows
        .run(&mut ctx)
        .await
        .with_context(|| format!("Flow file {} failed", file.display()))
}

/// Pair up `-m KEY VALUE` arguments; values stay strings
pub fn macro_overrides(args: &[String]) -> Vec<(String, Value)> {
    args.chunks_exact(2)
        .map(|pair| (pair[0].clone(), Value::String(pair[1].clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "cauliflow", "run", "flow.yml", "-m", "a", "1", "--macro", "b", "two", "--debug",
        ])
        .unwrap();

        let Commands::Run { file, macros, debug } = cli.command else {
            unreachable!("Expected the run command");
        };
        assert_eq!(file, PathBuf::from("flow.yml"));
        assert_eq!(macros, vec!["a", "1", "b", "two"]);
        assert!(debug);
        assert_eq!(
            macro_overrides(&macros),
            vec![
                ("a".to_string(), json!("1")),
                ("b".to_string(), json!("two"))
            ]
        );
    }

    #[test]
    fn test_macro_needs_key_and_value() {
        assert!(Cli::try_parse_from(["cauliflow", "run", "flow.yml", "-m", "a"]).is_err());
    }

    #[tokio::test]
    async fn test_run_flow_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let flow = dir.path().join("flow.yml");
        std::fs::write(
            &flow,
            format!(
                "macros:\n  greeting: hello\nflow:\n  - out_file:\n      path: {}\n      src: \"{{{{ macro.greeting }}}} world\"\n",
                out.display()
            ),
        )
        .unwrap();

        run_flow_file(&flow, &[], false).await.unwrap();
        run_flow_file(&flow, &["greeting".to_string(), "bye".to_string()], false)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "hello world\nbye world\n"
        );
    }

    #[tokio::test]
    async fn test_run_flow_file_reports_missing_file() {
        let err = run_flow_file(&PathBuf::from("/nonexistent/flow.yml"), &[], false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load flow file"));
    }
}
