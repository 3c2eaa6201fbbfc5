use std::sync::Arc;

use anyhow::Result;
use ringcentral_bridge::bridge::Bridge;
use ringcentral_bridge::core::cli::{self, Commands};
use ringcentral_bridge::core::config::BridgeConfig;
use ringcentral_bridge::core::constants::{CHAT_CACHE_FILE_NAME, DEFAULT_WORKSPACE};
use ringcentral_bridge::core::paths::expand_path;
use ringcentral_bridge::core::shutdown::ShutdownService;
use ringcentral_bridge::core::logging;
use ringcentral_bridge::runtime::NullAgentRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = cli::parse();

    match &cli.command {
        None | Some(Commands::Run) => run(&cli).await,
        Some(Commands::CheckConfig) => check_config(&cli),
        Some(Commands::PruneCache { workspace }) => prune_cache(&cli, workspace.clone()),
    }
}

async fn run(cli: &ringcentral_bridge::core::Cli) -> Result<()> {
    let config = BridgeConfig::load(cli)?;
    if config.accounts.is_empty() {
        anyhow::bail!("no accounts configured; see check-config");
    }

    let shutdown = ShutdownService::new();
    shutdown.install_signal_handlers();

    // The agent runtime is an out-of-scope collaborator the host process
    // supplies; this binary wires in the test double so the bridge runs
    // standalone for operators who just want to watch inbound admission.
    let runtime = Arc::new(NullAgentRuntime);

    let mut bridge = Bridge::new(config, shutdown.clone(), runtime);
    bridge.start().await;

    shutdown.wait().await;
    shutdown.await_tasks().await;

    Ok(())
}

fn check_config(cli: &ringcentral_bridge::core::Cli) -> Result<()> {
    let config = BridgeConfig::load(cli)?;
    let mut value = serde_json::to_value(&config.accounts)?;
    if let Some(accounts) = value.as_array_mut() {
        for account in accounts {
            if let Some(credentials) = account.get_mut("credentials") {
                *credentials = serde_json::json!({
                    "clientId": "<redacted>",
                    "clientSecret": "<redacted>",
                    "jwt": "<redacted>",
                    "server": credentials.get("server").cloned().unwrap_or(serde_json::Value::Null),
                });
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn prune_cache(cli: &ringcentral_bridge::core::Cli, workspace: Option<std::path::PathBuf>) -> Result<()> {
    let workspace = match workspace {
        Some(path) => expand_path(&path.to_string_lossy()),
        None => {
            let config = BridgeConfig::load(cli)?;
            match config.accounts.first() {
                Some(account) => account.workspace_dir(),
                None => expand_path(DEFAULT_WORKSPACE),
            }
        }
    };

    let path = workspace.join("memory").join(CHAT_CACHE_FILE_NAME);
    if path.exists() {
        std::fs::remove_file(&path)?;
        println!("removed {}", path.display());
    } else {
        println!("no cache file at {}", path.display());
    }
    Ok(())
}
