// Relay binary: wires config, browser, agents and transcript together and
// runs until the turn limit, an agent failure, or Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agent_relay::agent::ChatCompletionsClient;
use agent_relay::cli::{Cli, parse_timezone};
use agent_relay::dom::TabSurface;
use agent_relay::tabs::{Participant, discover_tabs, required_tabs};
use agent_relay::transcript::{Transcript, default_log_dir};
use agent_relay::{
    Agent, BrowserAgent, BrowserManager, Config, CustomAgent, Relay, RelaySettings, load_yaml_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_yaml_config(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    let timezone = parse_timezone(&config.timezone).map_err(anyhow::Error::msg)?;
    if config.deadlock.threshold == 0 {
        anyhow::bail!("deadlock threshold must be greater than 0");
    }

    let participants = [
        Participant {
            name: cli.name1.clone(),
            kind: cli.type1,
        },
        Participant {
            name: cli.name2.clone(),
            kind: cli.type2,
        },
    ];

    // No browser at all when both agents are custom
    let manager = (required_tabs(&participants) > 0).then(|| BrowserManager::new(config.browser.clone()));

    let outcome = run(&config, &participants, manager.as_ref(), timezone).await;

    if let Some(manager) = &manager
        && let Err(e) = manager.shutdown().await
    {
        warn!("Browser shutdown failed: {}", e);
    }

    outcome
}

async fn run(
    config: &Config,
    participants: &[Participant; 2],
    manager: Option<&BrowserManager>,
    timezone: chrono_tz::Tz,
) -> Result<()> {
    let surfaces = match manager {
        Some(manager) => {
            manager.get_or_launch().await?;
            discover_tabs(manager, participants).await?
        }
        None => [None, None],
    };

    let [surface1, surface2] = surfaces;
    let [first, second] = participants;
    let agent1 = build_agent(first, surface1, config)?;
    let agent2 = build_agent(second, surface2, config)?;

    let log_dir = config.log_dir.clone().unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let transcript = Transcript::create(&log_dir, &first.name, &second.name, timezone);

    let mut relay = Relay::new(agent1, agent2, transcript, RelaySettings::from_config(config));

    tokio::select! {
        result = relay.run() => {
            let relayed = result?;
            info!("Relay finished after {} messages", relayed);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping relay");
        }
    }

    Ok(())
}

fn build_agent(participant: &Participant, surface: Option<TabSurface>, config: &Config) -> Result<Box<dyn Agent>> {
    if !participant.kind.is_browser_driven() {
        let model = ChatCompletionsClient::from_config(&config.custom)?;
        return Ok(Box::new(CustomAgent::new(
            participant.name.clone(),
            Box::new(model),
            config.custom.system_prompt.clone(),
            config.custom.history_turns,
        )));
    }

    let surface = surface.with_context(|| format!("No browser tab for {}", participant.name))?;
    let agent = BrowserAgent::new(participant.name.clone(), participant.kind, surface, config.retry.policy())
        .with_context(|| format!("{} is not a browser-driven agent type", participant.kind))?;
    Ok(Box::new(agent))
}
