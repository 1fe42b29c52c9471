//! Command line for the relay binary

use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;

use crate::Config;
use crate::agent::{AgentError, AgentKind};

#[derive(Parser, Debug)]
#[command(
    name = "agent-relay",
    about = "Let two chat agents talk to each other through a browser",
    version
)]
pub struct Cli {
    /// Name of the first agent, exactly as the site shows it
    #[arg(short = 'a', long = "name1")]
    pub name1: String,

    /// Type of the first agent (character.ai, Replika, custom)
    #[arg(short = 'b', long = "type1", value_parser = parse_kind)]
    pub type1: AgentKind,

    /// Name of the second agent
    #[arg(short = 'c', long = "name2")]
    pub name2: String,

    /// Type of the second agent
    #[arg(short = 'd', long = "type2", value_parser = parse_kind)]
    pub type2: AgentKind,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Inject a change-of-topic prompt every few messages
    #[arg(short = 'e', long = "deadlockavoidance")]
    pub deadlock_avoidance: bool,

    /// Messages between deadlock avoidance prompts
    #[arg(short = 'f', long = "deadlockthreshold", value_parser = clap::value_parser!(u32).range(1..))]
    pub deadlock_threshold: Option<u32>,

    /// IANA timezone for transcript timestamps, e.g. America/New_York
    #[arg(short = 't', long, value_parser = parse_timezone)]
    pub timezone: Option<Tz>,

    /// YAML config file (defaults to ./relay.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Conversation topic seeded into the introductions
    #[arg(long)]
    pub topic: Option<String>,

    /// Stop after this many relayed messages
    #[arg(long = "max-turns")]
    pub max_turns: Option<usize>,
}

fn parse_kind(value: &str) -> Result<AgentKind, AgentError> {
    value.parse()
}

pub fn parse_timezone(value: &str) -> Result<Tz, String> {
    value
        .parse::<Tz>()
        .map_err(|_| format!("'{value}' is not a valid timezone. Use an IANA name such as UTC or Europe/Berlin."))
}

impl Cli {
    /// Command line flags win over the config file
    pub fn apply_to(&self, config: &mut Config) {
        if self.deadlock_avoidance {
            config.deadlock.enabled = true;
        }
        if let Some(threshold) = self.deadlock_threshold {
            config.deadlock.threshold = threshold;
        }
        if let Some(tz) = self.timezone {
            config.timezone = tz.name().to_string();
        }
        if let Some(topic) = &self.topic {
            config.topic = topic.clone();
        }
        if self.max_turns.is_some() {
            config.max_turns = self.max_turns;
        }
    }

    pub fn custom_agent_count(&self) -> usize {
        [self.type1, self.type2]
            .iter()
            .filter(|kind| !kind.is_browser_driven())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut args = vec!["agent-relay", "-a", "Ada", "-b", "character.ai", "-c", "Bob", "-d", "Replika"];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    }

    #[test]
    fn minimal_invocation() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.name1, "Ada");
        assert_eq!(cli.type1, AgentKind::CharacterAi);
        assert_eq!(cli.type2, AgentKind::Replika);
        assert!(!cli.deadlock_avoidance);
        assert_eq!(cli.custom_agent_count(), 0);
    }

    #[test]
    fn names_are_required() {
        assert!(Cli::try_parse_from(["agent-relay", "-b", "custom", "-d", "custom"]).is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        let err = Cli::try_parse_from(["agent-relay", "-a", "A", "-b", "chatgpt", "-c", "B", "-d", "custom"])
            .unwrap_err();
        assert!(err.to_string().contains("Supported agent types"));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        assert!(parse(&["-f", "0"]).is_err());
        assert!(parse(&["-f", "-3"]).is_err());
        assert_eq!(parse(&["-f", "3"]).unwrap().deadlock_threshold, Some(3));
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(parse(&["-t", "Mars/Olympus"]).is_err());
        assert_eq!(parse(&["-t", "Asia/Tokyo"]).unwrap().timezone, Some(chrono_tz::Asia::Tokyo));
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&["-e", "-f", "7", "-t", "Europe/Paris", "--topic", "boats", "--max-turns", "10"]).unwrap();
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert!(config.deadlock.enabled);
        assert_eq!(config.deadlock.threshold, 7);
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.topic, "boats");
        assert_eq!(config.max_turns, Some(10));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = parse(&[]).unwrap();
        let mut config = Config::default();
        config.deadlock.threshold = 40;
        config.topic = "films".into();
        cli.apply_to(&mut config);

        assert_eq!(config.deadlock.threshold, 40);
        assert_eq!(config.topic, "films");
        assert!(!config.deadlock.enabled);
    }

    #[test]
    fn counts_custom_agents() {
        let cli = Cli::try_parse_from(["agent-relay", "-a", "A", "-b", "custom", "-c", "B", "-d", "Replika"]).unwrap();
        assert_eq!(cli.custom_agent_count(), 1);
    }
}
