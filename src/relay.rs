//! Turn-taking loop between two agents
//!
//! Each turn one agent speaks: its newest message is cleaned, possibly
//! replaced by a canned prompt, logged, and typed into the other agent.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::Config;
use crate::agent::{Agent, AgentError};
use crate::transcript::Transcript;
use crate::utils::constants::DEADLOCK_TRANSCRIPT_MARKER;
use crate::utils::{clean_message, jittered};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Failed to write transcript: {0}")]
    Transcript(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Loop parameters, resolved from config and command line
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub topic: String,
    pub deadlock_enabled: bool,
    /// Messages relayed before the deadlock prompt is injected
    pub deadlock_threshold: u32,
    pub deadlock_prompt: String,
    pub response_wait: Duration,
    pub response_jitter: Duration,
    pub max_turns: Option<usize>,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topic: config.topic.clone(),
            deadlock_enabled: config.deadlock.enabled,
            deadlock_threshold: config.deadlock.threshold,
            deadlock_prompt: config.deadlock.prompt.clone(),
            response_wait: config.pacing.response_wait(),
            response_jitter: config.pacing.response_jitter(),
            max_turns: config.max_turns,
        }
    }

    fn introduction(&self, name: &str) -> String {
        format!("I am {}. Let's talk about {}.", name, self.topic)
    }
}

pub struct Relay {
    agents: [Box<dyn Agent>; 2],
    transcript: Transcript,
    settings: RelaySettings,
    message_counter: u32,
    relayed: usize,
}

impl Relay {
    pub fn new(first: Box<dyn Agent>, second: Box<dyn Agent>, transcript: Transcript, settings: RelaySettings) -> Self {
        Self {
            agents: [first, second],
            transcript,
            settings,
            message_counter: 0,
            relayed: 0,
        }
    }

    /// Messages relayed so far
    pub fn relayed(&self) -> usize {
        self.relayed
    }

    /// Alternate speakers until `max_turns` is reached, or forever.
    /// Any agent failure ends the loop.
    pub async fn run(&mut self) -> RelayResult<usize> {
        loop {
            for speaker in 0..self.agents.len() {
                if self.settings.max_turns.is_some_and(|max| self.relayed >= max) {
                    info!("Reached {} relayed messages, stopping", self.relayed);
                    return Ok(self.relayed);
                }
                self.relay_turn(speaker).await?;
            }
        }
    }

    /// One speaker's message carried to the other agent
    pub async fn relay_turn(&mut self, speaker: usize) -> RelayResult<()> {
        let [first, second] = &mut self.agents;
        let (speaker, listener) = if speaker == 0 { (first, second) } else { (second, first) };
        let settings = &self.settings;

        let mut latest = clean_message(&speaker.latest_message().await?);

        // Agents otherwise may never learn each other's name
        if speaker.current_message().is_empty() {
            debug!("In introduction stage, seeding greeting with agent name {} and topic prompt.", speaker.name());
            latest.push_str(&format!(". {}", settings.introduction(speaker.name())));
        }

        if settings.deadlock_enabled && self.message_counter >= settings.deadlock_threshold {
            debug!("Automated deadlock avoidance activated, resetting message counter and seeding prompt.");
            latest = settings.deadlock_prompt.clone();
            self.message_counter = 0;
            self.transcript.append(DEADLOCK_TRANSCRIPT_MARKER)?;
        }

        debug!("Updating {}'s latest message and relaying to {}...", speaker.name(), listener.name());

        // A flagged reply never appears, leaving the listener's own words on top
        if listener.current_message() == latest {
            debug!("Error, response was not created, seeding with topic prompt");
            latest = settings.introduction(speaker.name());
        }

        speaker.set_current_message(latest.clone());
        println!("{} entered message: '{}'", speaker.name(), latest);
        self.transcript.append(&format!("{}: {}", speaker.name(), latest))?;

        listener.send_message(&latest).await?;
        self.relayed += 1;

        // Custom agents block until they have replied
        if listener.kind().is_browser_driven() {
            let wait = jittered(settings.response_wait, settings.response_jitter);
            info!("Message sent. Waiting {:.2} seconds for response...", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }

        if settings.deadlock_enabled {
            self.message_counter += 1;
            debug!(
                "{} messages sent. {} until we seed conversation to try to avoid deadlock.",
                self.message_counter,
                settings.deadlock_threshold.saturating_sub(self.message_counter)
            );
        }

        Ok(())
    }
}
