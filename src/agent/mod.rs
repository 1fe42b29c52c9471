mod browser_agent;
mod custom;
mod model;

pub use browser_agent::BrowserAgent;
pub use custom::{CustomAgent, clean_model_output};
pub use model::{ChatCompletionsClient, ChatMessage, ChatModel, ChatRole};

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::dom::DomError;
use crate::sites::SiteProfile;

/// Supported agent backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    CharacterAi,
    Replika,
    Custom,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::CharacterAi, AgentKind::Replika, AgentKind::Custom];

    /// Browser-driven agents need a tab and paced waits for replies
    pub fn is_browser_driven(self) -> bool {
        !matches!(self, AgentKind::Custom)
    }

    /// DOM locators for browser-driven kinds
    pub fn site(self) -> Option<SiteProfile> {
        match self {
            AgentKind::CharacterAi => Some(SiteProfile::character_ai()),
            AgentKind::Replika => Some(SiteProfile::replika()),
            AgentKind::Custom => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::CharacterAi => "character.ai",
            AgentKind::Replika => "Replika",
            AgentKind::Custom => "custom",
        }
    }

    /// Comma-separated list for error messages
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character.ai" | "characterai" | "cai" => Ok(AgentKind::CharacterAi),
            "replika" => Ok(AgentKind::Replika),
            "custom" => Ok(AgentKind::Custom),
            _ => Err(AgentError::UnknownKind(s.to_string())),
        }
    }
}

/// Error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown agent type '{0}'. Supported agent types: {supported}", supported = AgentKind::supported())]
    UnknownKind(String),

    #[error("latest_message() for {kind} agent {name}: Latest message not retrieved and max retries exceeded {retries}.")]
    MessageUnavailable {
        kind: AgentKind,
        name: String,
        retries: u32,
    },

    #[error("send_message() for {kind} agent {name} (textbox finding stage): Could not find textbox and max retries exceeded {retries}.")]
    TextboxNotFound {
        kind: AgentKind,
        name: String,
        retries: u32,
    },

    #[error("send_message() for {kind} agent {name}: Entered message is blank, the textbox rejected the input.")]
    BlankInput { kind: AgentKind, name: String },

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Model error: {0}")]
    Model(String),
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// A named participant in the relay.
///
/// `current_message` is the last message this agent said, as relayed. It is
/// empty until the agent's first turn.
#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    fn current_message(&self) -> &str;

    fn set_current_message(&mut self, message: String);

    /// Newest message the agent posted, as raw text/HTML
    async fn latest_message(&mut self) -> AgentResult<String>;

    /// Deliver `message` to the agent as user input
    async fn send_message(&mut self, message: &str) -> AgentResult<()>;
}
