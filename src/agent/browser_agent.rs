//! Agent living in a browser tab on one of the supported chat sites

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Agent, AgentError, AgentKind, AgentResult};
use crate::dom::{ChatSurface, TabSurface};
use crate::sites::SiteProfile;
use crate::utils::{Attempt, PollOutcome, RetryPolicy, clean_message};

pub struct BrowserAgent<S: ChatSurface = TabSurface> {
    name: String,
    kind: AgentKind,
    site: SiteProfile,
    surface: S,
    policy: RetryPolicy,
    current_message: String,
}

impl<S: ChatSurface> BrowserAgent<S> {
    /// Returns `None` for kinds that are not browser-driven
    pub fn new(name: impl Into<String>, kind: AgentKind, surface: S, policy: RetryPolicy) -> Option<Self> {
        let site = kind.site()?;
        Some(Self {
            name: name.into(),
            kind,
            site,
            surface,
            policy,
            current_message: String::new(),
        })
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

/// Chat textareas submit on Enter, so a newline mid-message would send a
/// fragment.
fn single_line(message: &str) -> String {
    message
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl<S: ChatSurface> Agent for BrowserAgent<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn current_message(&self) -> &str {
        &self.current_message
    }

    fn set_current_message(&mut self, message: String) {
        self.current_message = message;
    }

    async fn latest_message(&mut self) -> AgentResult<String> {
        self.surface.activate().await?;

        let label = format!("latest_message() for {} agent {}", self.kind, self.name);
        let query = self.site.message_query();
        let (surface, site, current) = (&self.surface, &self.site, self.current_message.as_str());
        let (label_ref, query_ref) = (label.as_str(), &query);

        let outcome = self
            .policy
            .poll(label_ref, |_| async move {
                let nodes = match surface.snapshot(query_ref).await {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        debug!("{}: Exception encountered when retrieving latest message: {}", label_ref, e);
                        return Attempt::Retry(None);
                    }
                };

                let Some(raw) = site.pick_message(&nodes) else {
                    debug!("{}: No message element on the page yet.", label_ref);
                    return Attempt::Retry(None);
                };

                // The page still shows what we already relayed: no reply yet
                if clean_message(&raw) == current {
                    debug!("{}: Latest message is not available.", label_ref);
                    return Attempt::Retry(Some(raw));
                }

                Attempt::Done(raw)
            })
            .await;

        match outcome {
            PollOutcome::Done(raw) => Ok(raw),
            PollOutcome::Exhausted(Some(stale)) => {
                debug!("{}: No new message after {} retries, returning the last one seen.", label, self.policy.retries());
                Ok(stale)
            }
            PollOutcome::Exhausted(None) => Err(AgentError::MessageUnavailable {
                kind: self.kind,
                name: self.name.clone(),
                retries: self.policy.retries(),
            }),
        }
    }

    async fn send_message(&mut self, message: &str) -> AgentResult<()> {
        self.surface.activate().await?;

        let label = format!(
            "send_message() for {} agent {} (textbox finding stage)",
            self.kind, self.name
        );
        let query = self.site.textbox_query();
        let (surface, site) = (&self.surface, &self.site);
        let (label_ref, query_ref) = (label.as_str(), &query);

        let outcome = self
            .policy
            .poll(label_ref, |_| async move {
                match surface.snapshot(query_ref).await {
                    Ok(nodes) => match site.pick_textbox(&nodes) {
                        Some(index) => Attempt::Done(index),
                        None => {
                            debug!("{}: Could not find textbox.", label_ref);
                            Attempt::Retry(None)
                        }
                    },
                    Err(e) => {
                        debug!("{}: Could not find textbox: {}", label_ref, e);
                        Attempt::Retry(None)
                    }
                }
            })
            .await;

        let PollOutcome::Done(index) = outcome else {
            return Err(AgentError::TextboxNotFound {
                kind: self.kind,
                name: self.name.clone(),
                retries: self.policy.retries(),
            });
        };

        let text = single_line(message);
        let selector = self.site.textbox.selector;
        let entered = self.surface.fill(selector, index, &text).await?;

        if entered != text {
            warn!(
                "send_message() for {} agent {} (text entering stage): Could not enter message into textbox. Expected: {}, Actual: {}",
                self.kind, self.name, text, entered
            );
            if entered.is_empty() {
                return Err(AgentError::BlankInput {
                    kind: self.kind,
                    name: self.name.clone(),
                });
            }
            warn!(
                "send_message() for {} agent {} (text entering stage): Input is not blank, ignoring discrepancy.",
                self.kind, self.name
            );
        }

        self.surface.submit(selector, index).await?;
        debug!("Sent {} characters to {} agent {}", text.len(), self.kind, self.name);
        Ok(())
    }
}
