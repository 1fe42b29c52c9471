//! DOM locators for the supported chat sites
//!
//! Both sites change their markup without notice. Everything site-specific
//! lives here so a broken locator is a one-line fix.

use crate::dom::{DomQuery, NodeSnapshot, retrieve_target_element};

/// How the newest message is picked out of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePick {
    /// First node whose attribute contains the needle, optionally grouped
    /// with its following same-tag siblings
    FirstWithAttribute {
        attribute: &'static str,
        needle: &'static str,
        siblings: bool,
    },
    /// innerHTML of the last node (or of the end of its descendant chain)
    Last,
}

/// Where the message textbox is and how to recognise it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextboxLocator {
    pub selector: &'static str,
    pub attribute: &'static str,
    pub needle: &'static str,
}

/// Everything an agent needs to read from and type into one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: &'static str,
    pub message_selector: &'static str,
    pub message_descendants: &'static [&'static str],
    pub message_pick: MessagePick,
    pub textbox: TextboxLocator,
}

impl SiteProfile {
    /// character.ai renders each paragraph of a reply as a `<p>` carrying a
    /// stringified React prop
    pub fn character_ai() -> Self {
        Self {
            name: "character.ai",
            message_selector: "p",
            message_descendants: &[],
            message_pick: MessagePick::FirstWithAttribute {
                attribute: "node",
                needle: "[object Object]",
                siblings: true,
            },
            textbox: TextboxLocator {
                selector: "textarea",
                attribute: "placeholder",
                needle: "Message",
            },
        }
    }

    /// Replika wraps the text two spans deep inside each message bubble
    pub fn replika() -> Self {
        Self {
            name: "Replika",
            message_selector: "div[data-testid='chat-message-text']",
            message_descendants: &["span", "span"],
            message_pick: MessagePick::Last,
            textbox: TextboxLocator {
                selector: "textarea",
                attribute: "id",
                needle: "send-message-textarea",
            },
        }
    }

    pub fn message_query(&self) -> DomQuery {
        DomQuery::new(self.message_selector).with_descendants(self.message_descendants.iter().copied())
    }

    pub fn textbox_query(&self) -> DomQuery {
        DomQuery::new(self.textbox.selector)
    }

    /// Raw innerHTML of the newest message, if the snapshot holds one
    pub fn pick_message(&self, nodes: &[NodeSnapshot]) -> Option<String> {
        match &self.message_pick {
            MessagePick::FirstWithAttribute {
                attribute,
                needle,
                siblings,
            } => retrieve_target_element(nodes, attribute, needle, *siblings)
                .and_then(|found| found.inner_html()),
            MessagePick::Last => nodes.last().and_then(|node| node.inner_html.clone()),
        }
    }

    /// Index of the message textbox among the textbox query's matches
    pub fn pick_textbox(&self, nodes: &[NodeSnapshot]) -> Option<usize> {
        retrieve_target_element(nodes, self.textbox.attribute, self.textbox.needle, false)
            .map(|found| found.index())
    }
}
