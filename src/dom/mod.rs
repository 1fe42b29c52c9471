//! DOM access for chat pages
//!
//! Agents never touch chromiumoxide directly. They read serialisable node
//! snapshots through [`ChatSurface`] and pick elements with the attribute
//! predicates below, which keeps site logic testable without a browser.

mod tab;

pub use tab::TabSurface;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomError {
    #[error("Tab activation failed: {0}")]
    Activate(String),

    #[error("DOM query '{selector}' failed: {reason}")]
    Query { selector: String, reason: String },

    #[error("No element {index} for selector '{selector}'")]
    MissingElement { selector: String, index: usize },

    #[error("Input failed for selector '{selector}': {reason}")]
    Input { selector: String, reason: String },

    #[error("Failed to read page source: {0}")]
    Source(String),
}

pub type DomResult<T> = Result<T, DomError>;

/// CSS query, optionally narrowed by a chain of descendant lookups.
///
/// Each step is a `querySelector` on the previous step's result, so a
/// chain of `["span", "span"]` means "first span inside the first span",
/// never a match reaching outside the hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomQuery {
    pub selector: String,
    pub descendants: Vec<String>,
}

impl DomQuery {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            descendants: Vec::new(),
        }
    }

    pub fn with_descendants<I, T>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.descendants = steps.into_iter().map(Into::into).collect();
        self
    }
}

/// Snapshot of one element matched by a [`DomQuery`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Lower-case tag name
    pub tag: String,

    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// innerHTML of the element, or of the end of the query's descendant
    /// chain. `None` when some step of the chain found nothing.
    #[serde(default)]
    pub inner_html: Option<String>,

    /// innerHTML of every following sibling with the same tag, in order
    #[serde(default)]
    pub following_siblings: Vec<String>,
}

impl NodeSnapshot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Element picked by [`retrieve_target_element`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched<'a> {
    /// A single node (no grouping requested, or the node had no siblings)
    Single { index: usize, node: &'a NodeSnapshot },
    /// The node followed by the innerHTML of its same-tag siblings
    Group {
        index: usize,
        node: &'a NodeSnapshot,
        siblings: &'a [String],
    },
}

impl Matched<'_> {
    /// Position of the matched node in the snapshot list
    pub fn index(&self) -> usize {
        match self {
            Matched::Single { index, .. } | Matched::Group { index, .. } => *index,
        }
    }

    /// innerHTML of the node, with grouped siblings joined by single spaces
    pub fn inner_html(&self) -> Option<String> {
        match self {
            Matched::Single { node, .. } => node.inner_html.clone(),
            Matched::Group { node, siblings, .. } => {
                let mut parts = Vec::with_capacity(siblings.len() + 1);
                if let Some(first) = node.inner_html.as_deref() {
                    parts.push(first);
                }
                parts.extend(siblings.iter().map(String::as_str));
                Some(parts.join(" "))
            }
        }
    }
}

fn attribute_contains(node: &NodeSnapshot, attribute: &str, needle: &str) -> bool {
    // nodes lacking the attribute are skipped, not treated as empty
    node.attribute(attribute)
        .is_some_and(|value| value.contains(needle))
}

/// First node whose `attribute` contains `needle`.
///
/// With `siblings` set, the match is grouped with its following same-tag
/// siblings so multi-paragraph replies come back whole.
pub fn retrieve_target_element<'a>(
    nodes: &'a [NodeSnapshot],
    attribute: &str,
    needle: &str,
    siblings: bool,
) -> Option<Matched<'a>> {
    let (index, node) = nodes
        .iter()
        .enumerate()
        .find(|(_, node)| attribute_contains(node, attribute, needle))?;

    if siblings && !node.following_siblings.is_empty() {
        Some(Matched::Group {
            index,
            node,
            siblings: &node.following_siblings,
        })
    } else {
        Some(Matched::Single { index, node })
    }
}

/// Every node whose `attribute` contains `needle`
pub fn retrieve_target_elements<'a>(
    nodes: &'a [NodeSnapshot],
    attribute: &str,
    needle: &str,
) -> Vec<&'a NodeSnapshot> {
    nodes
        .iter()
        .filter(|node| attribute_contains(node, attribute, needle))
        .collect()
}

/// Browser tab as seen by an agent
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Bring the tab to the front before reading or typing
    async fn activate(&self) -> DomResult<()>;

    /// Snapshot every element matching `query`, in document order
    async fn snapshot(&self, query: &DomQuery) -> DomResult<Vec<NodeSnapshot>>;

    /// Focus the `index`th match of `selector`, clear it, type `text`, and
    /// return the value the field holds afterwards
    async fn fill(&self, selector: &str, index: usize, text: &str) -> DomResult<String>;

    /// Press Enter in the `index`th match of `selector`
    async fn submit(&self, selector: &str, index: usize) -> DomResult<()>;

    /// Full serialised HTML of the page
    async fn page_source(&self) -> DomResult<String>;
}
