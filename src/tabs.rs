//! Matching the operator's open chat tabs to agents

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::BrowserManager;
use crate::agent::AgentKind;
use crate::browser::BrowserError;
use crate::dom::{ChatSurface, TabSurface};

#[derive(Error, Debug)]
pub enum TabError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Failed to read from stdin: {0}")]
    Stdin(#[from] std::io::Error),

    #[error("stdin closed before the tabs were confirmed")]
    StdinClosed,

    #[error("Could not find the tab for {name}. This may be because their name wasn't entered exactly as it is shown in the website.")]
    Unassigned { name: String },
}

/// Name and kind of one relay participant
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub kind: AgentKind,
}

/// One tab per browser-driven agent
pub fn required_tabs(participants: &[Participant; 2]) -> usize {
    participants.iter().filter(|p| p.kind.is_browser_driven()).count()
}

/// Pick a tab for each name by looking for `>{name}` in the page source.
///
/// Tab order is meaningless, so the agent's name as rendered by the site is
/// the only handle. A tab already taken by one agent is never given to the
/// other, which lets two same-named agents on one site be told apart.
pub fn assign_tabs(sources: &[String], name1: &str, name2: &str) -> (Option<usize>, Option<usize>) {
    let (marker1, marker2) = (format!(">{name1}"), format!(">{name2}"));
    let (mut tab1, mut tab2) = (None, None);

    for (index, source) in sources.iter().enumerate() {
        if source.contains(&marker1) && tab1.is_none() && tab2 != Some(index) {
            tab1 = Some(index);
        }
        if source.contains(&marker2) && tab2.is_none() && tab1 != Some(index) {
            tab2 = Some(index);
        }
    }

    (tab1, tab2)
}

fn login_prompt(participants: &[Participant; 2]) -> String {
    let [first, second] = participants;
    match (first.kind.is_browser_driven(), second.kind.is_browser_driven()) {
        (true, true) => format!(
            "Press Enter when you have authenticated into your {} account and opened the chat for {} in one tab, \
             and you have authenticated into your {} account and opened the chat for {} in another tab",
            first.kind, first.name, second.kind, second.name
        ),
        (true, false) => single_tab_prompt(first),
        _ => single_tab_prompt(second),
    }
}

fn single_tab_prompt(participant: &Participant) -> String {
    format!(
        "Press Enter when you have authenticated into your {} account and opened the chat for {} in a single tab",
        participant.kind, participant.name
    )
}

/// Wait for the operator to open the chats, then hand each browser-driven
/// participant its tab. Custom participants get `None`.
pub async fn discover_tabs(
    manager: &BrowserManager,
    participants: &[Participant; 2],
) -> Result<[Option<TabSurface>; 2], TabError> {
    let required = required_tabs(participants);
    let prompt = login_prompt(participants);
    let mut stdin = BufReader::new(tokio::io::stdin());

    let (pages, sources) = loop {
        println!("{prompt}");
        let mut line = String::new();
        if stdin.read_line(&mut line).await? == 0 {
            return Err(TabError::StdinClosed);
        }

        let pages = manager.tabs().await?;
        if pages.len() != required {
            println!(
                "\nError: Did not detect {required} open tabs in your browser. There must only be {required}. Please try again.\n"
            );
            continue;
        }

        let mut sources = Vec::with_capacity(pages.len());
        for page in &pages {
            let surface = TabSurface::new(page.clone());
            let source = match surface.page_source().await {
                Ok(source) => source,
                Err(e) => {
                    warn!("Could not read tab source: {}", e);
                    String::new()
                }
            };
            sources.push(source);
        }
        break (pages, sources);
    };

    let [first, second] = participants;
    let (tab1, tab2) = assign_tabs(&sources, &first.name, &second.name);
    debug!("Tab assignment: {} -> {:?}, {} -> {:?}", first.name, tab1, second.name, tab2);

    let mut surfaces = [None, None];
    for ((slot, participant), tab) in surfaces.iter_mut().zip(participants).zip([tab1, tab2]) {
        if !participant.kind.is_browser_driven() {
            continue;
        }
        let index = tab.ok_or_else(|| TabError::Unassigned {
            name: participant.name.clone(),
        })?;
        *slot = Some(TabSurface::new(pages[index].clone()));
    }

    Ok(surfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(pages: &[&str]) -> Vec<String> {
        pages.iter().map(|p| p.to_string()).collect()
    }

    fn participant(name: &str, kind: AgentKind) -> Participant {
        Participant {
            name: name.into(),
            kind,
        }
    }

    #[test]
    fn distinct_names_find_their_tabs() {
        let pages = sources(&["<div>Bob</div>", "<h1>Ada</h1>"]);
        assert_eq!(assign_tabs(&pages, "Ada", "Bob"), (Some(1), Some(0)));
    }

    #[test]
    fn identical_names_take_separate_tabs() {
        let pages = sources(&["<p>Sam</p>", "<p>Sam</p>"]);
        assert_eq!(assign_tabs(&pages, "Sam", "Sam"), (Some(0), Some(1)));
    }

    #[test]
    fn name_without_leading_tag_close_is_ignored() {
        let pages = sources(&["talking about Ada", "<p>Bob</p>"]);
        assert_eq!(assign_tabs(&pages, "Ada", "Bob"), (None, Some(1)));
    }

    #[test]
    fn single_browser_tab_for_custom_pair() {
        let pages = sources(&["<span>Ada</span>"]);
        assert_eq!(assign_tabs(&pages, "Ada", "Bot"), (Some(0), None));
    }

    #[test]
    fn tab_count_drops_for_custom_agents() {
        let both = [participant("a", AgentKind::CharacterAi), participant("b", AgentKind::Replika)];
        let one = [participant("a", AgentKind::Custom), participant("b", AgentKind::Replika)];
        let none = [participant("a", AgentKind::Custom), participant("b", AgentKind::Custom)];
        assert_eq!(required_tabs(&both), 2);
        assert_eq!(required_tabs(&one), 1);
        assert_eq!(required_tabs(&none), 0);
    }

    #[test]
    fn prompt_names_only_browser_agents() {
        let one = [participant("Bot", AgentKind::Custom), participant("Rep", AgentKind::Replika)];
        let prompt = login_prompt(&one);
        assert!(prompt.contains("Replika account"));
        assert!(prompt.contains("chat for Rep in a single tab"));
        assert!(!prompt.contains("Bot"));
    }
}
