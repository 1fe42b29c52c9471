//! [`ChatSurface`] backed by a chromiumoxide page

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use tracing::trace;

use super::{ChatSurface, DomError, DomQuery, DomResult, NodeSnapshot};

/// One browser tab holding an agent's chat
#[derive(Clone)]
pub struct TabSurface {
    page: Page,
}

impl TabSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn element(&self, selector: &str, index: usize) -> DomResult<Element> {
        let mut elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| DomError::Query {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;

        if index >= elements.len() {
            return Err(DomError::MissingElement {
                selector: selector.to_string(),
                index,
            });
        }
        Ok(elements.swap_remove(index))
    }
}

fn insert_text(text: &str) -> InsertTextParams {
    InsertTextParams::new(text)
}

/// Builds the snapshot script. Selectors are embedded as JSON literals so
/// quotes inside attribute selectors survive.
fn snapshot_script(query: &DomQuery) -> DomResult<String> {
    let literal_error = |e: serde_json::Error| DomError::Query {
        selector: query.selector.clone(),
        reason: e.to_string(),
    };
    let selector = serde_json::to_string(&query.selector).map_err(literal_error)?;
    let descendants = serde_json::to_string(&query.descendants).map_err(literal_error)?;

    Ok(format!(
        r#"(() => {{
    const descendants = {descendants};
    return Array.from(document.querySelectorAll({selector})).map((el) => {{
        const attributes = {{}};
        for (const attr of el.attributes) {{
            attributes[attr.name] = attr.value;
        }}
        // one step at a time, each search scoped to the previous hit
        let target = el;
        for (const step of descendants) {{
            target = target === null ? null : target.querySelector(step);
        }}
        const following_siblings = [];
        for (let sib = el.nextElementSibling; sib !== null; sib = sib.nextElementSibling) {{
            if (sib.tagName === el.tagName) {{
                following_siblings.push(sib.innerHTML);
            }}
        }}
        return {{
            tag: el.tagName.toLowerCase(),
            attributes,
            inner_html: target === null ? null : target.innerHTML,
            following_siblings,
        }};
    }});
}})()"#
    ))
}

#[async_trait]
impl ChatSurface for TabSurface {
    async fn activate(&self) -> DomResult<()> {
        self.page
            .bring_to_front()
            .await
            .map_err(|e| DomError::Activate(e.to_string()))?;
        Ok(())
    }

    async fn snapshot(&self, query: &DomQuery) -> DomResult<Vec<NodeSnapshot>> {
        let script = snapshot_script(query)?;
        let query_error = |reason: String| DomError::Query {
            selector: query.selector.clone(),
            reason,
        };

        let nodes: Vec<NodeSnapshot> = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| query_error(e.to_string()))?
            .into_value()
            .map_err(|e| query_error(format!("unexpected snapshot shape: {e}")))?;

        trace!("Snapshot '{}' matched {} node(s)", query.selector, nodes.len());
        Ok(nodes)
    }

    async fn fill(&self, selector: &str, index: usize, text: &str) -> DomResult<String> {
        let input_error = |reason: String| DomError::Input {
            selector: selector.to_string(),
            reason,
        };
        let element = self.element(selector, index).await?;

        element
            .scroll_into_view()
            .await
            .map_err(|e| input_error(format!("scroll into view: {e}")))?;

        // Select the current contents and delete them with a real key event.
        // Assigning `value` directly bypasses the sites' React state.
        element
            .call_js_fn("function() { this.focus(); this.select(); }", false)
            .await
            .map_err(|e| input_error(format!("focus: {e}")))?;
        element
            .press_key("Backspace")
            .await
            .map_err(|e| input_error(format!("clear: {e}")))?;

        // Typing key by key only knows US keyboard keys; insertText takes
        // any Unicode, emoji and curly quotes included
        self.page
            .execute(insert_text(text))
            .await
            .map_err(|e| input_error(format!("insert text: {e}")))?;

        let value = element
            .call_js_fn("function() { return this.value; }", false)
            .await
            .map_err(|e| input_error(format!("read back: {e}")))?
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        Ok(value)
    }

    async fn submit(&self, selector: &str, index: usize) -> DomResult<()> {
        let element = self.element(selector, index).await?;
        element
            .press_key("Enter")
            .await
            .map_err(|e| DomError::Input {
                selector: selector.to_string(),
                reason: format!("press Enter: {e}"),
            })?;
        Ok(())
    }

    async fn page_source(&self) -> DomResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| DomError::Source(e.to_string()))
    }
}
