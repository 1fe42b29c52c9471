//! Owner of the relay's browser instance
//!
//! # Async Lock Requirements
//!
//! Browser operations are async, so the wrapper sits behind a
//! `tokio::sync::Mutex`; a sync lock cannot be held across `.await`.

use chromiumoxide::page::Page;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserResult, BrowserWrapper, launch_browser};

/// Lazily launched browser with health checking and crash recovery
///
/// Every call to `get_or_launch()` performs a health check via
/// `browser.version()`. A crashed browser is cleaned up and relaunched.
pub struct BrowserManager {
    config: BrowserConfig,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
}

impl BrowserManager {
    /// Browser will be lazy-loaded on first `get_or_launch()` call.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Get or launch the browser instance
    ///
    /// # Returns
    /// Arc to the browser Mutex - caller locks it to access BrowserWrapper
    pub async fn get_or_launch(&self) -> BrowserResult<Arc<Mutex<Option<BrowserWrapper>>>> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    debug!("Browser health check passed, reusing existing browser");
                    drop(guard);
                    return Ok(self.browser.clone());
                }
                Err(e) => {
                    warn!("Browser health check failed: {}. Triggering recovery...", e);

                    if let Some(mut crashed_wrapper) = guard.take() {
                        // Best-effort cleanup (may fail if process already dead)
                        let _ = crashed_wrapper.browser_mut().close().await;
                        let _ = crashed_wrapper.browser_mut().wait().await;
                        crashed_wrapper.cleanup_profile_dir();
                    }

                    info!("Crashed browser cleaned up, launching new instance");
                }
            }
        }

        info!("Launching browser (first time or after recovery)");
        *guard = Some(launch_browser(&self.config).await?);
        drop(guard);

        Ok(self.browser.clone())
    }

    /// Every open page target, including tabs the operator opened by hand.
    ///
    /// chromiumoxide only tracks targets it has attached to, so targets are
    /// refreshed first.
    pub async fn tabs(&self) -> BrowserResult<Vec<Page>> {
        let browser_arc = self.get_or_launch().await?;
        let mut guard = browser_arc.lock().await;
        let wrapper = guard
            .as_mut()
            .ok_or_else(|| BrowserError::TabsUnavailable("Browser not available".into()))?;

        wrapper
            .browser_mut()
            .fetch_targets()
            .await
            .map_err(|e| BrowserError::TabsUnavailable(e.to_string()))?;

        wrapper
            .browser()
            .pages()
            .await
            .map_err(|e| BrowserError::TabsUnavailable(e.to_string()))
    }

    /// Shutdown the browser if running
    ///
    /// Calls both `close()` and `wait()`: dropping the wrapper only aborts
    /// the handler task and would leave a zombie Chrome process.
    /// Safe to call multiple times.
    pub async fn shutdown(&self) -> BrowserResult<()> {
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down browser");

            if let Err(e) = wrapper.browser_mut().close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }

            if let Err(e) = wrapper.browser_mut().wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }

            wrapper.cleanup_profile_dir();
        }

        Ok(())
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        // Not a clean shutdown: only aborts the handler. Call shutdown() first.
        debug!("BrowserManager dropping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_before_launch_is_a_no_op() {
        let manager = BrowserManager::new(BrowserConfig::default());
        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();
        assert!(manager.browser.lock().await.is_none());
    }
}
