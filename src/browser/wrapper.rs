//! Browser lifecycle for the relay
//!
//! Launches chromiumoxide with the configured profile and keeps the CDP
//! handler task alongside the browser so both go away together.

use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{BrowserError, BrowserResult};
use crate::BrowserConfig;
use crate::browser_setup::default_profile_dir;

/// Wrapper for Browser and its event handler task
///
/// Handler MUST be aborted to prevent it running indefinitely after
/// browser is closed.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Set only for throwaway profiles; persistent ones are left alone
    ephemeral_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, ephemeral_dir: Option<PathBuf>) -> Self {
        Self {
            browser,
            handler,
            ephemeral_dir,
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Remove a throwaway profile directory (blocking operation)
    ///
    /// MUST be called AFTER `browser.wait()` completes to ensure Chrome
    /// has released all file handles.
    pub fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.ephemeral_dir.take() {
            info!("Cleaning up temp profile: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp profile {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        info!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();

        if let Some(path) = self.ephemeral_dir.as_ref() {
            warn!(
                "BrowserWrapper dropped without explicit cleanup. \
                Temp profile will be orphaned: {}. \
                Call BrowserManager::shutdown() before dropping to ensure proper cleanup.",
                path.display()
            );
        }
    }
}

/// Launch the relay's browser.
///
/// The profile is `browser.user_data_dir`, or the per-user default, so chat
/// logins carry over between runs. With `ephemeral_profile` a fresh
/// directory under the temp dir is used instead and removed on shutdown.
pub async fn launch_browser(config: &BrowserConfig) -> BrowserResult<BrowserWrapper> {
    let (profile, persistent) = if config.ephemeral_profile {
        let dir = std::env::temp_dir().join(format!("agent_relay_profile_{}", std::process::id()));
        (dir, false)
    } else {
        let dir = config.user_data_dir.clone().unwrap_or_else(default_profile_dir);
        (dir, true)
    };

    info!("Launching browser with profile {}", profile.display());

    let (browser, handler, user_data_dir) =
        crate::browser_setup::launch_browser(config, profile, persistent)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("{e:#}")))?;

    let ephemeral_dir = (!persistent).then_some(user_data_dir);
    Ok(BrowserWrapper::new(browser, handler, ephemeral_dir))
}
