//! Browser infrastructure for launching and managing the Chrome instance
//! that hosts the chat tabs

mod wrapper;

pub use crate::browser_setup::{download_managed_browser, find_browser_executable};
pub use wrapper::{BrowserWrapper, launch_browser};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to list browser tabs: {0}")]
    TabsUnavailable(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
