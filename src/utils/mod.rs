pub mod constants;
mod html;
mod retry;

pub use html::{clean_message, normalize_message, strip_html_tags};
pub use retry::{Attempt, PollOutcome, RetryPolicy};
pub(crate) use retry::jittered;
