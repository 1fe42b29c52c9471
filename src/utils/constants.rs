//! Shared configuration constants for the relay
//!
//! Default prompts and site strings used throughout the codebase to ensure
//! consistency and avoid magic strings.

/// Chrome user agent string for stealth mode
///
/// Chat sites gate automation on the user agent, so keep this close to the
/// current Chrome stable release.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Topic seeded into both introductions when none is configured
pub const DEFAULT_TOPIC: &str = "stuff";

/// Injected when deadlock avoidance fires
pub const DEADLOCK_AVOIDANCE_PROMPT: &str = "Let's talk about something else.";

/// Transcript marker written when deadlock avoidance fires
pub const DEADLOCK_TRANSCRIPT_MARKER: &str = "--SYSTEM-- DEADLOCK AVOIDANCE ACTIVATED";
