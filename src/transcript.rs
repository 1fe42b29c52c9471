//! Timestamped conversation log

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

/// Append-only transcript file, one `{timestamp} {text}` line per entry
pub struct Transcript {
    path: PathBuf,
    timezone: Tz,
}

impl Transcript {
    /// Name the file `log_{name1}_{name2}_{unix_seconds}.txt` inside `dir`.
    /// Nothing is written until the first `append`.
    pub fn create(dir: &Path, name1: &str, name2: &str, timezone: Tz) -> Self {
        let started = Utc::now().timestamp();
        let path = dir.join(format!("log_{name1}_{name2}_{started}.txt"));
        info!("Logging conversation to {}", path.display());
        Self { path, timezone }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, text: &str) -> std::io::Result<()> {
        let now = Utc::now().with_timezone(&self.timezone);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_line(&now, text))
    }
}

fn format_line<T: TimeZone>(at: &DateTime<T>, text: &str) -> String
where
    T::Offset: std::fmt::Display,
{
    format!("{} {}", at.format(TIMESTAMP_FORMAT), text)
}

/// Directory holding the running executable, or the working directory when
/// that cannot be determined.
pub fn default_log_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn line_carries_zone_offset() {
        let at = chrono_tz::America::New_York
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 1, 15)
                    .unwrap()
                    .and_hms_micro_opt(9, 30, 5, 42)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            format_line(&at, "Ada: hello"),
            "2024-01-15 09:30:05.000042-05:00 Ada: hello"
        );
    }

    #[test]
    fn appends_lines_to_named_file() {
        let dir = std::env::temp_dir().join(format!("agent_relay_transcript_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let transcript = Transcript::create(&dir, "Ada", "Bob", chrono_tz::UTC);
        let file_name = transcript.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("log_Ada_Bob_"));
        assert!(file_name.ends_with(".txt"));

        transcript.append("Ada: hi").unwrap();
        transcript.append("Bob: hey").unwrap();

        let contents = std::fs::read_to_string(transcript.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("+00:00 Ada: hi"));
        assert!(lines[1].ends_with("+00:00 Bob: hey"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn default_dir_is_next_to_executable() {
        let exe = std::env::current_exe().unwrap();
        assert_eq!(default_log_dir(), exe.parent().unwrap());
    }
}
