//! Output rendering shared by every `ll` command.
//!
//! Each command builds one serializable report and hands it to
//! [`render_mode`] together with a tab-separated and a human renderer, so
//! the three formats never drift apart.
//!
//! The mode is picked in this order: `--format`, then `--json`, then
//! `LIFELINE_FORMAT` (`pretty`, `text` or `json`), then pretty on a terminal
//! and text when piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

use lifeline_core::ErrorCode;

const FORMAT_ENV: &str = "LIFELINE_FORMAT";
const RULE_WIDTH: usize = 72;
const KEY_WIDTH: usize = 14;

// ---------------------------------------------------------------------------
// Human layout helpers
// ---------------------------------------------------------------------------

/// Heading underlined with a fixed-width rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}\n{}", "-".repeat(RULE_WIDTH))
}

/// `Key:` padded to a common column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let label = format!("{key}:");
    writeln!(w, "{label:<width$} {}", value.as_ref(), width = KEY_WIDTH)
}

// ---------------------------------------------------------------------------
// Mode selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-oriented sections and aligned columns.
    Pretty,
    /// Tab-separated rows for pipes and scripts.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Case-insensitive mode name; unknown names yield `None`.
    fn from_name(name: &str) -> Option<Self> {
        Self::value_variants()
            .iter()
            .copied()
            .find(|mode| mode.to_possible_value().is_some_and(|v| v.matches(name.trim(), true)))
    }
}

fn pick_mode(flag: Option<OutputMode>, json: bool, env: Option<&str>, tty: bool) -> OutputMode {
    flag.or_else(|| json.then_some(OutputMode::Json))
        .or_else(|| env.and_then(OutputMode::from_name))
        .unwrap_or(if tty { OutputMode::Pretty } else { OutputMode::Text })
}

/// Mode for this process, from flags, `LIFELINE_FORMAT` and whether stdout
/// is a terminal.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env = std::env::var(FORMAT_ENV).ok();
    pick_mode(format_flag, json_flag, env.as_deref(), io::stdout().is_terminal())
}

/// Write `value` to stdout as JSON or through one of the two renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error report printed on stderr, with the engine code when there is one.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    /// Error tagged with `code`; its hint becomes the suggestion.
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
            ..Self::new(message)
        }
    }
}

pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    write_error(mode, error, &mut io::stderr().lock())
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> anyhow::Result<()> {
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut *out, &serde_json::json!({ "error": error }))?;
        writeln!(out)?;
        return Ok(());
    }

    let tag = error
        .error_code
        .as_deref()
        .map_or_else(|| "error".to_string(), |code| format!("error[{code}]"));
    writeln!(out, "{tag}: {}", error.message)?;
    if let Some(suggestion) = &error.suggestion {
        writeln!(out, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_json_and_env() {
        let mode = pick_mode(Some(OutputMode::Text), true, Some("json"), true);
        assert_eq!(mode, OutputMode::Text);
        assert_eq!(pick_mode(None, true, Some("text"), true), OutputMode::Json);
    }

    #[test]
    fn env_then_tty_fallback() {
        assert_eq!(pick_mode(None, false, Some("JSON"), true), OutputMode::Json);
        assert_eq!(pick_mode(None, false, Some("bogus"), true), OutputMode::Pretty);
        assert_eq!(pick_mode(None, false, None, false), OutputMode::Text);
    }

    #[test]
    fn kv_lines_share_a_column() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "Events", "12").expect("write");
        pretty_kv(&mut buf, "Px per day", "0.5").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let columns: Vec<usize> = text.lines().filter_map(|l| l.rfind(' ')).collect();
        assert_eq!(columns, vec![KEY_WIDTH, KEY_WIDTH]);
    }

    #[test]
    fn coded_error_carries_hint() {
        let err = CliError::coded(ErrorCode::InvalidDate, "bad date in evt-1");
        assert_eq!(err.error_code.as_deref(), Some("E2001"));
        assert!(err.suggestion.is_some());

        let mut buf = Vec::new();
        write_error(OutputMode::Text, &err, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("error[E2001]: bad date in evt-1"));
    }

    #[test]
    fn json_error_is_wrapped() {
        let mut buf = Vec::new();
        write_error(OutputMode::Json, &CliError::new("boom"), &mut buf).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["error"]["message"], "boom");
        assert!(value["error"].get("error_code").is_none());
    }
}
