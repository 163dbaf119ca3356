//! Shared output layer: pretty/text/JSON parity for every command.
//!
//! Each command handler receives an [`OutputMode`] and a serializable
//! payload. JSON output serializes the payload as-is; pretty and text modes
//! go through per-command closures.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var (`pretty` | `text` | `json`)
//! 3. Default: pretty if stdout is a TTY, text if piped.

use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use serde::Serialize;

/// Width of separators in pretty output.
pub const PRETTY_RULE_WIDTH: usize = 60;

/// Horizontal separator for pretty output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Left-aligned key/value line for pretty output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned columns).
    Pretty,
    /// Plain rows for pipes and scripts.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

fn resolve_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }
    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
#[must_use]
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Render a serializable payload to stdout, with separate text and pretty
/// renderers.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
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

/// Render a serializable payload with one human renderer shared by pretty
/// and text mode.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with an optional hint, rendered to stderr.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Machine-readable code (`E####`).
    pub code: String,
    /// Code-level summary, stable per code.
    pub summary: String,
    /// Instance-specific detail.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: modgraph_core::ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code().to_string(),
            summary: code.message().to_string(),
            message: message.into(),
            hint: code.hint().map(ToString::to_string),
        }
    }
}

/// Render an error to stderr in the requested format, then return an
/// `anyhow` error carrying the message so `main` exits non-zero.
///
/// # Errors
///
/// Always returns an error (the rendered one).
pub fn fail<T>(mode: OutputMode, error: &CliError) -> anyhow::Result<T> {
    let stderr = io::stderr();
    let mut err_out = stderr.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut err_out, error)?;
        writeln!(err_out)?;
    } else {
        writeln!(
            err_out,
            "error[{}]: {}: {}",
            error.code, error.summary, error.message
        )?;
        if let Some(hint) = &error.hint {
            writeln!(err_out, "hint: {hint}")?;
        }
    }
    anyhow::bail!("{}", error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_carries_code_summary_and_hint() {
        let err = CliError::new(
            modgraph_core::ErrorCode::PackageNotFound,
            "package 'x' is not in the graph",
        );
        assert_eq!(err.code, "E4001");
        assert_eq!(err.summary, "Package not found");
        assert!(err.hint.is_none());

        let err = CliError::new(modgraph_core::ErrorCode::NotInitialized, "no index dir");
        assert_eq!(err.summary, "Index directory not initialized");
        assert!(err.hint.is_some());
    }

    #[test]
    fn explicit_format_flag_wins() {
        let mode = resolve_inner(Some(OutputMode::Json), false, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn json_flag_beats_env() {
        let mode = resolve_inner(None, true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn env_var_beats_tty_default() {
        let mode = resolve_inner(None, false, Some("json"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn unknown_env_value_falls_through_to_tty() {
        assert_eq!(
            resolve_inner(None, false, Some("fancy"), true),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_inner(None, false, Some("fancy"), false),
            OutputMode::Text
        );
    }
}
