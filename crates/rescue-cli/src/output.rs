//! Shared output layer for pretty/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: pretty output for humans or stable JSON for scripts.

use chrono::{DateTime, Local, Utc};
use rescue_core::EngineError;
use rescue_core::matcher::Candidate;
use rescue_core::model::{Case, Status};
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2001", "missing_identity").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Whether retrying the same command may succeed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl CliError {
    /// Create an error with a suggestion and error code.
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
            retryable: false,
        }
    }
}

impl From<&EngineError> for CliError {
    fn from(err: &EngineError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(str::to_string),
            error_code: Some(err.code().code().to_string()),
            retryable: err.is_retryable(),
        }
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode, the value is serialized with `serde_json`. In pretty mode,
/// the provided `human_fn` closure is called to produce text output.
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
        OutputMode::Pretty => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty => {
            match error.error_code {
                Some(ref code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Local-time rendering for human output.
pub fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Full case detail: header, current description and the contribution log.
/// Status label with its place on the rescue path, e.g. `Picked up (2/4)`.
pub fn status_progress(status: Status) -> String {
    format!("{} ({}/{})", status.label(), status.stage() + 1, Status::ALL.len())
}

pub fn write_case(w: &mut dyn Write, case: &Case) -> io::Result<()> {
    let heading = match case.custom_category {
        Some(ref custom) => format!("{} [{} / {custom}]", case.id, case.category),
        None => format!("{} [{}]", case.id, case.category),
    };
    pretty_section(w, &heading)?;
    pretty_kv(w, "Status", status_progress(case.status))?;
    pretty_kv(w, "Location", case.location.to_string())?;
    if let Some(current) = case.current_description() {
        pretty_kv(w, "Description", &current.text)?;
    }
    pretty_kv(w, "Opened", format!("{} by {}", local_time(case.created_at), case.created_by))?;
    pretty_kv(w, "Updated", local_time(case.updated_at))?;
    let contributors: Vec<&str> = case.contributors.iter().map(|c| c.as_str()).collect();
    pretty_kv(w, "Contributors", contributors.join(", "))?;

    if !case.photos.is_empty() {
        writeln!(w)?;
        writeln!(w, "Photos")?;
        for photo in &case.photos {
            writeln!(w, "  {}  {} ({})", local_time(photo.at), photo.url, photo.contributor)?;
        }
    }

    if case.location_history.len() > 1 {
        writeln!(w)?;
        writeln!(w, "Sightings")?;
        for entry in &case.location_history {
            writeln!(w, "  {}  {}", local_time(entry.at), entry.point)?;
        }
    }

    if !case.reporter_info.is_empty() {
        writeln!(w)?;
        writeln!(w, "Reporters")?;
        for reporter in &case.reporter_info {
            let name = if reporter.display_name.is_empty() {
                reporter.contributor.as_str()
            } else {
                reporter.display_name.as_str()
            };
            write!(w, "  {}  {name}", local_time(reporter.at))?;
            if !reporter.contact.is_empty() {
                write!(w, " <{}>", reporter.contact)?;
            }
            if !reporter.color_note.is_empty() {
                write!(w, "  color: {}", reporter.color_note)?;
            }
            writeln!(w)?;
        }
    }
    Ok(())
}

/// One-line case summary for listings.
pub fn write_case_row(w: &mut dyn Write, case: &Case) -> io::Result<()> {
    let description = case
        .current_description()
        .map_or("", |entry| entry.text.as_str());
    writeln!(
        w,
        "{:<20} {:<6} {:<13} {}  {}",
        case.id.as_str(),
        case.category.as_str(),
        case.status.label(),
        local_time(case.updated_at),
        truncate(description, 40),
    )
}

pub fn write_cases(w: &mut dyn Write, cases: &[Case]) -> io::Result<()> {
    if cases.is_empty() {
        return writeln!(w, "No cases.");
    }
    pretty_section(w, &format!("{} case(s)", cases.len()))?;
    for case in cases {
        write_case_row(w, case)?;
    }
    Ok(())
}

pub fn write_candidates(w: &mut dyn Write, candidates: &[Candidate]) -> io::Result<()> {
    if candidates.is_empty() {
        return writeln!(w, "No nearby cases. Report this sighting as a new case.");
    }
    pretty_section(w, &format!("{} nearby case(s)", candidates.len()))?;
    for candidate in candidates {
        let description = candidate.descriptions.last().map_or("", String::as_str);
        writeln!(
            w,
            "{:<20} {:>7.0} m  {:<13} {} photo(s)  {}",
            candidate.case_id.as_str(),
            candidate.distance_m,
            candidate.status.label(),
            candidate.photos.len(),
            truncate(description, 32),
        )?;
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
