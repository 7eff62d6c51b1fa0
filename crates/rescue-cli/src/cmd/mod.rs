pub mod delete;
pub mod list;
pub mod merge;
pub mod mine;
pub mod nearby;
pub mod report;
pub mod show;
pub mod status;

use crate::output::{CliError, OutputMode, pretty_kv, render_error, write_case};
use anyhow::Context as _;
use clap::Args;
use rescue_core::model::{Case, Point, ReporterFields, Submission};
use rescue_core::{Contribution, EngineError};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Render an engine failure and turn it into the command's error.
pub fn engine_failure(output: OutputMode, err: &EngineError) -> anyhow::Error {
    if let Err(render_err) = render_error(output, &CliError::from(err)) {
        return render_err;
    }
    anyhow::anyhow!("{err}")
}

/// Sighting fields shared by `report` and `merge`.
#[derive(Args, Debug, Default)]
pub struct SightingArgs {
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true, requires = "lng")]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    pub lng: Option<f64>,

    /// What the animal looks like or what is happening.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Free-text kind of animal, kept only for the Other category.
    #[arg(long)]
    pub custom_category: Option<String>,

    /// Already-hosted photo URL.
    #[arg(long, conflicts_with = "photo")]
    pub photo_url: Option<String>,

    /// Local photo file to upload.
    #[arg(long, value_name = "PATH")]
    pub photo: Option<PathBuf>,

    /// MIME type of `--photo` (inferred from the extension when omitted).
    #[arg(long, requires = "photo")]
    pub content_type: Option<String>,

    /// Reporter display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Reporter contact (phone or email).
    #[arg(long)]
    pub contact: Option<String>,

    /// Coat color or distinctive markings.
    #[arg(long)]
    pub color: Option<String>,
}

impl SightingArgs {
    pub fn point(&self) -> Option<Point> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
            _ => None,
        }
    }

    /// Build a submission, reading the photo file if one was given.
    pub fn to_submission(&self, category: Option<&str>) -> anyhow::Result<Submission> {
        let mut submission = Submission {
            category: category.map(str::to_string),
            point: self.point(),
            description: self.description.clone(),
            custom_category: self.custom_category.clone(),
            reporter: ReporterFields {
                display_name: self.name.clone().unwrap_or_default(),
                contact: self.contact.clone().unwrap_or_default(),
                color_note: self.color.clone().unwrap_or_default(),
            },
            ..Submission::default()
        };

        if let Some(ref url) = self.photo_url {
            submission = submission.with_photo_url(url.clone());
        }
        if let Some(ref path) = self.photo {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read photo {}", path.display()))?;
            let content_type = self
                .content_type
                .clone()
                .unwrap_or_else(|| infer_content_type(path).to_string());
            submission = submission.with_photo_upload(bytes, content_type);
        }
        Ok(submission)
    }
}

/// MIME type from a photo's file extension.
pub fn infer_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// JSON view of a create or merge: the case plus any photo upload failure.
#[derive(Serialize)]
pub struct ContributionView<'a> {
    #[serde(flatten)]
    pub case: &'a Case,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_error: Option<CliError>,
}

impl<'a> From<&'a Contribution> for ContributionView<'a> {
    fn from(contribution: &'a Contribution) -> Self {
        Self {
            case: &contribution.case,
            photo_error: contribution.photo_error.as_ref().map(CliError::from),
        }
    }
}

pub fn write_contribution(
    w: &mut dyn Write,
    view: &ContributionView<'_>,
    verb: &str,
) -> io::Result<()> {
    writeln!(w, "{verb} {}", view.case.id)?;
    writeln!(w)?;
    write_case(w, view.case)?;
    if let Some(ref err) = view.photo_error {
        writeln!(w)?;
        pretty_kv(w, "Photo", format!("not saved: {}", err.message))?;
    }
    Ok(())
}
