use serde::{Deserialize, Serialize};

use super::Point;

/// Display fields a reporter attaches to each contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterFields {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub contact: String,
    /// Free-text coat color or marking note.
    #[serde(default)]
    pub color_note: String,
}

/// A photo attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Already hosted by the blob store.
    Url(String),
    /// Raw bytes still to be uploaded.
    Upload {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// One reporter's input: a new sighting or an update to an existing case.
///
/// The contributor identity is not part of the payload; the engine takes it
/// from the authenticated caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    /// Free-text category as typed by the reporter; normalized before use.
    pub category: Option<String>,
    pub custom_category: Option<String>,
    pub description: Option<String>,
    pub photo: Option<PhotoSource>,
    pub point: Option<Point>,
    pub reporter: ReporterFields,
}

impl Submission {
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn at(mut self, point: Point) -> Self {
        self.point = Some(point);
        self
    }

    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo = Some(PhotoSource::Url(url.into()));
        self
    }

    #[must_use]
    pub fn with_photo_upload(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.photo = Some(PhotoSource::Upload {
            bytes,
            content_type: content_type.into(),
        });
        self
    }

    #[must_use]
    pub fn with_custom_category(mut self, text: impl Into<String>) -> Self {
        self.custom_category = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: ReporterFields) -> Self {
        self.reporter = reporter;
        self
    }

    /// Description text if it carries anything besides whitespace.
    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}
