//! Generated artifacts and request input files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The media type of a generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A still image.
    Image,
    /// An audio clip.
    Audio,
    /// A video clip.
    Video,
    /// Plain text.
    Text,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// One unit of generated output.
///
/// Binary media is referenced by `url`; text output is carried inline in
/// `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// The media type.
    pub kind: ArtifactKind,

    /// Location of the media (remote URL, data URL or cache URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Inline content for text artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// MIME type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,

    /// Backend-specific metadata (seed, dimensions, duration).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Artifact {
    /// Creates a URL-backed artifact.
    #[must_use]
    pub fn from_url(kind: ArtifactKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: Some(url.into()),
            content: None,
            mime: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a text artifact.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Text,
            url: None,
            content: Some(content.into()),
            mime: Some("text/plain".to_string()),
            metadata: HashMap::new(),
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A file attached to a generation request (reference image, audio prompt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Original file name.
    pub filename: String,
    /// MIME type.
    pub mime: String,
    /// Raw bytes.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl InputFile {
    /// Creates an input file.
    #[must_use]
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime: mime.into(),
            data,
        }
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
