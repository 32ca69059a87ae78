//! Static, pre-authored content shown next to a prediction.
//!
//! Content is authored as a list of entries, each keyed either by a label
//! name or by a position in the model's vocabulary. The list is resolved once
//! against the vocabulary into a [`ContentTable`]; after that, lookups are
//! pure reads.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Most items of each kind shown for one label.
pub const MAX_ITEMS: usize = 3;

const BUILTIN_CONTENT: &str = include_str!("../../content/default.json");

/// What an authored entry is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKey {
    Label(String),
    /// Position in the vocabulary, resolved when the table is built
    Index(usize),
}

/// One authored block of content, as written in the content file.
///
/// Exactly one of `label` and `index` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAuthoring {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default)]
    pub texts: Vec<String>,
    /// Image URIs, including inline `data:` URIs
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

impl ContentAuthoring {
    pub fn for_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn for_index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_texts(mut self, texts: Vec<impl Into<String>>) -> Self {
        self.texts = texts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_images(mut self, images: Vec<impl Into<String>>) -> Self {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_videos(mut self, videos: Vec<impl Into<String>>) -> Self {
        self.videos = videos.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> Option<ContentKey> {
        match (&self.label, self.index) {
            (Some(label), None) => Some(ContentKey::Label(label.clone())),
            (None, Some(index)) => Some(ContentKey::Index(index)),
            _ => None,
        }
    }
}

/// The content shown for one label, already filtered and truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    pub label: String,
    pub texts: Vec<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

impl ContentEntry {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty() && self.videos.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct RawContent {
    texts: Vec<String>,
    images: Vec<String>,
    videos: Vec<String>,
}

/// Label → content mapping. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct ContentTable {
    entries: HashMap<String, RawContent>,
}

impl ContentTable {
    /// Resolves authored entries against a vocabulary.
    ///
    /// Index keys outside the vocabulary and entries with no usable key are
    /// skipped with a warning. When two entries resolve to the same label the
    /// later one replaces the earlier one.
    pub fn resolve(authoring: Vec<ContentAuthoring>, vocabulary: &[String]) -> Self {
        let mut entries = HashMap::new();

        for (position, item) in authoring.into_iter().enumerate() {
            let label = match item.key() {
                Some(ContentKey::Label(label)) => label,
                Some(ContentKey::Index(index)) => match vocabulary.get(index) {
                    Some(label) => label.clone(),
                    None => {
                        warn!(
                            "Content entry {} refers to label index {}, but the vocabulary has {} labels; skipping",
                            position + 1,
                            index,
                            vocabulary.len()
                        );
                        continue;
                    }
                },
                None => {
                    warn!("Content entry {} must set exactly one of 'label' or 'index'; skipping", position + 1);
                    continue;
                }
            };

            let raw = RawContent {
                texts: item.texts,
                images: item.images,
                videos: item.videos,
            };
            if entries.insert(label.clone(), raw).is_some() {
                debug!("Content for label '{}' defined more than once, keeping the last definition", label);
            }
        }

        info!("Content table ready with {} labels", entries.len());
        Self { entries }
    }

    /// The content bundled with the binary.
    pub fn builtin(vocabulary: &[String]) -> Self {
        Self::resolve(Self::builtin_authoring(), vocabulary)
    }

    /// The authored entries bundled with the binary, before resolution.
    pub fn builtin_authoring() -> Vec<ContentAuthoring> {
        parse_authoring(BUILTIN_CONTENT).unwrap_or_else(|e| {
            warn!("Built-in content is invalid, starting with an empty table: {}", e);
            Vec::new()
        })
    }

    /// Reads authored entries from a JSON file.
    pub fn load_authoring(path: impl AsRef<Path>) -> anyhow::Result<Vec<ContentAuthoring>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read content file {}: {}", path.display(), e))?;
        parse_authoring(&text)
            .map_err(|e| anyhow::anyhow!("Invalid content file {}: {}", path.display(), e))
    }

    /// Returns up to [`MAX_ITEMS`] non-blank texts, images and videos for `label`,
    /// in authored order. Unknown labels yield an empty entry.
    pub fn lookup(&self, label: &str) -> ContentEntry {
        let mut entry = ContentEntry {
            label: label.to_string(),
            ..ContentEntry::default()
        };
        if let Some(raw) = self.entries.get(label) {
            entry.texts = pick_top(&raw.texts);
            entry.images = pick_top(&raw.images);
            entry.videos = pick_top(&raw.videos);
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn parse_authoring(text: &str) -> serde_json::Result<Vec<ContentAuthoring>> {
    serde_json::from_str(text)
}

fn pick_top(items: &[String]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.trim().is_empty())
        .take(MAX_ITEMS)
        .cloned()
        .collect()
}
