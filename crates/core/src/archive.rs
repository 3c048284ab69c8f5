//! Saved poems and the plain-text forms used when copying or saving one.

use crate::poem::PoemResult;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "archive";

pub const PREVIEW_CHARS: usize = 100;
pub const RECENT_LIMIT: usize = 6;
const FILE_PREFIX: &str = "emotion2poem_";
const FILE_SUFFIX: &str = ".txt";
const FOOTER: &str = "\n\n— Generated on ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedPoem {
    emotion_label: String,
    poem_text: String,
    saved_at: DateTime<Utc>,
}

impl SavedPoem {
    pub fn emotion_label(&self) -> &str {
        &self.emotion_label
    }

    pub fn poem_text(&self) -> &str {
        &self.poem_text
    }

    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }
}

impl From<&PoemResult> for SavedPoem {
    fn from(poem: &PoemResult) -> Self {
        Self {
            emotion_label: poem.emotion_label().to_owned(),
            poem_text: poem.poem_text().to_owned(),
            saved_at: poem.generated_at(),
        }
    }
}

/// Saved poems, newest first.
#[derive(Clone, Debug, Default)]
pub struct PoemArchive {
    poems: Vec<SavedPoem>,
}

impl PoemArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the archive from files written by [`write_download`].
    /// Files that do not parse are skipped.
    pub fn read_dir(dir: &Path) -> io::Result<Self> {
        let mut poems = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }
            let contents = fs::read_to_string(entry.path())?;
            match parse_download(&name, &contents) {
                Some(poem) => poems.push(poem),
                None => tracing::debug!(target: LOG_TARGET, file = %name, "skipping unreadable saved poem"),
            }
        }
        poems.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(Self { poems })
    }

    pub fn save(&mut self, poem: &PoemResult) {
        self.poems.insert(0, SavedPoem::from(poem));
    }

    pub fn recent(&self, limit: usize) -> &[SavedPoem] {
        &self.poems[..limit.min(self.poems.len())]
    }

    pub fn len(&self) -> usize {
        self.poems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poems.is_empty()
    }
}

fn parse_download(file_name: &str, contents: &str) -> Option<SavedPoem> {
    let millis = file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .rsplit_once('_')?
        .1
        .parse::<i64>()
        .ok()?;
    let saved_at = DateTime::from_timestamp_millis(millis)?;

    let (label, rest) = contents.strip_prefix("Emotion: ")?.split_once("\n\n")?;
    let (poem, _date) = rest.rsplit_once(FOOTER)?;
    Some(SavedPoem {
        emotion_label: label.to_owned(),
        poem_text: poem.to_owned(),
        saved_at,
    })
}

pub fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

pub fn clipboard_text(poem: &PoemResult) -> String {
    format!("{}\n\n{}", poem.emotion_label().to_uppercase(), poem.poem_text())
}

pub fn download_text(poem: &PoemResult) -> String {
    format!(
        "Emotion: {}\n\n{}{FOOTER}{}",
        poem.emotion_label(),
        poem.poem_text(),
        poem.generated_at().format("%Y-%m-%d")
    )
}

pub fn download_file_name(poem: &PoemResult) -> String {
    let slug = poem
        .emotion_label()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "{FILE_PREFIX}{}_{}{FILE_SUFFIX}",
        slug,
        poem.generated_at().timestamp_millis()
    )
}

/// Writes [`download_text`] into `dir` under [`download_file_name`].
pub fn write_download(dir: &Path, poem: &PoemResult) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(download_file_name(poem));
    fs::write(&path, download_text(poem))?;
    Ok(path)
}
