//! Local chapter files. One `<stem>.html` plus a `<stem>.meta.json` sidecar per chapter,
//! where the stem is the zero-padded book order followed by the sanitized title.

use crate::model::{BookId, Chapter, ChapterMeta};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HTML_EXT: &str = "html";
const META_SUFFIX: &str = ".meta.json";
const BOOK_META_FILE: &str = "book.json";
/// Byte budget for the title part of a stem; leaves room for the order prefix and
/// `.meta.json` under the usual 255-byte file name limit.
const MAX_TITLE_BYTES: usize = 200;

/// Errors from writing pulled chapters. Writing stops at the first failure.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path} ({written} chapter(s) written before the failure): {source}")]
    Io {
        path: PathBuf,
        written: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode metadata for {path}: {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from reading local chapter files back (push path).
#[derive(Debug, Error)]
pub enum LocalChapterError {
    #[error("Chapter file not found: {path}")]
    Missing { path: PathBuf },

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid chapter metadata {path}: {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Sanitize a chapter title for use in a filename. Alphanumerics keep their case;
/// every other run of characters becomes a single `-`. Cut at a char boundary to
/// at most [MAX_TITLE_BYTES] bytes.
fn sanitize_title(title: &str) -> String {
    let mut s = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            s.push(c);
        } else if !s.ends_with('-') {
            s.push('-');
        }
    }
    let mut s = s.trim_matches('-');
    if s.len() > MAX_TITLE_BYTES {
        let mut end = MAX_TITLE_BYTES;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s = s[..end].trim_end_matches('-');
    }
    if s.is_empty() {
        "chapter".to_string()
    } else {
        s.to_string()
    }
}

/// File stem for a chapter: `01-Title`. Width grows with the chapter count so that
/// lexical order always matches book order.
pub fn chapter_stem(order: u32, title: &str, total: usize) -> String {
    let width = total.to_string().len().max(2);
    format!("{:0width$}-{}", order, sanitize_title(title), width = width)
}

fn meta_path(directory: &Path, stem: &str) -> PathBuf {
    directory.join(format!("{}{}", stem, META_SUFFIX))
}

fn to_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<String, WriteError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| WriteError::Meta {
        path: path.to_path_buf(),
        source: e,
    })?;
    json.push('\n');
    Ok(json)
}

/// Write `book.json` and every chapter into `directory`, overwriting existing files.
/// Returns the HTML paths in order.
pub fn write_chapters(
    directory: &Path,
    book: &BookId,
    chapters: &[Chapter],
) -> Result<Vec<PathBuf>, WriteError> {
    fs::create_dir_all(directory).map_err(|e| WriteError::CreateDir {
        path: directory.to_path_buf(),
        source: e,
    })?;
    let book_path = directory.join(BOOK_META_FILE);
    fs::write(&book_path, to_json(book, &book_path)?).map_err(|e| WriteError::Io {
        path: book_path.clone(),
        written: 0,
        source: e,
    })?;

    let mut written = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let stem = chapter_stem(chapter.order, &chapter.title, chapters.len());
        let html_path = directory.join(format!("{}.{}", stem, HTML_EXT));
        let sidecar = meta_path(directory, &stem);

        let meta = to_json(&chapter.meta(), &sidecar)?;

        let files = [
            (&html_path, chapter.content.as_bytes()),
            (&sidecar, meta.as_bytes()),
        ];
        for (path, bytes) in files {
            fs::write(path, bytes).map_err(|e| WriteError::Io {
                path: path.clone(),
                written: written.len(),
                source: e,
            })?;
        }
        log::info!("Wrote {}", html_path.display());
        written.push(html_path);
    }
    Ok(written)
}

/// Stems of the `*.html` chapter files in `directory`, sorted (book order).
pub fn list_chapter_stems(directory: &Path) -> Result<Vec<String>, LocalChapterError> {
    let entries = fs::read_dir(directory).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LocalChapterError::Missing {
                path: directory.to_path_buf(),
            }
        } else {
            LocalChapterError::Read {
                path: directory.to_path_buf(),
                source: e,
            }
        }
    })?;
    let mut stems = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LocalChapterError::Read {
            path: directory.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(HTML_EXT) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

fn read(path: PathBuf) -> Result<String, LocalChapterError> {
    fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LocalChapterError::Missing { path: path.clone() }
        } else {
            LocalChapterError::Read {
                path: path.clone(),
                source: e,
            }
        }
    })
}

/// Read the book identity saved by the last pull.
pub fn read_book_id(directory: &Path) -> Result<BookId, LocalChapterError> {
    let path = directory.join(BOOK_META_FILE);
    let json = read(path.clone())?;
    serde_json::from_str(&json).map_err(|e| LocalChapterError::Meta { path, source: e })
}

/// Read a chapter back from `<stem>.html` and its sidecar.
pub fn read_chapter(directory: &Path, stem: &str) -> Result<Chapter, LocalChapterError> {
    let content = read(directory.join(format!("{}.{}", stem, HTML_EXT)))?;
    let sidecar = meta_path(directory, stem);
    let meta_json = read(sidecar.clone())?;
    let meta: ChapterMeta =
        serde_json::from_str(&meta_json).map_err(|e| LocalChapterError::Meta {
            path: sidecar,
            source: e,
        })?;
    Ok(Chapter::from_meta(meta, content))
}
