//! Data model for pulled Moodle books.
//!
//! The API client produces [Chapter]s in book order; the writer consumes them.

use serde::{Deserialize, Serialize};

/// Identifies a book module inside its course. Saved as `book.json` in the book directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookId {
    pub course_id: u64,
    /// Course-module id (the `id` in the book's view URL).
    pub cmid: u64,
    /// Book instance id.
    pub instance: u64,
}

/// One chapter in book order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Moodle chapter id.
    pub id: u64,
    pub title: String,
    /// Chapter body as HTML.
    pub content: String,
    /// 1-based position in book order (subchapters included).
    pub order: u32,
    /// 0 for a top-level chapter, greater for subchapters.
    pub level: u32,
    /// Relative link from the book structure, e.g. `12/index.html`.
    pub href: String,
    /// Pluginfile URL of the chapter body, without token.
    pub file_url: Option<String>,
}

impl Chapter {
    pub fn is_subchapter(&self) -> bool {
        self.level > 0
    }

    pub fn meta(&self) -> ChapterMeta {
        ChapterMeta {
            id: self.id,
            title: self.title.clone(),
            order: self.order,
            level: self.level,
            is_subchapter: self.is_subchapter(),
            href: self.href.clone(),
            fileurl: self.file_url.clone(),
            dirname: self.file_url.as_deref().and_then(pluginfile_dirname),
        }
    }

    /// Rebuild a chapter from its sidecar metadata and local HTML body.
    pub fn from_meta(meta: ChapterMeta, content: String) -> Self {
        Chapter {
            id: meta.id,
            title: meta.title,
            content,
            order: meta.order,
            level: meta.level,
            href: meta.href,
            file_url: meta.fileurl,
        }
    }
}

/// Sidecar metadata written next to each chapter file (`<stem>.meta.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMeta {
    pub id: u64,
    pub title: String,
    pub order: u32,
    pub level: u32,
    pub is_subchapter: bool,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fileurl: Option<String>,
    /// Path of the chapter's file area below `pluginfile.php`, e.g. `/15/mod_book/chapter/12/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirname: Option<String>,
}

fn pluginfile_dirname(file_url: &str) -> Option<String> {
    let (_, rest) = file_url.split_once("pluginfile.php/")?;
    let rest = rest.split('?').next().unwrap_or(rest);
    let dir = rest.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    Some(format!("/{}/", dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chapter() -> Chapter {
        Chapter {
            id: 12,
            title: "Introduction".to_string(),
            content: "<p>Hello</p>".to_string(),
            order: 1,
            level: 1,
            href: "12/index.html".to_string(),
            file_url: Some(
                "https://m.example/webservice/pluginfile.php/15/mod_book/chapter/12/index.html"
                    .to_string(),
            ),
        }
    }

    #[test]
    fn meta_derives_dirname_and_subchapter_flag() {
        let meta = sample_chapter().meta();
        assert!(meta.is_subchapter);
        assert_eq!(meta.dirname.as_deref(), Some("/15/mod_book/chapter/12/"));
    }

    #[test]
    fn meta_json_omits_missing_fileurl() -> Result<(), serde_json::Error> {
        let mut ch = sample_chapter();
        ch.file_url = None;
        let json = serde_json::to_string(&ch.meta())?;
        assert!(!json.contains("fileurl"));
        assert!(!json.contains("dirname"));
        assert!(json.contains("\"href\":\"12/index.html\""));
        Ok(())
    }

    #[test]
    fn from_meta_restores_chapter() {
        let ch = sample_chapter();
        let restored = Chapter::from_meta(ch.meta(), ch.content.clone());
        assert_eq!(restored, ch);
    }
}
