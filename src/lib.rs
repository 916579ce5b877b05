//! moodle-book-sync: pull Moodle book chapters into local HTML files.

pub mod cli;
pub mod config;
pub mod model;
pub mod moodle;
pub mod store;

// Re-exports for CLI and consumers.
pub use config::{BookConfig, Config, ConfigError, MoodleConfig};
pub use model::{BookId, Chapter, ChapterMeta};
pub use moodle::{HttpTransport, MoodleClient, MoodleError, Transport};
pub use store::{chapter_stem, write_chapters, LocalChapterError, WriteError};
