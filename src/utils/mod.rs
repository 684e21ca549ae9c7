//! Cross-cutting utilities: filesystem helpers, zip extraction and progress reporting.

pub mod archive;
pub mod fs;
pub mod progress;

pub use archive::{ArchiveError, extract_archive};
pub use fs::{atomic_write, ensure_dir, remove_file_if_exists};
pub use progress::{ProgressEvent, ProgressSink};
