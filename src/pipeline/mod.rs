//! Pipeline entry points.
//!
//! - `crawl`: paginated crawling of remote listings into storage
//! - `generate`: stored rows to chunk files through converter workers
//! - `upload`: chunk files to a search index core, then commit or rollback
//! - `run_batch`: any of the above inside a recorded run

mod builder;
mod chunk;
pub mod crawl;
mod extract;
mod generate;
mod history;
mod upload;

pub use builder::{DocumentBuilder, ProblemBuilder, SubmissionBuilder, UserBuilder};
pub use chunk::{ChunkSummary, ChunkWriter, chunk_path, list_chunks};
pub use extract::{StatementExtractor, Statements};
pub use generate::{GenerateSummary, RowSource, generate};
pub use history::run_batch;
pub use upload::{UploadOptions, UploadPhase, UploadSummary, upload};
