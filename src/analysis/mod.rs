//! Analysis pipeline: per-file operations, batches, and result records.

pub mod analyzer;
pub mod batch;
pub mod locator;
pub mod records;

pub use analyzer::FileAnalyzer;
pub use batch::BatchExecutor;
