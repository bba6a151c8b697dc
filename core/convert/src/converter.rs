//! Converter trait definition.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use docsync_common::{DocFormat, Result};

/// External capability that turns a document of one format into another.
///
/// Implementations run to completion before returning; the caller imposes
/// no timeout.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Get the converter name (e.g., "pandoc", "passthrough").
    fn name(&self) -> &str;

    /// Convert `source` from `from` into `to`, writing the result to `output`.
    ///
    /// # Preconditions
    /// - `source` exists and is readable
    /// - The parent directory of `output` exists
    ///
    /// # Postconditions
    /// - On success, `output` holds the complete converted document and is
    ///   returned
    /// - On failure, nothing is left at `output`
    ///
    /// # Errors
    /// - `Conversion` naming the source file and the reason
    async fn convert(
        &self,
        source: &Path,
        from: DocFormat,
        to: DocFormat,
        output: &Path,
    ) -> Result<PathBuf>;
}
