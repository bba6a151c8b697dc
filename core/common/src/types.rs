//! Common types used throughout docsync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Modification time as observed on disk.
pub type Timestamp = DateTime<Utc>;

/// Convert a filesystem time into a [`Timestamp`] without losing precision.
pub fn timestamp_from_system(time: SystemTime) -> Timestamp {
    DateTime::<Utc>::from(time)
}

/// Document format on either side of a tracked pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Markdown,
    Docx,
    PlainText,
    Html,
    Odt,
    Rtf,
}

impl DocFormat {
    /// File suffix without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            DocFormat::Markdown => "md",
            DocFormat::Docx => "docx",
            DocFormat::PlainText => "txt",
            DocFormat::Html => "html",
            DocFormat::Odt => "odt",
            DocFormat::Rtf => "rtf",
        }
    }

    /// Format name understood by pandoc's `-f`/`-t` flags.
    pub fn pandoc_name(&self) -> &'static str {
        match self {
            DocFormat::Markdown => "markdown",
            DocFormat::Docx => "docx",
            DocFormat::PlainText => "plain",
            DocFormat::Html => "html",
            DocFormat::Odt => "odt",
            DocFormat::Rtf => "rtf",
        }
    }

    /// Look up a format by file suffix (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(DocFormat::Markdown),
            "docx" => Some(DocFormat::Docx),
            "txt" => Some(DocFormat::PlainText),
            "html" | "htm" => Some(DocFormat::Html),
            "odt" => Some(DocFormat::Odt),
            "rtf" => Some(DocFormat::Rtf),
            _ => None,
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_extension(s.trim_start_matches('.'))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown document format: {}", s)))
    }
}

/// File name of a document directly inside a root directory.
///
/// Only a single path component is accepted; nested directories are not
/// tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocName(String);

impl DocName {
    /// Parse and validate a bare file name.
    ///
    /// # Errors
    /// - Empty name, `.` or `..`
    /// - Name contains a path separator or NUL byte
    pub fn parse(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Document name cannot be empty".to_string(),
            ));
        }
        if name == "." || name == ".." {
            return Err(crate::Error::InvalidInput(format!(
                "Not a document name: {}",
                name
            )));
        }
        if name.contains('/') || name.contains('\\') || name.contains('\0') {
            return Err(crate::Error::InvalidInput(format!(
                "Document name cannot contain separators: {}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name without its final suffix.
    pub fn stem(&self) -> &str {
        match self.0.rfind('.') {
            Some(0) | None => &self.0,
            Some(pos) => &self.0[..pos],
        }
    }

    /// Final suffix without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.0.rfind('.') {
            Some(0) | None => None,
            Some(pos) => Some(&self.0[pos + 1..]),
        }
    }

    /// Whether the suffix matches `format`.
    pub fn has_format(&self, format: DocFormat) -> bool {
        self.extension()
            .and_then(DocFormat::from_extension)
            .map(|f| f == format)
            .unwrap_or(false)
    }

    /// Same base name with the suffix of `format`.
    pub fn with_format(&self, format: DocFormat) -> Self {
        Self(format!("{}.{}", self.stem(), format.extension()))
    }
}

impl fmt::Display for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocName> for String {
    fn from(name: DocName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doc_name_parse() {
        let name = DocName::parse("notes.md").unwrap();
        assert_eq!(name.stem(), "notes");
        assert_eq!(name.extension(), Some("md"));
        assert!(name.has_format(DocFormat::Markdown));
    }

    #[test]
    fn test_doc_name_rejects_nested() {
        assert!(DocName::parse("sub/notes.md").is_err());
        assert!(DocName::parse("sub\\notes.md").is_err());
        assert!(DocName::parse("").is_err());
        assert!(DocName::parse("..").is_err());
    }

    #[test]
    fn test_with_format() {
        let name = DocName::parse("weekly.report.md").unwrap();
        assert_eq!(name.with_format(DocFormat::Docx).as_str(), "weekly.report.docx");
    }

    #[test]
    fn test_hidden_file_has_no_extension() {
        let name = DocName::parse(".docsync.json").unwrap();
        assert_eq!(name.extension(), Some("json"));
        let dotfile = DocName::parse(".hidden").unwrap();
        assert_eq!(dotfile.extension(), None);
        assert_eq!(dotfile.stem(), ".hidden");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("docx".parse::<DocFormat>().unwrap(), DocFormat::Docx);
        assert_eq!(".md".parse::<DocFormat>().unwrap(), DocFormat::Markdown);
        assert!("pdf".parse::<DocFormat>().is_err());
    }

    #[test]
    fn test_doc_name_serde_validates() {
        let ok: DocName = serde_json::from_str("\"a.md\"").unwrap();
        assert_eq!(ok.as_str(), "a.md");
        assert!(serde_json::from_str::<DocName>("\"a/b.md\"").is_err());
    }

    proptest! {
        #[test]
        fn with_format_keeps_stem(stem in "[a-zA-Z0-9_ -]{1,32}") {
            let name = DocName::parse(&format!("{}.md", stem)).unwrap();
            let remote = name.with_format(DocFormat::Docx);
            prop_assert_eq!(remote.stem(), name.stem());
            prop_assert!(remote.has_format(DocFormat::Docx));
            prop_assert_eq!(remote.with_format(DocFormat::Markdown), name);
        }

        #[test]
        fn parse_never_accepts_separators(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            let joined = format!("{}/{}", a, b);
            prop_assert!(DocName::parse(&joined).is_err());
        }
    }
}
