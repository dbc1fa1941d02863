//! Normalization of book metadata into PDF document fields.

use crate::extract::Metadata;

use super::AssemblyError;

/// Fields written to the PDF Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfMetadata {
    /// Book title.
    pub title: Option<String>,
    /// `creator` and `associated-names`, joined with `"; "`.
    pub author: Option<String>,
    /// Year from the `date` field.
    pub creation_year: Option<i32>,
    /// Keywords; holds the book's details URL.
    pub keywords: Vec<String>,
}

impl PdfMetadata {
    /// Builds PDF fields from the manifest metadata.
    ///
    /// `details_url` becomes the only keyword. A `date` whose first four
    /// characters are not a year is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::UnsupportedMetadata`] when `title`, `creator`
    /// or `associated-names` is neither a string nor a list of strings.
    pub fn from_metadata(
        metadata: &Metadata,
        details_url: impl Into<String>,
    ) -> Result<Self, AssemblyError> {
        let title = metadata.text("title")?;
        let creator = metadata.text("creator")?;
        let associated = metadata.text("associated-names")?;

        let author = match (creator, associated) {
            (Some(creator), Some(associated)) => Some(format!("{creator}; {associated}")),
            (creator, associated) => creator.or(associated),
        };

        Ok(Self {
            title,
            author,
            creation_year: metadata.year(),
            keywords: vec![details_url.into()],
        })
    }
}
