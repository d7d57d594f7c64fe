//! Import/export in three interchange formats: this crate's own JSON
//! round-trip, GraphML, and GEXF. GraphML/GEXF have no native vector slot, so
//! nodes imported from them get a zero vector of the store's dimension
//! rather than failing the import outright.

pub mod gexf;
pub mod graphml;
pub mod json;

use crate::error::{BatchResult, GraphError};
use crate::store::GraphStore;

/// The three interchange formats this crate understands.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Format {
    Json,
    GraphMl,
    Gexf,
}

/// Sniffs a text payload's format from its leading content. Falls back to
/// [`GraphError::UnknownFormat`] when no format's leading marker matches.
pub fn detect_format(text: &str) -> Result<Format, GraphError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return Ok(Format::Json);
    }
    let head: String = trimmed.chars().take(512).collect::<String>().to_lowercase();
    if head.contains("<graphml") {
        return Ok(Format::GraphMl);
    }
    if head.contains("<gexf") {
        return Ok(Format::Gexf);
    }
    Err(GraphError::UnknownFormat)
}

/// Imports `text`, auto-detecting its format.
pub fn auto_import(store: &GraphStore, text: &str) -> Result<BatchResult, GraphError> {
    match detect_format(text)? {
        Format::Json => json::import(store, text),
        Format::GraphMl => graphml::import(store, text),
        Format::Gexf => gexf::import(store, text),
    }
}

/// Exports the whole store in the requested format.
pub fn export(store: &GraphStore, format: Format) -> Result<String, GraphError> {
    match format {
        Format::Json => json::export(store),
        Format::GraphMl => graphml::export(store),
        Format::Gexf => gexf::export(store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_json_by_leading_brace() {
        assert_eq!(detect_format(" {\"nodes\":[]}").unwrap(), Format::Json);
    }

    #[test]
    fn detects_graphml_by_root_tag() {
        let xml = "<?xml version=\"1.0\"?><graphml><graph/></graphml>";
        assert_eq!(detect_format(xml).unwrap(), Format::GraphMl);
    }

    #[test]
    fn detects_gexf_by_root_tag() {
        let xml = "<?xml version=\"1.0\"?><gexf><graph/></gexf>";
        assert_eq!(detect_format(xml).unwrap(), Format::Gexf);
    }

    #[test]
    fn unrecognized_text_is_an_error() {
        assert!(matches!(detect_format("not a known format").unwrap_err(), GraphError::UnknownFormat));
    }
}
