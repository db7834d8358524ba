//! PDF parser using the `pdf-extract` crate.

use crate::category::LegalCategory;
use crate::entry::EntryDraft;
use crate::error::ImportError;
use crate::import::{ImportResult, propose_tags};

pub fn parse(name: &str, data: &[u8], category: LegalCategory) -> ImportResult<Vec<EntryDraft>> {
    let text = pdf_extract::extract_text_from_mem(data).map_err(|e| ImportError::ParseError {
        format: "pdf".into(),
        message: e.to_string(),
    })?;

    let content = text.trim();
    if content.is_empty() {
        return Err(ImportError::EmptyDocument {
            origin: name.to_string(),
        });
    }

    Ok(vec![EntryDraft {
        title: name.to_string(),
        content: content.to_string(),
        category,
        tags: propose_tags(content),
        source: "文件导入".into(),
    }])
}
