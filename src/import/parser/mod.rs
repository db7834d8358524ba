//! Format-specific draft parsers.

pub mod csv;
pub mod html;
pub mod pdf;

use crate::category::LegalCategory;
use crate::entry::EntryDraft;
use crate::error::ImportError;

use super::{ImportResult, propose_tags};

/// Parse plain text: the whole document becomes one draft, titled after
/// the file.
pub fn parse_text(name: &str, data: &[u8], category: LegalCategory) -> ImportResult<Vec<EntryDraft>> {
    let text = String::from_utf8_lossy(data);
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
