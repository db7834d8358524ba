//! File import: turn documents into knowledge entry drafts.
//!
//! Import is a boundary concern: parsers extract text and propose tags,
//! but validation and persistence always go through the knowledge store's
//! `create` contract. Supported formats: plain text, HTML, PDF, CSV.
//! Word documents are detected and rejected with a diagnostic error.

pub mod parser;

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::category::LegalCategory;
use crate::entry::EntryDraft;
use crate::error::ImportError;

/// Result type for import operations.
pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// Supported import formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    PlainText,
    Html,
    Pdf,
    Csv,
}

impl ImportFormat {
    /// Human-readable name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the import format from a file extension.
///
/// Word documents are recognized but unsupported: the error says so
/// instead of pretending the extension is unknown.
pub fn detect_format(path: &str) -> ImportResult<ImportFormat> {
    let lower = path.to_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") || lower.ends_with(".xhtml") {
        Ok(ImportFormat::Html)
    } else if lower.ends_with(".pdf") {
        Ok(ImportFormat::Pdf)
    } else if lower.ends_with(".csv") || lower.ends_with(".tsv") {
        Ok(ImportFormat::Csv)
    } else if lower.ends_with(".txt") || lower.ends_with(".md") || lower.ends_with(".text") {
        Ok(ImportFormat::PlainText)
    } else if lower.ends_with(".doc") || lower.ends_with(".docx") {
        Err(ImportError::UnsupportedFormat {
            format: "docx".into(),
        })
    } else {
        Err(ImportError::UnsupportedFormat {
            format: Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        })
    }
}

/// Parse raw bytes into entry drafts.
pub fn parse_bytes(
    name: &str,
    data: &[u8],
    format: ImportFormat,
    category: LegalCategory,
) -> ImportResult<Vec<EntryDraft>> {
    let drafts = match format {
        ImportFormat::PlainText => parser::parse_text(name, data, category)?,
        ImportFormat::Html => parser::html::parse(name, data, category)?,
        ImportFormat::Pdf => parser::pdf::parse(name, data, category)?,
        ImportFormat::Csv => parser::csv::parse(name, data, category)?,
    };
    if drafts.is_empty() {
        return Err(ImportError::EmptyDocument {
            origin: name.to_string(),
        });
    }
    Ok(drafts)
}

/// Read a file and parse it into entry drafts, detecting the format from
/// the extension.
pub fn parse_path(path: &Path, category: LegalCategory) -> ImportResult<Vec<EntryDraft>> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("imported")
        .to_string();
    let format = detect_format(&path.to_string_lossy())?;
    let data = std::fs::read(path).map_err(|e| ImportError::Io { source: e })?;
    parse_bytes(&name, &data, format, category)
}

/// Legal keywords used to propose tags for imported content.
const TAG_KEYWORDS: [&str; 13] = [
    "合同", "侵权", "婚姻", "继承", "劳动", "刑事", "行政",
    "民事", "商事", "知识产权", "环境", "金融", "房地产",
];

/// Propose tags by scanning the content for well-known legal keywords.
pub fn propose_tags(content: &str) -> Vec<String> {
    TAG_KEYWORDS
        .iter()
        .filter(|kw| content.contains(*kw))
        .map(|kw| kw.to_string())
        .collect()
}

fn citation_regexes() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 《中华人民共和国民法典》, 《…条例》, 《…规定》
            Regex::new(r"《[^》]+》").expect("valid citation regex"),
            // 第五百条 / 第12条 / 第三款 / 第一项
            Regex::new(r"第[一二三四五六七八九十百千万0-9]+[条款项]").expect("valid article regex"),
        ]
    })
}

/// Extract statute / article references from content.
///
/// Used to suggest citation relations between imported entries; duplicates
/// are collapsed, first-occurrence order is kept.
pub fn extract_citation_refs(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    for regex in citation_regexes() {
        for m in regex.find_iter(content) {
            let text = m.as_str().to_string();
            if seen.insert(text.clone()) {
                refs.push(text);
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection() {
        assert_eq!(detect_format("民法典.txt").unwrap(), ImportFormat::PlainText);
        assert_eq!(detect_format("page.HTML").unwrap(), ImportFormat::Html);
        assert_eq!(detect_format("判决书.pdf").unwrap(), ImportFormat::Pdf);
        assert_eq!(detect_format("知识库.csv").unwrap(), ImportFormat::Csv);
    }

    #[test]
    fn docx_is_explicitly_unsupported() {
        let err = detect_format("合同模板.docx").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat { format } if format == "docx"));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        assert!(detect_format("archive.zip").is_err());
    }

    #[test]
    fn tags_proposed_from_keywords() {
        let tags = propose_tags("本案涉及劳动合同解除与经济补偿");
        assert!(tags.contains(&"合同".to_string()));
        assert!(tags.contains(&"劳动".to_string()));
        assert!(!tags.contains(&"环境".to_string()));
    }

    #[test]
    fn citation_refs_extracted_and_deduplicated() {
        let content = "依据《中华人民共和国民法典》第五百条及《劳动合同法》第三十九条，\
                       参照《中华人民共和国民法典》的相关规定。";
        let refs = extract_citation_refs(content);
        assert_eq!(
            refs,
            vec![
                "《中华人民共和国民法典》".to_string(),
                "《劳动合同法》".to_string(),
                "第五百条".to_string(),
                "第三十九条".to_string(),
            ]
        );
    }

    #[test]
    fn empty_document_rejected() {
        let err = parse_bytes("empty", b"   ", ImportFormat::PlainText, LegalCategory::CivilLaw)
            .unwrap_err();
        assert!(matches!(err, ImportError::EmptyDocument { .. }));
    }
}
