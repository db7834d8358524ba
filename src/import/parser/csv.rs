//! CSV parser: one knowledge entry draft per row.
//!
//! Expected columns: `title, content [, category] [, tags] [, source]`,
//! with tags separated by `;`. A header row is recognized by its first
//! cell and skipped; `#`-prefixed lines are comments. Fields are split on
//! the delimiter without quoting — content with embedded delimiters
//! belongs in a text import instead.

use crate::category::LegalCategory;
use crate::entry::EntryDraft;
use crate::error::ImportError;
use crate::import::{ImportResult, propose_tags};

pub fn parse(name: &str, data: &[u8], category: LegalCategory) -> ImportResult<Vec<EntryDraft>> {
    let text = String::from_utf8_lossy(data);
    let delimiter = if name.to_lowercase().ends_with(".tsv") || text.contains('\t') {
        '\t'
    } else {
        ','
    };

    let mut drafts = Vec::new();
    let mut errors = 0usize;

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).map(|f| f.trim()).collect();

        // Skip a header-like first row.
        if line_num == 0 {
            let first = fields[0].trim_matches('"').to_lowercase();
            if first == "title" || first == "标题" {
                continue;
            }
        }

        if fields.len() < 2 || fields[0].is_empty() || fields[1].is_empty() {
            errors += 1;
            continue;
        }

        let row_category = fields
            .get(2)
            .and_then(|c| LegalCategory::from_id(c))
            .unwrap_or(category);
        let tags: Vec<String> = fields
            .get(3)
            .map(|t| {
                t.split(';')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| propose_tags(fields[1]));
        let source = fields
            .get(4)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "文件导入".into());

        drafts.push(EntryDraft {
            title: fields[0].to_string(),
            content: fields[1].to_string(),
            category: row_category,
            tags,
            source,
        });
    }

    if errors > 0 {
        tracing::warn!(file = name, skipped = errors, "csv rows skipped");
    }
    if drafts.is_empty() {
        return Err(ImportError::EmptyDocument {
            origin: name.to_string(),
        });
    }
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_become_drafts_with_defaults() {
        let csv = "title,content,category\n\
                   民法典,民法典是民事法律的基础,civil_law\n\
                   劳动法摘要,劳动合同的订立与解除\n";
        let drafts = parse("kb.csv", csv.as_bytes(), LegalCategory::CommercialLaw).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].category, LegalCategory::CivilLaw);
        // Missing category column falls back to the import default.
        assert_eq!(drafts[1].category, LegalCategory::CommercialLaw);
        // Missing tags column proposes from content.
        assert!(drafts[1].tags.contains(&"劳动".to_string()));
    }

    #[test]
    fn explicit_tags_and_source_are_kept() {
        let csv = "合同审查,合同审查的要点说明,commercial_law,合同;实务,律师事务所\n";
        let drafts = parse("kb.csv", csv.as_bytes(), LegalCategory::CivilLaw).unwrap();
        assert_eq!(drafts[0].tags, vec!["合同".to_string(), "实务".to_string()]);
        assert_eq!(drafts[0].source, "律师事务所");
    }

    #[test]
    fn tsv_delimiter_detected() {
        let tsv = "民法典\t民法典是基础\tcivil_law\n";
        let drafts = parse("kb.tsv", tsv.as_bytes(), LegalCategory::CivilLaw).unwrap();
        assert_eq!(drafts[0].title, "民法典");
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let csv = "只有一列\n民法典,内容正常\n";
        let drafts = parse("kb.csv", csv.as_bytes(), LegalCategory::CivilLaw).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "民法典");
    }

    #[test]
    fn all_rows_malformed_is_empty_document() {
        let csv = "# 注释\n只有一列\n";
        assert!(parse("kb.csv", csv.as_bytes(), LegalCategory::CivilLaw).is_err());
    }
}
