//! HTML parser using the `scraper` crate.
//!
//! Extracts `<title>` and the text of content-bearing elements
//! (`<p>`, `<li>`, `<td>`, `<blockquote>`, headings) into one draft.

use scraper::{Html, Selector};

use crate::category::LegalCategory;
use crate::entry::EntryDraft;
use crate::error::ImportError;
use crate::import::{ImportResult, propose_tags};

pub fn parse(name: &str, data: &[u8], category: LegalCategory) -> ImportResult<Vec<EntryDraft>> {
    let text = String::from_utf8_lossy(data);
    let document = Html::parse_document(&text);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| name.to_string());

    let content_sel =
        Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td, blockquote").map_err(|e| {
            ImportError::ParseError {
                format: "html".into(),
                message: e.to_string(),
            }
        })?;

    let mut paragraphs: Vec<String> = Vec::new();
    for el in document.select(&content_sel) {
        let block = el.text().collect::<String>().trim().to_string();
        if !block.is_empty() {
            paragraphs.push(block);
        }
    }
    let content = paragraphs.join("\n");
    if content.trim().is_empty() {
        return Err(ImportError::EmptyDocument {
            origin: name.to_string(),
        });
    }

    Ok(vec![EntryDraft {
        title,
        content: content.clone(),
        category,
        tags: propose_tags(&content),
        source: "文件导入".into(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_paragraphs() {
        let html = "<html><head><title>合同审查要点</title></head>\
                    <body><h1>要点</h1><p>合同审查是法律实务中的重要环节。</p>\
                    <p>需要注意商事条款。</p></body></html>";
        let drafts = parse("fallback", html.as_bytes(), LegalCategory::CommercialLaw).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "合同审查要点");
        assert!(drafts[0].content.contains("重要环节"));
        assert!(drafts[0].content.contains("商事条款"));
        assert!(drafts[0].tags.contains(&"合同".to_string()));
    }

    #[test]
    fn missing_title_falls_back_to_name() {
        let html = "<html><body><p>正文内容</p></body></html>";
        let drafts = parse("导入文档", html.as_bytes(), LegalCategory::CivilLaw).unwrap();
        assert_eq!(drafts[0].title, "导入文档");
    }

    #[test]
    fn contentless_html_rejected() {
        let html = "<html><body><script>var x;</script></body></html>";
        assert!(parse("empty", html.as_bytes(), LegalCategory::CivilLaw).is_err());
    }
}
