//! Question classifier: maps free-text questions onto the legal taxonomy.
//!
//! Each category carries a profile of representative legal vocabulary.
//! A question is scored against every profile by blending term overlap
//! with embedding cosine; the top category wins. Scores below the
//! minimum-confidence threshold fall back to `Uncategorized` — ambiguous
//! input is an answer, never an error.

use std::collections::BTreeSet;

use crate::category::LegalCategory;
use crate::error::ClassifyError;
use crate::index::lexical::distinct_tokens;
use crate::index::semantic::{EmbeddingDim, cosine, embed};

/// Result type for classification.
pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;

/// Maximum accepted input length in chars.
pub const MAX_INPUT_LEN: usize = 2048;

/// Representative vocabulary per category. Mixed Chinese/English so both
/// script families classify.
fn profile_terms(category: LegalCategory) -> &'static [&'static str] {
    match category {
        LegalCategory::CivilLaw => &[
            "合同", "侵权", "违约", "赔偿", "婚姻", "继承", "物权", "债权", "民事",
            "民法典", "担保", "contract", "tort", "civil",
        ],
        LegalCategory::CriminalLaw => &[
            "犯罪", "刑罚", "刑法", "刑事", "罪名", "量刑", "缓刑", "自首", "取保候审",
            "criminal", "crime", "sentence",
        ],
        LegalCategory::AdministrativeLaw => &[
            "行政", "处罚", "许可", "复议", "行政诉讼", "强制", "征收", "政府",
            "administrative", "license",
        ],
        LegalCategory::CommercialLaw => &[
            "公司", "股权", "证券", "金融", "保险", "破产", "票据", "股东", "商事",
            "company", "shareholder", "bankruptcy",
        ],
        LegalCategory::LaborLaw => &[
            "劳动", "工资", "社保", "工伤", "解雇", "辞退", "加班", "劳动合同",
            "劳动争议", "labor", "employment", "wage",
        ],
        LegalCategory::IntellectualProperty => &[
            "专利", "商标", "著作权", "版权", "商业秘密", "知识产权", "侵权赔偿",
            "patent", "trademark", "copyright",
        ],
        LegalCategory::InternationalLaw => &[
            "国际", "条约", "跨境", "涉外", "仲裁", "贸易", "关税", "国际法",
            "international", "treaty", "trade",
        ],
        LegalCategory::EnvironmentalLaw => &[
            "环境", "污染", "排放", "环保", "生态", "治理", "环境影响",
            "environment", "pollution", "emission",
        ],
        LegalCategory::Uncategorized => &[],
    }
}

/// Per-category score detail, exposed for observability.
#[derive(Debug, Clone)]
pub struct CategoryScore {
    pub category: LegalCategory,
    pub score: f32,
}

/// Outcome of classifying a question.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The winning category, or `Uncategorized` below the threshold.
    pub category: LegalCategory,
    /// Confidence in [0, 1]: the winning category's raw score.
    pub confidence: f32,
    /// All category scores, taxonomy order.
    pub scores: Vec<CategoryScore>,
}

/// One precomputed category profile.
struct Profile {
    category: LegalCategory,
    tokens: BTreeSet<String>,
    embedding: Vec<f32>,
}

/// The classifier. Profiles are precomputed at construction.
pub struct Classifier {
    profiles: Vec<Profile>,
    min_confidence: f32,
    dim: EmbeddingDim,
}

impl Classifier {
    /// Build a classifier. `min_confidence` is the threshold below which
    /// the result falls back to `Uncategorized`.
    pub fn new(dim: EmbeddingDim, min_confidence: f32) -> Self {
        let profiles = LegalCategory::TAXONOMY
            .iter()
            .map(|&category| {
                let joined = profile_terms(category).join(" ");
                Profile {
                    category,
                    tokens: distinct_tokens(&joined),
                    embedding: embed(&joined, dim),
                }
            })
            .collect();
        Self {
            profiles,
            min_confidence,
            dim,
        }
    }

    /// Classify a question. Never fails for well-formed non-empty input.
    pub fn classify(&self, question: &str) -> ClassifyResult<Classification> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(ClassifyError::EmptyInput);
        }
        let length = trimmed.chars().count();
        if length > MAX_INPUT_LEN {
            return Err(ClassifyError::InputTooLong {
                length,
                max: MAX_INPUT_LEN,
            });
        }

        let question_tokens = distinct_tokens(trimmed);
        let question_embedding = embed(trimmed, self.dim);

        let scores: Vec<CategoryScore> = self
            .profiles
            .iter()
            .map(|profile| {
                let overlap = if question_tokens.is_empty() {
                    0.0
                } else {
                    let matched = question_tokens
                        .iter()
                        .filter(|t| profile.tokens.contains(*t))
                        .count();
                    matched as f32 / question_tokens.len() as f32
                };
                let similarity = cosine(&question_embedding, &profile.embedding).max(0.0);
                // Overlap carries more weight: hashed embeddings have a noise
                // floor of roughly 1/sqrt(dim) even for unrelated texts.
                CategoryScore {
                    category: profile.category,
                    score: 0.6 * overlap + 0.4 * similarity,
                }
            })
            .collect();

        // Strictly-greater keeps the winner deterministic on ties
        // (taxonomy order).
        let top = scores
            .iter()
            .fold(None::<&CategoryScore>, |best, s| match best {
                Some(b) if s.score > b.score => Some(s),
                Some(b) => Some(b),
                None => Some(s),
            })
            .cloned();

        let (category, confidence) = match top {
            Some(top) if top.score >= self.min_confidence => (top.category, top.score),
            Some(top) => (LegalCategory::Uncategorized, top.score),
            None => (LegalCategory::Uncategorized, 0.0),
        };

        tracing::debug!(%category, confidence, "question classified");
        Ok(Classification {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            scores,
        })
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("profiles", &self.profiles.len())
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}
