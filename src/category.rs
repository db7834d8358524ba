//! The closed legal category taxonomy.
//!
//! Categories are a fixed enum rather than free-form strings so that
//! membership is checkable at compile time. `Uncategorized` exists only
//! as a classifier fallback; the knowledge store rejects it on create.

use serde::{Deserialize, Serialize};

/// A legal domain in the fixed taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalCategory {
    CivilLaw,
    CriminalLaw,
    AdministrativeLaw,
    CommercialLaw,
    LaborLaw,
    IntellectualProperty,
    InternationalLaw,
    EnvironmentalLaw,
    /// Classifier fallback for questions below the confidence threshold.
    /// Not a valid category for knowledge entries.
    Uncategorized,
}

impl LegalCategory {
    /// All categories valid for knowledge entries (excludes `Uncategorized`).
    pub const TAXONOMY: [LegalCategory; 8] = [
        LegalCategory::CivilLaw,
        LegalCategory::CriminalLaw,
        LegalCategory::AdministrativeLaw,
        LegalCategory::CommercialLaw,
        LegalCategory::LaborLaw,
        LegalCategory::IntellectualProperty,
        LegalCategory::InternationalLaw,
        LegalCategory::EnvironmentalLaw,
    ];

    /// Stable wire identifier, matching the REST surface.
    pub fn id(&self) -> &'static str {
        match self {
            LegalCategory::CivilLaw => "civil_law",
            LegalCategory::CriminalLaw => "criminal_law",
            LegalCategory::AdministrativeLaw => "administrative_law",
            LegalCategory::CommercialLaw => "commercial_law",
            LegalCategory::LaborLaw => "labor_law",
            LegalCategory::IntellectualProperty => "intellectual_property",
            LegalCategory::InternationalLaw => "international_law",
            LegalCategory::EnvironmentalLaw => "environmental_law",
            LegalCategory::Uncategorized => "uncategorized",
        }
    }

    /// Chinese display name.
    pub fn name(&self) -> &'static str {
        match self {
            LegalCategory::CivilLaw => "民法",
            LegalCategory::CriminalLaw => "刑法",
            LegalCategory::AdministrativeLaw => "行政法",
            LegalCategory::CommercialLaw => "商法",
            LegalCategory::LaborLaw => "劳动法",
            LegalCategory::IntellectualProperty => "知识产权法",
            LegalCategory::InternationalLaw => "国际法",
            LegalCategory::EnvironmentalLaw => "环境法",
            LegalCategory::Uncategorized => "未分类",
        }
    }

    /// One-line description for category listings.
    pub fn description(&self) -> &'static str {
        match self {
            LegalCategory::CivilLaw => "民事纠纷、合同、侵权、婚姻继承等",
            LegalCategory::CriminalLaw => "刑事案件、犯罪与刑罚适用等",
            LegalCategory::AdministrativeLaw => "行政行为、行政处罚、行政复议等",
            LegalCategory::CommercialLaw => "公司、证券、金融、保险、破产等",
            LegalCategory::LaborLaw => "劳动合同、工资社保、劳动争议等",
            LegalCategory::IntellectualProperty => "专利、商标、著作权、商业秘密等",
            LegalCategory::InternationalLaw => "国际法、跨境贸易等",
            LegalCategory::EnvironmentalLaw => "环境保护、污染治理等",
            LegalCategory::Uncategorized => "未能归入已知法律领域的问题",
        }
    }

    /// Parse a wire identifier. Returns `None` for unknown strings
    /// and for "uncategorized" (not accepted as input anywhere).
    pub fn from_id(id: &str) -> Option<Self> {
        Self::TAXONOMY.iter().copied().find(|c| c.id() == id)
    }
}

impl std::fmt::Display for LegalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_excludes_uncategorized() {
        assert_eq!(LegalCategory::TAXONOMY.len(), 8);
        assert!(!LegalCategory::TAXONOMY.contains(&LegalCategory::Uncategorized));
    }

    #[test]
    fn id_round_trip() {
        for cat in LegalCategory::TAXONOMY {
            assert_eq!(LegalCategory::from_id(cat.id()), Some(cat));
        }
    }

    #[test]
    fn unknown_and_fallback_ids_rejected() {
        assert_eq!(LegalCategory::from_id("maritime_law"), None);
        assert_eq!(LegalCategory::from_id("uncategorized"), None);
    }

    #[test]
    fn serde_uses_snake_case_ids() {
        let json = serde_json::to_string(&LegalCategory::CivilLaw).unwrap();
        assert_eq!(json, "\"civil_law\"");
        let back: LegalCategory = serde_json::from_str("\"labor_law\"").unwrap();
        assert_eq!(back, LegalCategory::LaborLaw);
    }

    #[test]
    fn display_matches_id() {
        assert_eq!(LegalCategory::IntellectualProperty.to_string(), "intellectual_property");
    }
}
