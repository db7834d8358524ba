//! End-to-end integration tests for the maat engine.
//!
//! These tests exercise the full pipeline from entry creation through
//! search, graph traversal, and consultation, validating that the store,
//! indices, classifier, and orchestrator all work together.

use maat::category::LegalCategory;
use maat::consult::{ConsultRequest, ConsultationStatus};
use maat::engine::{Engine, EngineConfig};
use maat::entry::{EntryDraft, EntryPatch};
use maat::graph::RelationType;
use maat::graph::traverse::ClosureConfig;
use maat::index::semantic::EmbeddingDim;
use maat::search::SearchFilters;

fn test_engine() -> Engine {
    Engine::new(EngineConfig {
        embedding_dim: EmbeddingDim::TEST,
        ..Default::default()
    })
    .unwrap()
}

fn draft(title: &str, content: &str, category: LegalCategory, tags: &[&str]) -> EntryDraft {
    EntryDraft {
        title: title.into(),
        content: content.into(),
        category,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        source: "集成测试".into(),
    }
}

#[test]
fn version_lineage_and_conflict() {
    let engine = test_engine();
    let entry = engine
        .create_entry(draft(
            "劳动合同法",
            "劳动合同的订立、履行与解除。",
            LegalCategory::LaborLaw,
            &["劳动"],
        ))
        .unwrap();
    assert_eq!(entry.version, 1);

    // N successful updates leave version N+1.
    let mut version = 1;
    for i in 0..3 {
        let updated = engine
            .update_entry(
                entry.id,
                EntryPatch {
                    expected_version: version,
                    content: Some(format!("劳动合同的订立、履行与解除。修订{i}。")),
                    ..Default::default()
                },
            )
            .unwrap();
        version = updated.version;
    }
    assert_eq!(version, 4);

    // A stale token always conflicts.
    let err = engine
        .update_entry(
            entry.id,
            EntryPatch {
                expected_version: 1,
                title: Some("过期标题".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("conflict"));
}

#[test]
fn soft_delete_round_trip() {
    let engine = test_engine();
    let entry = engine
        .create_entry(draft(
            "废止条例",
            "该条例已被新法取代。",
            LegalCategory::AdministrativeLaw,
            &[],
        ))
        .unwrap();

    engine.deactivate_entry(entry.id).unwrap();
    // Idempotent second call.
    engine.deactivate_entry(entry.id).unwrap();

    let fetched = engine.get_entry(entry.id).unwrap();
    assert!(!fetched.active);
    assert_eq!(fetched.version, 1);

    // Deactivated entries are invisible to listing and search.
    assert!(engine.list_entries(None, 0, 10).is_empty());
    engine.quiesce_index();
    assert!(engine
        .search("条例", &SearchFilters::default(), None)
        .unwrap()
        .is_empty());
}

#[test]
fn contract_search_ranks_civil_entry_first() {
    // The civil 合同 entry must rank at or above the labor entry under
    // default weights, no filters.
    let engine = test_engine();
    engine
        .create_entry(draft(
            "合同纠纷典型案例",
            "合同纠纷的处理需结合合同约定与履行情况。",
            LegalCategory::CivilLaw,
            &["合同"],
        ))
        .unwrap();
    engine
        .create_entry(draft(
            "劳动合同解除指引",
            "劳动合同解除的法定情形。",
            LegalCategory::LaborLaw,
            &["劳动"],
        ))
        .unwrap();
    engine.quiesce_index();

    let hits = engine
        .search("合同", &SearchFilters::default(), Some(10))
        .unwrap();
    assert_eq!(hits.len(), 2);
    let pos_civil = hits
        .iter()
        .position(|h| h.category == LegalCategory::CivilLaw)
        .unwrap();
    let pos_labor = hits
        .iter()
        .position(|h| h.category == LegalCategory::LaborLaw)
        .unwrap();
    assert!(pos_civil <= pos_labor);
}

#[test]
fn search_is_deterministic_across_runs() {
    let engine = test_engine();
    for i in 0..6 {
        engine
            .create_entry(draft(
                &format!("合同条款解读{i}"),
                "合同条款的解释规则与违约责任。",
                LegalCategory::CivilLaw,
                &[],
            ))
            .unwrap();
    }
    engine.quiesce_index();

    let first = engine
        .search("合同违约", &SearchFilters::default(), Some(10))
        .unwrap();
    for _ in 0..5 {
        let again = engine
            .search("合同违约", &SearchFilters::default(), Some(10))
            .unwrap();
        let a: Vec<u64> = first.iter().map(|h| h.entry_id.get()).collect();
        let b: Vec<u64> = again.iter().map(|h| h.entry_id.get()).collect();
        assert_eq!(a, b);
    }
    // Total order: no two hits share (score, updated, id).
    for pair in first.windows(2) {
        assert!(
            pair[0].blended_score > pair[1].blended_score
                || pair[0].updated_at > pair[1].updated_at
                || pair[0].entry_id < pair[1].entry_id
        );
    }
}

#[test]
fn transitive_closure_survives_citation_cycle() {
    let engine = test_engine();
    let a = engine
        .create_entry(draft("法条A", "内容甲。", LegalCategory::CivilLaw, &[]))
        .unwrap();
    let b = engine
        .create_entry(draft("法条B", "内容乙。", LegalCategory::CivilLaw, &[]))
        .unwrap();
    let c = engine
        .create_entry(draft("法条C", "内容丙。", LegalCategory::CivilLaw, &[]))
        .unwrap();

    // A → B → C → A, a perfectly normal citation cycle.
    engine
        .add_relation(a.id, b.id, RelationType::Citation, 0.9)
        .unwrap();
    engine
        .add_relation(b.id, c.id, RelationType::Citation, 0.9)
        .unwrap();
    engine
        .add_relation(c.id, a.id, RelationType::Citation, 0.9)
        .unwrap();

    let result = engine.transitive_closure(a.id, &ClosureConfig::default());
    assert_eq!(result.nodes.len(), 2);
    let visited: Vec<u64> = result.nodes.iter().map(|n| n.entry_id.get()).collect();
    assert_eq!(visited, vec![b.id.get(), c.id.get()]);

    // Duplicate relation triple conflicts.
    let err = engine
        .add_relation(a.id, b.id, RelationType::Citation, 0.5)
        .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn consult_on_empty_store_completes_with_fallback() {
    let engine = test_engine();
    let record = engine
        .consult(&ConsultRequest::question("什么是合同?"))
        .unwrap();
    assert_eq!(record.status, ConsultationStatus::Completed);
    assert!(!record.answer.trim().is_empty());
    assert!(record.sources.is_empty());
    let confidence = record.confidence.unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(confidence < 0.5);
}

#[test]
fn consult_cites_and_logs() {
    let engine = test_engine();
    engine
        .create_entry(draft(
            "合同纠纷典型案例",
            "某公司与供应商签订采购合同，因质量问题产生合同纠纷。",
            LegalCategory::CivilLaw,
            &["合同"],
        ))
        .unwrap();
    engine.quiesce_index();

    let mut request = ConsultRequest::question("合同纠纷如何处理?");
    request.user = "alice".into();
    let record = engine.consult(&request).unwrap();
    assert_eq!(record.status, ConsultationStatus::Completed);
    assert!(!record.sources.is_empty());
    assert!(record.answer.contains("合同纠纷典型案例"));

    // History is queryable by user, newest first.
    let history = engine.consultations(Some("alice"), 0, 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
    assert!(engine.consultations(Some("bob"), 0, 10).is_empty());
}

#[test]
fn batch_consult_completes_all_items() {
    let engine = test_engine();
    engine
        .create_entry(draft(
            "劳动争议处理流程",
            "劳动争议的仲裁与诉讼流程。",
            LegalCategory::LaborLaw,
            &[],
        ))
        .unwrap();
    engine.quiesce_index();

    let results = engine.consult_batch(vec![
        ConsultRequest::question("劳动争议怎么仲裁?"),
        ConsultRequest::question("合同违约如何赔偿?"),
        ConsultRequest::question("专利侵权如何维权?"),
    ]);
    assert_eq!(results.len(), 3);
    for result in results {
        let record = result.unwrap();
        assert_eq!(record.status, ConsultationStatus::Completed);
        assert!(!record.answer.is_empty());
    }
    assert_eq!(engine.consultations(None, 0, 10).len(), 3);
}

#[test]
fn invalid_question_is_persisted_failure() {
    let engine = test_engine();
    let record = engine.consult(&ConsultRequest::question("")).unwrap();
    assert_eq!(record.status, ConsultationStatus::Failed);
    assert!(record.confidence.is_none());
    assert_eq!(engine.consultations(None, 0, 10).len(), 1);
}

#[test]
fn classifier_never_fails_on_wellformed_input() {
    let engine = test_engine();
    for question in [
        "合同纠纷如何处理?",
        "what is a trademark?",
        "今天吃什么",
        "1 + 1",
    ] {
        let result = engine.classify(question).unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}

#[test]
fn related_entries_through_graph() {
    let engine = test_engine();
    let law = engine
        .create_entry(draft("民法典", "民法典总则。", LegalCategory::CivilLaw, &[]))
        .unwrap();
    let case = engine
        .create_entry(draft(
            "合同纠纷案例",
            "适用民法典的案例。",
            LegalCategory::CivilLaw,
            &[],
        ))
        .unwrap();
    engine
        .add_relation(case.id, law.id, RelationType::Citation, 0.95)
        .unwrap();

    // Relations surface in both directions.
    assert_eq!(engine.related_entries(law.id, 10).len(), 1);
    assert_eq!(engine.related_entries(case.id, 10).len(), 1);

    // Deactivating an endpoint hides it from traversal without deleting
    // the edge or the historical record.
    engine.deactivate_entry(law.id).unwrap();
    assert!(engine.related_entries(case.id, 10).is_empty());
}
