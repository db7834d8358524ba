//! Benchmarks for the hot search path: tokenization, embedding, and
//! end-to-end hybrid search over a seeded index.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use maat::category::LegalCategory;
use maat::engine::{Engine, EngineConfig};
use maat::entry::EntryDraft;
use maat::index::lexical::tokenize;
use maat::index::semantic::{EmbeddingDim, embed};
use maat::search::SearchFilters;

fn seeded_engine(entries: usize) -> Engine {
    let engine = Engine::new(EngineConfig::standard()).unwrap();
    let categories = [
        LegalCategory::CivilLaw,
        LegalCategory::CriminalLaw,
        LegalCategory::LaborLaw,
        LegalCategory::CommercialLaw,
    ];
    for i in 0..entries {
        engine
            .create_entry(EntryDraft {
                title: format!("条目{i}"),
                content: format!(
                    "合同纠纷的处理规则第{i}号：违约责任、赔偿范围与争议解决方式。"
                ),
                category: categories[i % categories.len()],
                tags: vec!["基准".into()],
                source: "bench".into(),
            })
            .unwrap();
    }
    engine.quiesce_index();
    engine
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "某公司与供应商签订采购合同，因质量问题产生合同纠纷，诉请违约赔偿。";
    c.bench_function("tokenize_cjk", |b| {
        b.iter(|| tokenize(black_box(text)));
    });
}

fn bench_embed(c: &mut Criterion) {
    let text = "劳动合同解除的法定情形与经济补偿标准";
    c.bench_function("embed_256", |b| {
        b.iter(|| embed(black_box(text), EmbeddingDim::DEFAULT));
    });
}

fn bench_search(c: &mut Criterion) {
    let engine = seeded_engine(500);
    let filters = SearchFilters::default();
    c.bench_function("hybrid_search_500", |b| {
        b.iter(|| {
            engine
                .search(black_box("合同违约赔偿"), &filters, Some(20))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_tokenize, bench_embed, bench_search);
criterion_main!(benches);
