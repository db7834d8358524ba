//! # maat
//!
//! A legal knowledge engine: versioned knowledge store with a typed
//! citation graph, hybrid lexical+semantic retrieval, and an AI
//! consultation pipeline with an append-only log.
//!
//! ## Architecture
//!
//! - **Knowledge store** (`store`): versioned entries with optimistic
//!   concurrency, soft delete, and redb persistence
//! - **Relation graph** (`graph`): typed, weighted edges (petgraph) with
//!   cycle-tolerant bounded traversal
//! - **Indexer** (`index`): eventually consistent lexical (term→postings)
//!   and semantic (deterministic embeddings) indices
//! - **Search** (`search`): blended lexical+semantic ranking with
//!   deterministic total order
//! - **Classifier** (`classify`): taxonomy classification with an
//!   uncategorized fallback
//! - **Consultation** (`consult`): classify → retrieve → compose → score
//!   state machine, bounded batch fan-out, append-only log
//!
//! ## Library usage
//!
//! ```no_run
//! use maat::category::LegalCategory;
//! use maat::consult::ConsultRequest;
//! use maat::engine::{Engine, EngineConfig};
//! use maat::entry::EntryDraft;
//!
//! let engine = Engine::new(EngineConfig::standard()).unwrap();
//! engine
//!     .create_entry(EntryDraft {
//!         title: "民法典".into(),
//!         content: "民法典是民事法律的基础，规定了民事主体的权利义务关系。".into(),
//!         category: LegalCategory::CivilLaw,
//!         tags: vec!["民法典".into()],
//!         source: "全国人大".into(),
//!     })
//!     .unwrap();
//! engine.quiesce_index();
//! let record = engine.consult(&ConsultRequest::question("什么是合同?")).unwrap();
//! println!("{}", record.answer);
//! ```

pub mod category;
pub mod classify;
pub mod consult;
pub mod engine;
pub mod entry;
pub mod error;
pub mod graph;
pub mod import;
pub mod index;
pub mod search;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
