//! ACID-durable persistence backed by redb.
//!
//! One database file holds four tables: knowledge entries, relations,
//! consultation records, and allocator metadata. All writes go through
//! transactions; reads use MVCC snapshots. Values are bincode-encoded.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::consult::ConsultationRecord;
use crate::entry::KnowledgeEntry;
use crate::error::StoreError;
use crate::graph::Relation;

const ENTRIES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("entries");
const RELATIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("relations");
const CONSULTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("consultations");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Result type for durable store operations.
pub type DurableResult<T> = std::result::Result<T, StoreError>;

/// ACID-durable store using redb.
pub struct DurableStore {
    db: Arc<Database>,
}

fn redb_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb {
        message: format!("{context}: {e}"),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DurableResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DurableResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

impl DurableStore {
    /// Open or create the database in the given directory.
    pub fn open(data_dir: &Path) -> DurableResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("maat.redb");
        let db = Database::create(&db_path)
            .map_err(|e| redb_err(&format!("open {}", db_path.display()), e))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn put_bytes_u64(
        &self,
        table: TableDefinition<u64, &[u8]>,
        key: u64,
        value: &[u8],
    ) -> DurableResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        {
            let mut t = txn.open_table(table).map_err(|e| redb_err("open_table", e))?;
            t.insert(key, value).map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    fn load_all_u64<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<u64, &[u8]>,
    ) -> DurableResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let t = match txn.open_table(table) {
            Ok(t) => t,
            // Table not created yet: nothing persisted.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(redb_err("open_table", e)),
        };
        let mut out = Vec::new();
        let iter = t.iter().map_err(|e| redb_err("iter", e))?;
        for item in iter {
            let (_, value) = item.map_err(|e| redb_err("iter item", e))?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    /// Write or overwrite a knowledge entry.
    pub fn put_entry(&self, entry: &KnowledgeEntry) -> DurableResult<()> {
        let encoded = encode(entry)?;
        self.put_bytes_u64(ENTRIES_TABLE, entry.id.get(), &encoded)
    }

    /// Load all persisted knowledge entries.
    pub fn load_entries(&self) -> DurableResult<Vec<KnowledgeEntry>> {
        self.load_all_u64(ENTRIES_TABLE)
    }

    /// Write a relation, keyed by its (source, target, type) triple.
    pub fn put_relation(&self, relation: &Relation) -> DurableResult<()> {
        let key = relation_key(relation);
        let encoded = encode(relation)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        {
            let mut t = txn
                .open_table(RELATIONS_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            t.insert(key.as_slice(), encoded.as_slice())
                .map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    /// Load all persisted relations.
    pub fn load_relations(&self) -> DurableResult<Vec<Relation>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let t = match txn.open_table(RELATIONS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(redb_err("open_table", e)),
        };
        let mut out = Vec::new();
        let iter = t.iter().map_err(|e| redb_err("iter", e))?;
        for item in iter {
            let (_, value) = item.map_err(|e| redb_err("iter item", e))?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    /// Write a consultation record.
    pub fn put_consultation(&self, record: &ConsultationRecord) -> DurableResult<()> {
        let encoded = encode(record)?;
        self.put_bytes_u64(CONSULTS_TABLE, record.id.get(), &encoded)
    }

    /// Load all persisted consultation records.
    pub fn load_consultations(&self) -> DurableResult<Vec<ConsultationRecord>> {
        self.load_all_u64(CONSULTS_TABLE)
    }

    /// Persist an allocator high-water mark.
    pub fn put_counter(&self, name: &str, value: u64) -> DurableResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        {
            let mut t = txn
                .open_table(META_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            t.insert(name, value).map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    /// Read an allocator high-water mark. Returns `None` if never written.
    pub fn get_counter(&self, name: &str) -> DurableResult<Option<u64>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let t = match txn.open_table(META_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(redb_err("open_table", e)),
        };
        let result = t.get(name).map_err(|e| redb_err("get", e))?;
        Ok(result.map(|guard| guard.value()))
    }
}

/// Composite key for a relation: source (8 bytes) + target (8) + type (1).
fn relation_key(relation: &Relation) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[..8].copy_from_slice(&relation.source.get().to_be_bytes());
    key[8..16].copy_from_slice(&relation.target.get().to_be_bytes());
    key[16] = relation.relation_type as u8;
    key
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::LegalCategory;
    use crate::entry::EntryId;
    use crate::graph::RelationType;
    use tempfile::TempDir;

    fn sample_entry(id: u64) -> KnowledgeEntry {
        KnowledgeEntry {
            id: EntryId::new(id).unwrap(),
            title: "民法典".into(),
            content: "民法典是民事法律的基础".into(),
            category: LegalCategory::CivilLaw,
            tags: ["民法典".to_string()].into_iter().collect(),
            source: "全国人大".into(),
            version: 1,
            active: true,
            created_at: 100,
            updated_at: 100,
        }
    }

    #[test]
    fn entries_persist_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.put_entry(&sample_entry(1)).unwrap();
            store.put_entry(&sample_entry(2)).unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        let entries = store.load_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "民法典");
    }

    #[test]
    fn overwrite_keeps_latest_version() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let mut entry = sample_entry(1);
        store.put_entry(&entry).unwrap();
        entry.version = 2;
        entry.content = "修订后的内容".into();
        store.put_entry(&entry).unwrap();

        let entries = store.load_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, 2);
    }

    #[test]
    fn relations_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let rel = Relation::new(
            EntryId::new(1).unwrap(),
            EntryId::new(2).unwrap(),
            RelationType::Citation,
            0.9,
        );
        store.put_relation(&rel).unwrap();

        let relations = store.load_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_type, RelationType::Citation);
    }

    #[test]
    fn counters_default_to_none() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.get_counter("next_entry_id").unwrap(), None);
        store.put_counter("next_entry_id", 42).unwrap();
        assert_eq!(store.get_counter("next_entry_id").unwrap(), Some(42));
    }

    #[test]
    fn empty_tables_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(store.load_entries().unwrap().is_empty());
        assert!(store.load_relations().unwrap().is_empty());
        assert!(store.load_consultations().unwrap().is_empty());
    }
}
