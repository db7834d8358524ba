//! Lexical index: term → postings with term frequency.
//!
//! The tokenizer is language-agnostic: NFKC normalization, lowercasing,
//! ASCII alphanumeric words, and character bigrams for CJK runs (there is
//! no dictionary segmenter; bigrams keep scoring deterministic and work
//! well for short legal queries like 合同 or 劳动争议).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use unicode_normalization::UnicodeNormalization;

use crate::category::LegalCategory;
use crate::entry::EntryId;

/// Whether a character belongs to the CJK unified ideograph blocks.
fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

/// Tokenize text into indexable terms.
///
/// ASCII words shorter than 2 chars are dropped as noise; CJK runs emit
/// overlapping character bigrams (a single isolated CJK char becomes a
/// unigram token).
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();

    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_word = |word: &mut String, tokens: &mut Vec<String>| {
        if word.chars().count() >= 2 {
            tokens.push(std::mem::take(word));
        } else {
            word.clear();
        }
    };
    let flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            n => {
                for i in 0..n - 1 {
                    let mut bigram = String::with_capacity(8);
                    bigram.push(run[i]);
                    bigram.push(run[i + 1]);
                    tokens.push(bigram);
                }
            }
        }
        run.clear();
    };

    for c in normalized.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk_run.push(c);
        } else if c.is_ascii_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.push(c);
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);

    tokens
}

/// Distinct tokens of a text, in sorted order.
pub fn distinct_tokens(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Committed per-entry index row. Replaced atomically on re-index, so a
/// reader sees the old or the new row, never a mix.
#[derive(Debug, Clone)]
pub struct LexRow {
    /// Entry version this row was built from.
    pub version: u64,
    pub category: LegalCategory,
    pub tags: BTreeSet<String>,
    pub updated_at: u64,
    /// Total token count of title + content, for length normalization.
    pub token_count: usize,
}

/// Term-frequency index over active knowledge entries.
pub struct LexicalIndex {
    /// term → (entry → term frequency).
    postings: DashMap<String, HashMap<EntryId, u32>>,
    /// Committed per-entry rows (the candidate set for search).
    rows: DashMap<EntryId, Arc<LexRow>>,
    /// Terms currently indexed per entry, for posting removal on re-index.
    terms_by_entry: DashMap<EntryId, Vec<String>>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self {
            postings: DashMap::new(),
            rows: DashMap::new(),
            terms_by_entry: DashMap::new(),
        }
    }

    /// Index (or re-index) an entry's tokens. Postings converge first; the
    /// row insert is the commit point readers key off.
    pub fn upsert(
        &self,
        id: EntryId,
        version: u64,
        category: LegalCategory,
        tags: BTreeSet<String>,
        updated_at: u64,
        tokens: &[String],
    ) {
        self.remove_postings(id);

        let mut tf: HashMap<&String, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token).or_insert(0) += 1;
        }

        let mut terms = Vec::with_capacity(tf.len());
        for (term, count) in &tf {
            self.postings
                .entry((*term).clone())
                .or_default()
                .insert(id, *count);
            terms.push((*term).clone());
        }
        self.terms_by_entry.insert(id, terms);

        self.rows.insert(
            id,
            Arc::new(LexRow {
                version,
                category,
                tags,
                updated_at,
                token_count: tokens.len(),
            }),
        );
    }

    /// Drop an entry from the index (deactivation). The row goes first so
    /// the entry stops being a search candidate immediately.
    pub fn remove(&self, id: EntryId) {
        self.rows.remove(&id);
        self.remove_postings(id);
    }

    fn remove_postings(&self, id: EntryId) {
        if let Some((_, old_terms)) = self.terms_by_entry.remove(&id) {
            for term in old_terms {
                let now_empty = self
                    .postings
                    .get_mut(&term)
                    .map(|mut p| {
                        p.remove(&id);
                        p.is_empty()
                    })
                    .unwrap_or(false);
                if now_empty {
                    self.postings.remove_if(&term, |_, p| p.is_empty());
                }
            }
        }
    }

    /// The committed row for an entry, if indexed.
    pub fn row(&self, id: EntryId) -> Option<Arc<LexRow>> {
        self.rows.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Snapshot of all committed rows (the search candidate universe).
    pub fn snapshot_rows(&self) -> Vec<(EntryId, Arc<LexRow>)> {
        self.rows
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect()
    }

    /// Accumulate term frequencies of `terms` per entry:
    /// entry → Σ tf(term, entry) over the given terms.
    pub fn accumulate_tf(&self, terms: &BTreeSet<String>) -> HashMap<EntryId, u32> {
        let mut acc: HashMap<EntryId, u32> = HashMap::new();
        for term in terms {
            if let Some(posting) = self.postings.get(term) {
                for (id, tf) in posting.iter() {
                    *acc.entry(*id).or_insert(0) += tf;
                }
            }
        }
        acc
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("entries", &self.rows.len())
            .field("terms", &self.postings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_ascii_words() {
        let tokens = tokenize("The Contract Law of 1999");
        assert_eq!(tokens, vec!["the", "contract", "law", "of", "1999"]);
    }

    #[test]
    fn tokenize_drops_single_ascii_chars() {
        let tokens = tokenize("a b contract");
        assert_eq!(tokens, vec!["contract"]);
    }

    #[test]
    fn tokenize_cjk_bigrams() {
        let tokens = tokenize("合同纠纷");
        assert_eq!(tokens, vec!["合同", "同纠", "纠纷"]);
    }

    #[test]
    fn tokenize_single_cjk_char_is_unigram() {
        let tokens = tokenize("法");
        assert_eq!(tokens, vec!["法"]);
    }

    #[test]
    fn tokenize_mixed_scripts() {
        let tokens = tokenize("劳动法 labor law");
        assert_eq!(tokens, vec!["劳动", "动法", "labor", "law"]);
    }

    #[test]
    fn tokenize_punctuation_splits_runs() {
        let tokens = tokenize("什么是合同？");
        assert_eq!(tokens, vec!["什么", "么是", "是合", "合同"]);
    }

    fn sample_upsert(index: &LexicalIndex, raw_id: u64, version: u64, text: &str) {
        index.upsert(
            EntryId::new(raw_id).unwrap(),
            version,
            LegalCategory::CivilLaw,
            BTreeSet::new(),
            100,
            &tokenize(text),
        );
    }

    #[test]
    fn upsert_and_accumulate() {
        let index = LexicalIndex::new();
        sample_upsert(&index, 1, 1, "合同纠纷 合同");
        sample_upsert(&index, 2, 1, "劳动合同");

        let query: BTreeSet<String> = distinct_tokens("合同");
        let acc = index.accumulate_tf(&query);
        assert_eq!(acc.get(&EntryId::new(1).unwrap()), Some(&2));
        assert_eq!(acc.get(&EntryId::new(2).unwrap()), Some(&1));
    }

    #[test]
    fn reindex_replaces_old_postings() {
        let index = LexicalIndex::new();
        sample_upsert(&index, 1, 1, "合同");
        sample_upsert(&index, 1, 2, "侵权");

        let old: BTreeSet<String> = distinct_tokens("合同");
        assert!(index.accumulate_tf(&old).is_empty());
        let new: BTreeSet<String> = distinct_tokens("侵权");
        assert_eq!(index.accumulate_tf(&new).len(), 1);
        assert_eq!(index.row(EntryId::new(1).unwrap()).unwrap().version, 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_drops_entry_everywhere() {
        let index = LexicalIndex::new();
        sample_upsert(&index, 1, 1, "合同");
        index.remove(EntryId::new(1).unwrap());

        assert!(index.is_empty());
        let q: BTreeSet<String> = distinct_tokens("合同");
        assert!(index.accumulate_tf(&q).is_empty());
        assert_eq!(index.term_count(), 0);
    }
}
