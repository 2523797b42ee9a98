//! Knowledge base: the corpus, its index, and the embedder that built it.
//!
//! A [`KnowledgeBase`] is constructed once from a [`Corpus`] and is immutable
//! afterwards. Passage `i` always has its vector at index position `i`,
//! because both are produced in a single [`KnowledgeBase::build`] call and
//! never mutated separately.
//!
//! Hot reloading goes through [`SharedKnowledgeBase`], which swaps the whole
//! `Arc<KnowledgeBase>` under a lock. Readers take a snapshot and keep using
//! it for the rest of their call, so they never see a corpus paired with an
//! index built from a different one.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use panchakarma_core::{Corpus, HashEmbedder, KnowledgeBase};
//!
//! # async fn demo() -> Result<(), panchakarma_core::EmbeddingError> {
//! let corpus = Corpus::parse("Virechana is purgation.\n\nBasti is enema therapy.");
//! let kb = KnowledgeBase::build(corpus, Arc::new(HashEmbedder::default())).await?;
//! let hits = kb.retrieve("What is Basti?", 1).await?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::corpus::{Corpus, Passage};
use crate::embedding::{embed_query, Embedder};
use crate::error::EmbeddingError;
use crate::index::FlatL2Index;

/// Number of passages retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 2;

/// Which prompt shape a question gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// At least one passage was retrieved; passages are in best-first order.
    Grounded(Vec<Passage>),
    /// Nothing retrieved; the model answers from general knowledge.
    Ungrounded,
}

impl RetrievalOutcome {
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        if passages.is_empty() {
            Self::Ungrounded
        } else {
            Self::Grounded(passages)
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded(_))
    }

    pub fn passages(&self) -> &[Passage] {
        match self {
            Self::Grounded(passages) => passages,
            Self::Ungrounded => &[],
        }
    }
}

/// A passage together with its squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub distance: f32,
}

/// Immutable corpus + index pair.
pub struct KnowledgeBase {
    corpus: Corpus,
    index: FlatL2Index,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    /// Embed every passage and build the index.
    ///
    /// An empty corpus produces an empty index without calling the embedder.
    pub async fn build(corpus: Corpus, embedder: Arc<dyn Embedder>) -> Result<Self, EmbeddingError> {
        if corpus.is_empty() {
            return Ok(Self {
                index: FlatL2Index::empty(embedder.dims()),
                corpus,
                embedder,
            });
        }

        let vectors = embedder.embed(&corpus.texts()).await?;
        if vectors.len() != corpus.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: corpus.len(),
                actual: vectors.len(),
            });
        }

        let dims = vectors.first().map(Vec::len).unwrap_or_else(|| embedder.dims());
        let index = FlatL2Index::build(dims, vectors)?;
        tracing::info!(
            passages = corpus.len(),
            dims,
            model = embedder.model_name(),
            "knowledge base indexed"
        );

        Ok(Self {
            corpus,
            index,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// The embedder used for passages, needed to embed queries against a
    /// rebuilt index.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Up to `k` nearest passages with their distances, best first.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredPassage>, EmbeddingError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let hits = self.index.search(&query_vec, k)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.corpus.get(hit.position).map(|passage| ScoredPassage {
                    passage: passage.clone(),
                    distance: hit.distance,
                })
            })
            .collect())
    }

    /// Up to `k` nearest passages, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, EmbeddingError> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|s| s.passage)
            .collect())
    }

    /// Retrieve and classify into a [`RetrievalOutcome`].
    pub async fn outcome(&self, query: &str, k: usize) -> Result<RetrievalOutcome, EmbeddingError> {
        let passages = self.retrieve(query, k).await?;
        tracing::debug!(retrieved = passages.len(), k, "retrieval complete");
        Ok(RetrievalOutcome::from_passages(passages))
    }
}

/// Handle to the live [`KnowledgeBase`], replaceable as a whole.
#[derive(Clone)]
pub struct SharedKnowledgeBase {
    inner: Arc<RwLock<Arc<KnowledgeBase>>>,
}

impl SharedKnowledgeBase {
    pub fn new(kb: KnowledgeBase) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(kb))),
        }
    }

    /// The knowledge base as of now. Later swaps do not affect it.
    pub fn snapshot(&self) -> Arc<KnowledgeBase> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a fully built replacement.
    pub fn replace(&self, kb: KnowledgeBase) {
        let passages = kb.len();
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(kb);
        tracing::info!(passages, "knowledge base replaced");
    }
}
