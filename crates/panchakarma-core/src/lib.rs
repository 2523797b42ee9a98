//! # Panchakarma Core
//!
//! The retrieval-and-prompt pipeline behind the Panchakarma chatbot, with no
//! HTTP, filesystem watching, or runtime dependencies beyond reading the
//! knowledge file.
//!
//! ```text
//! knowledge file ──▶ Corpus ──▶ KnowledgeBase (passages + L2 index)
//!                                      │
//!          user message ──▶ retrieve ──┤
//!                                      ▼
//!                        RetrievalOutcome::{Grounded, Ungrounded}
//!                                      │
//!                                      ▼
//!                         compose_prompt ──▶ GenerationBackend
//!                                      │
//!                                      ▼
//!                       answer text  |  "Error generating response: …"
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`corpus`] | Blank-line passage splitting and file loading |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) trait and the deterministic hashing embedder |
//! | [`index`] | Flat (brute-force) Euclidean nearest-neighbour index |
//! | [`retriever`] | [`KnowledgeBase`](retriever::KnowledgeBase) and its atomically swappable handle |
//! | [`prompt`] | Persona, instructions, disclaimer and therapy focus |
//! | [`generate`] | [`GenerationBackend`](generate::GenerationBackend) trait and the [`Responder`](generate::Responder) |
//! | [`error`] | Typed errors for each pipeline stage |
//!
//! Concrete embedding providers and the Gemini backend live in the
//! `panchakarma-bot` app crate.

pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod prompt;
pub mod retriever;

pub use corpus::{Corpus, Passage};
pub use embedding::{Embedder, HashEmbedder};
pub use error::{EmbeddingError, GenerationError, LoadError};
pub use generate::{GenerationBackend, Reply, Responder};
pub use prompt::TherapyFocus;
pub use retriever::{KnowledgeBase, RetrievalOutcome, SharedKnowledgeBase, DEFAULT_TOP_K};
