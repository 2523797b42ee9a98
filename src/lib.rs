//! # Panchakarma Bot
//!
//! A retrieval-augmented chatbot for Panchakarma and general Ayurvedic
//! questions.
//!
//! A plain-text knowledge file is split into passages, embedded, and held in
//! an in-memory nearest-neighbour index. Each question retrieves the closest
//! passages, which are placed in a Gemini prompt together with an optional
//! therapy focus. The retrieval core lives in the `panchakarma-core` crate;
//! this crate wires it to configuration, embedding providers, the Gemini
//! backend and the two shells.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Knowledge file│──▶│ Split+Embed │──▶│  Flat L2     │
//! │ (passages)    │   │             │   │  index       │
//! └───────────────┘   └─────────────┘   └──────┬───────┘
//!                                              │ top-k
//!                                              ▼
//!                                       ┌──────────────┐   ┌──────────┐
//!                                       │ Prompt       │──▶│  Gemini  │
//!                                       └──────────────┘   └────┬─────┘
//!                                                               │
//!                                ┌──────────────────────────────┤
//!                                ▼                              ▼
//!                          ┌──────────┐                   ┌──────────┐
//!                          │ Console  │                   │ Web UI   │
//!                          └──────────┘                   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! panchakarma chat --therapy Virechana
//! panchakarma serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`console`] | Interactive console shell |
//! | [`embedding`] | Embedding provider selection |
//! | [`gemini`] | Gemini generation backend |
//! | [`knowledge`] | Knowledge base loading and reload |
//! | [`logging`] | Diagnostic log setup |
//! | [`server`] | Web chat UI and JSON API |

pub mod config;
pub mod console;
pub mod embedding;
pub mod gemini;
pub mod knowledge;
pub mod logging;
pub mod server;
