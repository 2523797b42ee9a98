//! Response generation.
//!
//! [`Responder::respond`] runs the whole pipeline for one user message:
//!
//! 1. Snapshot the live knowledge base and retrieve the `top_k` nearest
//!    passages.
//! 2. Compose a grounded or ungrounded prompt ([`crate::prompt`]).
//! 3. Make exactly one call to the [`GenerationBackend`].
//! 4. Return the trimmed answer, or a one-line diagnostic beginning with
//!    [`ERROR_PREFIX`].
//!
//! Nothing is retried and nothing is raised to the caller. Shells print the
//! returned string as-is, whether it is an answer or a diagnostic.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GenerationError;
use crate::prompt::{compose_prompt, ends_with_disclaimer, TherapyFocus};
use crate::retriever::{RetrievalOutcome, SharedKnowledgeBase};

/// Every failure string returned by [`Responder::respond`] starts with this.
pub const ERROR_PREFIX: &str = "Error generating response:";

/// A hosted (or fake) text-generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend identifier for logs (e.g. `"gemini:gemini-1.5-flash"`).
    fn name(&self) -> &str;

    /// What the user should check when a call fails (e.g. `"Gemini API key"`).
    fn credential_hint(&self) -> &str {
        "API key"
    }

    /// Send `prompt` as a single user-role message and return the completion.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Longest cause text kept in a diagnostic, in characters.
const MAX_CAUSE_CHARS: usize = 300;

/// Format the user-facing diagnostic for a failed call.
///
/// The result is always a single line: whitespace in the cause (for example
/// an HTML error page from a proxy) is collapsed and long causes are cut.
pub fn format_failure(cause: &GenerationError, credential_hint: &str) -> String {
    format!(
        "{} {}. Check your {} and internet connection.",
        ERROR_PREFIX,
        single_line(&cause.to_string(), MAX_CAUSE_CHARS),
        credential_hint
    )
}

fn single_line(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Result of one [`Responder::answer`] call.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    /// Answer text, or the diagnostic when `failed` is set.
    pub text: String,
    /// Whether retrieved passages were placed in the prompt.
    pub grounded: bool,
    /// Texts of the passages used as context, best first.
    pub sources: Vec<String>,
    /// Whether generation (or per-query retrieval) failed.
    pub failed: bool,
}

/// The retrieval → prompt → generation pipeline.
pub struct Responder {
    knowledge: SharedKnowledgeBase,
    backend: Arc<dyn GenerationBackend>,
    top_k: usize,
}

impl Responder {
    pub fn new(
        knowledge: SharedKnowledgeBase,
        backend: Arc<dyn GenerationBackend>,
        top_k: usize,
    ) -> Self {
        Self {
            knowledge,
            backend,
            top_k,
        }
    }

    pub fn knowledge(&self) -> &SharedKnowledgeBase {
        &self.knowledge
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `user_message`, optionally biased towards `therapy_type`.
    pub async fn respond(&self, user_message: &str, therapy_type: Option<&str>) -> String {
        self.answer(user_message, therapy_type).await.text
    }

    /// Like [`respond`](Self::respond), with retrieval details attached.
    pub async fn answer(&self, user_message: &str, therapy_type: Option<&str>) -> Reply {
        let focus = TherapyFocus::parse(therapy_type);
        let kb = self.knowledge.snapshot();

        let outcome = match kb.outcome(user_message, self.top_k).await {
            Ok(outcome) => outcome,
            Err(e) => return self.failure(e.into(), &RetrievalOutcome::Ungrounded),
        };

        let prompt = compose_prompt(&outcome, user_message, focus.as_ref());
        tracing::debug!(
            backend = self.backend.name(),
            grounded = outcome.is_grounded(),
            prompt_chars = prompt.len(),
            "generating response"
        );

        let generated = self.backend.generate(&prompt).await.and_then(|text| {
            let text = text.trim();
            if text.is_empty() {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok(text.to_string())
            }
        });

        match generated {
            Ok(text) => {
                if !ends_with_disclaimer(&text) {
                    tracing::debug!(
                        backend = self.backend.name(),
                        "answer does not end with the disclaimer"
                    );
                }
                Reply {
                    text,
                    grounded: outcome.is_grounded(),
                    sources: source_texts(&outcome),
                    failed: false,
                }
            }
            Err(e) => self.failure(e, &outcome),
        }
    }

    fn failure(&self, cause: GenerationError, outcome: &RetrievalOutcome) -> Reply {
        tracing::warn!(backend = self.backend.name(), error = %cause, "generation failed");
        Reply {
            text: format_failure(&cause, self.backend.credential_hint()),
            grounded: outcome.is_grounded(),
            sources: source_texts(outcome),
            failed: true,
        }
    }
}

fn source_texts(outcome: &RetrievalOutcome) -> Vec<String> {
    outcome.passages().iter().map(|p| p.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::error::EmbeddingError;
    use crate::prompt::{ends_with_disclaimer, DISCLAIMER};
    use crate::retriever::KnowledgeBase;
    use std::sync::Mutex;

    /// Records every prompt and replays a scripted result.
    struct ScriptedBackend {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn credential_hint(&self) -> &str {
            "Gemini API key"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(GenerationError::Api {
                    status: 400,
                    message: message.clone(),
                }),
            }
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            // Succeeds for the corpus build, fails for single-text queries.
            if texts.len() > 1 {
                Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
            } else {
                Err(EmbeddingError::Provider("model unloaded".into()))
            }
        }
    }

    const KNOWLEDGE: &str = "Virechana precautions: eat light khichdi, avoid cold water and daytime sleep after the purgation.\n\n\
        Basti precautions: rest for an hour after the enema and avoid heavy meals.\n\n\
        Nasya precautions: avoid cold exposure and dust after nasal oil drops.";

    async fn shared(text: &str) -> SharedKnowledgeBase {
        SharedKnowledgeBase::new(
            KnowledgeBase::build(Corpus::parse(text), Arc::new(HashEmbedder::default()))
                .await
                .unwrap(),
        )
    }

    fn answer_with_disclaimer() -> String {
        format!("- Light food\n- Rest\n\n{}", DISCLAIMER)
    }

    #[tokio::test]
    async fn test_grounded_prompt_carries_passage_text() {
        let backend = ScriptedBackend::ok(&answer_with_disclaimer());
        let responder = Responder::new(shared(KNOWLEDGE).await, backend.clone(), 2);

        let reply = responder.answer("What is Virechana?", None).await;

        assert!(reply.grounded);
        assert!(!reply.failed);
        let prompt = backend.last_prompt();
        assert!(prompt.contains("Context:"));
        assert!(prompt.contains(
            "Virechana precautions: eat light khichdi, avoid cold water and daytime sleep after the purgation."
        ));
        assert_eq!(reply.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_unrelated_question_still_uses_nearest_passages() {
        let backend = ScriptedBackend::ok(&answer_with_disclaimer());
        let responder = Responder::new(shared(KNOWLEDGE).await, backend.clone(), 2);

        let text = responder
            .respond("What is the capital of France?", None)
            .await;

        assert!(!text.starts_with(ERROR_PREFIX));
        assert!(ends_with_disclaimer(&text));
        // Pure nearest-neighbour: two passages are included regardless of relevance.
        let prompt = backend.last_prompt();
        let included = Corpus::parse(KNOWLEDGE)
            .passages()
            .iter()
            .filter(|p| prompt.contains(&p.text))
            .count();
        assert_eq!(included, 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_takes_ungrounded_branch() {
        let backend = ScriptedBackend::ok("Paris is not an Ayurvedic topic.");
        let responder = Responder::new(shared("").await, backend.clone(), 2);

        let reply = responder.answer("What is the capital of France?", None).await;

        assert!(!reply.grounded);
        assert!(reply.sources.is_empty());
        assert!(!backend.last_prompt().contains("Context:"));
    }

    #[tokio::test]
    async fn test_therapy_focus_in_both_branches() {
        for knowledge in [KNOWLEDGE, ""] {
            let backend = ScriptedBackend::ok("ok");
            let responder = Responder::new(shared(knowledge).await, backend.clone(), 2);
            responder.respond("How should I rest?", Some("Basti")).await;
            assert!(backend.last_prompt().contains("Focus on: Basti"));
        }
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_string() {
        let backend = ScriptedBackend::failing("API key not valid");
        let responder = Responder::new(shared(KNOWLEDGE).await, backend, 2);

        let reply = responder.answer("What is Virechana?", None).await;

        assert!(reply.failed);
        assert!(reply.text.starts_with(ERROR_PREFIX));
        assert!(reply.text.contains("API key not valid"));
        assert!(reply
            .text
            .ends_with("Check your Gemini API key and internet connection."));
    }

    #[tokio::test]
    async fn test_blank_completion_is_failure() {
        let backend = ScriptedBackend::ok("   \n ");
        let responder = Responder::new(shared(KNOWLEDGE).await, backend, 2);
        let text = responder.respond("What is Basti?", None).await;
        assert!(text.starts_with(ERROR_PREFIX));
        assert!(text.contains("empty response"));
    }

    #[tokio::test]
    async fn test_completion_is_trimmed() {
        let backend = ScriptedBackend::ok("\n  Rest well.  \n");
        let responder = Responder::new(shared(KNOWLEDGE).await, backend, 2);
        assert_eq!(responder.respond("What is Basti?", None).await, "Rest well.");
    }

    #[tokio::test]
    async fn test_query_embedding_failure_reported_not_raised() {
        let kb = KnowledgeBase::build(Corpus::parse(KNOWLEDGE), Arc::new(BrokenEmbedder))
            .await
            .unwrap();
        let backend = ScriptedBackend::ok("never used");
        let responder = Responder::new(SharedKnowledgeBase::new(kb), backend.clone(), 2);

        let text = responder.respond("What is Nasya?", None).await;

        assert!(text.starts_with(ERROR_PREFIX));
        assert!(text.contains("model unloaded"));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_format_failure_is_single_line() {
        let page = "<html>\n<head><title>502 Bad Gateway</title></head>\n<body>bad gateway</body>\n</html>\n";
        let msg = format_failure(
            &GenerationError::Api {
                status: 502,
                message: page.to_string(),
            },
            "Gemini API key",
        );
        assert!(!msg.contains('\n'));
        assert!(msg.starts_with(ERROR_PREFIX));
        assert!(msg.contains("<title>502 Bad Gateway</title></head> <body>"));
        assert!(msg.ends_with("Check your Gemini API key and internet connection."));
    }

    #[test]
    fn test_format_failure_caps_long_cause() {
        let msg = format_failure(&GenerationError::Transport("x".repeat(5000)), "API key");
        assert!(msg.chars().count() < MAX_CAUSE_CHARS + 100);
        assert!(msg.contains('…'));
    }

    #[test]
    fn test_format_failure() {
        let msg = format_failure(
            &GenerationError::MissingCredential {
                var: "GEMINI_API_KEY".into(),
            },
            "Gemini API key",
        );
        assert_eq!(
            msg,
            "Error generating response: GEMINI_API_KEY is not set. Check your Gemini API key and internet connection."
        );
    }
}
