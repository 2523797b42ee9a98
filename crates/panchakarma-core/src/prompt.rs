//! Prompt composition.
//!
//! Two prompt shapes exist, selected by the [`RetrievalOutcome`]:
//!
//! | Outcome | Shape |
//! |---------|-------|
//! | `Grounded` | persona, `Context:` block, question, context-first instructions |
//! | `Ungrounded` | persona, question, general-knowledge instructions |
//!
//! Both end by instructing the model to close with [`DISCLAIMER`], and both
//! get a trailing `Focus on: <therapy>` directive when a [`TherapyFocus`] is
//! set. The disclaimer is requested, not enforced: nothing here checks the
//! model's output.

use crate::retriever::RetrievalOutcome;

/// Persona line opening every prompt.
pub const PERSONA: &str = "You are an empathetic Ayurvedic assistant specializing in Panchakarma.";

/// Closing sentence every answer is asked to end with.
pub const DISCLAIMER: &str =
    "This is general guidance based on Ayurveda—consult your practitioner for personalized advice.";

/// The one accepted alternative wording of [`DISCLAIMER`].
pub const DISCLAIMER_VARIANT: &str = "This is general guidance based on traditional Ayurveda—consult your qualified practitioner for personalized advice.";

/// Whether `answer` closes with the disclaimer or its approved variant.
pub fn ends_with_disclaimer(answer: &str) -> bool {
    let trimmed = answer.trim_end().trim_end_matches('"').trim_end();
    trimmed.ends_with(DISCLAIMER) || trimmed.ends_with(DISCLAIMER_VARIANT)
}

/// Optional therapy the answer should concentrate on (e.g. `"Basti"`).
///
/// Free text; not checked against any vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TherapyFocus(String);

impl TherapyFocus {
    /// Trim the input; blank or missing input means no focus.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Self(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Build the full prompt sent to the generation backend as a single
/// user-role message.
pub fn compose_prompt(
    outcome: &RetrievalOutcome,
    user_message: &str,
    focus: Option<&TherapyFocus>,
) -> String {
    let mut prompt = match outcome {
        RetrievalOutcome::Grounded(passages) => {
            let context = passages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            format!(
                "{PERSONA}\n\
                 Use the following context to answer the user's question accurately:\n\
                 \n\
                 Context:\n\
                 {context}\n\
                 \n\
                 User question: {user_message}\n\
                 \n\
                 Instructions:\n\
                 - Summarize key points in bullet points if relevant.\n\
                 - If a therapy focus is given, focus on it.\n\
                 - Be clear, concise, and supportive.\n\
                 - If the question is outside the context, answer using your general Ayurvedic knowledge.\n\
                 - End with: \"{DISCLAIMER}\"\n"
            )
        }
        RetrievalOutcome::Ungrounded => format!(
            "{PERSONA}\n\
             User question: {user_message}\n\
             \n\
             Instructions:\n\
             - Answer using your general Ayurvedic knowledge.\n\
             - Summarize key points in bullet points if possible.\n\
             - If a therapy focus is given, focus on it.\n\
             - End with: \"{DISCLAIMER}\"\n"
        ),
    };

    if let Some(focus) = focus {
        prompt.push_str("\n\nFocus on: ");
        prompt.push_str(focus.as_str());
    }

    prompt
}
