//! Local AI support for intent checks.
//!
//! Holds the prompt sent to the vision model and the parser that turns its
//! free-text answer into a [`Verdict`]. The HTTP client lives in
//! [`ollama`] behind the `ollama` feature.

use crate::core::intent::Verdict;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{AiError, BlockingOllamaClient, OllamaClient};

/// System prompt for intent checks. Leans towards matching, since a false
/// nudge costs more than a missed one.
pub const INTENT_SYSTEM_PROMPT: &str = "You are a focus assistant. Be lenient - if the content could \
reasonably be related to work (research, documentation, tutorials), say YES. \
Only say NO for obvious distractions like social media, games, or unrelated videos.";

/// User prompt asking whether a screenshot matches the declared intent.
pub fn intent_prompt(intent: &str) -> String {
    format!(
        "The user said they are working on: \"{intent}\"\n\
         \n\
         Look at this screenshot. Is the content related to their stated work?\n\
         \n\
         Answer with:\n\
         1. YES or NO\n\
         2. Brief explanation (one sentence)\n\
         \n\
         Format: YES/NO: explanation"
    )
}

/// Parse a `YES/NO: explanation` answer.
///
/// Anything not starting with YES (case-insensitive) is a mismatch. The
/// explanation is the text after the first colon, or the whole answer when
/// there is none.
pub fn parse_verdict(response: &str) -> Verdict {
    let response = response.trim();
    let matches = response
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("yes"));

    let explanation = match response.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => response,
    };

    Verdict {
        matches,
        explanation: explanation.to_string(),
    }
}
