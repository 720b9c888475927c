//! Answer generation: compose the grounded request payload and issue one
//! generation call, retrying exactly once on a rate-limit signal.
//!
//! The remote service is stateless across calls, so the full document set
//! is resent on every turn.

use std::future::Future;
use std::time::Duration;

use crate::gemini::{GeminiError, Part, RemoteFile, RemoteInference};

/// Fixed instruction preamble enforcing strict grounding. Sent ahead of the
/// document handles and the question on every turn.
pub const GROUNDING_PREAMBLE: [&str; 4] = [
    "You are a strict Medicaid eligibility assistant. Answer using only the attached policy documents.",
    "Cite the specific document name and section or page for every claim.",
    "If the answer depends on a checked box or other visual form field, state that explicitly.",
    "If the documents do not support an answer, say you are not certain instead of guessing.",
];

const MAX_ATTEMPTS: u32 = 2;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

/// Request payload in fixed order: preamble, document handles, question.
pub fn compose_payload(handles: &[RemoteFile], question: &str) -> Vec<Part> {
    let mut parts: Vec<Part> = GROUNDING_PREAMBLE.iter().map(|rule| Part::text(*rule)).collect();
    parts.extend(handles.iter().map(Part::file));
    parts.push(Part::text(question));
    parts
}

/// Run `op` up to `max_attempts` times, sleeping `backoff` between attempts
/// while `retryable` holds for the error. The last error is returned as-is.
pub async fn retry<T, E, F, Fut, P>(
    max_attempts: u32,
    backoff: Duration,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && retryable(&err) => {
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Answer one question against the cached document handles.
///
/// A rate-limited call is retried once with the identical payload after a
/// fixed backoff; a second rate limit (or any other failure) is terminal
/// for this turn only.
pub async fn answer(
    client: &dyn RemoteInference,
    model: &str,
    handles: &[RemoteFile],
    question: &str,
) -> Result<String, GeminiError> {
    let parts = compose_payload(handles, question);
    retry(
        MAX_ATTEMPTS,
        RATE_LIMIT_BACKOFF,
        GeminiError::is_rate_limit,
        || client.generate(model, parts.clone()),
    )
    .await
}
