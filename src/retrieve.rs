//! Assembly of ranked search hits into a prompt-ready context block.

use crate::types::RankedResult;

/// Fixed answer when retrieval produces nothing usable.
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information in the knowledge base to answer your question.";

/// Joins ranked hits into one labelled context string, best match first.
/// Returns `None` when there are no hits; callers typically substitute
/// [`NO_RELEVANT_INFORMATION`].
pub fn assemble_context(results: &[RankedResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut context = String::new();
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&format!("[Document {}]\n{}", i + 1, result.content));
    }
    Some(context)
}
