//! Answer prompt construction.

use notes_rag_core::models::ScoredResult;

/// Built-in answer prompt. `{retrieved_chunks}` and `{user_query}` are
/// replaced by [`build_prompt`].
pub const INSTRUCTION_PROMPT: &str = r#"You are an expert Q&A assistant. Your task is to directly answer the user's question based *only* on the provided context. Do not be conversational. If the context contains the answer, synthesize it into a clear and direct response. If it does not, say "The provided notes do not contain this information."
Context:
{retrieved_chunks}

Question:
{user_query}

Answer:"#;

/// Join chunk texts in rank order, one per line.
pub fn format_context(results: &[ScoredResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute context and question into `template`.
///
/// The context is substituted first so that a literal `{user_query}`
/// inside a note is not replaced by the question.
pub fn build_prompt(template: &str, context: &str, query: &str) -> String {
    match template.split_once("{retrieved_chunks}") {
        Some((before, after)) => format!(
            "{}{}{}",
            before.replace("{user_query}", query),
            context,
            after.replace("{user_query}", query)
        ),
        None => template.replace("{user_query}", query),
    }
}
