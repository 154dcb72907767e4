//! Prompt construction for the generation stage.

use searchlight_shared::Source;

/// Substituted for an empty retrieval context.
pub const NO_INFORMATION: &str = "No relevant information was found on the web for this query.";

pub const SYSTEM_PROMPT: &str = "\
You are an AI research assistant that provides comprehensive, accurate, and well-sourced answers to user questions. Your responses should be:

1. **Informative and Comprehensive**: Provide detailed explanations that fully address the user's question
2. **Well-Structured**: Organize information logically with clear sections when appropriate
3. **Source-Aware**: Reference the provided sources naturally in your response
4. **Accurate**: Only use information from the provided context and sources
5. **Conversational**: Maintain a helpful and engaging tone
6. **Honest**: If you cannot answer something based on the provided information, say so

When responding:
- Use the context and sources provided to answer the question
- Integrate information from multiple sources when relevant
- Be specific and provide examples when possible
- If the sources don't contain enough information to fully answer the question, acknowledge this limitation
- Maintain conversation context when relevant to the current query";

const CLOSING_INSTRUCTION: &str = "Please provide a comprehensive answer based on the information above. \
Reference specific sources naturally in your response where relevant.";

/// Assemble the user message from history, retrieved context, sources and the question.
///
/// Sections are separated by blank lines; empty history and empty source
/// lists are omitted, while an empty context becomes [`NO_INFORMATION`].
pub fn build_user_prompt(query: &str, context: &str, sources: &[Source], history: &str) -> String {
    let mut parts = Vec::with_capacity(5);

    if !history.is_empty() {
        parts.push(format!("Previous conversation context:\n{history}"));
    }

    let context = if context.trim().is_empty() { NO_INFORMATION } else { context };
    parts.push(format!("Relevant information from web search:\n{context}"));

    if !sources.is_empty() {
        let listed = sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Source {}: {} ({})\n{}", i + 1, s.title, s.url, s.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");
        parts.push(format!("Sources:\n{listed}"));
    }

    parts.push(format!("User Question: {query}"));
    parts.push(CLOSING_INSTRUCTION.to_string());

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_uses_marker() {
        let prompt = build_user_prompt("what?", "", &[], "");
        assert_eq!(
            prompt,
            format!(
                "Relevant information from web search:\n{NO_INFORMATION}\n\nUser Question: what?\n\n{CLOSING_INSTRUCTION}"
            )
        );
    }

    #[test]
    fn full_prompt_sections_in_order() {
        let sources = [Source {
            title: "Rust".into(),
            url: "https://rust-lang.org".into(),
            snippet: "A language".into(),
        }];
        let prompt = build_user_prompt("why rust?", "Rust is fast.", &sources, "User: hi\n\nAssistant: hello");

        let history = prompt.find("Previous conversation context:").unwrap();
        let context = prompt.find("Relevant information from web search:\nRust is fast.").unwrap();
        let listed = prompt.find("Sources:\nSource 1: Rust (https://rust-lang.org)\nA language").unwrap();
        let question = prompt.find("User Question: why rust?").unwrap();
        assert!(history < context && context < listed && listed < question);
        assert!(prompt.ends_with(CLOSING_INSTRUCTION));
    }
}
