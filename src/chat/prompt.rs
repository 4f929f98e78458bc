use crate::history::ChatTurn;
use crate::llm::ChatMessage;
use crate::rag::ChunkSearchResult;

pub const NO_HISTORY_PLACEHOLDER: &str = "No previous conversation";

pub const IPAD_PRO_URL: &str = "https://en.wikipedia.org/wiki/IPad_Pro";
pub const IPAD_MINI_URL: &str = "https://en.wikipedia.org/wiki/IPad_Mini";

const PERSONA: &str = "You are an expert on Apple iPads with comprehensive knowledge from Wikipedia and structured specifications.
Use the following pieces of retrieved context to answer the question accurately.
If you don't know the answer based on the provided context, say that you don't know.
Provide detailed, accurate information about iPad models, specifications, release dates, and features.
Use clear, concise language and cite specific information when possible.
Do not add negative statements after a concise answer, such as what a model doesn't have or doesn't support.";

const LATEST_MODELS: &str = "When answering questions about specific iPad models, use the structured information provided:
- iPad Pro (M4): Latest model with M4 chip, Ultra Retina XDR display, price 99,990 INR
- iPad Air (M3): Latest model with M3 chip, Liquid Retina display, price 79,990 INR
- iPad (11th gen): Latest model with A16 Bionic chip, Liquid Retina display, price 69,990 INR
- iPad mini (A17 Pro): Latest model with A17 Pro chip, compact 8.3-inch design, price 59,990 INR

Always mention the latest models and their key specifications when relevant.";

const HISTORY_RULE: &str = "Also use the chat history to give contextually relevant and coherent responses. If the user is asking a follow-up question, refer to earlier parts of the conversation where appropriate.";

/// Source link for the product line a query names.
///
/// Plain case-insensitive substring match. A query naming both lines, or
/// neither, gets no link.
pub fn select_source_link(query: &str) -> Option<&'static str> {
    let query = query.to_lowercase();
    match (query.contains("pro"), query.contains("mini")) {
        (true, false) => Some(IPAD_PRO_URL),
        (false, true) => Some(IPAD_MINI_URL),
        _ => None,
    }
}

pub fn system_prompt(source_link: Option<&str>) -> String {
    let link_rule = match source_link {
        Some(url) => format!("Provide the source as a link at the end of the response: {}", url),
        None => "Do not append a source link to the response.".to_string(),
    };
    format!("{}\n{}\n\n{}\n\n{}", PERSONA, link_rule, LATEST_MODELS, HISTORY_RULE)
}

/// Retrieved chunk texts separated by blank lines, best match first.
pub fn render_context(results: &[ChunkSearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turns as `User:`/`Assistant:` lines, oldest first.
pub fn render_history(turns: &[ChatTurn]) -> String {
    if turns.is_empty() {
        return NO_HISTORY_PLACEHOLDER.to_string();
    }
    turns
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn user_message(context: &str, history: &str, query: &str) -> String {
    format!(
        "Context: {}\n\nChat History: {}\n\nQuestion: {}",
        context, history, query
    )
}

/// System instruction plus the single user turn sent to the chat model.
pub fn build_messages(
    query: &str,
    results: &[ChunkSearchResult],
    turns: &[ChatTurn],
    source_link: Option<&str>,
) -> Vec<ChatMessage> {
    let context = render_context(results);
    let history = render_history(turns);
    vec![
        ChatMessage::system(system_prompt(source_link)),
        ChatMessage::user(user_message(&context, &history, query)),
    ]
}
