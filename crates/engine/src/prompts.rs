//! System prompts for the document desk
//!
//! Layer prompts shape generated documents; the knowledge manager prompt
//! turns a saved document into change proposals for the knowledge base.

/// Knowledge manager prompt
///
/// The reply must be the JSON object understood by
/// [`cellbook_core::parse_change_proposals`].
pub fn knowledge_manager() -> &'static str {
    "You maintain a personal knowledge base: a plain list of facts about the user. \
    You will receive the current knowledge base and a document the user just edited. \
    Find facts in the document that are new or that contradict the knowledge base.

## Output Format
Reply with a single JSON object and nothing else:

{\"changes\": [{\"update\": \"add\", \"original_fact\": \"\", \"updated_fact\": \"...\"}, \
{\"update\": \"edit\", \"original_fact\": \"...\", \"updated_fact\": \"...\"}]}

- Use `add` for a fact the knowledge base does not contain. Leave `original_fact` empty.
- Use `edit` for a fact the document changes. Copy `original_fact` verbatim from the knowledge base.
- Reply with `{\"changes\": []}` when nothing changed."
}

/// Dating app profile layer
pub fn dating_app() -> &'static str {
    "Write a dating app profile for the user from the facts you are given. \
    Keep it warm and specific, under 150 words, and avoid cliches."
}

/// Speaker bio layer
pub fn speaker_bio() -> &'static str {
    "Write a third-person speaker bio for the user from the facts you are given, \
    suitable for a conference program. One paragraph, under 120 words."
}

/// Tweet thread layer
pub fn tweet_thread() -> &'static str {
    "Write a short thread of tweets introducing the user from the facts you are given. \
    Number each tweet and keep every tweet under 280 characters."
}
