//! Knowledge base and the change proposals produced when a document is saved.
//!
//! A saved document is compared against the knowledge base by the model,
//! which answers with a JSON list of proposed edits. Proposals queue here
//! until the user accepts or rejects them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of a proposed knowledge change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Edit,
}

/// A single proposed change to the knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProposal {
    #[serde(rename = "update")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub original_fact: String,
    pub updated_fact: String,
}

impl ChangeProposal {
    pub fn add(updated_fact: impl Into<String>) -> Self {
        Self { kind: ChangeKind::Add, original_fact: String::new(), updated_fact: updated_fact.into() }
    }

    pub fn edit(original_fact: impl Into<String>, updated_fact: impl Into<String>) -> Self {
        Self { kind: ChangeKind::Edit, original_fact: original_fact.into(), updated_fact: updated_fact.into() }
    }
}

#[derive(Debug, Deserialize)]
struct ProposalEnvelope {
    changes: Vec<ChangeProposal>,
}

/// Parse a model reply of the form `{"changes": [...]}`.
///
/// The reply may be wrapped in a fenced code block, with or without a
/// `json` language tag.
pub fn parse_change_proposals(text: &str) -> Result<Vec<ChangeProposal>> {
    let body = strip_code_fence(text);
    serde_json::from_str::<ProposalEnvelope>(body)
        .map(|envelope| envelope.changes)
        .map_err(|e| Error::MalformedStructuredResponse(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

/// Free-text knowledge plus the queue of pending proposals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub base: String,
    pub edits: Vec<ChangeProposal>,
}

impl KnowledgeBase {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into(), edits: Vec::new() }
    }

    /// Replace the knowledge text wholesale.
    pub fn update(&mut self, base: impl Into<String>) {
        self.base = base.into();
    }

    pub fn add_proposals(&mut self, proposals: impl IntoIterator<Item = ChangeProposal>) {
        self.edits.extend(proposals);
    }

    /// Apply the pending proposal at `index` and drop it from the queue.
    pub fn accept(&mut self, index: usize) -> Result<ChangeProposal> {
        let proposal = self.take(index)?;
        match proposal.kind {
            ChangeKind::Edit if !proposal.original_fact.is_empty() && self.base.contains(&proposal.original_fact) => {
                self.base = self.base.replacen(&proposal.original_fact, &proposal.updated_fact, 1);
            }
            ChangeKind::Add | ChangeKind::Edit => {
                self.base.push('\n');
                self.base.push_str(&proposal.updated_fact);
            }
        }
        Ok(proposal)
    }

    /// Drop the pending proposal at `index` without applying it.
    pub fn reject(&mut self, index: usize) -> Result<ChangeProposal> {
        self.take(index)
    }

    fn take(&mut self, index: usize) -> Result<ChangeProposal> {
        if index >= self.edits.len() {
            return Err(Error::out_of_range(index, self.edits.len()));
        }
        Ok(self.edits.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let text = r#"{"changes": [{"update": "add", "original_fact": "", "updated_fact": "Likes tea"}]}"#;
        let proposals = parse_change_proposals(text).unwrap();
        assert_eq!(proposals, vec![ChangeProposal::add("Likes tea")]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"changes\": [{\"update\": \"edit\", \"original_fact\": \"Lives in Paris\", \"updated_fact\": \"Lives in Lyon\"}]}\n```";
        let proposals = parse_change_proposals(text).unwrap();
        assert_eq!(proposals, vec![ChangeProposal::edit("Lives in Paris", "Lives in Lyon")]);
    }

    #[test]
    fn test_parse_bare_fence_and_missing_original() {
        let text = "```\n{\"changes\": [{\"update\": \"add\", \"updated_fact\": \"Runs marathons\"}]}\n```";
        let proposals = parse_change_proposals(text).unwrap();
        assert_eq!(proposals[0].original_fact, "");
    }

    #[test]
    fn test_parse_empty_changes() {
        assert!(parse_change_proposals(r#"{"changes": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_change_proposals("Sure! Here are the edits you asked for.").unwrap_err();
        assert!(matches!(err, Error::MalformedStructuredResponse(_)));

        let err = parse_change_proposals(r#"{"edits": []}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedStructuredResponse(_)));

        let err = parse_change_proposals(r#"{"changes": [{"update": "delete", "updated_fact": "x"}]}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedStructuredResponse(_)));
    }

    #[test]
    fn test_accept_add_appends_fact() {
        let mut kb = KnowledgeBase::new("Name: Ada");
        kb.add_proposals(vec![ChangeProposal::add("Likes tea")]);
        kb.accept(0).unwrap();
        assert_eq!(kb.base, "Name: Ada\nLikes tea");
        assert!(kb.edits.is_empty());
    }

    #[test]
    fn test_accept_edit_replaces_fact() {
        let mut kb = KnowledgeBase::new("Lives in Paris\nLikes tea");
        kb.add_proposals(vec![ChangeProposal::edit("Lives in Paris", "Lives in Lyon")]);
        kb.accept(0).unwrap();
        assert_eq!(kb.base, "Lives in Lyon\nLikes tea");
    }

    #[test]
    fn test_accept_edit_with_unknown_original_appends() {
        let mut kb = KnowledgeBase::new("Likes tea");
        kb.add_proposals(vec![ChangeProposal::edit("Lives in Paris", "Lives in Lyon")]);
        kb.accept(0).unwrap();
        assert_eq!(kb.base, "Likes tea\nLives in Lyon");
    }

    #[test]
    fn test_reject_drops_only_that_proposal() {
        let mut kb = KnowledgeBase::new("");
        kb.add_proposals(vec![ChangeProposal::add("one"), ChangeProposal::add("two")]);
        let rejected = kb.reject(0).unwrap();
        assert_eq!(rejected.updated_fact, "one");
        assert_eq!(kb.edits, vec![ChangeProposal::add("two")]);
        assert_eq!(kb.base, "");
    }

    #[test]
    fn test_accept_out_of_range() {
        let mut kb = KnowledgeBase::new("");
        assert!(matches!(kb.accept(0), Err(Error::IndexOutOfRange { position: 0, len: 0 })));
    }
}
