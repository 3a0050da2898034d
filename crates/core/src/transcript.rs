//! Transcript entries and the cutoff computation.
//!
//! The transcript is the linear `user`/`assistant` conversation sent to the
//! model. It is a flattening of the cells that hold text: each such cell owns
//! a user turn, and an assistant turn once it has output. Blank cells own no
//! turns, so cell positions and transcript indexes drift apart;
//! [`compute_cutoff`] is the single place that maps one onto the other.

use crate::cell::CellSequence;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    /// Blank user entries mark a slot reserved for a cell that has not run.
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::User && self.content.is_empty()
    }
}

/// Transcript index at which the user turn of the cell at `position` belongs, plus one.
///
/// Equivalently: the length of the history the model sees when running that
/// cell, its own user turn included. `position == cells.len()` is valid and
/// yields the cutoff for a cell appended at the end.
pub fn compute_cutoff(cells: &CellSequence, position: usize) -> Result<usize> {
    if position > cells.len() {
        return Err(Error::out_of_range(position, cells.len()));
    }

    let preceding: usize = cells.as_slice()[..position]
        .iter()
        .filter(|cell| cell.has_text())
        .map(|cell| if cell.has_output() { 2 } else { 1 })
        .sum();

    Ok(preceding + 1)
}

/// Ordered conversation history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transcript implied by committed cells.
    pub fn from_cells(cells: &CellSequence) -> Self {
        let mut entries = Vec::new();
        for cell in cells.iter().filter(|c| c.has_text()) {
            entries.push(Message::user(cell.text.clone()));
            if cell.has_output() {
                entries.push(Message::assistant(cell.output.clone()));
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }

    /// Entries `[0, cutoff)`: the history visible to a cell with this cutoff.
    pub fn history(&self, cutoff: usize) -> &[Message] {
        &self.entries[..cutoff.min(self.entries.len())]
    }

    /// Write a cell's user turn at `cutoff - 1`.
    ///
    /// When the cell already owns that slot the entry is overwritten (a
    /// re-run); otherwise a new slot is opened there, which at the tail is
    /// a plain append.
    pub fn write_user_turn(&mut self, cutoff: usize, content: impl Into<String>, owns_slot: bool) {
        self.write_at(cutoff.saturating_sub(1), Message::user(content), owns_slot);
    }

    /// Write a cell's assistant turn at `cutoff`, overwriting or opening a slot.
    pub fn write_assistant_turn(&mut self, cutoff: usize, content: impl Into<String>, owns_slot: bool) {
        self.write_at(cutoff, Message::assistant(content), owns_slot);
    }

    /// Remove the entry at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<Message> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Insert a blank user placeholder at `index`, clamped to the end.
    ///
    /// Returns the index the placeholder actually landed at.
    pub fn insert_placeholder(&mut self, index: usize) -> usize {
        let index = index.min(self.entries.len());
        self.entries.insert(index, Message::user(""));
        index
    }

    fn write_at(&mut self, index: usize, message: Message, overwrite: bool) {
        if overwrite && index < self.entries.len() {
            self.entries[index] = message;
        } else {
            let index = index.min(self.entries.len());
            self.entries.insert(index, message);
        }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use proptest::prelude::*;

    fn cells(pairs: &[(&str, &str)]) -> CellSequence {
        CellSequence::from_cells(pairs.iter().map(|(t, o)| Cell::committed(*t, *o, 1)).collect())
    }

    #[test]
    fn test_cutoff_first_cell_is_one() {
        let cells = CellSequence::new();
        assert_eq!(compute_cutoff(&cells, 0).unwrap(), 1);
    }

    #[test]
    fn test_cutoff_counts_user_and_assistant_turns() {
        let cells = cells(&[("a", "1"), ("b", ""), ("c", "3")]);
        assert_eq!(compute_cutoff(&cells, 1).unwrap(), 3);
        assert_eq!(compute_cutoff(&cells, 2).unwrap(), 4);
        assert_eq!(compute_cutoff(&cells, 3).unwrap(), 6);
    }

    #[test]
    fn test_cutoff_skips_blank_cells() {
        let sparse = cells(&[("a", "1"), ("", ""), ("c", "3")]);
        let dense = cells(&[("a", "1"), ("c", "3")]);
        assert_eq!(compute_cutoff(&sparse, 2).unwrap(), compute_cutoff(&dense, 1).unwrap());
    }

    #[test]
    fn test_cutoff_at_length_is_valid() {
        let cells = cells(&[("a", "1")]);
        assert_eq!(cells.len(), 2);
        assert_eq!(compute_cutoff(&cells, 2).unwrap(), 3);
    }

    #[test]
    fn test_cutoff_past_length_is_rejected() {
        let cells = CellSequence::new();
        assert!(matches!(
            compute_cutoff(&cells, 2),
            Err(Error::IndexOutOfRange { position: 2, len: 1 })
        ));
    }

    #[test]
    fn test_from_cells_flattens_runnable_cells() {
        let cells = cells(&[("a", "1"), ("", ""), ("b", "")]);
        let transcript = Transcript::from_cells(&cells);
        assert_eq!(
            transcript.as_slice(),
            &[Message::user("a"), Message::assistant("1"), Message::user("b")]
        );
    }

    #[test]
    fn test_write_user_turn_appends_on_first_run() {
        let mut transcript = Transcript::new();
        transcript.write_user_turn(1, "hello", false);
        assert_eq!(transcript.as_slice(), &[Message::user("hello")]);
    }

    #[test]
    fn test_write_user_turn_overwrites_owned_slot() {
        let mut transcript = Transcript::from_cells(&cells(&[("a", "1")]));
        transcript.write_user_turn(1, "edited", true);
        assert_eq!(transcript.as_slice(), &[Message::user("edited"), Message::assistant("1")]);
    }

    #[test]
    fn test_write_user_turn_opens_slot_before_later_cells() {
        let mut transcript = Transcript::from_cells(&cells(&[("a", "1"), ("c", "3")]));
        transcript.write_user_turn(3, "b", false);
        assert_eq!(transcript.get(2), Some(&Message::user("b")));
        assert_eq!(transcript.get(3), Some(&Message::user("c")));
        assert_eq!(transcript.len(), 5);
    }

    #[test]
    fn test_write_assistant_turn_overwrite_or_insert() {
        let mut transcript = Transcript::from_cells(&cells(&[("a", "1"), ("b", "")]));
        transcript.write_assistant_turn(1, "one", true);
        assert_eq!(transcript.get(1), Some(&Message::assistant("one")));

        transcript.write_assistant_turn(3, "two", false);
        assert_eq!(transcript.get(3), Some(&Message::assistant("two")));
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn test_remove_entry() {
        let mut transcript = Transcript::from_cells(&cells(&[("a", "1")]));
        assert_eq!(transcript.remove(1), Some(Message::assistant("1")));
        assert_eq!(transcript.remove(5), None);
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_history_is_clamped() {
        let transcript = Transcript::from_cells(&cells(&[("a", "1")]));
        assert_eq!(transcript.history(1), &[Message::user("a")]);
        assert_eq!(transcript.history(10).len(), 2);
    }

    #[test]
    fn test_insert_placeholder_is_clamped() {
        let mut transcript = Transcript::from_cells(&cells(&[("a", "1")]));
        assert_eq!(transcript.insert_placeholder(7), 2);
        assert!(transcript.get(2).unwrap().is_placeholder());
        assert_eq!(transcript.insert_placeholder(0), 0);
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn test_transcript_serialization() {
        let transcript = Transcript::from_cells(&cells(&[("a", "1")]));
        let json = serde_json::to_string(&transcript).unwrap();
        assert_eq!(json, r#"[{"role":"user","content":"a"},{"role":"assistant","content":"1"}]"#);
    }

    fn arb_cells() -> impl Strategy<Value = CellSequence> {
        prop::collection::vec(("[ab]{0,2}", "[xy]{0,2}"), 0..8).prop_map(|pairs| {
            CellSequence::from_cells(
                pairs
                    .into_iter()
                    .map(|(text, output)| Cell::committed(text, output, 1))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_cutoff_without_outputs_is_n_plus_one(n in 0usize..12) {
            let ran = (0..n).map(|i| Cell::committed(format!("q{}", i), "", i as u64 + 1)).collect();
            let cells = CellSequence::from_cells(ran);
            prop_assert_eq!(compute_cutoff(&cells, n).unwrap(), n + 1);
        }

        #[test]
        fn prop_cutoff_with_outputs_is_two_n_plus_one(n in 0usize..12) {
            let ran = (0..n).map(|i| Cell::committed(format!("q{}", i), "r", i as u64 + 1)).collect();
            let cells = CellSequence::from_cells(ran);
            prop_assert_eq!(compute_cutoff(&cells, n).unwrap(), 2 * n + 1);
        }

        #[test]
        fn prop_cutoff_is_idempotent(cells in arb_cells(), seed in 0usize..16) {
            let position = seed % (cells.len() + 1);
            prop_assert_eq!(compute_cutoff(&cells, position).unwrap(), compute_cutoff(&cells, position).unwrap());
        }

        #[test]
        fn prop_cutoff_agrees_with_flattened_transcript(cells in arb_cells()) {
            let transcript = Transcript::from_cells(&cells);
            for (position, cell) in cells.iter().enumerate() {
                let cutoff = compute_cutoff(&cells, position).unwrap();
                if cell.has_text() {
                    prop_assert_eq!(transcript.get(cutoff - 1), Some(&Message::user(cell.text.clone())));
                }
                if cell.has_text() && cell.has_output() {
                    prop_assert_eq!(transcript.get(cutoff), Some(&Message::assistant(cell.output.clone())));
                }
            }
            prop_assert_eq!(compute_cutoff(&cells, cells.len()).unwrap(), transcript.len() + 1);
        }
    }
}
