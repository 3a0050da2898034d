//! Cells and the ordered cell sequence.
//!
//! A [`Cell`] is one unit of conversation: user-authored text plus the last
//! model output produced for it. Position in the [`CellSequence`] is the only
//! identity a cell has, so inserting or deleting shifts every later cell.
//!
//! Transitions are copy-on-write: callers clone the sequence, apply a change
//! and publish the new value, so a failed run never leaves a half-mutated
//! cell visible to observers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Execution state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunCount {
    /// Settled; `0` means the cell has never been run
    Count(u64),
    /// A model call is in flight; `last` is restored if the marker is cleared
    Running { last: u64 },
}

impl RunCount {
    /// The last committed run number, ignoring any in-flight marker.
    pub fn last(&self) -> u64 {
        match self {
            RunCount::Count(n) => *n,
            RunCount::Running { last } => *last,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunCount::Running { .. })
    }

    /// The same count with the running marker set.
    pub fn running(self) -> Self {
        RunCount::Running { last: self.last() }
    }

    /// The same count with the running marker cleared.
    pub fn settled(self) -> Self {
        RunCount::Count(self.last())
    }
}

impl Default for RunCount {
    fn default() -> Self {
        RunCount::Count(0)
    }
}

impl fmt::Display for RunCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunCount::Running { .. } => write!(f, "[*]"),
            RunCount::Count(0) => write!(f, "[ ]"),
            RunCount::Count(n) => write!(f, "[{}]", n),
        }
    }
}

/// One input/output unit in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    pub output: String,
    #[serde(default)]
    pub run_count: RunCount,
}

impl Cell {
    pub fn blank() -> Self {
        Self::default()
    }

    /// A cell holding `text` that has not been run yet.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    /// Cells with text own a user turn in the transcript.
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// Cells with text and output also own an assistant turn.
    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.run_count.is_running()
    }

    /// A copy of this cell with the running marker set.
    pub fn marked_running(&self) -> Self {
        Self { run_count: self.run_count.running(), ..self.clone() }
    }

    /// A copy of this cell with the running marker cleared.
    pub fn settled(&self) -> Self {
        Self { run_count: self.run_count.settled(), ..self.clone() }
    }

    /// The cell produced by a successful run.
    pub fn committed(text: impl Into<String>, output: impl Into<String>, run: u64) -> Self {
        Self { text: text.into(), output: output.into(), run_count: RunCount::Count(run) }
    }
}

/// The ordered container of cells.
///
/// Never empty: a fresh sequence holds a single blank cell, and every
/// mutation that could leave it empty (or leave a run cell last) appends a
/// blank trailing cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct CellSequence {
    cells: Vec<Cell>,
}

impl CellSequence {
    pub fn new() -> Self {
        Self { cells: vec![Cell::blank()] }
    }

    /// Build a sequence from restored cells, restoring the trailing blank slot.
    ///
    /// Running markers in restored cells are settled; nothing can be in flight
    /// for a sequence that was just loaded.
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        let mut sequence = Self { cells: cells.iter().map(Cell::settled).collect() };
        sequence.ensure_trailing_blank();
        sequence
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }

    /// Fail with [`Error::IndexOutOfRange`] unless `position` names an existing cell.
    pub fn check(&self, position: usize) -> Result<()> {
        if position < self.cells.len() { Ok(()) } else { Err(Error::out_of_range(position, self.cells.len())) }
    }

    pub fn get(&self, position: usize) -> Result<&Cell> {
        self.cells
            .get(position)
            .ok_or_else(|| Error::out_of_range(position, self.cells.len()))
    }

    pub fn is_last(&self, position: usize) -> bool {
        position + 1 == self.cells.len()
    }

    /// Replace the cell at `position`, returning the previous value.
    pub fn replace(&mut self, position: usize, cell: Cell) -> Result<Cell> {
        self.check(position)?;
        Ok(std::mem::replace(&mut self.cells[position], cell))
    }

    /// Insert a blank cell at `position + 1` and return its position.
    pub fn insert_blank_after(&mut self, position: usize) -> Result<usize> {
        self.check(position)?;
        self.cells.insert(position + 1, Cell::blank());
        Ok(position + 1)
    }

    /// Remove the cell at `position`.
    pub fn remove(&mut self, position: usize) -> Result<Cell> {
        self.check(position)?;
        let removed = self.cells.remove(position);
        self.ensure_trailing_blank();
        Ok(removed)
    }

    /// Append a blank cell if the sequence is empty or its last cell holds text.
    ///
    /// Returns `true` when a cell was appended.
    pub fn ensure_trailing_blank(&mut self) -> bool {
        match self.cells.last() {
            Some(last) if !last.has_text() => false,
            _ => {
                self.cells.push(Cell::blank());
                true
            }
        }
    }

    /// Mark `position` and every later cell with text as running.
    ///
    /// Returns the positions that were marked, in increasing order.
    pub fn mark_running_from(&mut self, position: usize) -> Result<Vec<usize>> {
        self.check(position)?;
        let mut marked = Vec::new();
        for (index, cell) in self.cells.iter_mut().enumerate().skip(position) {
            if index == position || cell.has_text() {
                *cell = cell.marked_running();
                marked.push(index);
            }
        }
        Ok(marked)
    }

    /// Clear every running marker, returning how many were cleared.
    pub fn clear_running(&mut self) -> usize {
        let mut cleared = 0;
        for cell in self.cells.iter_mut().filter(|c| c.is_running()) {
            *cell = cell.settled();
            cleared += 1;
        }
        cleared
    }

    /// Highest committed run number across the sequence.
    pub fn max_run_count(&self) -> u64 {
        self.cells.iter().map(|c| c.run_count.last()).max().unwrap_or(0)
    }
}

impl Default for CellSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Cell>> for CellSequence {
    fn from(cells: Vec<Cell>) -> Self {
        Self::from_cells(cells)
    }
}

impl From<CellSequence> for Vec<Cell> {
    fn from(sequence: CellSequence) -> Self {
        sequence.cells
    }
}

impl<'a> IntoIterator for &'a CellSequence {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Monotonically increasing run sequence owned by the coordinator.
///
/// Every executed cell takes the next number, so run counts order runs
/// globally rather than per cell.
#[derive(Debug, Default)]
pub struct RunCounter {
    last: AtomicU64,
}

impl RunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose first [`RunCounter::next`] returns `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        Self { last: AtomicU64::new(last) }
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
