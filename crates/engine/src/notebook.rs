//! The execution coordinator.
//!
//! A [`Notebook`] owns the cell sequence and the transcript derived from it.
//! Every operation works on a private copy of the current [`NotebookState`]
//! and publishes the result as one snapshot through a [`watch`] channel, so
//! observers never see a cell without its matching transcript entries.
//!
//! Operations are serialized by a guard. Under [`BusyPolicy::Reject`] a second
//! operation issued while one is in flight fails with [`Error::Busy`]; under
//! [`BusyPolicy::Queue`] it waits for the guard.

use crate::model::ModelCall;
use cellbook_core::logging::{PrivacyConfig, redact_content};
use cellbook_core::{
    BusyPolicy, Cell, CellSequence, Error, NotebookConfig, Result, RunCounter, Transcript, compute_cutoff,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};

/// One published snapshot of the notebook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookState {
    pub cells: CellSequence,
    pub transcript: Transcript,
}

impl NotebookState {
    /// A state whose transcript is derived from `cells`.
    pub fn from_cells(cells: CellSequence) -> Self {
        let transcript = Transcript::from_cells(&cells);
        Self { cells, transcript }
    }
}

/// Result of one committed cell run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub position: usize,
    pub run_count: u64,
    pub cutoff: usize,
    pub output: String,
}

/// A model reply together with the working transcript it was written into.
struct Step {
    cutoff: usize,
    output: String,
    transcript: Transcript,
}

pub struct Notebook {
    model: Arc<dyn ModelCall>,
    state: watch::Sender<NotebookState>,
    runs: RunCounter,
    guard: Mutex<()>,
    busy_policy: BusyPolicy,
    privacy: PrivacyConfig,
}

impl Notebook {
    /// A notebook holding a single blank cell.
    pub fn new(model: Arc<dyn ModelCall>) -> Self {
        Self::with_cells(model, CellSequence::new())
    }

    /// A notebook restored from `cells`.
    ///
    /// The run counter continues after the highest run number in the sequence.
    pub fn with_cells(model: Arc<dyn ModelCall>, cells: CellSequence) -> Self {
        let runs = RunCounter::starting_after(cells.max_run_count());
        let (state, _) = watch::channel(NotebookState::from_cells(cells));
        Self {
            model,
            state,
            runs,
            guard: Mutex::new(()),
            busy_policy: BusyPolicy::default(),
            privacy: PrivacyConfig::default(),
        }
    }

    pub fn with_config(mut self, config: &NotebookConfig) -> Self {
        self.busy_policy = config.busy_policy;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Privacy settings applied to cell text and output in log events.
    pub fn with_privacy(mut self, privacy: PrivacyConfig) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    /// The current snapshot.
    pub fn state(&self) -> NotebookState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<NotebookState> {
        self.state.subscribe()
    }

    /// Cutoff for the cell at `position` in the current snapshot.
    pub fn cutoff(&self, position: usize) -> Result<usize> {
        compute_cutoff(&self.state.borrow().cells, position)
    }

    /// Run the cell at `position` with `input` as its new text.
    ///
    /// On failure the cell's previous contents are restored and the error is
    /// returned; nothing else changes.
    pub async fn run_cell(&self, position: usize, input: &str) -> Result<RunOutcome> {
        let _guard = self.acquire().await?;
        let mut state = self.state();
        state.cells.check(position)?;
        validate_input(input)?;

        let running = state.cells.get(position)?.marked_running();
        let previous = state.cells.replace(position, running)?;
        self.publish(state.clone());
        tracing::info!(position, input = %redact_content(input, &self.privacy), "running cell");

        match self.execute(&state.cells, position, input).await {
            Ok(step) => {
                let outcome = self.commit(&mut state, position, input, step)?;
                self.publish(state);
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(position, error = %err, "cell run failed");
                state.cells.replace(position, previous.settled())?;
                self.publish(state);
                Err(err)
            }
        }
    }

    /// Run the cell at `position` with `input`, then re-run every later cell that has text.
    ///
    /// Each cell is committed and published before the next one starts, so a
    /// later cell always sees the outputs produced earlier in the same cascade.
    /// The first failure halts the cascade with [`Error::CascadeHalted`]:
    /// earlier cells stay committed, while the failing cell and the ones not
    /// yet attempted keep their running markers until
    /// [`clear_running_markers`](Self::clear_running_markers) is called.
    pub async fn run_from_here(&self, position: usize, input: &str) -> Result<Vec<RunOutcome>> {
        let _guard = self.acquire().await?;
        let mut state = self.state();
        state.cells.check(position)?;
        validate_input(input)?;

        let targets = state.cells.mark_running_from(position)?;
        self.publish(state.clone());
        tracing::info!(position, cells = targets.len(), "running cascade");

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let text = if target == position { input.to_string() } else { state.cells.get(target)?.text.clone() };

            let step = match self.execute(&state.cells, target, &text).await {
                Ok(step) => step,
                Err(err) => {
                    tracing::warn!(position = target, committed = outcomes.len(), error = %err, "cascade halted");
                    return Err(Error::CascadeHalted { position: target, source: Box::new(err) });
                }
            };

            outcomes.push(self.commit(&mut state, target, &text, step)?);
            self.publish(state.clone());
        }

        Ok(outcomes)
    }

    /// Insert a blank cell after `position` and return its position.
    ///
    /// A blank user placeholder is shown in the transcript at the new cell's
    /// slot, right after every entry owned by the cells before it. The
    /// placeholder owns nothing: the next committed run re-derives
    /// the transcript from the cells.
    pub async fn insert_blank_after(&self, position: usize) -> Result<usize> {
        let _guard = self.acquire().await?;
        let mut state = self.state();
        state.cells.check(position)?;

        let inserted = state.cells.insert_blank_after(position)?;
        let slot = state.transcript.insert_placeholder(compute_cutoff(&state.cells, inserted)? - 1);
        self.publish(state);

        tracing::debug!(position = inserted, transcript_index = slot, "inserted blank cell");
        Ok(inserted)
    }

    /// Remove the cell at `position`, splicing its turns out of the transcript.
    pub async fn delete(&self, position: usize) -> Result<Cell> {
        let _guard = self.acquire().await?;
        let mut state = self.state();

        let removed = state.cells.remove(position)?;
        state.transcript = Transcript::from_cells(&state.cells);
        self.publish(state);

        tracing::debug!(position, had_output = removed.has_output(), "deleted cell");
        Ok(removed)
    }

    /// Settle every running marker left behind by a halted cascade.
    pub async fn clear_running_markers(&self) -> Result<usize> {
        let _guard = self.acquire().await?;
        let mut state = self.state();

        let cleared = state.cells.clear_running();
        if cleared > 0 {
            self.publish(state);
            tracing::debug!(cleared, "cleared running markers");
        }
        Ok(cleared)
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        match self.busy_policy {
            BusyPolicy::Reject => self.guard.try_lock().map_err(|_| Error::Busy),
            BusyPolicy::Queue => Ok(self.guard.lock().await),
        }
    }

    fn publish(&self, state: NotebookState) {
        self.state.send_replace(state);
    }

    /// Write the cell's user turn, call the model on the history up to the
    /// cutoff, and write the assistant turn.
    async fn execute(&self, cells: &CellSequence, position: usize, input: &str) -> Result<Step> {
        let cell = cells.get(position)?;
        let cutoff = compute_cutoff(cells, position)?;
        let owns_assistant = cell.has_text() && cell.has_output();

        let mut transcript = Transcript::from_cells(cells);
        transcript.write_user_turn(cutoff, input, cell.has_text());

        let output = self.model.invoke(transcript.history(cutoff)).await?;

        if !output.is_empty() {
            transcript.write_assistant_turn(cutoff, output.as_str(), owns_assistant);
        } else if owns_assistant {
            transcript.remove(cutoff);
        }

        Ok(Step { cutoff, output, transcript })
    }

    fn commit(&self, state: &mut NotebookState, position: usize, input: &str, step: Step) -> Result<RunOutcome> {
        let run_count = self.runs.next();
        state.cells.replace(position, Cell::committed(input, step.output.as_str(), run_count))?;
        if state.cells.is_last(position) {
            state.cells.ensure_trailing_blank();
        }
        state.transcript = step.transcript;
        debug_assert_eq!(state.transcript, Transcript::from_cells(&state.cells));

        tracing::info!(
            position,
            run_count,
            cutoff = step.cutoff,
            output = %redact_content(&step.output, &self.privacy),
            "cell committed"
        );
        Ok(RunOutcome { position, run_count, cutoff: step.cutoff, output: step.output })
    }
}

fn validate_input(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(Error::Validation("cell input must not be empty".to_string()));
    }
    Ok(())
}
