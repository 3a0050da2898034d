pub mod cell;
pub mod config;
pub mod document;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod transcript;

pub use cell::{Cell, CellSequence, RunCount, RunCounter};
pub use config::{BusyPolicy, Config, NotebookConfig, ProviderConfig};
pub use document::{Document, DocumentStore};
pub use error::{Error, Result};
pub use knowledge::{ChangeKind, ChangeProposal, KnowledgeBase, parse_change_proposals};
pub use transcript::{Message, Role, Transcript, compute_cutoff};
