pub mod documents;
pub mod model;
pub mod notebook;
pub mod prompts;

pub use documents::{DocumentDesk, Layer, default_layers};
pub use model::{ModelCall, ProviderModel};
pub use notebook::{Notebook, NotebookState, RunOutcome};

pub use cellbook_core::{Error, Result};
