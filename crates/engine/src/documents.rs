//! Document desk: layered generation from the knowledge base, and
//! save-triggered change proposals flowing back into it.

use crate::model::ModelCall;
use crate::prompts;
use cellbook_core::{Document, DocumentStore, Error, KnowledgeBase, Message, Result, parse_change_proposals};
use std::sync::Arc;

/// A named system prompt fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub prompt: String,
}

impl Layer {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { name: name.into(), prompt: prompt.into() }
    }
}

pub fn default_layers() -> Vec<Layer> {
    vec![
        Layer::new("Dating App", prompts::dating_app()),
        Layer::new("Speaker Bio", prompts::speaker_bio()),
        Layer::new("Tweet Thread", prompts::tweet_thread()),
    ]
}

pub struct DocumentDesk {
    model: Arc<dyn ModelCall>,
    documents: DocumentStore,
    knowledge: KnowledgeBase,
}

impl DocumentDesk {
    pub fn new(model: Arc<dyn ModelCall>, knowledge: KnowledgeBase) -> Self {
        Self { model, documents: DocumentStore::new(), knowledge }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn knowledge_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.knowledge
    }

    pub fn add_document(&mut self, id: impl Into<String>, document: Document) {
        self.documents.add(id, document);
    }

    /// Generate the document `id` from the knowledge base under the given layers.
    ///
    /// The generated text replaces the document's content and is returned.
    pub async fn generate(&mut self, id: &str, layers: &[Layer]) -> Result<String> {
        self.require(id)?;
        let system = layers.iter().map(|l| l.prompt.as_str()).collect::<Vec<_>>().join("\n");
        let history = [Message::system(system), Message::user(self.knowledge.base.clone())];

        let content = self.model.invoke(&history).await?;
        self.documents.update_content(id, content.as_str());

        tracing::info!(document = id, layers = layers.len(), chars = content.len(), "generated document");
        Ok(content)
    }

    /// Save `content` to document `id` and queue the knowledge changes it implies.
    ///
    /// The content is stored before the model is asked, so a failed or
    /// malformed reply loses no edits. Returns the number of proposals queued.
    pub async fn save(&mut self, id: &str, content: &str) -> Result<usize> {
        self.require(id)?;
        self.documents.update_content(id, content);

        let history = [
            Message::system(prompts::knowledge_manager()),
            Message::user(format!("## Knowledge Base {}\n ## Document {}", self.knowledge.base, content)),
        ];
        let reply = self.model.invoke(&history).await?;

        let proposals = parse_change_proposals(&reply).inspect_err(|err| {
            tracing::warn!(document = id, error = %err, "discarding knowledge manager reply");
        })?;
        let queued = proposals.len();
        self.knowledge.add_proposals(proposals);

        tracing::info!(document = id, queued, "queued knowledge changes");
        Ok(queued)
    }

    fn require(&self, id: &str) -> Result<()> {
        match self.documents.get(id) {
            Some(_) => Ok(()),
            None => Err(Error::Validation(format!("unknown document: {}", id))),
        }
    }
}
