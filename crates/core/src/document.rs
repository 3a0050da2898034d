use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A generated or user-edited document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl Document {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self { title: title.into(), url: url.into(), content: String::new() }
    }
}

/// Documents keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStore {
    documents: BTreeMap<String, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the document stored under `id`.
    pub fn add(&mut self, id: impl Into<String>, document: Document) {
        self.documents.insert(id.into(), document);
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Content of `id`, or empty when the document does not exist.
    pub fn content(&self, id: &str) -> &str {
        self.documents.get(id).map(|d| d.content.as_str()).unwrap_or("")
    }

    /// Replace the content of an existing document.
    ///
    /// Unknown ids are left alone; the return value says whether anything changed.
    pub fn update_content(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.documents.get_mut(id) {
            Some(document) => {
                document.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
