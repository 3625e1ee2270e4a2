//! Key-store contract for quizzes, bank questions and game history.
//!
//! Game logic only sees the `ElementStore` trait; the storage engine
//! behind it is interchangeable. `MemoryStore` is the in-process
//! implementation, optionally seeded from a JSON file at boot.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("element already exists: {0}")]
    Duplicate(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed store file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Anything the store can hold, addressed by a string id.
pub trait StoredElement {
    fn element_id(&self) -> &str;
}

impl StoredElement for crate::types::Quiz {
    fn element_id(&self) -> &str {
        &self.id
    }
}

impl StoredElement for crate::types::Question {
    fn element_id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
pub trait ElementStore<T>: Send + Sync {
    async fn get_element_by_id(&self, id: &str) -> Option<T>;
    async fn get_elements(&self) -> Vec<T>;
    async fn add_element(&self, element: T) -> Result<(), StoreError>;
    async fn replace_element(&self, element: T) -> Result<(), StoreError>;
    async fn delete_element(&self, id: &str) -> Result<(), StoreError>;
    async fn delete_all_elements(&self) -> Result<(), StoreError>;
}

/// Insertion-ordered in-memory store.
pub struct MemoryStore<T> {
    elements: RwLock<Vec<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            elements: RwLock::new(Vec::new()),
        }
    }

    pub fn with_elements(elements: Vec<T>) -> Self {
        Self {
            elements: RwLock::new(elements),
        }
    }
}

#[async_trait]
impl<T> ElementStore<T> for MemoryStore<T>
where
    T: StoredElement + Clone + Send + Sync,
{
    async fn get_element_by_id(&self, id: &str) -> Option<T> {
        self.elements
            .read()
            .await
            .iter()
            .find(|e| e.element_id() == id)
            .cloned()
    }

    async fn get_elements(&self) -> Vec<T> {
        self.elements.read().await.clone()
    }

    async fn add_element(&self, element: T) -> Result<(), StoreError> {
        let mut elements = self.elements.write().await;
        if elements
            .iter()
            .any(|e| e.element_id() == element.element_id())
        {
            return Err(StoreError::Duplicate(element.element_id().to_string()));
        }
        elements.push(element);
        Ok(())
    }

    async fn replace_element(&self, element: T) -> Result<(), StoreError> {
        let mut elements = self.elements.write().await;
        match elements
            .iter_mut()
            .find(|e| e.element_id() == element.element_id())
        {
            Some(slot) => {
                *slot = element;
                Ok(())
            }
            None => Err(StoreError::NotFound(element.element_id().to_string())),
        }
    }

    async fn delete_element(&self, id: &str) -> Result<(), StoreError> {
        let mut elements = self.elements.write().await;
        let before = elements.len();
        elements.retain(|e| e.element_id() != id);
        if elements.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_all_elements(&self) -> Result<(), StoreError> {
        self.elements.write().await.clear();
        Ok(())
    }
}

/// Read a JSON array of elements from disk (quiz/question banks at
/// boot).
pub fn load_elements<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
