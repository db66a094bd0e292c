use super::model::PromptAnalysis;
use crate::error::OrionError;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const HISTORY_KEY: &str = "orion_prompt_history";
pub const HISTORY_CAPACITY: usize = 20;
const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: u64,
    pub original_preview: String,
    pub optimized_preview: String,
    pub score: u8,
    pub full_analysis: PromptAnalysis,
}

impl HistoryItem {
    pub fn from_analysis(analysis: PromptAnalysis) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let suffix = Uuid::new_v4().simple().to_string();

        Self {
            id: format!("{timestamp}-{}", &suffix[..8]),
            timestamp,
            original_preview: preview(&analysis.original_text),
            optimized_preview: preview(&analysis.optimized_prompt),
            score: analysis.score,
            full_analysis: analysis,
        }
    }
}

/// First 40 characters, with an ellipsis when anything was cut.
pub fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

pub struct HistoryStore<S: KeyValueStore> {
    store: S,
    items: Vec<HistoryItem>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// Rehydrates from `store`. Unreadable or corrupt data yields an empty history.
    pub fn load(store: S) -> Self {
        let items = match store.get(HISTORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
                Ok(mut items) => {
                    items.truncate(HISTORY_CAPACITY);
                    items
                }
                Err(e) => {
                    log::warn!("Discarding corrupt history record: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Could not read history record: {e}");
                Vec::new()
            }
        };

        Self { store, items }
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn record(&mut self, analysis: PromptAnalysis) -> Result<&HistoryItem, OrionError> {
        self.append(HistoryItem::from_analysis(analysis))?;
        Ok(&self.items[0])
    }

    pub fn append(&mut self, item: HistoryItem) -> Result<(), OrionError> {
        self.items.insert(0, item);
        self.items.truncate(HISTORY_CAPACITY);
        self.persist()
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> Result<bool, OrionError> {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), OrionError> {
        self.items.clear();
        self.store.remove(HISTORY_KEY)
    }

    fn persist(&mut self) -> Result<(), OrionError> {
        let serialized = serde_json::to_string(&self.items)?;
        self.store.set(HISTORY_KEY, &serialized)
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
