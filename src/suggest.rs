//! Autocomplete suggestions.
//!
//! Two halves:
//!
//! - **[`IndexSuggester`]** answers one suggestion request against the index
//!   and renders the OpenSearch suggestions array
//!   `[query, [names...], [], []]`. It never fails: short input and index
//!   errors both yield an empty list. Suggestions are not recorded as
//!   analytics.
//! - **[`SuggestionBox`]** / **[`SuggestionEngine`]** drive an interactive
//!   search box: input below the floor clears immediately, input at or above
//!   it schedules a debounced fetch, and each fetch carries a generation
//!   number so only the newest response is ever applied. The engine aborts
//!   superseded timers and fetches.
//!
//! # Keyboard Model
//!
//! | Key | Effect |
//! |-----|--------|
//! | Down | move selection toward the last suggestion, stopping there |
//! | Up | move selection toward "none" (-1) |
//! | Enter | submit the selected name, else the typed text if non-blank |
//! | Escape | close the list, keep the text |

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::SuggestionsConfig;
use crate::error::PortalResult;
use crate::index::IndexService;
use crate::models::SearchQuery;

/// Source of suggestion names for a piece of text.
#[async_trait]
pub trait SuggestionFetcher: Send + Sync {
    async fn fetch(&self, text: &str) -> PortalResult<Vec<String>>;
}

/// Suggestions served straight from the search index.
pub struct IndexSuggester {
    index: Arc<dyn IndexService>,
    index_name: String,
    min_chars: usize,
    limit: usize,
}

fn long_enough(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() >= min_chars
}

impl IndexSuggester {
    pub fn new(index: Arc<dyn IndexService>, index_name: impl Into<String>, config: &SuggestionsConfig) -> Self {
        Self {
            index,
            index_name: index_name.into(),
            min_chars: config.min_chars,
            limit: config.limit,
        }
    }

    /// The OpenSearch suggestions array for `q`.
    pub async fn suggest(&self, q: Option<&str>) -> Value {
        let q = q.unwrap_or_default();
        if !long_enough(q, self.min_chars) {
            return json!([q, []]);
        }

        match self.fetch(q.trim()).await {
            Ok(names) => json!([q, names, [], []]),
            Err(e) => {
                tracing::warn!(query = %q, error = %e, "suggestion lookup failed");
                json!([q, []])
            }
        }
    }
}

#[async_trait]
impl SuggestionFetcher for IndexSuggester {
    async fn fetch(&self, text: &str) -> PortalResult<Vec<String>> {
        let query = SearchQuery {
            attributes_to_retrieve: vec!["name".to_string(), "description".to_string()],
            ..SearchQuery::text(text, self.limit)
        };
        let response = self.index.search(&self.index_name, &query).await?;
        Ok(response
            .hits
            .iter()
            .filter_map(|hit| hit.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

// ============ Search box state ============

/// A scheduled fetch. Only the ticket with the current generation may
/// update the suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionTicket {
    pub generation: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEffect {
    /// Below the floor: suggestions were cleared and nothing is fetched.
    Cleared,
    /// A fetch should run after the debounce delay.
    Schedule(SuggestionTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Submit(String),
}

/// Interactive search-box state.
#[derive(Debug, Clone)]
pub struct SuggestionBox {
    text: String,
    suggestions: Vec<String>,
    selected: isize,
    open: bool,
    generation: u64,
    min_chars: usize,
}

impl SuggestionBox {
    pub fn new(min_chars: usize) -> Self {
        Self {
            text: String::new(),
            suggestions: Vec::new(),
            selected: -1,
            open: false,
            generation: 0,
            min_chars,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Index of the highlighted suggestion, if any.
    pub fn selected(&self) -> Option<usize> {
        usize::try_from(self.selected).ok()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn clear(&mut self) {
        self.suggestions.clear();
        self.selected = -1;
        self.open = false;
    }

    /// The text changed. Every call invalidates outstanding tickets.
    pub fn input(&mut self, text: &str) -> InputEffect {
        self.text = text.to_string();
        self.generation += 1;

        if !long_enough(text, self.min_chars) {
            self.clear();
            return InputEffect::Cleared;
        }

        InputEffect::Schedule(SuggestionTicket {
            generation: self.generation,
            text: text.trim().to_string(),
        })
    }

    /// Apply a fetch result. Returns `false` when the ticket is stale.
    pub fn apply(&mut self, ticket: &SuggestionTicket, names: Vec<String>) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.suggestions = names;
        self.selected = -1;
        self.open = !self.suggestions.is_empty();
        true
    }

    pub fn key(&mut self, key: Key) -> KeyAction {
        match key {
            Key::Down => {
                if self.open && !self.suggestions.is_empty() {
                    let last = self.suggestions.len() as isize - 1;
                    self.selected = (self.selected + 1).min(last);
                }
                KeyAction::None
            }
            Key::Up => {
                if self.open {
                    self.selected = (self.selected - 1).max(-1);
                }
                KeyAction::None
            }
            Key::Enter => {
                let chosen = self
                    .selected()
                    .filter(|_| self.open)
                    .and_then(|i| self.suggestions.get(i))
                    .cloned();
                // Stop any fetch in flight from reopening the list.
                self.generation += 1;
                match chosen {
                    Some(name) => {
                        self.text = name.clone();
                        self.clear();
                        KeyAction::Submit(name)
                    }
                    None => {
                        self.clear();
                        let typed = self.text.trim();
                        if typed.is_empty() {
                            KeyAction::None
                        } else {
                            KeyAction::Submit(typed.to_string())
                        }
                    }
                }
            }
            Key::Escape => {
                self.open = false;
                self.selected = -1;
                KeyAction::None
            }
        }
    }

    /// A pointer press landed outside the box.
    pub fn click_outside(&mut self) {
        self.open = false;
        self.selected = -1;
    }
}

// ============ Async driver ============

/// Debounced, cancellable suggestion driver around a [`SuggestionBox`].
pub struct SuggestionEngine {
    state: Arc<Mutex<SuggestionBox>>,
    fetcher: Arc<dyn SuggestionFetcher>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SuggestionEngine {
    pub fn new(fetcher: Arc<dyn SuggestionFetcher>, min_chars: usize, debounce: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SuggestionBox::new(min_chars))),
            fetcher,
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub fn from_config(fetcher: Arc<dyn SuggestionFetcher>, config: &SuggestionsConfig) -> Self {
        Self::new(fetcher, config.min_chars, Duration::from_millis(config.debounce_ms))
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Feed a keystroke's resulting text. Must be called inside a tokio
    /// runtime.
    pub fn input(&self, text: &str) {
        self.cancel_pending();
        let effect = self.state.lock().unwrap().input(text);

        let InputEffect::Schedule(ticket) = effect else {
            return;
        };

        let state = self.state.clone();
        let fetcher = self.fetcher.clone();
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let names = match fetcher.fetch(&ticket.text).await {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(query = %ticket.text, error = %e, "suggestion fetch failed");
                    Vec::new()
                }
            };
            if !state.lock().unwrap().apply(&ticket, names) {
                tracing::debug!(generation = ticket.generation, "discarding stale suggestions");
            }
        });
        *self.pending.lock().unwrap() = Some(handle);
    }

    pub fn key(&self, key: Key) -> KeyAction {
        let action = self.state.lock().unwrap().key(key);
        if let KeyAction::Submit(_) = action {
            self.cancel_pending();
        }
        action
    }

    pub fn click_outside(&self) {
        self.state.lock().unwrap().click_outside();
    }

    /// A copy of the current box state.
    pub fn snapshot(&self) -> SuggestionBox {
        self.state.lock().unwrap().clone()
    }
}

impl Drop for SuggestionEngine {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
