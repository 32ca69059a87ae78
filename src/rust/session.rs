//! Per-visitor interactive state.
//!
//! Sessions expire after a period without requests, and the store holds a
//! bounded number of them; the least recently used one is dropped to make room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::classifier::PredictionResult;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// What one visitor has supplied and seen so far.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// The most recent successfully classified image, upright, as a PNG data URI
    pub current_image: Option<String>,
    pub last_prediction: Option<PredictionResult>,
    /// Label picked in the content selector, if the visitor changed it
    pub selected_label: Option<String>,
}

impl SessionState {
    pub fn last_predicted_label(&self) -> Option<&str> {
        self.last_prediction.as_ref().map(|p| p.predicted_label.as_str())
    }

    /// Replaces the image and prediction together. The content selection
    /// follows the new prediction again.
    pub fn record(&mut self, image_data_uri: String, prediction: PredictionResult) {
        self.current_image = Some(image_data_uri);
        self.last_prediction = Some(prediction);
        self.selected_label = None;
    }

    /// The label whose content panel should be shown: an explicit selection
    /// if it is in `vocabulary`, otherwise the predicted label.
    pub fn panel_label<'a>(&'a self, vocabulary: &'a [String]) -> Option<&'a str> {
        self.selected_label
            .as_deref()
            .filter(|label| vocabulary.iter().any(|l| l == label))
            .or_else(|| self.last_predicted_label())
    }
}

#[derive(Debug)]
struct Entry {
    state: SessionState,
    touched: Instant,
}

/// All live sessions, keyed by the id stored in the visitor's cookie.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose sessions expire after `ttl` without use, holding at most `capacity` of them.
    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// A snapshot of the session, or an empty state for unknown or expired ids.
    pub async fn get(&self, id: Uuid) -> SessionState {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions, now);
        match sessions.get_mut(&id) {
            Some(entry) => {
                entry.touched = now;
                entry.state.clone()
            }
            None => SessionState::default(),
        }
    }

    /// Applies `update` to the session, creating it first if needed.
    pub async fn update<F, R>(&self, id: Uuid, update: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions, now);

        if !sessions.contains_key(&id) && sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                debug!("Session store full, dropping least recently used session {}", oldest);
                sessions.remove(&oldest);
            }
        }

        let entry = sessions.entry(id).or_insert_with(|| Entry {
            state: SessionState::default(),
            touched: now,
        });
        entry.touched = now;
        update(&mut entry.state)
    }

    /// Ends the session. Returns whether it existed.
    pub async fn end(&self, id: Uuid) -> bool {
        self.sessions.lock().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions, now);
        sessions.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions, now);
        sessions.len()
    }

    fn prune(&self, sessions: &mut HashMap<Uuid, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.touched) < self.ttl);
        if sessions.len() < before {
            debug!("Expired {} idle sessions", before - sessions.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LabelScore;

    fn prediction(label: &str) -> PredictionResult {
        PredictionResult {
            predicted_label: label.to_string(),
            predicted_index: 0,
            ranked: vec![LabelScore {
                label: label.to_string(),
                probability: 1.0,
            }],
        }
    }

    fn image() -> String {
        "data:image/png;base64,AAAA".to_string()
    }

    #[test]
    fn test_panel_label_defaults_to_prediction() {
        let vocab = vec!["a".to_string(), "b".to_string()];
        let mut state = SessionState::default();
        assert_eq!(state.panel_label(&vocab), None);

        state.record(image(), prediction("a"));
        assert_eq!(state.panel_label(&vocab), Some("a"));

        state.selected_label = Some("b".into());
        assert_eq!(state.panel_label(&vocab), Some("b"));

        state.selected_label = Some("zzz".into());
        assert_eq!(state.panel_label(&vocab), Some("a"));
    }

    #[test]
    fn test_record_resets_selection() {
        let mut state = SessionState {
            selected_label: Some("b".into()),
            ..SessionState::default()
        };
        state.record(image(), prediction("a"));
        assert_eq!(state.selected_label, None);
        assert_eq!(state.last_predicted_label(), Some("a"));
        assert_eq!(state.current_image.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        store.update(first, |s| s.record(image(), prediction("a"))).await;
        assert_eq!(store.get(first).await.last_predicted_label(), Some("a"));
        assert_eq!(store.get(second).await.last_predicted_label(), None);
        assert!(!store.contains(second).await);

        assert!(store.end(first).await);
        assert!(!store.end(first).await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::with_limits(Duration::from_secs(60), 16);
        let (idle, active) = (Uuid::new_v4(), Uuid::new_v4());
        store.update(idle, |s| s.record(image(), prediction("a"))).await;
        store.update(active, |s| s.record(image(), prediction("b"))).await;

        tokio::time::advance(Duration::from_secs(40)).await;
        // Reading a session keeps it alive
        assert_eq!(store.get(active).await.last_predicted_label(), Some("b"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!store.contains(idle).await);
        assert!(store.contains(active).await);
        assert_eq!(store.get(idle).await.last_predicted_label(), None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_drops_least_recently_used() {
        let store = SessionStore::with_limits(DEFAULT_SESSION_TTL, 2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        store.update(ids[0], |s| s.record(image(), prediction("a"))).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.update(ids[1], |s| s.record(image(), prediction("b"))).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.get(ids[0]).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.update(ids[2], |s| s.record(image(), prediction("c"))).await;

        assert_eq!(store.len().await, 2);
        assert!(store.contains(ids[0]).await);
        assert!(!store.contains(ids[1]).await);
        assert!(store.contains(ids[2]).await);
    }

    #[tokio::test]
    async fn test_cookieless_requests_stay_bounded() {
        let store = SessionStore::with_limits(DEFAULT_SESSION_TTL, 8);
        for _ in 0..100 {
            store.update(Uuid::new_v4(), |s| s.record(image(), prediction("a"))).await;
        }
        assert_eq!(store.len().await, 8);
    }
}
