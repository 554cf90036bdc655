//! Paginated, mutable view of one resource's messages for one user.
//!
//! The list is newest first. Pagination reads older messages and appends
//! them. Realtime changes are merged synchronously and never produce two
//! entries with the same id. Async operations are not serialized against
//! each other; whichever finishes last writes last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use realtime_api::{messages_topic, ChangeEnvelope, ChangeKind};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::model::Message;
use crate::ports::MessagePort;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Page size for every fetch.
    pub limit: usize,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    /// Longest accepted message, in characters.
    pub max_content_len: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            auto_refresh: false,
            refresh_interval: Duration::from_millis(30_000),
            max_content_len: 1000,
        }
    }
}

impl StoreOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_auto_refresh(mut self, every: Duration) -> Self {
        self.auto_refresh = true;
        self.refresh_interval = every;
        self
    }

    pub fn with_max_content_len(mut self, len: usize) -> Self {
        self.max_content_len = len;
        self
    }

    /// Raise values the store cannot run with to the nearest usable ones.
    fn normalized(mut self) -> Self {
        if self.limit == 0 {
            warn!("page limit 0 raised to 1");
            self.limit = 1;
        }
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            warn!(interval = ?self.refresh_interval, "refresh interval raised to 1ms");
            self.refresh_interval = MIN_REFRESH_INTERVAL;
        }
        self
    }
}

const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Observable state of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreState {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub loading_more: bool,
    pub sending: bool,
    pub error: Option<String>,
    pub has_more: bool,
}

#[derive(Default)]
struct Shared {
    state: StoreState,
    /// Server-side position of the next page. Not used for display.
    offset: usize,
}

struct Identity {
    resource_id: String,
    user_id: String,
}

struct Inner {
    identity: Option<Identity>,
    port: Arc<dyn MessagePort>,
    options: StoreOptions,
    shared: Mutex<Shared>,
    disposed: AtomicBool,
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Apply a state change unless the store was disposed meanwhile.
    fn update<R: Default>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        let mut guard = self.shared.lock();
        if self.is_disposed() {
            trace!("update on disposed message store ignored");
            return R::default();
        }
        f(&mut guard)
    }

    fn require_identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or_else(|| {
            Error::InvalidArgument("resource id and user id are required".into())
        })
    }

    async fn fetch(&self, reset: bool) {
        let Some(id) = self.identity.as_ref() else {
            return;
        };
        if self.is_disposed() {
            return;
        }
        let limit = self.options.limit;
        let offset = self.update(|s| {
            if reset && s.state.messages.is_empty() {
                s.state.loading = true;
            } else {
                s.state.loading_more = true;
            }
            s.state.error = None;
            if reset {
                0
            } else {
                s.offset
            }
        });
        debug!(resource_id = %id.resource_id, offset, limit, reset, "fetching messages");
        let res = self
            .port
            .fetch_messages(&id.resource_id, &id.user_id, limit, offset)
            .await;
        self.update(|s| {
            s.state.loading = false;
            s.state.loading_more = false;
            match res {
                Ok(page) => {
                    s.state.has_more = page.len() == limit;
                    if reset {
                        s.offset = page.len();
                        s.state.messages.clear();
                    } else {
                        s.offset += page.len();
                    }
                    append_unique(&mut s.state.messages, page);
                }
                Err(e) => {
                    warn!(resource_id = %id.resource_id, "fetching messages failed: {e:#}");
                    s.state.error = Some(e.to_string());
                }
            }
        });
    }

    async fn refresh(&self) {
        self.update(|s| s.offset = 0);
        self.fetch(true).await;
    }

    async fn send(&self, content: &str) -> Result<Message> {
        let id = self.require_identity()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidArgument("message content is empty".into()));
        }
        let max = self.options.max_content_len;
        if content.chars().count() > max {
            return Err(Error::InvalidArgument(format!(
                "message exceeds {max} characters"
            )));
        }
        self.update(|s| {
            s.state.sending = true;
            s.state.error = None;
        });
        match self
            .port
            .send_message(&id.resource_id, &id.user_id, content)
            .await
        {
            Ok(message) => {
                self.update(|s| {
                    s.state.sending = false;
                    // a realtime insert may have beaten us here
                    if prepend_unique(&mut s.state.messages, message.clone()) {
                        s.offset += 1;
                    }
                });
                Ok(message)
            }
            Err(e) => {
                let err = Error::port(e);
                warn!(resource_id = %id.resource_id, "sending message failed: {err}");
                self.update(|s| {
                    s.state.sending = false;
                    s.state.error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }

    async fn delete(&self, message_id: &str) -> Result<()> {
        let id = self.require_identity()?;
        if message_id.is_empty() {
            return Err(Error::InvalidArgument("message id is required".into()));
        }
        match self
            .port
            .delete_message(message_id, &id.user_id, &id.resource_id)
            .await
        {
            Ok(()) => {
                self.update(|s| remove_by_id(s, message_id));
                Ok(())
            }
            Err(e) => {
                let err = Error::port(e);
                warn!(resource_id = %id.resource_id, message_id, "deleting message failed: {err}");
                self.update(|s| s.state.error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    fn add(&self, message: Message) -> bool {
        self.update(|s| {
            let added = prepend_unique(&mut s.state.messages, message);
            if added {
                s.offset += 1;
            }
            added
        })
    }

    fn replace(&self, message: Message) -> bool {
        self.update(|s| {
            match s.state.messages.iter_mut().find(|m| m.id == message.id) {
                Some(slot) => {
                    *slot = message;
                    true
                }
                None => false,
            }
        })
    }

    fn remove(&self, message_id: &str) -> bool {
        self.update(|s| remove_by_id(s, message_id))
    }

    fn apply_change(&self, change: &ChangeEnvelope) -> bool {
        match change.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let message = match change.decode_record::<Message>() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(topic = %change.topic, "undecodable message change: {e:#}");
                        return false;
                    }
                };
                if change.kind == ChangeKind::Insert {
                    self.add(message)
                } else {
                    self.replace(message)
                }
            }
            ChangeKind::Delete => match change.old_id() {
                Some(id) => self.remove(id),
                None => {
                    warn!(topic = %change.topic, "delete change without id");
                    false
                }
            },
        }
    }
}

fn prepend_unique(list: &mut Vec<Message>, message: Message) -> bool {
    if list.iter().any(|m| m.id == message.id) {
        return false;
    }
    list.insert(0, message);
    true
}

fn append_unique(list: &mut Vec<Message>, page: Vec<Message>) {
    for message in page {
        if !list.iter().any(|m| m.id == message.id) {
            list.push(message);
        }
    }
}

fn remove_by_id(s: &mut Shared, message_id: &str) -> bool {
    let before = s.state.messages.len();
    s.state.messages.retain(|m| m.id != message_id);
    let removed = s.state.messages.len() != before;
    if removed {
        s.offset = s.offset.saturating_sub(1);
    }
    removed
}

/// Message list for one `(resource, user)` pair.
///
/// A store opened without a resource or user is disabled: it stays empty,
/// never loads and never calls the port. A different identity needs a new
/// store; dispose the old one first.
pub struct MessageStore {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageStore {
    /// Create a store and load its first page.
    pub async fn open(
        resource_id: Option<&str>,
        user_id: Option<&str>,
        port: Arc<dyn MessagePort>,
        options: StoreOptions,
    ) -> Self {
        let identity = match (resource_id, user_id) {
            (Some(r), Some(u)) if !r.is_empty() && !u.is_empty() => Some(Identity {
                resource_id: r.to_string(),
                user_id: u.to_string(),
            }),
            _ => None,
        };
        let enabled = identity.is_some();
        let store = Self {
            inner: Arc::new(Inner {
                identity,
                port,
                options: options.normalized(),
                shared: Mutex::new(Shared::default()),
                disposed: AtomicBool::new(false),
            }),
            tasks: Mutex::new(Vec::new()),
        };
        if !enabled {
            debug!("message store disabled: missing resource or user");
            return store;
        }
        store.inner.fetch(true).await;
        if store.inner.options.auto_refresh {
            store.spawn_auto_refresh();
        }
        store
    }

    fn spawn_auto_refresh(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.options.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately; the initial load already ran
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.is_disposed() {
                    break;
                }
                trace!("auto refresh");
                inner.refresh().await;
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Route realtime changes from `rx` into the merge operations. Changes
    /// for other resources are ignored.
    pub fn attach_feed(&self, mut rx: UnboundedReceiver<ChangeEnvelope>) {
        let Some(id) = self.inner.identity.as_ref() else {
            return;
        };
        let topic = messages_topic(&id.resource_id);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if inner.is_disposed() {
                    break;
                }
                if change.topic != topic {
                    trace!(topic = %change.topic, "change for another resource");
                    continue;
                }
                inner.apply_change(&change);
            }
        });
        self.tasks.lock().push(handle);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.identity.is_some()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.inner.identity.as_ref().map(|i| i.resource_id.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.inner.identity.as_ref().map(|i| i.user_id.as_str())
    }

    pub fn state(&self) -> StoreState {
        self.inner.shared.lock().state.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.shared.lock().state.messages.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.shared.lock().state.loading
    }

    pub fn loading_more(&self) -> bool {
        self.inner.shared.lock().state.loading_more
    }

    pub fn sending(&self) -> bool {
        self.inner.shared.lock().state.sending
    }

    pub fn error(&self) -> Option<String> {
        self.inner.shared.lock().state.error.clone()
    }

    pub fn has_more(&self) -> bool {
        self.inner.shared.lock().state.has_more
    }

    /// Fetch one page. Failures land in [`error`](Self::error), never in
    /// the return value.
    pub async fn fetch(&self, reset: bool) {
        self.inner.fetch(reset).await;
    }

    /// Fetch the next older page. Does not consult `has_more`; callers check it.
    pub async fn load_more(&self) {
        self.inner.fetch(false).await;
    }

    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Send a message. A port failure is recorded in `error` and also returned.
    pub async fn send(&self, content: &str) -> Result<Message> {
        self.inner.send(content).await
    }

    /// Delete a message through the port, then drop it locally. A port
    /// failure is recorded in `error`, returned, and leaves the list untouched.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.inner.delete(message_id).await
    }

    /// Realtime insert. Returns false if the id is already present.
    pub fn add_message(&self, message: Message) -> bool {
        self.inner.add(message)
    }

    /// Realtime update: replace the entry with the same id in place.
    pub fn update_message(&self, message: Message) -> bool {
        self.inner.replace(message)
    }

    /// Realtime delete.
    pub fn remove_message(&self, message_id: &str) -> bool {
        self.inner.remove(message_id)
    }

    /// Merge one realtime change envelope.
    pub fn apply_change(&self, change: &ChangeEnvelope) -> bool {
        self.inner.apply_change(change)
    }

    pub fn clear_error(&self) {
        self.inner.update(|s| s.state.error = None);
    }

    /// Stop background work. Operations still in flight complete against
    /// the port but no longer touch the state.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    #[cfg(test)]
    fn offset(&self) -> usize {
        self.inner.shared.lock().offset
    }
}

impl Drop for MessageStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedPort {
        pages: Mutex<VecDeque<anyhow::Result<Vec<Message>>>>,
        fetches: Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl MessagePort for ScriptedPort {
        async fn fetch_messages(
            &self,
            _resource_id: &str,
            _user_id: &str,
            limit: usize,
            offset: usize,
        ) -> anyhow::Result<Vec<Message>> {
            self.fetches.lock().push((limit, offset));
            self.pages.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn send_message(
            &self,
            resource_id: &str,
            user_id: &str,
            content: &str,
        ) -> anyhow::Result<Message> {
            Ok(msg_in(resource_id, user_id, &format!("sent-{content}")))
        }

        async fn delete_message(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn msg(id: &str) -> Message {
        msg_in("hab-1", "u1", id)
    }

    fn msg_in(resource: &str, author: &str, id: &str) -> Message {
        Message {
            id: id.into(),
            resource_id: resource.into(),
            author_id: author.into(),
            content: format!("content of {id}"),
            created_at: 0,
            author_profile: None,
        }
    }

    async fn store_with(pages: Vec<Vec<Message>>, limit: usize) -> (MessageStore, Arc<ScriptedPort>) {
        let port = Arc::new(ScriptedPort::default());
        port.pages.lock().extend(pages.into_iter().map(Ok));
        let store = MessageStore::open(
            Some("hab-1"),
            Some("u1"),
            port.clone(),
            StoreOptions::default().with_limit(limit),
        )
        .await;
        (store, port)
    }

    #[tokio::test]
    async fn offset_tracks_every_mutation() {
        let (store, port) = store_with(vec![vec![msg("a"), msg("b")], vec![msg("c")]], 2).await;
        assert_eq!(store.offset(), 2);
        assert!(store.has_more());

        store.send("hello").await.unwrap();
        assert_eq!(store.offset(), 3);
        assert!(store.add_message(msg("rt")));
        assert_eq!(store.offset(), 4);
        assert!(store.remove_message("a"));
        assert_eq!(store.offset(), 3);
        store.delete_message("b").await.unwrap();
        assert_eq!(store.offset(), 2);

        store.load_more().await;
        assert_eq!(port.fetches.lock().last(), Some(&(2, 2)));
        assert_eq!(store.offset(), 3);
        assert!(!store.has_more());
    }

    #[tokio::test]
    async fn offset_never_negative() {
        let (store, _port) = store_with(vec![vec![]], 2).await;
        assert_eq!(store.offset(), 0);
        assert!(store.add_message(msg("x")));
        assert!(store.remove_message("x"));
        assert!(!store.remove_message("x"));
        assert_eq!(store.offset(), 0);
    }

    #[tokio::test]
    async fn zero_limit_is_raised() {
        let port = Arc::new(ScriptedPort::default());
        let store = MessageStore::open(
            Some("hab-1"),
            Some("u1"),
            port.clone(),
            StoreOptions::default().with_limit(0),
        )
        .await;
        assert_eq!(port.fetches.lock().as_slice(), &[(1, 0)]);
        // an empty history ends pagination
        assert!(!store.has_more());
    }

    #[tokio::test]
    async fn zero_refresh_interval_still_refreshes() {
        let port = Arc::new(ScriptedPort::default());
        let store = MessageStore::open(
            Some("hab-1"),
            Some("u1"),
            port.clone(),
            StoreOptions::default().with_auto_refresh(Duration::ZERO),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(port.fetches.lock().len() > 1);
        store.dispose();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let settled = port.fetches.lock().len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(port.fetches.lock().len(), settled);
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let (store, _port) = store_with(vec![vec![msg("a"), msg("b"), msg("c")]], 50).await;
        let mut edited = msg("b");
        edited.content = "edited".into();
        assert!(store.update_message(edited.clone()));
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.messages()[1], edited);
        assert!(!store.update_message(msg("zzz")));
        assert_eq!(store.messages().len(), 3);
    }

    #[tokio::test]
    async fn page_overlapping_realtime_insert_stays_unique() {
        let (store, _port) = store_with(vec![vec![msg("a")], vec![msg("b"), msg("c")]], 1).await;
        assert!(store.add_message(msg("c")));
        store.load_more().await;
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn content_validation() {
        let (store, _port) = store_with(vec![], 50).await;
        assert!(matches!(
            store.send("   ").await,
            Err(Error::InvalidArgument(_))
        ));
        let long = "x".repeat(1001);
        assert!(matches!(
            store.send(&long).await,
            Err(Error::InvalidArgument(_))
        ));
        let sent = store.send("  hi  ").await.unwrap();
        assert_eq!(sent.content, "sent-hi");
    }

    #[tokio::test]
    async fn disposed_store_ignores_updates() {
        let (store, _port) = store_with(vec![vec![msg("a")]], 50).await;
        store.dispose();
        assert!(!store.add_message(msg("b")));
        store.refresh().await;
        assert_eq!(store.messages(), vec![msg("a")]);
        assert!(store.is_disposed());
    }

    #[tokio::test]
    async fn applies_change_envelopes() {
        let (store, _port) = store_with(vec![vec![msg("a")]], 50).await;
        let topic = messages_topic("hab-1");
        let insert = ChangeEnvelope::insert(topic.clone(), &msg("b")).unwrap();
        assert!(store.apply_change(&insert));
        assert!(!store.apply_change(&insert));
        let delete = ChangeEnvelope::delete(topic.clone(), "a");
        assert!(store.apply_change(&delete));
        let garbage = ChangeEnvelope {
            topic,
            kind: ChangeKind::Insert,
            record: Some(serde_json::json!({"nope": 1})),
            old_record: None,
            commit_timestamp: None,
        };
        assert!(!store.apply_change(&garbage));
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["b"]);
    }
}
