//! # In-memory `BoardStore`
//!
//! One async mutex serializes every transaction. A transaction works on a
//! private copy of the board and publishes it on commit, so a dropped
//! transaction leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    BoardStore, BoardTx, Identity, IdentityCounters, IdentityKey, NewPost, Post, PostId,
    PostTallies, ThreadPath,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
struct StoredPost {
    id: PostId,
    timestamp: DateTime<Utc>,
    content: String,
    author: IdentityKey,
    /// `(root_id, path)`, unset between insertion and placement.
    placement: Option<(PostId, ThreadPath)>,
    hidden: bool,
    views: u64,
    likes: u64,
    dislikes: u64,
}

impl StoredPost {
    fn to_post(&self) -> Option<Post> {
        let (root_id, path) = self.placement.clone()?;
        Some(Post {
            id: self.id,
            timestamp: self.timestamp,
            content: self.content.clone(),
            author: self.author.clone(),
            root_id,
            path,
            hidden: self.hidden,
            views: self.views,
            likes: self.likes,
            dislikes: self.dislikes,
        })
    }

    fn root_id(&self) -> Option<PostId> {
        self.placement.as_ref().map(|(root, _)| *root)
    }
}

#[derive(Debug, Clone)]
struct BoardState {
    identities: BTreeMap<IdentityKey, Identity>,
    posts: BTreeMap<PostId, StoredPost>,
    next_id: PostId,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            identities: BTreeMap::new(),
            posts: BTreeMap::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBoardStore {
    state: Arc<Mutex<BoardState>>,
}

impl InMemoryBoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed view of one identity.
    pub async fn identity(&self, key: &IdentityKey) -> Option<Identity> {
        self.state.lock().await.identities.get(key).cloned()
    }

    /// Committed view of one placed post.
    pub async fn post(&self, id: PostId) -> Option<Post> {
        self.state.lock().await.posts.get(&id).and_then(StoredPost::to_post)
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.posts.len()
    }

    /// Moderation: moves an identity into the absorbing restricted state.
    pub async fn restrict(&self, key: &IdentityKey, message: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let identity = state
            .identities
            .get_mut(key)
            .ok_or_else(|| anyhow!("identity {key} not found"))?;
        identity.restricted = true;
        identity.restricted_message = message.to_string();
        Ok(())
    }

    /// Moderation: hides a post from thread selection.
    pub async fn hide_post(&self, id: PostId) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let post = state.posts.get_mut(&id).ok_or_else(|| anyhow!("post {id} not found"))?;
        post.hidden = true;
        Ok(())
    }
}

#[async_trait]
impl BoardStore for InMemoryBoardStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn BoardTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<BoardState>,
    working: BoardState,
}

impl MemoryTx {
    fn stored_post_mut(&mut self, id: PostId) -> anyhow::Result<&mut StoredPost> {
        self.working
            .posts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("post {id} not found"))
    }
}

#[async_trait]
impl BoardTx for MemoryTx {
    async fn identity(&mut self, key: &IdentityKey) -> anyhow::Result<Option<Identity>> {
        Ok(self.working.identities.get(key).cloned())
    }

    async fn insert_identity(&mut self, identity: &Identity) -> anyhow::Result<()> {
        if self.working.identities.contains_key(&identity.key) {
            bail!("identity {} already exists", identity.key);
        }
        self.working
            .identities
            .insert(identity.key.clone(), identity.clone());
        Ok(())
    }

    async fn save_identity(&mut self, identity: &Identity) -> anyhow::Result<()> {
        let stored = self
            .working
            .identities
            .get_mut(&identity.key)
            .ok_or_else(|| anyhow!("identity {} not found", identity.key))?;
        stored.verified = identity.verified;
        stored.captcha_required = identity.captcha_required;
        stored.last_posted_at = identity.last_posted_at;
        stored.view_ticket = identity.view_ticket;
        Ok(())
    }

    async fn add_identity_counters(
        &mut self,
        key: &IdentityKey,
        delta: &IdentityCounters,
    ) -> anyhow::Result<bool> {
        match self.working.identities.get_mut(key) {
            Some(identity) => {
                identity.counters.apply(delta);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn random_root(&mut self, exclude: &IdentityKey) -> anyhow::Result<Option<PostId>> {
        let eligible: Vec<PostId> = self
            .working
            .posts
            .values()
            .filter(|post| !post.hidden && &post.author != exclude)
            .filter_map(StoredPost::root_id)
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        Ok(Some(eligible[rand::random_range(0..eligible.len())]))
    }

    async fn thread(&mut self, root_id: PostId) -> anyhow::Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .working
            .posts
            .values()
            .filter(|post| post.root_id() == Some(root_id))
            .filter_map(StoredPost::to_post)
            .collect();
        posts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(posts)
    }

    async fn post(&mut self, id: PostId) -> anyhow::Result<Option<Post>> {
        Ok(self.working.posts.get(&id).and_then(StoredPost::to_post))
    }

    async fn insert_post(&mut self, post: &NewPost) -> anyhow::Result<PostId> {
        let id = self.working.next_id;
        self.working.next_id += 1;
        self.working.posts.insert(
            id,
            StoredPost {
                id,
                timestamp: post.timestamp,
                content: post.content.clone(),
                author: post.author.clone(),
                placement: None,
                hidden: false,
                views: 0,
                likes: 0,
                dislikes: 0,
            },
        );
        Ok(id)
    }

    async fn place_post(
        &mut self,
        id: PostId,
        root_id: PostId,
        path: &ThreadPath,
    ) -> anyhow::Result<()> {
        let taken = self
            .working
            .posts
            .values()
            .any(|post| post.id != id && matches!(&post.placement, Some((_, p)) if p == path));
        if taken {
            bail!("path {path} already in use");
        }
        self.stored_post_mut(id)?.placement = Some((root_id, path.clone()));
        Ok(())
    }

    async fn add_post_tallies(&mut self, id: PostId, delta: &PostTallies) -> anyhow::Result<()> {
        let post = self.stored_post_mut(id)?;
        post.views += delta.views;
        post.likes += delta.likes;
        post.dislikes += delta.dislikes;
        Ok(())
    }

    async fn add_thread_views(&mut self, root_id: PostId) -> anyhow::Result<()> {
        self.working
            .posts
            .values_mut()
            .filter(|post| post.root_id() == Some(root_id))
            .for_each(|post| post.views += 1);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(author: &str, content: &str) -> NewPost {
        NewPost {
            timestamp: Utc::now(),
            content: content.to_string(),
            author: IdentityKey::new(author),
        }
    }

    async fn seed_root(store: &InMemoryBoardStore, author: &str) -> PostId {
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_post(&new_post(author, "root")).await.unwrap();
        tx.place_post(id, id, &ThreadPath::root(id)).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryBoardStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_identity(&Identity::first_contact("10.0.0.1".into()))
                .await
                .unwrap();
            tx.insert_post(&new_post("10.0.0.1", "lost")).await.unwrap();
        }
        assert!(store.identity(&"10.0.0.1".into()).await.is_none());
        assert_eq!(store.post_count().await, 0);
    }

    #[tokio::test]
    async fn ids_increase_and_unplaced_posts_stay_invisible() {
        let store = InMemoryBoardStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = tx.insert_post(&new_post("a", "one")).await.unwrap();
        let second = tx.insert_post(&new_post("a", "two")).await.unwrap();
        assert!(second > first);
        assert!(tx.post(first).await.unwrap().is_none());
        assert_eq!(tx.random_root(&"b".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn random_root_skips_own_and_hidden_posts() {
        let store = InMemoryBoardStore::new();
        let mine = seed_root(&store, "me").await;
        let hidden = seed_root(&store, "other").await;
        store.hide_post(hidden).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.random_root(&"me".into()).await.unwrap(), None);
        assert_eq!(tx.random_root(&"someone".into()).await.unwrap(), Some(mine));
    }

    #[tokio::test]
    async fn thread_is_ordered_component_wise() {
        let store = InMemoryBoardStore::new();
        let root = seed_root(&store, "a").await;
        let mut tx = store.begin().await.unwrap();
        let mut last = ThreadPath::root(root);
        // Push ids past 9 so string ordering would disagree.
        for _ in 0..11 {
            let id = tx.insert_post(&new_post("b", "reply")).await.unwrap();
            last = ThreadPath::root(root).child(id);
            tx.place_post(id, root, &last).await.unwrap();
        }
        let thread = tx.thread(root).await.unwrap();
        assert_eq!(thread.len(), 12);
        assert!(thread.windows(2).all(|w| w[0].path < w[1].path));
        assert_eq!(thread.last().unwrap().path, last);
    }

    #[tokio::test]
    async fn place_post_rejects_duplicate_path() {
        let store = InMemoryBoardStore::new();
        let root = seed_root(&store, "a").await;
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_post(&new_post("a", "dup")).await.unwrap();
        assert!(tx.place_post(id, root, &ThreadPath::root(root)).await.is_err());
    }

    #[tokio::test]
    async fn counters_on_missing_identity_report_absence() {
        let store = InMemoryBoardStore::new();
        let mut tx = store.begin().await.unwrap();
        let delta = IdentityCounters { views_sent: 1, ..Default::default() };
        assert!(!tx.add_identity_counters(&"ghost".into(), &delta).await.unwrap());
    }
}
