//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the binary.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Identity, IdentityCounters, IdentityKey, NewPost, Post, PostId, PostTallies};
use crate::path::ThreadPath;

/// Transactional persistence for identities and posts.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Opens one serializable transaction.
    async fn begin(&self) -> anyhow::Result<Box<dyn BoardTx>>;
}

/// One open transaction. Dropping it without [`BoardTx::commit`] rolls back.
#[async_trait]
pub trait BoardTx: Send {
    // Identity operations
    async fn identity(&mut self, key: &IdentityKey) -> anyhow::Result<Option<Identity>>;
    async fn insert_identity(&mut self, identity: &Identity) -> anyhow::Result<()>;
    /// Persists `verified`, `captcha_required`, `last_posted_at` and `view_ticket`.
    /// Counters and moderation fields are left alone.
    async fn save_identity(&mut self, identity: &Identity) -> anyhow::Result<()>;
    /// Adds `delta` to the identity's counters. Returns false if it does not exist.
    async fn add_identity_counters(
        &mut self,
        key: &IdentityKey,
        delta: &IdentityCounters,
    ) -> anyhow::Result<bool>;

    // Post operations
    /// Picks one visible post not authored by `exclude`, uniformly at random,
    /// and returns its root id.
    async fn random_root(&mut self, exclude: &IdentityKey) -> anyhow::Result<Option<PostId>>;
    /// Every post of a thread, ordered by path.
    async fn thread(&mut self, root_id: PostId) -> anyhow::Result<Vec<Post>>;
    async fn post(&mut self, id: PostId) -> anyhow::Result<Option<Post>>;
    /// Inserts a post with no place in the tree yet and returns its new id.
    async fn insert_post(&mut self, post: &NewPost) -> anyhow::Result<PostId>;
    async fn place_post(&mut self, id: PostId, root_id: PostId, path: &ThreadPath)
        -> anyhow::Result<()>;
    async fn add_post_tallies(&mut self, id: PostId, delta: &PostTallies) -> anyhow::Result<()>;
    /// Adds one view to every post of the thread.
    async fn add_thread_views(&mut self, root_id: PostId) -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

/// Remote IP-reputation lookup. Higher scores are more suspicious.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReputationChecker: Send + Sync {
    /// Returns a score in `[0, 1]`.
    async fn score(&self, address: &IdentityKey) -> anyhow::Result<f64>;
}

/// Remote CAPTCHA token verification.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> anyhow::Result<bool>;
}

/// Transport-level facts about a request, as seen by the web adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub peer: Option<IpAddr>,
    /// Value of the trusted forwarding header, if present.
    pub forwarded: Option<String>,
}

/// Derives the identity a request acts as.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, origin: &RequestOrigin) -> Option<IdentityKey>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
