//! # Domain Models
//!
//! These structs represent the core entities of the board: the per-address
//! trust record and the posts that make up threads.
//! Post ids are storage-assigned and strictly increasing.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::path::ThreadPath;

/// Storage-assigned post identifier. A thread is named by its root post's id.
pub type PostId = i64;

/// Opaque identity token. In practice the caller's network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Activity counters kept on every identity.
///
/// Also used as an increment when applied through
/// [`BoardTx::add_identity_counters`](crate::ports::BoardTx::add_identity_counters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityCounters {
    pub likes_sent: u64,
    pub likes_received: u64,
    pub dislikes_sent: u64,
    pub dislikes_received: u64,
    pub views_sent: u64,
    pub views_received: u64,
}

impl IdentityCounters {
    pub fn apply(&mut self, delta: &IdentityCounters) {
        self.likes_sent += delta.likes_sent;
        self.likes_received += delta.likes_received;
        self.dislikes_sent += delta.dislikes_sent;
        self.dislikes_received += delta.dislikes_received;
        self.views_sent += delta.views_sent;
        self.views_received += delta.views_received;
    }
}

/// The per-address trust record.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub key: IdentityKey,
    /// Set by moderation only; absorbing.
    pub restricted: bool,
    pub restricted_message: String,
    pub verified: bool,
    pub captcha_required: bool,
    pub last_posted_at: Option<DateTime<Utc>>,
    /// Root id of the thread this identity was last shown, if not yet voted on.
    pub view_ticket: Option<PostId>,
    pub counters: IdentityCounters,
}

impl Identity {
    /// A first-contact record: verified, but always facing a CAPTCHA on its
    /// first post.
    pub fn first_contact(key: IdentityKey) -> Self {
        Self {
            key,
            restricted: false,
            restricted_message: String::new(),
            verified: true,
            captcha_required: true,
            last_posted_at: None,
            view_ticket: None,
            counters: IdentityCounters::default(),
        }
    }

    pub fn trust_state(&self) -> TrustState {
        if self.restricted {
            TrustState::Restricted
        } else if !self.verified {
            TrustState::Unverified
        } else if self.captcha_required {
            TrustState::VerifiedCaptchaRequired
        } else {
            TrustState::Verified
        }
    }
}

/// Coarse view of the `verified`/`captcha_required`/`restricted` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    Unverified,
    VerifiedCaptchaRequired,
    Verified,
    Restricted,
}

/// A post as stored, after its place in the tree has been fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub author: IdentityKey,
    pub root_id: PostId,
    pub path: ThreadPath,
    pub hidden: bool,
    pub views: u64,
    pub likes: u64,
    pub dislikes: u64,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.id == self.root_id
    }
}

/// Fields known before insertion; id, root and path come afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub author: IdentityKey,
}

/// Increment applied to a post's tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostTallies {
    pub views: u64,
    pub likes: u64,
    pub dislikes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Like,
    Dislike,
}

impl VoteAction {
    pub fn from_like_flag(is_like: bool) -> Self {
        if is_like {
            VoteAction::Like
        } else {
            VoteAction::Dislike
        }
    }

    /// Voter-side counter increment.
    pub fn sent(self) -> IdentityCounters {
        match self {
            VoteAction::Like => IdentityCounters { likes_sent: 1, ..Default::default() },
            VoteAction::Dislike => IdentityCounters { dislikes_sent: 1, ..Default::default() },
        }
    }

    /// Author-side counter increment.
    pub fn received(self) -> IdentityCounters {
        match self {
            VoteAction::Like => IdentityCounters { likes_received: 1, ..Default::default() },
            VoteAction::Dislike => IdentityCounters { dislikes_received: 1, ..Default::default() },
        }
    }

    pub fn tally(self) -> PostTallies {
        match self {
            VoteAction::Like => PostTallies { likes: 1, ..Default::default() },
            VoteAction::Dislike => PostTallies { dislikes: 1, ..Default::default() },
        }
    }
}
