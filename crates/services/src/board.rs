//! # BoardService
//!
//! The three operations the outside world can invoke. Each one writes in
//! exactly one transaction; any error drops it and nothing it touched is
//! committed.
//!
//! Reputation and CAPTCHA calls go out with no transaction open. A short
//! read-only transaction decides whether a call is needed, and the write
//! transaction re-checks the record before changing it.

use std::sync::Arc;

use domains::{
    BoardStore, Clock, DomainError, IdentityKey, NewPost, Post, PostId, Result, VoteAction,
};
use tracing::{debug, error, info};

use crate::content::ContentFilter;
use crate::gate::ReputationGate;
use crate::ledger::IdentityLedger;
use crate::thread;
use crate::ticket;
use crate::utils::ip_hash;
use crate::vote::{self, VoteOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub identity: IdentityKey,
    /// Only consulted when the ledger currently requires a CAPTCHA.
    pub captcha_token: Option<String>,
    pub content: String,
    pub reply_to: Option<PostId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub identity: IdentityKey,
    pub post_id: PostId,
    pub action: VoteAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteReceipt {
    /// False when the post's author had no record to credit. The voter and
    /// the post tally are counted either way.
    pub counted: bool,
    /// The voted thread after the vote, in path order.
    pub thread: Vec<Post>,
}

pub struct BoardService {
    store: Arc<dyn BoardStore>,
    gate: ReputationGate,
    filter: ContentFilter,
    ledger: IdentityLedger,
    clock: Arc<dyn Clock>,
}

impl BoardService {
    pub fn new(
        store: Arc<dyn BoardStore>,
        gate: ReputationGate,
        filter: ContentFilter,
        ledger: IdentityLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, gate, filter, ledger, clock }
    }

    /// Returns whether the caller's next post needs a CAPTCHA.
    pub async fn verify(&self, identity: &IdentityKey) -> Result<bool> {
        let result = self.verify_inner(identity).await;
        observe("verify", identity, &result);
        result
    }

    async fn verify_inner(&self, identity: &IdentityKey) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let known = self.ledger.verify_known(tx.as_mut(), identity).await?;
        if let Some(captcha_required) = known {
            tx.commit().await?;
            return Ok(captcha_required);
        }
        drop(tx);

        self.gate.check_reputation(identity).await?;

        let mut tx = self.store.begin().await?;
        let captcha_required = self.ledger.record_first_contact(tx.as_mut(), identity).await?;
        tx.commit().await?;
        Ok(captcha_required)
    }

    /// Stores the caller's post and returns the thread they are shown next.
    /// The caller's ticket now names that thread.
    pub async fn post(&self, request: PostRequest) -> Result<Vec<Post>> {
        let result = self.post_inner(&request).await;
        observe("post", &request.identity, &result);
        result
    }

    async fn post_inner(&self, request: &PostRequest) -> Result<Vec<Post>> {
        let now = self.clock.now();
        // Restriction and cooldown win over content rejection.
        let mut tx = self.store.begin().await?;
        let seen = self.ledger.check_post(tx.as_mut(), &request.identity, now).await?;
        drop(tx);

        let screened = self.filter.screen(&request.content, &request.identity)?;
        let captcha_required = seen.captcha_required;
        if captcha_required {
            self.gate.check_captcha(request.captcha_token.as_deref()).await?;
        }

        let mut tx = self.store.begin().await?;
        let mut identity = self
            .ledger
            .consume_for_post(tx.as_mut(), &request.identity, now, captcha_required)
            .await?;

        let shown = thread::select_thread(tx.as_mut(), &request.identity).await?;
        let root_id = shown
            .first()
            .map(|post| post.root_id)
            .ok_or_else(|| DomainError::NotFound("Thread".into()))?;

        let stored = thread::append_post(
            tx.as_mut(),
            NewPost {
                timestamp: now,
                content: screened.content,
                author: screened.author,
            },
            request.reply_to,
        )
        .await?;

        ticket::issue(tx.as_mut(), &mut identity, root_id).await?;
        tx.commit().await?;

        debug!(
            ip_hash = %ip_hash(&request.identity),
            post_id = stored.id,
            path = %stored.path,
            ticket = root_id,
            "post stored"
        );
        Ok(shown)
    }

    /// Records one vote on a post of the caller's ticketed thread and
    /// returns that thread's tallies.
    pub async fn vote(&self, request: VoteRequest) -> Result<VoteReceipt> {
        let result = self.vote_inner(&request).await;
        observe("vote", &request.identity, &result);
        result
    }

    async fn vote_inner(&self, request: &VoteRequest) -> Result<VoteReceipt> {
        let mut tx = self.store.begin().await?;
        let outcome =
            vote::cast_vote(tx.as_mut(), &request.identity, request.post_id, request.action)
                .await?;
        let thread = tx.thread(outcome.root_id()).await?;
        tx.commit().await?;
        Ok(VoteReceipt {
            counted: matches!(outcome, VoteOutcome::Counted { .. }),
            thread,
        })
    }
}

fn observe<T>(operation: &'static str, identity: &IdentityKey, result: &Result<T>) {
    match result {
        Ok(_) => debug!(operation, ip_hash = %ip_hash(identity), "accepted"),
        Err(DomainError::Internal(detail)) => {
            error!(operation, ip_hash = %ip_hash(identity), error = %detail, "failed")
        }
        Err(reason) => info!(operation, ip_hash = %ip_hash(identity), %reason, "denied"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{MockCaptchaVerifier, MockReputationChecker, SystemClock};
    use storage_adapters::InMemoryBoardStore;

    use crate::ledger::LedgerPolicy;

    fn service(store: &InMemoryBoardStore) -> BoardService {
        let mut reputation = MockReputationChecker::new();
        reputation.expect_score().returning(|_| Ok(0.0));
        let mut captcha = MockCaptchaVerifier::new();
        captcha.expect_verify().returning(|token| Ok(token == "ok"));
        BoardService::new(
            Arc::new(store.clone()),
            ReputationGate::new(Arc::new(reputation), Arc::new(captcha), 0.90),
            ContentFilter::new(["spam"], "££", IdentityKey::new("1.1.1.1")),
            IdentityLedger::new(LedgerPolicy {
                captcha_probability: 0.0,
                ..LedgerPolicy::default()
            }),
            Arc::new(SystemClock),
        )
    }

    async fn seed_thread(store: &InMemoryBoardStore, author: &str) -> PostId {
        let mut tx = store.begin().await.unwrap();
        let root = thread::append_post(
            tx.as_mut(),
            NewPost {
                timestamp: Utc::now(),
                content: "welcome".into(),
                author: IdentityKey::new(author),
            },
            None,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        root.id
    }

    fn post_request(identity: &str, content: &str) -> PostRequest {
        PostRequest {
            identity: IdentityKey::new(identity),
            captcha_token: Some("ok".into()),
            content: content.into(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn blacklisted_post_touches_nothing() {
        let store = InMemoryBoardStore::new();
        seed_thread(&store, "seed").await;
        let board = service(&store);
        board.verify(&IdentityKey::new("10.0.0.1")).await.unwrap();

        let err = board.post(post_request("10.0.0.1", "this is SPAM")).await.unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
        assert_eq!(store.post_count().await, 1);
        let identity = store.identity(&IdentityKey::new("10.0.0.1")).await.unwrap();
        assert!(identity.verified);
        assert_eq!(identity.view_ticket, None);
    }

    #[tokio::test]
    async fn anonymous_marker_changes_attribution_not_ledger() {
        let store = InMemoryBoardStore::new();
        let seeded = seed_thread(&store, "seed").await;
        let board = service(&store);
        let me = IdentityKey::new("10.0.0.1");
        board.verify(&me).await.unwrap();

        board.post(post_request("10.0.0.1", "££")).await.unwrap();
        let stored = store.post(seeded + 1).await.unwrap();
        assert_eq!(stored.content, "££");
        assert_eq!(stored.author, IdentityKey::new("1.1.1.1"));
        let identity = store.identity(&me).await.unwrap();
        assert_eq!(identity.view_ticket, Some(seeded));
        assert!(!identity.verified);
    }

    #[tokio::test]
    async fn missing_captcha_aborts_whole_post() {
        let store = InMemoryBoardStore::new();
        seed_thread(&store, "seed").await;
        let board = service(&store);
        board.verify(&IdentityKey::new("10.0.0.1")).await.unwrap();

        let mut request = post_request("10.0.0.1", "hello");
        request.captcha_token = None;
        assert!(matches!(board.post(request).await, Err(DomainError::Forbidden(_))));
        assert_eq!(store.post_count().await, 1);
        let seed_root = store.post(1).await.unwrap();
        assert_eq!(seed_root.views, 0);
    }
}
