//! Shared fixtures: an in-memory board with scripted remote verifiers and a
//! hand-driven clock.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use domains::{
    BoardStore, Clock, Identity, IdentityKey, MockCaptchaVerifier, MockReputationChecker,
    NewPost, Post, PostId,
};
use services::{
    BoardService, ContentFilter, IdentityLedger, LedgerPolicy, PostRequest, ReputationGate,
    VoteRequest,
};
use storage_adapters::InMemoryBoardStore;

/// The CAPTCHA verifier accepts this token and nothing else.
pub const VALID_TOKEN: &str = "solved";
/// The reputation checker scores this address as a proxy.
pub const PROXY_ADDRESS: &str = "192.0.2.66";
pub const BLACKLISTED: &str = "spam";
pub const ANONYMOUS: &str = "1.1.1.1";

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += TimeDelta::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn scripted_gate() -> ReputationGate {
    let mut reputation = MockReputationChecker::new();
    reputation
        .expect_score()
        .returning(|address| Ok(if address.as_str() == PROXY_ADDRESS { 0.99 } else { 0.05 }));
    let mut captcha = MockCaptchaVerifier::new();
    captcha.expect_verify().returning(|token| Ok(token == VALID_TOKEN));
    ReputationGate::new(Arc::new(reputation), Arc::new(captcha), 0.90)
}

pub fn board_service(
    store: &InMemoryBoardStore,
    clock: Arc<ManualClock>,
    captcha_probability: f64,
) -> BoardService {
    gated_board_service(store, clock, scripted_gate(), captcha_probability)
}

pub fn gated_board_service(
    store: &InMemoryBoardStore,
    clock: Arc<ManualClock>,
    gate: ReputationGate,
    captcha_probability: f64,
) -> BoardService {
    BoardService::new(
        Arc::new(store.clone()),
        gate,
        ContentFilter::new([BLACKLISTED], "££", IdentityKey::new(ANONYMOUS)),
        IdentityLedger::new(LedgerPolicy { captcha_probability, ..LedgerPolicy::default() }),
        clock,
    )
}

pub struct Harness {
    pub store: InMemoryBoardStore,
    pub clock: Arc<ManualClock>,
    pub board: BoardService,
}

impl Harness {
    pub fn new(captcha_probability: f64) -> Self {
        Self::with_gate(scripted_gate(), captcha_probability)
    }

    pub fn with_gate(gate: ReputationGate, captcha_probability: f64) -> Self {
        let store = InMemoryBoardStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let board = gated_board_service(&store, clock.clone(), gate, captcha_probability);
        Self { store, clock, board }
    }

    /// Writes a ledger record for `who` directly, as a completed first
    /// contact, optionally holding a ticket.
    pub async fn enroll(&self, who: &str, view_ticket: Option<PostId>) -> anyhow::Result<()> {
        let mut identity = Identity::first_contact(IdentityKey::new(who));
        identity.view_ticket = view_ticket;
        let mut tx = self.store.begin().await?;
        tx.insert_identity(&identity).await?;
        tx.commit().await
    }

    /// Opens a thread by `author`, who gets a ledger record if missing.
    pub async fn seed_thread(&self, author: &str, content: &str) -> anyhow::Result<Post> {
        self.seed_post(author, content, None).await
    }

    pub async fn seed_reply(&self, author: &str, parent: PostId) -> anyhow::Result<Post> {
        self.seed_post(author, &format!("reply by {author}"), Some(parent)).await
    }

    async fn seed_post(
        &self,
        author: &str,
        content: &str,
        reply_to: Option<PostId>,
    ) -> anyhow::Result<Post> {
        let key = IdentityKey::new(author);
        let mut tx = self.store.begin().await?;
        if tx.identity(&key).await?.is_none() {
            tx.insert_identity(&Identity::first_contact(key.clone())).await?;
        }
        let post = services::thread::append_post(
            tx.as_mut(),
            NewPost { timestamp: self.clock.now(), content: content.into(), author: key },
            reply_to,
        )
        .await?;
        tx.commit().await?;
        Ok(post)
    }

    pub async fn ticket(&self, who: &str) -> Option<PostId> {
        self.store
            .identity(&IdentityKey::new(who))
            .await
            .and_then(|identity| identity.view_ticket)
    }

    pub async fn identity(&self, who: &str) -> Option<Identity> {
        self.store.identity(&IdentityKey::new(who)).await
    }
}

pub fn post_request(who: &str, content: &str) -> PostRequest {
    PostRequest {
        identity: IdentityKey::new(who),
        captcha_token: Some(VALID_TOKEN.into()),
        content: content.into(),
        reply_to: None,
    }
}

pub fn vote_request(who: &str, post_id: PostId, like: bool) -> VoteRequest {
    VoteRequest {
        identity: IdentityKey::new(who),
        post_id,
        action: domains::VoteAction::from_like_flag(like),
    }
}
