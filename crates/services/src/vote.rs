//! # Vote Ledger
//!
//! Applies a like/dislike against a redeemed ticket. The voter's sent
//! counter and the post's tally always move with the ticket. The author's
//! received counter moves too when the author has a ledger record.

use domains::{BoardTx, DomainError, IdentityKey, PostId, Result, VoteAction};
use tracing::warn;

use crate::ticket;
use crate::utils::ip_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Counted { root_id: PostId },
    /// Counted for the voter and the post, but the post's author has no
    /// ledger record to credit.
    AuthorMissing { root_id: PostId },
}

impl VoteOutcome {
    pub fn root_id(&self) -> PostId {
        match *self {
            VoteOutcome::Counted { root_id } | VoteOutcome::AuthorMissing { root_id } => root_id,
        }
    }
}

pub async fn cast_vote(
    tx: &mut dyn BoardTx,
    voter: &IdentityKey,
    post_id: PostId,
    action: VoteAction,
) -> Result<VoteOutcome> {
    let mut identity = tx
        .identity(voter)
        .await?
        .ok_or_else(|| DomainError::NotFound("User".into()))?;
    let post = ticket::redeem(tx, &mut identity, post_id).await?;

    tx.add_identity_counters(voter, &action.sent()).await?;
    tx.add_post_tallies(post.id, &action.tally()).await?;
    if !tx.add_identity_counters(&post.author, &action.received()).await? {
        warn!(post_id, author = %ip_hash(&post.author), "vote on post without author record");
        return Ok(VoteOutcome::AuthorMissing { root_id: post.root_id });
    }
    Ok(VoteOutcome::Counted { root_id: post.root_id })
}
