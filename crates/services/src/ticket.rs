//! # Ticket Protocol
//!
//! A ticket is the root id of the thread an identity was last shown. It is
//! minted once per successful post and is the only thing that makes a vote
//! legitimate. Redeeming clears it, so one view buys at most one vote.

use domains::{BoardTx, DomainError, Identity, Post, PostId, Result};

/// Overwrites any previous ticket.
pub async fn issue(tx: &mut dyn BoardTx, identity: &mut Identity, root_id: PostId) -> Result<()> {
    identity.view_ticket = Some(root_id);
    tx.save_identity(identity).await?;
    Ok(())
}

/// Spends the identity's ticket on `post_id` and returns the post.
///
/// Fails `NotFound` for an unknown post and `Forbidden` unless the post
/// belongs to the ticketed thread.
pub async fn redeem(tx: &mut dyn BoardTx, identity: &mut Identity, post_id: PostId) -> Result<Post> {
    let post = tx
        .post(post_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Post".into()))?;
    if identity.view_ticket != Some(post.root_id) {
        return Err(DomainError::Forbidden("User cannot vote on this post".into()));
    }
    identity.view_ticket = None;
    tx.save_identity(identity).await?;
    Ok(post)
}
