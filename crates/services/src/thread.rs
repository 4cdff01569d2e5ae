//! # Thread Tree
//!
//! Builds the reply tree with materialized paths and picks the thread a
//! poster is shown next.

use std::collections::BTreeSet;

use domains::{
    BoardTx, DomainError, IdentityCounters, IdentityKey, NewPost, Post, PostId, Result,
    ThreadPath,
};

/// Picks a thread for `viewer` and records the view.
///
/// The thread is chosen through one post drawn uniformly from every visible
/// post the viewer did not author, so busy threads are shown more often.
/// Every post in it gains a view, every distinct author gains a received
/// view and the viewer gains a sent view.
pub async fn select_thread(tx: &mut dyn BoardTx, viewer: &IdentityKey) -> Result<Vec<Post>> {
    let root_id = tx
        .random_root(viewer)
        .await?
        .ok_or_else(|| DomainError::NotFound("Thread".into()))?;

    tx.add_thread_views(root_id).await?;
    let thread = tx.thread(root_id).await?;

    let authors: BTreeSet<&IdentityKey> = thread.iter().map(|post| &post.author).collect();
    let received = IdentityCounters { views_received: 1, ..Default::default() };
    for author in authors {
        // Authors without a ledger record (the anonymous placeholder) are skipped.
        tx.add_identity_counters(author, &received).await?;
    }
    let sent = IdentityCounters { views_sent: 1, ..Default::default() };
    tx.add_identity_counters(viewer, &sent).await?;

    Ok(thread)
}

/// Inserts a post as a new thread root or as a reply to `reply_to`.
///
/// The id is only known after insertion, so the post is placed in a second
/// step of the same transaction.
pub async fn append_post(
    tx: &mut dyn BoardTx,
    post: NewPost,
    reply_to: Option<PostId>,
) -> Result<Post> {
    let parent = match reply_to {
        Some(parent_id) => Some(
            tx.post(parent_id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Reply target".into()))?,
        ),
        None => None,
    };

    let id = tx.insert_post(&post).await?;
    let (root_id, path) = match &parent {
        Some(parent) => (parent.root_id, parent.path.child(id)),
        None => (id, ThreadPath::root(id)),
    };
    tx.place_post(id, root_id, &path).await?;

    Ok(Post {
        id,
        timestamp: post.timestamp,
        content: post.content,
        author: post.author,
        root_id,
        path,
        hidden: false,
        views: 0,
        likes: 0,
        dislikes: 0,
    })
}
