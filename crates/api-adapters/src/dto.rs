//! Wire types. Field names follow the browser client (camelCase).

use domains::{Post, PostId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub captcha_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
    pub post_content: String,
    /// `null`, absent and `0` all start a new thread.
    #[serde(default)]
    pub reply_id: Option<PostId>,
}

impl PostBody {
    /// `Err` carries the offending id.
    pub fn reply_to(&self) -> Result<Option<PostId>, PostId> {
        match self.reply_id {
            None | Some(0) => Ok(None),
            Some(id) if id > 0 => Ok(Some(id)),
            Some(id) => Err(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub post_content: String,
    pub path: String,
    pub id: PostId,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            post_content: post.content.clone(),
            path: post.path.to_string(),
            id: post.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
    pub post_id: PostId,
    /// `true` likes, `false` dislikes.
    pub vote_action: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyView {
    pub likes: u64,
    pub dislikes: u64,
    pub id: PostId,
}

impl From<&Post> for TallyView {
    fn from(post: &Post) -> Self {
        Self { likes: post.likes, dislikes: post.dislikes, id: post.id }
    }
}
