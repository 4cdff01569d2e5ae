//! # Postgres `BoardStore`
//!
//! Maps the relational model onto the domain models. Every transaction runs
//! at `SERIALIZABLE` with a bounded `statement_timeout`; a serialization
//! failure surfaces as an internal error and the request is not retried.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use domains::{
    BoardStore, BoardTx, Identity, IdentityCounters, IdentityKey, NewPost, Post, PostId,
    PostTallies, ThreadPath,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

const IDENTITY_COLUMNS: &str = "address, restricted, restricted_message, verified, \
    captcha_required, last_posted_at, view_ticket, likes_sent, likes_received, \
    dislikes_sent, dislikes_received, views_sent, views_received";

const POST_COLUMNS: &str =
    "id, posted_at, content, author_address, root_id, path, hidden, views, likes, dislikes";

pub struct PgBoardStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgBoardStore {
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        tracing::info!(max_connections, "connected to postgres");
        Ok(Self::from_pool(pool, timeout))
    }

    pub fn from_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self { pool, statement_timeout }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        tracing::debug!("schema migrations applied");
        Ok(())
    }
}

#[async_trait]
impl BoardStore for PgBoardStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn BoardTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        // SET does not accept bind parameters; the value is an integer we own.
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(Box::new(PgBoardTx { tx }))
    }
}

pub struct PgBoardTx {
    tx: Transaction<'static, Postgres>,
}

/// `view_ticket` is stored as 0 when no ticket is live.
pub(crate) fn ticket_to_column(ticket: Option<PostId>) -> i64 {
    ticket.unwrap_or(0)
}

pub(crate) fn ticket_from_column(raw: i64) -> Option<PostId> {
    (raw != 0).then_some(raw)
}

fn to_sql(count: u64) -> anyhow::Result<i64> {
    i64::try_from(count).context("counter exceeds BIGINT range")
}

fn count(row: &PgRow, column: &str) -> anyhow::Result<u64> {
    let raw: i64 = row.try_get(column)?;
    u64::try_from(raw).with_context(|| format!("negative {column}: {raw}"))
}

fn identity_from_row(row: &PgRow) -> anyhow::Result<Identity> {
    Ok(Identity {
        key: IdentityKey::new(row.try_get::<String, _>("address")?),
        restricted: row.try_get("restricted")?,
        restricted_message: row.try_get("restricted_message")?,
        verified: row.try_get("verified")?,
        captcha_required: row.try_get("captcha_required")?,
        last_posted_at: row.try_get("last_posted_at")?,
        view_ticket: ticket_from_column(row.try_get("view_ticket")?),
        counters: IdentityCounters {
            likes_sent: count(row, "likes_sent")?,
            likes_received: count(row, "likes_received")?,
            dislikes_sent: count(row, "dislikes_sent")?,
            dislikes_received: count(row, "dislikes_received")?,
            views_sent: count(row, "views_sent")?,
            views_received: count(row, "views_received")?,
        },
    })
}

/// Returns `None` for a row that has not been placed in the tree yet.
fn post_from_row(row: &PgRow) -> anyhow::Result<Option<Post>> {
    let root_id: Option<i64> = row.try_get("root_id")?;
    let path: Option<String> = row.try_get("path")?;
    let (Some(root_id), Some(path)) = (root_id, path) else {
        return Ok(None);
    };
    Ok(Some(Post {
        id: row.try_get("id")?,
        timestamp: row.try_get("posted_at")?,
        content: row.try_get("content")?,
        author: IdentityKey::new(row.try_get::<String, _>("author_address")?),
        root_id,
        path: path.parse()?,
        hidden: row.try_get("hidden")?,
        views: count(row, "views")?,
        likes: count(row, "likes")?,
        dislikes: count(row, "dislikes")?,
    }))
}

#[async_trait]
impl BoardTx for PgBoardTx {
    async fn identity(&mut self, key: &IdentityKey) -> anyhow::Result<Option<Identity>> {
        let row = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE address = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn insert_identity(&mut self, identity: &Identity) -> anyhow::Result<()> {
        let c = &identity.counters;
        sqlx::query(&format!(
            "INSERT INTO identities ({IDENTITY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(identity.key.as_str())
        .bind(identity.restricted)
        .bind(&identity.restricted_message)
        .bind(identity.verified)
        .bind(identity.captcha_required)
        .bind(identity.last_posted_at)
        .bind(ticket_to_column(identity.view_ticket))
        .bind(to_sql(c.likes_sent)?)
        .bind(to_sql(c.likes_received)?)
        .bind(to_sql(c.dislikes_sent)?)
        .bind(to_sql(c.dislikes_received)?)
        .bind(to_sql(c.views_sent)?)
        .bind(to_sql(c.views_received)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_identity(&mut self, identity: &Identity) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE identities SET verified = $2, captcha_required = $3, \
             last_posted_at = $4, view_ticket = $5 WHERE address = $1",
        )
        .bind(identity.key.as_str())
        .bind(identity.verified)
        .bind(identity.captcha_required)
        .bind(identity.last_posted_at)
        .bind(ticket_to_column(identity.view_ticket))
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            bail!("identity {} not found", identity.key);
        }
        Ok(())
    }

    async fn add_identity_counters(
        &mut self,
        key: &IdentityKey,
        delta: &IdentityCounters,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE identities SET \
             likes_sent = likes_sent + $2, likes_received = likes_received + $3, \
             dislikes_sent = dislikes_sent + $4, dislikes_received = dislikes_received + $5, \
             views_sent = views_sent + $6, views_received = views_received + $7 \
             WHERE address = $1",
        )
        .bind(key.as_str())
        .bind(to_sql(delta.likes_sent)?)
        .bind(to_sql(delta.likes_received)?)
        .bind(to_sql(delta.dislikes_sent)?)
        .bind(to_sql(delta.dislikes_received)?)
        .bind(to_sql(delta.views_sent)?)
        .bind(to_sql(delta.views_received)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn random_root(&mut self, exclude: &IdentityKey) -> anyhow::Result<Option<PostId>> {
        let root = sqlx::query_scalar::<_, i64>(
            "SELECT root_id FROM posts \
             WHERE author_address <> $1 AND NOT hidden AND root_id IS NOT NULL \
             ORDER BY random() LIMIT 1",
        )
        .bind(exclude.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(root)
    }

    async fn thread(&mut self, root_id: PostId) -> anyhow::Result<Vec<Post>> {
        // Order by the integer segments, not the text, so "/1/10" follows "/1/2".
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE root_id = $1 \
             ORDER BY string_to_array(substr(path, 2), '/')::BIGINT[]"
        ))
        .bind(root_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(post) = post_from_row(row)? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    async fn post(&mut self, id: PostId) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => post_from_row(&row),
            None => Ok(None),
        }
    }

    async fn insert_post(&mut self, post: &NewPost) -> anyhow::Result<PostId> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO posts (posted_at, content, author_address) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post.timestamp)
        .bind(&post.content)
        .bind(post.author.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn place_post(
        &mut self,
        id: PostId,
        root_id: PostId,
        path: &ThreadPath,
    ) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE posts SET root_id = $2, path = $3 WHERE id = $1")
            .bind(id)
            .bind(root_id)
            .bind(path.to_string())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() != 1 {
            bail!("post {id} not found");
        }
        Ok(())
    }

    async fn add_post_tallies(&mut self, id: PostId, delta: &PostTallies) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE posts SET views = views + $2, likes = likes + $3, dislikes = dislikes + $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(to_sql(delta.views)?)
        .bind(to_sql(delta.likes)?)
        .bind(to_sql(delta.dislikes)?)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            bail!("post {id} not found");
        }
        Ok(())
    }

    async fn add_thread_views(&mut self, root_id: PostId) -> anyhow::Result<()> {
        sqlx::query("UPDATE posts SET views = views + 1 WHERE root_id = $1")
            .bind(root_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
