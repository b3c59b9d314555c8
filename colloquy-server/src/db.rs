use std::collections::{HashMap, HashSet};

use anyhow::Context;
use axum::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::Row;

use colloquy_api::{
    ArticleId, AuthToken, Comment, CommentId, Db, Error as ApiError, Like, NewComment, User, UserId,
};

use crate::Error;

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE token = $1")
        .bind(token.0)
        .fetch_optional(&mut *conn)
        .await
        .context("querying sessions table")?;
    match row {
        Some(r) => Ok(UserId(
            r.try_get("user_id").context("retrieving the user_id field")?,
        )),
        None => Err(Error::permission_denied()),
    }
}

pub async fn fetch_user(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> anyhow::Result<Option<User>> {
    sqlx::query(
        "SELECT id, username, is_premium, premium_end_at, is_superuser FROM users WHERE id = $1",
    )
    .bind(user.0)
    .fetch_optional(&mut *conn)
    .await
    .context("querying users table")?
    .map(|r| {
        Ok(User {
            id: UserId(r.try_get("id").context("retrieving the id field")?),
            username: r
                .try_get("username")
                .context("retrieving the username field")?,
            is_premium: r
                .try_get("is_premium")
                .context("retrieving the is_premium field")?,
            premium_end_at: r
                .try_get::<Option<chrono::NaiveDateTime>, _>("premium_end_at")
                .context("retrieving the premium_end_at field")?
                .map(|d| d.and_local_timezone(Utc).unwrap()),
            is_superuser: r
                .try_get("is_superuser")
                .context("retrieving the is_superuser field")?,
        })
    })
    .transpose()
}

pub async fn resolve_username(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> anyhow::Result<Option<String>> {
    sqlx::query("SELECT username FROM users WHERE id = $1")
        .bind(user.0)
        .fetch_optional(&mut *conn)
        .await
        .context("querying users table")?
        .map(|r| {
            r.try_get("username")
                .context("retrieving the username field")
        })
        .transpose()
}

fn comment_from_row(r: &sqlx::postgres::PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(r.try_get("id").context("retrieving the id field")?),
        article_id: ArticleId(
            r.try_get("article_id")
                .context("retrieving the article_id field")?,
        ),
        content: r
            .try_get("content")
            .context("retrieving the content field")?,
        user_id: UserId(
            r.try_get("user_id")
                .context("retrieving the user_id field")?,
        ),
        parent_id: r
            .try_get::<Option<i64>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        created_at: r
            .try_get::<chrono::NaiveDateTime, _>("created_at")
            .context("retrieving the created_at field")?
            .and_local_timezone(Utc)
            .unwrap(),
    })
}

pub async fn fetch_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> anyhow::Result<Option<Comment>> {
    sqlx::query(
        "SELECT id, article_id, content, user_id, parent_id, created_at
            FROM comments
            WHERE id = $1",
    )
    .bind(comment.0)
    .fetch_optional(&mut *conn)
    .await
    .context("querying comments table")?
    .map(|r| comment_from_row(&r))
    .transpose()
}

pub async fn fetch_comments_by_article(
    conn: &mut sqlx::PgConnection,
    article: &ArticleId,
) -> anyhow::Result<Vec<Comment>> {
    let mut rows = sqlx::query(
        "SELECT id, article_id, content, user_id, parent_id, created_at
            FROM comments
            WHERE article_id = $1
            ORDER BY id DESC",
    )
    .bind(&article.0)
    .fetch(&mut *conn);
    let mut comments = Vec::new();
    while let Some(row) = rows.try_next().await.context("querying comments table")? {
        comments.push(comment_from_row(&row)?);
    }
    Ok(comments)
}

pub async fn fetch_like_counts(
    conn: &mut sqlx::PgConnection,
    comments: &[CommentId],
) -> anyhow::Result<HashMap<CommentId, i64>> {
    let ids = comments.iter().map(|c| c.0).collect::<Vec<_>>();
    sqlx::query(
        "SELECT comment_id, COUNT(*) AS like_count
            FROM likes
            WHERE comment_id = ANY($1)
            GROUP BY comment_id",
    )
    .bind(&ids)
    .try_map(|row: sqlx::postgres::PgRow| {
        Ok((
            CommentId(row.try_get("comment_id")?),
            row.try_get::<i64, _>("like_count")?,
        ))
    })
    .fetch(&mut *conn)
    .try_collect::<HashMap<_, _>>()
    .await
    .context("querying likes table")
}

pub async fn fetch_liked_comment_ids(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    comments: &[CommentId],
) -> anyhow::Result<HashSet<CommentId>> {
    let ids = comments.iter().map(|c| c.0).collect::<Vec<_>>();
    sqlx::query("SELECT comment_id FROM likes WHERE user_id = $1 AND comment_id = ANY($2)")
        .bind(user.0)
        .bind(&ids)
        .try_map(|row: sqlx::postgres::PgRow| Ok(CommentId(row.try_get("comment_id")?)))
        .fetch(&mut *conn)
        .try_collect::<HashSet<_>>()
        .await
        .context("querying likes table")
}

pub async fn create_comment(
    conn: &mut sqlx::PgConnection,
    author: UserId,
    data: &NewComment,
) -> Result<Comment, Error> {
    let row = sqlx::query(
        "INSERT INTO comments (article_id, content, user_id, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at",
    )
    .bind(&data.article_id.0)
    .bind(&data.content)
    .bind(author.0)
    .bind(data.parent_id.map(|p| p.0))
    .bind(Utc::now().naive_utc())
    .fetch_one(&mut *conn)
    .await
    .context("inserting into comments table")?;
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        article_id: data.article_id.clone(),
        content: data.content.clone(),
        user_id: author,
        parent_id: data.parent_id,
        created_at: row
            .try_get::<chrono::NaiveDateTime, _>("created_at")
            .context("retrieving the created_at field")?
            .and_local_timezone(Utc)
            .unwrap(),
    })
}

/// Deletes a comment and every reply transitively under it, likes included.
/// Walks the parent chain in SQL because parent_id has no foreign key.
pub async fn delete_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> Result<(), Error> {
    let done = sqlx::query(
        "WITH RECURSIVE doomed AS (
            SELECT id FROM comments WHERE id = $1
            UNION
            SELECT c.id FROM comments c INNER JOIN doomed d ON c.parent_id = d.id
        )
        DELETE FROM comments WHERE id IN (SELECT id FROM doomed)",
    )
    .bind(comment.0)
    .execute(&mut *conn)
    .await
    .context("deleting from comments table")?;
    if done.rows_affected() == 0 {
        return Err(Error::comment_not_found(comment));
    }
    Ok(())
}

pub async fn create_like(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
) -> Result<Like, Error> {
    let created_at = Utc::now();
    let res = sqlx::query("INSERT INTO likes (comment_id, user_id, created_at) VALUES ($1, $2, $3)")
        .bind(comment.0)
        .bind(user.0)
        .bind(created_at.naive_utc())
        .execute(&mut *conn)
        .await;
    match res {
        Ok(_) => Ok(Like {
            comment_id: comment,
            user_id: user,
            created_at,
        }),
        // The composite primary key is what resolves concurrent double-likes:
        // the loser of the race lands here.
        Err(sqlx::Error::Database(err)) if err.constraint() == Some("likes_pkey") => {
            Err(Error::Api(ApiError::AlreadyLiked(comment, user)))
        }
        Err(sqlx::Error::Database(err)) if err.constraint() == Some("likes_comment_id_fkey") => {
            Err(Error::comment_not_found(comment))
        }
        Err(err) => Err(Error::Anyhow(
            anyhow::Error::new(err).context("inserting into likes table"),
        )),
    }
}

pub async fn delete_like(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
) -> Result<(), Error> {
    let done = sqlx::query("DELETE FROM likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment.0)
        .bind(user.0)
        .execute(&mut *conn)
        .await
        .context("deleting from likes table")?;
    if done.rows_affected() == 0 {
        return Err(Error::Api(ApiError::LikeNotFound(comment, user)));
    }
    Ok(())
}

/// Postgres-backed implementation of the read interface the tree builder
/// consumes.
pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

#[async_trait]
impl<'a> Db for PostgresDb<'a> {
    async fn fetch_comments_by_article(
        &mut self,
        article: &ArticleId,
    ) -> anyhow::Result<Vec<Comment>> {
        fetch_comments_by_article(&mut *self.conn, article).await
    }

    async fn fetch_like_counts(
        &mut self,
        comments: &[CommentId],
    ) -> anyhow::Result<HashMap<CommentId, i64>> {
        fetch_like_counts(&mut *self.conn, comments).await
    }

    async fn fetch_liked_comment_ids(
        &mut self,
        user: UserId,
        comments: &[CommentId],
    ) -> anyhow::Result<HashSet<CommentId>> {
        fetch_liked_comment_ids(&mut *self.conn, user, comments).await
    }

    async fn resolve_username(&mut self, user: UserId) -> anyhow::Result<Option<String>> {
        resolve_username(&mut *self.conn, user).await
    }
}
