use anyhow::Context;
use axum::{
    extract::{Path, State},
    Json,
};

use colloquy_api::{
    build_comment_tree, ArticleId, Comment, CommentId, CommentNode, Like, NewComment, UserId,
};

use crate::{db, extractors::*, Error};

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn fetch_comment_tree(
    MaybeAuth(user): MaybeAuth,
    mut conn: PgConn,
    Path(article): Path<ArticleId>,
) -> Result<Json<Vec<CommentNode>>, Error> {
    let mut store = db::PostgresDb { conn: &mut *conn };
    Ok(Json(
        build_comment_tree(&mut store, &article, user)
            .await
            .with_context(|| format!("building comment tree for article {:?}", article))?,
    ))
}

pub async fn create_comment(
    Auth(user): Auth,
    State(config): State<Config>,
    mut conn: PgConn,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    data.validate()?;
    if config.validate_parents {
        if let Some(parent) = data.parent_id {
            let parent_comment = db::fetch_comment(&mut *conn, parent)
                .await
                .with_context(|| format!("fetching parent comment {:?}", parent))?
                .ok_or_else(|| Error::comment_not_found(parent))?;
            if parent_comment.article_id != data.article_id {
                return Err(Error::comment_not_found(parent));
            }
        }
    }
    Ok(Json(db::create_comment(&mut *conn, user, &data).await?))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<CommentId>,
) -> Result<(), Error> {
    let target = db::fetch_comment(&mut *conn, comment)
        .await
        .with_context(|| format!("fetching comment {:?}", comment))?
        .ok_or_else(|| Error::comment_not_found(comment))?;
    if target.user_id != user {
        let requester = db::fetch_user(&mut *conn, user)
            .await
            .with_context(|| format!("fetching user {:?}", user))?;
        if !requester.map_or(false, |u| u.is_superuser) {
            return Err(Error::permission_denied());
        }
    }
    db::delete_comment(&mut *conn, comment).await
}

pub async fn create_like(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<CommentId>,
) -> Result<Json<Like>, Error> {
    Ok(Json(db::create_like(&mut *conn, comment, user).await?))
}

pub async fn delete_like(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<CommentId>,
) -> Result<(), Error> {
    db::delete_like(&mut *conn, comment, user).await
}
