use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;

use crate::{ArticleId, Comment, CommentId, CommentNode, UserId};

/// Read operations the tree builder needs from the backing store.
#[async_trait]
pub trait Db {
    /// All comments on the article, ordered by descending id (newest first).
    async fn fetch_comments_by_article(
        &mut self,
        article: &ArticleId,
    ) -> anyhow::Result<Vec<Comment>>;

    /// Total like count per comment; comments nobody liked are absent.
    async fn fetch_like_counts(
        &mut self,
        comments: &[CommentId],
    ) -> anyhow::Result<HashMap<CommentId, i64>>;

    /// Which of `comments` the given user has liked.
    async fn fetch_liked_comment_ids(
        &mut self,
        user: UserId,
        comments: &[CommentId],
    ) -> anyhow::Result<HashSet<CommentId>>;

    /// Display name for a user, if their record still exists.
    async fn resolve_username(&mut self, user: UserId) -> anyhow::Result<Option<String>>;
}

/// Fetches everything known about an article's comments and rebuilds the
/// reply tree, newest-id first among siblings at every level.
///
/// When `for_user` is absent, `liked` is false on every node; `like_count`
/// stays the aggregate over all users either way. Store failures propagate
/// verbatim; no partial tree is ever returned.
pub async fn build_comment_tree<D: Db>(
    db: &mut D,
    article: &ArticleId,
    for_user: Option<UserId>,
) -> anyhow::Result<Vec<CommentNode>> {
    let comments = db
        .fetch_comments_by_article(article)
        .await
        .with_context(|| format!("fetching comments for article {:?}", article))?;
    let ids = comments.iter().map(|c| c.id).collect::<Vec<_>>();

    let like_counts = db
        .fetch_like_counts(&ids)
        .await
        .context("fetching like counts")?;
    let liked = match for_user {
        Some(user) => db
            .fetch_liked_comment_ids(user, &ids)
            .await
            .with_context(|| format!("fetching liked comment ids for {:?}", user))?,
        None => HashSet::new(),
    };

    let mut usernames = HashMap::new();
    for c in &comments {
        if !usernames.contains_key(&c.user_id) {
            let name = db
                .resolve_username(c.user_id)
                .await
                .with_context(|| format!("resolving username for {:?}", c.user_id))?;
            usernames.insert(c.user_id, name);
        }
    }

    Ok(assemble_tree(comments, &usernames, &like_counts, &liked))
}

/// Pure tree assembly over already-fetched rows.
///
/// The flat list is partitioned by parent id, keeping the fetched order
/// inside each group; that order becomes sibling order. A comment whose
/// parent is not in `comments` ends up in a group nothing ever looks up, so
/// it appears neither as a root nor inside any reply list.
fn assemble_tree(
    comments: Vec<Comment>,
    usernames: &HashMap<UserId, Option<String>>,
    like_counts: &HashMap<CommentId, i64>,
    liked: &HashSet<CommentId>,
) -> Vec<CommentNode> {
    let mut roots = Vec::new();
    let mut groups: HashMap<CommentId, Vec<Comment>> = HashMap::new();
    for c in comments {
        match c.parent_id {
            None => roots.push(c),
            Some(parent) => groups.entry(parent).or_insert_with(Vec::new).push(c),
        }
    }

    let tree = roots
        .into_iter()
        .map(|c| build_node(c, &mut groups, usernames, like_counts, liked))
        .collect();

    if !groups.is_empty() {
        let orphans = groups
            .values()
            .flat_map(|g| g.iter().map(|c| c.id))
            .collect::<Vec<_>>();
        tracing::warn!(?orphans, "dropping comments whose parent was not fetched");
    }

    tree
}

fn build_node(
    comment: Comment,
    groups: &mut HashMap<CommentId, Vec<Comment>>,
    usernames: &HashMap<UserId, Option<String>>,
    like_counts: &HashMap<CommentId, i64>,
    liked: &HashSet<CommentId>,
) -> CommentNode {
    let replies = groups
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|c| build_node(c, groups, usernames, like_counts, liked))
        .collect();
    CommentNode {
        id: comment.id,
        content: comment.content,
        article_id: comment.article_id,
        user_id: comment.user_id,
        parent_id: comment.parent_id,
        created_at: comment.created_at,
        username: usernames.get(&comment.user_id).cloned().flatten(),
        like_count: like_counts.get(&comment.id).copied().unwrap_or(0),
        liked: liked.contains(&comment.id),
        replies,
    }
}
