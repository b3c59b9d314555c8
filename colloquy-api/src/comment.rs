use crate::{Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

/// Key of the article a comment thread hangs off. Articles themselves live in
/// another service; here they are nothing but a grouping key.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ArticleId(pub String);

/// One comment row as stored. Comments are never edited in place; deleting
/// one takes its whole reply subtree with it.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub article_id: ArticleId,
    pub content: String,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub article_id: ArticleId,
    pub content: String,
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.article_id.0)?;
        crate::validate_string(&self.content)?;
        if self.content.is_empty() {
            return Err(Error::EmptyContent);
        }
        Ok(())
    }
}

/// One node of the reply tree as serialized to clients.
///
/// `like_count` is the aggregate over all users; `liked` tracks the
/// requesting user separately and is false for anonymous requests.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentNode {
    pub id: CommentId,
    pub content: String,
    pub article_id: ArticleId,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub created_at: Time,
    pub username: Option<String>,
    pub like_count: i64,
    pub liked: bool,
    pub replies: Vec<CommentNode>,
}
