use crate::{CommentId, Time, UserId};

/// A user's endorsement of one comment. At most one per (comment, user)
/// pair; the store's uniqueness constraint is what resolves races.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Like {
    pub comment_id: CommentId,
    pub user_id: UserId,
    pub created_at: Time,
}
