use anyhow::{anyhow, Context};
use serde_json::json;

use crate::{CommentId, UserId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment {0:?} not found")]
    CommentNotFound(CommentId),

    #[error("No like by user {1:?} on comment {0:?}")]
    LikeNotFound(CommentId, UserId),

    #[error("User {1:?} already liked comment {0:?}")]
    AlreadyLiked(CommentId, UserId),

    #[error("Comment content must not be empty")]
    EmptyContent,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::LikeNotFound(_, _) => StatusCode::NOT_FOUND,
            Error::AlreadyLiked(_, _) => StatusCode::CONFLICT,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::CommentNotFound(c) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "comment": c.0,
            }),
            Error::LikeNotFound(c, u) => json!({
                "message": "like not found",
                "type": "like-not-found",
                "comment": c.0,
                "user": u.0,
            }),
            Error::AlreadyLiked(c, u) => json!({
                "message": "like already recorded",
                "type": "conflict-like",
                "comment": c.0,
                "user": u.0,
            }),
            Error::EmptyContent => json!({
                "message": "comment content must not be empty",
                "type": "empty-content",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::StoreUnavailable(msg) => json!({
                "message": msg,
                "type": "store-unavailable",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let comment = || {
            data.get("comment")
                .and_then(|c| c.as_i64())
                .map(CommentId)
                .ok_or_else(|| anyhow!("error contents has no comment id"))
        };
        let user = || {
            data.get("user")
                .and_then(|u| u.as_i64())
                .map(UserId)
                .ok_or_else(|| anyhow!("error contents has no user id"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "permission-denied" => Error::PermissionDenied,
                "comment-not-found" => Error::CommentNotFound(comment()?),
                "like-not-found" => Error::LikeNotFound(comment()?, user()?),
                "conflict-like" => Error::AlreadyLiked(comment()?, user()?),
                "empty-content" => Error::EmptyContent,
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                "store-unavailable" => Error::StoreUnavailable(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_round_trip_to_self() {
        let errors = vec![
            Error::Unknown(String::from("boom")),
            Error::PermissionDenied,
            Error::CommentNotFound(CommentId(17)),
            Error::LikeNotFound(CommentId(17), UserId(3)),
            Error::AlreadyLiked(CommentId(17), UserId(3)),
            Error::EmptyContent,
            Error::NullByteInString(String::from("a\0b")),
            Error::StoreUnavailable(String::from("connection refused")),
        ];
        for e in errors {
            assert_eq!(Error::parse(&e.contents()).unwrap(), e);
        }
    }

    #[test]
    fn status_codes_match_taxonomy() {
        use http::StatusCode;
        assert_eq!(
            Error::CommentNotFound(CommentId(1)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::LikeNotFound(CommentId(1), UserId(2)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::AlreadyLiked(CommentId(1), UserId(2)).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::StoreUnavailable(String::new()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
