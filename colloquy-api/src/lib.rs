pub use uuid::{uuid, Uuid};

mod auth;
mod comment;
mod db;
mod error;
mod like;
mod user;

pub use auth::AuthToken;
pub use comment::{ArticleId, Comment, CommentId, CommentNode, NewComment};
pub use db::{build_comment_tree, Db};
pub use error::Error;
pub use like::Like;
pub use user::{User, UserId};

pub type Time = chrono::DateTime<chrono::Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

pub(crate) fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(s.to_string())),
        false => Ok(()),
    }
}
