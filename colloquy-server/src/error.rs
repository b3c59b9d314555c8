use colloquy_api::{CommentId, Error as ApiError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn comment_not_found(comment: CommentId) -> Error {
        Error::Api(ApiError::CommentNotFound(comment))
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            // The only fallible internal work is talking to the store, so
            // anything that bubbles up as anyhow is a store failure.
            Error::Anyhow(err) => {
                tracing::error!(?err, "store failure");
                #[cfg(not(test))]
                let err = ApiError::StoreUnavailable(String::from(
                    "store unavailable, see logs for details",
                ));
                #[cfg(test)]
                let err = ApiError::StoreUnavailable(format!("store unavailable: {err:?}"));
                err
            }
            Error::Api(err) => {
                tracing::info!("returning error to client: {err}");
                err
            }
        };
        (err.status_code(), err.contents()).into_response()
    }
}
