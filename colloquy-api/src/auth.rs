use uuid::Uuid;

use crate::STUB_UUID;

/// Opaque bearer token naming one session. Sessions are provisioned out of
/// band; this crate only ever resolves tokens back to users.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}
