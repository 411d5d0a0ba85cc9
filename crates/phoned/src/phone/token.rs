use std::fmt;
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

/// Opaque per-entity access token.
///
/// The token is the hex SHA-256 digest of 256 random bits. It is generated on
/// first access and stays fixed for the lifetime of the owning entity.
#[derive(Default)]
pub struct AccessToken {
    cell: OnceLock<String>,
}

impl AccessToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the token, generating it on first use.
    pub fn get(&self) -> &str {
        self.cell.get_or_init(generate)
    }

    /// Whether the token has been generated yet.
    pub fn is_generated(&self) -> bool {
        self.cell.get().is_some()
    }
}

fn generate() -> String {
    let mut bits = [0u8; 32];
    OsRng.fill_bytes(&mut bits);
    hex::encode(Sha256::digest(bits))
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_generated() {
            "<generated>"
        } else {
            "<pending>"
        };
        f.debug_tuple("AccessToken").field(&state).finish()
    }
}
