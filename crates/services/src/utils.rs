//! Small helpers shared by the services.

use domains::IdentityKey;
use sha2::{Digest, Sha256};

/// Short, stable, non-reversible tag for an identity, used in log fields so
/// raw addresses never reach the logs.
pub fn ip_hash(identity: &IdentityKey) -> String {
    let digest = Sha256::digest(identity.as_str().as_bytes());
    let mut tag = hex::encode(digest);
    tag.truncate(12);
    tag
}
