/// Domain tag mixed into every script digest.
const SCRIPT_DOMAIN: &str = "vhash-script-v1";

/// Content digest identifying a script body on the in-memory server.
///
/// Domain-separated BLAKE3, hex encoded. Redis computes its own SHA-1
/// digests; callers treat digests as opaque either way.
pub fn script_digest(body: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SCRIPT_DOMAIN.as_bytes());
    hasher.update(b":");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}
