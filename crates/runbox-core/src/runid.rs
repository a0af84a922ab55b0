//! Request-unique identifiers.
//!
//! Containers are created under a timestamp-prefixed short-hash name so that
//! concurrent sessions never collide and the stale reaper can tell a live
//! container from a leaked one by age alone.

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const HASH_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Build an id of the form `MMDDHHMM-<5 hash chars>-<parts...>`.
pub fn new(parts: &[&str]) -> String {
    let stamp = Utc::now().format("%m%d%H%M");
    let mut id = format!("{}-{}", stamp, short_hash(5));
    for part in parts {
        id.push('-');
        id.push_str(part);
    }
    id
}

fn short_hash(length: usize) -> String {
    let seed = format!("{}{}", Uuid::new_v4(), Uuid::new_v4());
    let digest = Sha256::digest(seed.as_bytes());
    digest
        .iter()
        .cycle()
        .take(length)
        .map(|b| HASH_CHARSET[(*b as usize) % HASH_CHARSET.len()] as char)
        .collect()
}
