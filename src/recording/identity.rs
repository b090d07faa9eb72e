//! Per-transaction correlation identities.
//!
//! An identity concatenates the arrival time in Unix nanoseconds (8 bytes,
//! big-endian), a 4-byte random salt and the MD5 digest of the transaction
//! description, then encodes the 28 bytes with unpadded URL-safe base64.
//! The nanosecond component makes identities near-unique under normal load,
//! the salt breaks ties when two transactions arrive in the same nanosecond,
//! and the digest lets an operator eyeball which requests describe the same
//! host/method/path.
//!
//! Collisions are accepted as unlikely rather than prevented: there is no
//! detection or retry, and a later record that resolves to the same filename
//! overwrites the earlier one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use rand::{rngs::OsRng, RngCore};

/// Mints a fresh identity for a transaction observed at `received` and
/// described by `description`. Safe to call concurrently from any task.
pub fn make_transaction_id(description: &str, received: DateTime<Local>) -> String {
    let nanos = received.timestamp_nanos_opt().unwrap_or_default() as u64;
    let mut salt = [0u8; 4];
    OsRng.fill_bytes(&mut salt);

    let mut raw = Vec::with_capacity(28);
    raw.extend_from_slice(&nanos.to_be_bytes());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&md5::compute(description).0);
    URL_SAFE_NO_PAD.encode(raw)
}
