//! Issue ID generation and hierarchy helpers.
//!
//! Root IDs have the form `{prefix}-{suffix}` with a lowercase base-36
//! suffix derived from SHA-256 material. The suffix length adapts to the
//! store size: the smallest length keeping the expected collision
//! probability of one fresh draw at or below 25%, so the create path's
//! exclusive-create retry loop expects fewer than two attempts.
//!
//! Hierarchical child IDs append `.N` segments (`bd-a3f8.1`, `bd-a3f8.1.2`);
//! the number of segments past the root is the ID's depth, bounded by store
//! configuration.

use chrono::Utc;
use sha2::{Digest, Sha256};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Floor for adaptive suffix sizing; short suffixes read badly and save
/// nothing.
const MIN_SUFFIX_LENGTH: usize = 4;

/// Attempts the create path makes before declaring the store broken.
pub const MAX_CREATE_ATTEMPTS: usize = 20;

/// Smallest suffix length whose keyspace keeps one draw's expected
/// collision probability at or below 25% for a store of `issue_count`
/// issues: the least `L` with `36^L >= 4 * issue_count`.
#[must_use]
pub fn suffix_length_for(issue_count: usize) -> usize {
    let needed = 4 * issue_count as u128;
    let mut length = MIN_SUFFIX_LENGTH;
    let mut keyspace = 36u128.pow(length as u32);
    while keyspace < needed {
        length += 1;
        keyspace *= 36;
    }
    length
}

/// Produce a candidate root ID of the given suffix length.
///
/// The suffix is base-36 over SHA-256 of the issue's seed material plus a
/// nonce; the caller bumps the nonce on each collision so consecutive
/// candidates differ even within one clock tick.
#[must_use]
pub fn candidate(prefix: &str, title: &str, creator: &str, nonce: u32, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0]);
    hasher.update(creator.as_bytes());
    hasher.update([0]);
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();

    let suffix = encode_base36(&digest[..8], length);
    format!("{prefix}-{suffix}")
}

/// Encode the leading bytes as a base-36 string of exactly `length` chars.
fn encode_base36(bytes: &[u8], length: usize) -> String {
    let mut num: u64 = 0;
    for &byte in bytes {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut out = Vec::with_capacity(length);
    let mut n = num;
    while out.len() < length {
        out.push(BASE36_CHARS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();

    // BASE36_CHARS is ASCII, so this cannot fail.
    String::from_utf8(out).unwrap_or_default()
}

/// Whether `id` is a hierarchical child ID: the substring after the final
/// `.` is non-empty and all digits.
#[must_use]
pub fn is_hierarchical(id: &str) -> bool {
    match id.rsplit_once('.') {
        Some((_, last)) => !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Number of dot-segments past the root; a root ID has depth 0.
#[must_use]
pub fn depth(id: &str) -> usize {
    id.matches('.').count()
}

/// The root ID: everything before the first `.`.
#[must_use]
pub fn root_of(id: &str) -> &str {
    id.split_once('.').map_or(id, |(root, _)| root)
}

/// The immediate parent of a hierarchical ID, `None` for roots.
#[must_use]
pub fn parent_of(id: &str) -> Option<&str> {
    if is_hierarchical(id) {
        id.rsplit_once('.').map(|(parent, _)| parent)
    } else {
        None
    }
}

/// The `n`-th child ID of `parent`.
#[must_use]
pub fn child_id(parent: &str, n: u64) -> String {
    format!("{parent}.{n}")
}

/// The child number of `id` if it is a *direct* child of `parent`
/// (or a deeper descendant through that child).
///
/// `bd-a.3` and `bd-a.3.2` both report `3` for parent `bd-a`; used by the
/// next-child-ID scan to find the maximum allocated child number.
#[must_use]
pub fn direct_child_number(parent: &str, id: &str) -> Option<u64> {
    let rest = id.strip_prefix(parent)?.strip_prefix('.')?;
    let segment = rest.split('.').next()?;
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Validate an explicitly-supplied ID against the store prefix.
///
/// Valid forms:
/// - Root: `{prefix}-{suffix}` with a non-empty alphanumeric suffix
/// - Hierarchical: a valid root followed by `.N` segments, each a positive
///   integer
#[must_use]
pub fn validate_id(id: &str, prefix: &str) -> bool {
    let Some(after_prefix) = id.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) else {
        return false;
    };

    let mut parts = after_prefix.split('.');
    let Some(suffix) = parts.next() else {
        return false;
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }

    parts.all(|segment| {
        !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && segment.parse::<u64>().is_ok_and(|n| n > 0)
    })
}
