//! Crash-safe filesystem primitives for the beads issue store.
//!
//! This crate provides the low-level building blocks the store is assembled
//! from, with no knowledge of issues or their schema:
//!
//! - **Atomic writes**: the temp-file-then-rename pattern for new file
//!   locations, and an in-place truncate-with-backup protocol for rewriting
//!   a file whose descriptor is already held under an exclusive lock.
//! - **Crash recovery**: restoring `*.backup` files left behind by an
//!   interrupted in-place write.
//! - **Advisory locks**: RAII [`FileLock`] guards over POSIX-style flocks,
//!   with optional bounded-wait acquisition and stale sidecar-lock sweeping.
//!
//! # Atomicity Guarantee
//!
//! On POSIX systems, file renames within the same filesystem are atomic.
//! [`write_atomic`] exploits this: data is written to a sibling temp file,
//! fsynced, and renamed over the target. A crash before the rename leaves
//! the original target untouched.
//!
//! [`write_in_place`] trades the rename for descriptor identity: when a
//! writer already holds an exclusive lock on the target's descriptor, a
//! rename would silently detach that lock from the visible file. Instead the
//! current bytes are first copied to a `.backup` sibling, the original
//! descriptor is truncated and rewritten, and the backup is removed only
//! after the rewrite is durable. [`restore_backups`] completes the protocol
//! after a crash.

#![forbid(unsafe_code)]

mod atomic;
mod error;
mod lock;

pub use atomic::{
    create_exclusive, is_transient_name, read_locked, restore_backups, write_atomic,
    write_in_place,
};
pub use error::{FsError, Result};
pub use lock::{sweep_stale_locks, FileLock};
