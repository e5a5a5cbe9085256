//! Beads - a git-native issue tracker backed by a directory of JSON files.
//!
//! Persistent state lives entirely under a `.beads/` root; each issue is one
//! JSON file whose directory encodes its lifecycle state. The crate provides
//! both the [`store::Store`] library API and the `bd` CLI binary.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod store;

// Public CLI module (needed by binary)
pub mod cli;

// Command implementations
pub mod commands;

// Human-facing rendering for the CLI
pub mod output;
