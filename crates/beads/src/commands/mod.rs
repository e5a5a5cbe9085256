//! Command implementations that sit above the store API.

pub mod init;
