//! Tapedeck - media sample buffering and timeline composition engine
//!
//! The engine itself lives in the `td-*` crates. This crate adds the pieces
//! the command-line tool needs and exposes them for integration testing.

pub mod config;
pub mod playback;
pub mod playlist;
pub mod synthetic;
