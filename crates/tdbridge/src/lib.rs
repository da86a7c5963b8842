//! # tdbridge
//!
//! Server binary support: CLI parsing, settings resolution, engine bootstrap
//! and the serve-until-signal loop. `main.rs` only supplies the native
//! engine.

#![deny(unsafe_code)]

pub mod app;
pub mod cli;

pub use cli::Cli;
