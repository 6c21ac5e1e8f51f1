//! # Nightshade Library
//!
//! Internal library for the nightshade binary.
//!
//! This library exists to enable testing of the automation internals and to
//! keep CLI dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: `Nightshade` runner wires resources and runs the daemon
//! - **Core Logic**: `core` holds the curve engine, activity tracker, shift
//!   state machine and the single-owner `Coordinator`
//! - **Rules**: `rules` stores per-app and per-site suppression rules
//! - **Backends**: `backend` defines the display-control port
//! - **Configuration**: `config` for TOML-based settings
//! - **State**: `state` for the persisted key-value store and IPC
//! - **Commands**: `commands` for the client subcommands
//! - **Infrastructure**: signals, lock file, logging and the clock

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod common;

pub mod args;
pub mod backend;
pub mod commands;
pub mod config;
pub mod core;
pub mod geo;
pub mod io;
pub mod rules;
pub mod state;
pub mod time;

mod nightshade;

// Re-export for binary
pub use nightshade::Nightshade;
