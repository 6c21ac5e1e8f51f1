//! Command-line command handlers for nightshade.
//!
//! Every client command talks to the running daemon over IPC; nothing here
//! touches the display or the state file directly.

pub mod control;
pub mod help;
pub mod status;
