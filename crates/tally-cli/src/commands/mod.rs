pub mod common;
pub mod completions;
pub mod config;
pub mod merge;
pub mod pull;
pub mod push;
pub mod status;
pub mod sync;
pub mod verify;
