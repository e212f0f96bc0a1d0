//! Media preprocessing for chat messages.
//!
//! Inbound messages carrying media pass through one selectable processor
//! (scrub, decrypt, save to disk, or upload to cloud storage) before they
//! reach application code.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod storage;
