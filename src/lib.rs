//! Event photo uploader.
//!
//! Guests' photos and videos are sent to an event's upload endpoint one file
//! at a time, with per-file and overall progress reporting. Organizer-side
//! records (events, users, storage connections) live behind the store traits.

pub mod commands;
pub mod config;
pub mod errors;
pub mod media;
pub mod security;
pub mod store;
pub mod uploader;
