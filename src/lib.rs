//! Liso - a small HTTP/1.1 origin server
//!
//! This crate provides the non-blocking core of the `lisod` static file
//! server: growable socket buffers, an incremental request parser, and a
//! file-to-socket streaming path, driven by a readiness-based event loop.

pub mod config;
pub mod http;
pub mod net;
pub mod server;
