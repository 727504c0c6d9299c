//! Model files: the manifest, resumable transfers, archive extraction, and the lifecycle manager
//! that owns the loaded engine.

pub mod download;
pub mod extract;
pub mod manager;
pub mod manifest;
pub mod transport;
