//! # mural-storage
//!
//! Server-side persistence for mural canvas projects: an SQLite-backed
//! project store with optimistic concurrency control, inline image
//! materialization into blob storage with compensating rollback, and an
//! in-process save transport adapter for the client crate.
//!
//! The version column is the only arbitration mechanism between
//! concurrent writers; there are no server-held locks or sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assets;
pub mod blob;
pub mod config;
pub mod error;
pub mod storage;
pub mod transport;

pub use assets::{decode_inline, materialize_inline_images, project_prefix};
pub use blob::{BlobError, BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::StorageLimits;
pub use error::{LimitKind, Result, StorageError};
pub use storage::{CanvasStorage, UpdatePayload, DEFAULT_PROJECT_TITLE};
pub use transport::StorageTransport;
