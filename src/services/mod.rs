//! Services module - the moving parts behind bootstrap and shutdown.
//!
//! Everything here is independent of how the process is started, so each
//! service can be exercised on its own in tests.
//!
//! # Components
//!
//! - [`similarity`]: normalized edit-distance score used to match titles.
//! - [`DirectoryReconciler`]: finds downloads that arrived while the service
//!   was down and enqueues them.
//! - [`WorkerPool`] / [`QueueWorker`]: thread pool that processes archives,
//!   with [`TaskProcessor`] as the per-archive work.
//! - [`LibraryMover`]: the bundled [`TaskProcessor`], moving archives into
//!   the library.
//! - [`Persistence`] / [`FileStore`]: storage for the task tables.
//! - [`MetadataApi`] / [`AniList`]: external metadata source.
//!
//! The traits are the seams bootstrap is written against; tests substitute
//! `mockall` doubles for them.

pub mod library;
pub mod metadata;
pub mod persistence;
pub mod reconcile;
pub mod similarity;
pub mod workers;

pub use library::LibraryMover;
pub use metadata::{ANILIST_ENDPOINT, AniList, MetadataApi};
pub use persistence::{FileStore, Persistence};
pub use reconcile::DirectoryReconciler;
pub use workers::{QueueWorker, TaskProcessor, WorkerPool};
