//! The vfold virtual folder service.
//!
//! A virtual folder presents a remote-synchronized file tree as a local
//! read-only FUSE mount whose contents materialize on demand. Only the
//! folder's index lives locally; block data is fetched lazily from peers —
//! reactively when a mounted read touches a byte range, and proactively via
//! a background download queue fed by index scans.
//!
//! # Architecture
//!
//! ```text
//! FolderService ── serve() lifecycle, scans, control surface
//!   ├── BlockCache (vfold-blobs-store) over mem:// file:// s3:// storage
//!   ├── FetchCoordinator ── JobQueue + 4 download workers
//!   │     └── BlockPuller (capability: the replication layer)
//!   └── FolderFs (fuser) ── InodeTable + index snapshots
//!         └── BlockFetcher (capability: the coordinator)
//! ```
//!
//! The host constructs a [`FolderService`] from a [`FolderConfig`], an index
//! provider, a block puller, and an event channel, then drives it with
//! [`FolderService::serve`]. Everything the host observes comes back either
//! as [`FolderEvent`](vfold_common::FolderEvent)s or through the control
//! surface (`jobs`, `bring_to_front`, `hash_block_data`, ...).

mod config;
mod coordinator;
mod error;
mod fuse;
mod queue;
mod service;

pub use config::FolderConfig;
pub use coordinator::{BlockFetcher, BlockPuller, FetchCoordinator};
pub use error::{BlockLookupError, ConfigError, MountError, ServeError};
pub use fuse::{FolderFs, InodeTable, ROOT_INODE};
pub use queue::{Job, JobQueue};
pub use service::FolderService;
