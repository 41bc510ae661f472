//! Shared types for the vfold virtual folder service.
//!
//! This crate holds the data model exchanged between the folder service, the
//! blob storage layer, and the host application:
//!
//! - files, blocks and block hashes as they appear in the index
//!   ([`FileInfo`], [`BlockInfo`], [`BlockHash`])
//! - the narrow interface the service consumes the index through
//!   ([`IndexProvider`], [`Snapshot`]), plus [`MemIndex`], an in-memory
//!   provider for tests and embedders
//! - events the service emits back to the host ([`FolderEvent`])
//! - pull-order configuration for the download queue ([`PullOrder`])

mod events;
mod index;
mod model;
mod order;

pub use events::FolderEvent;
pub use index::{IndexError, IndexProvider, MemIndex, Snapshot};
pub use model::{BlockHash, BlockInfo, DeviceId, FileError, FileInfo, FolderStatistics};
pub use order::PullOrder;
