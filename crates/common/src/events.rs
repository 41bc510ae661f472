//! Events emitted by the folder service for host integration.
//!
//! Delivered over a `flume` channel handed to the service at construction;
//! the host decides whether to fan them out, persist them, or drop them.

use serde::Serialize;

/// Events the folder service produces.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum FolderEvent {
    /// The local index gained an entry: every block of the named file is
    /// confirmed present in the block cache.
    LocalIndexUpdated {
        folder: String,
        items: usize,
        filenames: Vec<String>,
        sequence: i64,
        /// Legacy alias for `sequence`.
        version: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_index_updated_serializes_with_legacy_version() {
        let event = FolderEvent::LocalIndexUpdated {
            folder: "default".into(),
            items: 1,
            filenames: vec!["file.bin".into()],
            sequence: 3,
            version: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LocalIndexUpdated");
        assert_eq!(json["data"]["sequence"], 3);
        assert_eq!(json["data"]["version"], 3);
        assert_eq!(json["data"]["filenames"][0], "file.bin");
    }
}
