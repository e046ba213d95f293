//! Immutable transfer description

use crate::config::OverwritePolicy;
use serde::{Deserialize, Serialize};

/// Description of one file transfer.
///
/// Created once when the transfer is dispatched to an endpoint and
/// read-only from then on; the endpoint and its chunk operations only
/// ever borrow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Identity of the transfer within the job
    pub id: u64,
    /// Source path or URI
    pub source: String,
    /// Destination path or URI
    pub destination: String,
    /// Total file size in bytes
    pub size: u64,
    /// Configured chunk size in bytes
    pub chunk_size: u64,
    /// What to do when the destination already exists
    pub overwrite: OverwritePolicy,
}

impl TransferInfo {
    /// Short display name of the file being moved
    pub fn display_name(&self) -> &str {
        self.source
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let info = TransferInfo {
            id: 1,
            source: "/data/photos/cat.jpg".to_string(),
            destination: "backup/cat.jpg".to_string(),
            size: 10,
            chunk_size: 4,
            overwrite: OverwritePolicy::Always,
        };
        assert_eq!(info.display_name(), "cat.jpg");
    }
}
