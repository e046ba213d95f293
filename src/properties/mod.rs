//! Source metadata capabilities and replay
//!
//! Some source providers can expose OS attributes, timestamps, and a
//! security descriptor for the item being transferred; some destinations
//! can accept them. Both sides are modeled as capabilities: absence is a
//! clean skip, never an error. Replay onto the destination happens during
//! a successful epilogue, in a fixed order (attributes, then timestamps,
//! then access-control state).

mod descriptor;
mod replay;
mod source;

pub use descriptor::{well_known_sids, AccessEntry, AccessEntryType, AccessList, SecurityDescriptor};
pub use replay::{replay_properties, LocalFileApplier, PropertyApplier, PropertyReplayReport};
pub use source::{LocalFileSource, StaticPropertySource};

use crate::error::{CloudMoveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// One independently optional kind of source metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// OS file attribute bits
    Attributes,
    /// Creation timestamp
    CreationTime,
    /// Last-write timestamp
    LastWriteTime,
    /// Access-control descriptor (owner, group, DACL)
    SecurityDescriptor,
}

impl PropertyKind {
    /// All kinds, in replay order
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::Attributes,
        PropertyKind::CreationTime,
        PropertyKind::LastWriteTime,
        PropertyKind::SecurityDescriptor,
    ];
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Attributes => "file attributes",
            PropertyKind::CreationTime => "creation time",
            PropertyKind::LastWriteTime => "last-write time",
            PropertyKind::SecurityDescriptor => "security descriptor",
        };
        f.write_str(name)
    }
}

/// OS file attribute bits (SMB/Windows numbering)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Raw attribute bits
    pub bits: u32,
}

impl FileAttributes {
    /// File may not be written
    pub const READ_ONLY: u32 = 0x0001;
    /// File is hidden from normal listings
    pub const HIDDEN: u32 = 0x0002;
    /// Operating system file
    pub const SYSTEM: u32 = 0x0004;
    /// Item is a directory
    pub const DIRECTORY: u32 = 0x0010;
    /// File is marked for archiving
    pub const ARCHIVE: u32 = 0x0020;
    /// No other attributes set
    pub const NORMAL: u32 = 0x0080;
    /// File is temporary
    pub const TEMPORARY: u32 = 0x0100;

    /// Create from raw bits
    pub fn new(bits: u32) -> Self {
        Self { bits }
    }

    /// Check if specific attribute is set
    pub fn has(&self, attribute: u32) -> bool {
        self.bits & attribute == attribute
    }

    /// Add an attribute
    pub fn add(&mut self, attribute: u32) {
        self.bits |= attribute;
    }

    /// Remove an attribute
    pub fn remove(&mut self, attribute: u32) {
        self.bits &= !attribute;
    }
}

/// Capability exposed by property-bearing sources.
///
/// Each kind is independently optional: `supports` reports whether the
/// source can ever supply that kind, while the getters report whether it
/// could be supplied this time. Getters fail with
/// [`CloudMoveError::PropertyRead`] naming the kind that was lost.
pub trait PropertySource: Send + Sync {
    /// Whether this source can supply the given kind at all
    fn supports(&self, kind: PropertyKind) -> bool;

    /// OS attribute bits of the source item
    fn attributes(&self) -> Result<FileAttributes>;

    /// Creation timestamp of the source item
    fn creation_time(&self) -> Result<SystemTime>;

    /// Last-write timestamp of the source item
    fn last_write_time(&self) -> Result<SystemTime>;

    /// Platform-neutral security descriptor string
    fn security_descriptor(&self) -> Result<String>;
}

/// Capability query for source providers: does this source carry
/// properties? Resolved once per transfer, before the epilogue.
pub trait SourceInfoProvider: Send + Sync {
    /// The property capability, if this source has one
    fn properties(&self) -> Option<std::sync::Arc<dyn PropertySource>>;
}

/// Lazy, at-most-once-per-kind view of a source's properties.
///
/// Built during the epilogue; repeated reads of the same kind return the
/// memoized result instead of re-querying the source.
pub struct PropertySnapshot<'a> {
    source: &'a dyn PropertySource,
    attributes: Option<std::result::Result<FileAttributes, String>>,
    creation_time: Option<std::result::Result<SystemTime, String>>,
    last_write_time: Option<std::result::Result<SystemTime, String>>,
    security_descriptor: Option<std::result::Result<String, String>>,
}

impl<'a> PropertySnapshot<'a> {
    /// Create an empty snapshot over `source`
    pub fn new(source: &'a dyn PropertySource) -> Self {
        Self {
            source,
            attributes: None,
            creation_time: None,
            last_write_time: None,
            security_descriptor: None,
        }
    }

    /// Attribute bits, fetched on first access
    pub fn attributes(&mut self) -> Result<FileAttributes> {
        if self.attributes.is_none() {
            self.attributes = Some(self.source.attributes().map_err(|e| e.to_string()));
        }
        self.attributes
            .as_ref()
            .expect("just populated")
            .clone()
            .map_err(|m| CloudMoveError::property_read(PropertyKind::Attributes, m))
    }

    /// Creation time, fetched on first access
    pub fn creation_time(&mut self) -> Result<SystemTime> {
        if self.creation_time.is_none() {
            self.creation_time = Some(self.source.creation_time().map_err(|e| e.to_string()));
        }
        self.creation_time
            .as_ref()
            .expect("just populated")
            .clone()
            .map_err(|m| CloudMoveError::property_read(PropertyKind::CreationTime, m))
    }

    /// Last-write time, fetched on first access
    pub fn last_write_time(&mut self) -> Result<SystemTime> {
        if self.last_write_time.is_none() {
            self.last_write_time = Some(self.source.last_write_time().map_err(|e| e.to_string()));
        }
        self.last_write_time
            .as_ref()
            .expect("just populated")
            .clone()
            .map_err(|m| CloudMoveError::property_read(PropertyKind::LastWriteTime, m))
    }

    /// Security descriptor string, fetched on first access
    pub fn security_descriptor(&mut self) -> Result<String> {
        if self.security_descriptor.is_none() {
            self.security_descriptor =
                Some(self.source.security_descriptor().map_err(|e| e.to_string()));
        }
        self.security_descriptor
            .as_ref()
            .expect("just populated")
            .clone()
            .map_err(|m| CloudMoveError::property_read(PropertyKind::SecurityDescriptor, m))
    }
}

/// One batch of metadata sent to a remote destination.
///
/// Fields are optional so each replay step can carry only its own kind,
/// preserving the apply order on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteProperties {
    /// OS attribute bits
    pub attributes: Option<FileAttributes>,
    /// Creation timestamp
    pub creation_time: Option<SystemTime>,
    /// Last-write timestamp
    pub last_write_time: Option<SystemTime>,
    /// Serialized security descriptor
    pub security_descriptor: Option<String>,
}

impl RemoteProperties {
    /// Which kinds this batch carries, in replay order
    pub fn kinds(&self) -> Vec<PropertyKind> {
        let mut kinds = Vec::new();
        if self.attributes.is_some() {
            kinds.push(PropertyKind::Attributes);
        }
        if self.creation_time.is_some() {
            kinds.push(PropertyKind::CreationTime);
        }
        if self.last_write_time.is_some() {
            kinds.push(PropertyKind::LastWriteTime);
        }
        if self.security_descriptor.is_some() {
            kinds.push(PropertyKind::SecurityDescriptor);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        fetches: AtomicU32,
    }

    impl PropertySource for CountingSource {
        fn supports(&self, _kind: PropertyKind) -> bool {
            true
        }

        fn attributes(&self) -> Result<FileAttributes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(FileAttributes::new(FileAttributes::ARCHIVE))
        }

        fn creation_time(&self) -> Result<SystemTime> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Err(CloudMoveError::property_read(
                PropertyKind::CreationTime,
                "unavailable",
            ))
        }

        fn last_write_time(&self) -> Result<SystemTime> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(SystemTime::UNIX_EPOCH)
        }

        fn security_descriptor(&self) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok("O:WD".to_string())
        }
    }

    #[test]
    fn test_snapshot_fetches_each_kind_at_most_once() {
        let source = CountingSource { fetches: AtomicU32::new(0) };
        let mut snapshot = PropertySnapshot::new(&source);

        assert!(snapshot.attributes().is_ok());
        assert!(snapshot.attributes().is_ok());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // Errors are memoized too.
        assert!(snapshot.creation_time().is_err());
        assert!(snapshot.creation_time().is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attribute_bits() {
        let mut attrs = FileAttributes::new(FileAttributes::READ_ONLY);
        assert!(attrs.has(FileAttributes::READ_ONLY));
        assert!(!attrs.has(FileAttributes::HIDDEN));

        attrs.add(FileAttributes::HIDDEN);
        assert!(attrs.has(FileAttributes::HIDDEN));

        attrs.remove(FileAttributes::READ_ONLY);
        assert!(!attrs.has(FileAttributes::READ_ONLY));
    }

    #[test]
    fn test_remote_properties_kinds_follow_replay_order() {
        let props = RemoteProperties {
            attributes: Some(FileAttributes::new(0)),
            creation_time: None,
            last_write_time: Some(SystemTime::UNIX_EPOCH),
            security_descriptor: Some("O:WD".to_string()),
        };
        assert_eq!(
            props.kinds(),
            vec![
                PropertyKind::Attributes,
                PropertyKind::LastWriteTime,
                PropertyKind::SecurityDescriptor,
            ]
        );
    }
}
