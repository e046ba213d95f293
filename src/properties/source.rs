//! Property-bearing source providers
//!
//! [`LocalFileSource`] reads metadata straight from a local file and is
//! what the upload path hands to property-aware destinations.
//! [`StaticPropertySource`] carries a property set captured earlier (e.g.
//! at enumeration time) and doubles as the test source.

use crate::error::{CloudMoveError, Result};
use crate::properties::{
    AccessEntry, AccessEntryType, AccessList, FileAttributes, PropertyKind, PropertySource,
    SecurityDescriptor, SourceInfoProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Property capability backed by a local file
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    /// Create a source over the local file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_error(&self, kind: PropertyKind, err: impl std::fmt::Display) -> CloudMoveError {
        CloudMoveError::property_read(kind, format!("{}: {err}", self.path.display()))
    }
}

impl PropertySource for LocalFileSource {
    fn supports(&self, kind: PropertyKind) -> bool {
        match kind {
            PropertyKind::Attributes
            | PropertyKind::CreationTime
            | PropertyKind::LastWriteTime => true,
            // The descriptor is synthesized from the unix owner/mode; other
            // platforms have no equivalent here.
            PropertyKind::SecurityDescriptor => cfg!(unix),
        }
    }

    fn attributes(&self) -> Result<FileAttributes> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| self.read_error(PropertyKind::Attributes, e))?;

        let mut attributes = FileAttributes::default();
        if metadata.permissions().readonly() {
            attributes.add(FileAttributes::READ_ONLY);
        }
        if metadata.is_dir() {
            attributes.add(FileAttributes::DIRECTORY);
        }
        if self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            attributes.add(FileAttributes::HIDDEN);
        }
        if attributes.bits == 0 {
            attributes.add(FileAttributes::NORMAL);
        }

        Ok(attributes)
    }

    fn creation_time(&self) -> Result<SystemTime> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| self.read_error(PropertyKind::CreationTime, e))?;
        metadata
            .created()
            .map_err(|e| self.read_error(PropertyKind::CreationTime, e))
    }

    fn last_write_time(&self) -> Result<SystemTime> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| self.read_error(PropertyKind::LastWriteTime, e))?;
        metadata
            .modified()
            .map_err(|e| self.read_error(PropertyKind::LastWriteTime, e))
    }

    #[cfg(unix)]
    fn security_descriptor(&self) -> Result<String> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| self.read_error(PropertyKind::SecurityDescriptor, e))?;

        // Unix identities are mapped into the S-1-22 authority the same way
        // SMB servers expose them: S-1-22-1-<uid> for users, S-1-22-2-<gid>
        // for groups.
        let owner = format!("S-1-22-1-{}", metadata.uid());
        let group = format!("S-1-22-2-{}", metadata.gid());
        let mode = metadata.mode();

        let mut entries = Vec::new();
        if let Some(rights) = mode_rights(mode >> 6) {
            entries.push(allow_entry(rights, owner.clone()));
        }
        if let Some(rights) = mode_rights(mode >> 3) {
            entries.push(allow_entry(rights, group.clone()));
        }
        if let Some(rights) = mode_rights(mode) {
            entries.push(allow_entry(rights, "WD".to_string()));
        }

        let descriptor = SecurityDescriptor {
            owner: Some(owner),
            group: Some(group),
            dacl: Some(AccessList { entries }),
            sacl: None,
        };

        Ok(descriptor.to_string())
    }

    #[cfg(not(unix))]
    fn security_descriptor(&self) -> Result<String> {
        Err(CloudMoveError::property_read(
            PropertyKind::SecurityDescriptor,
            "not available on this platform",
        ))
    }
}

impl SourceInfoProvider for LocalFileSource {
    fn properties(&self) -> Option<Arc<dyn PropertySource>> {
        Some(Arc::new(self.clone()))
    }
}

#[cfg(unix)]
fn mode_rights(mode_triplet: u32) -> Option<String> {
    let mut rights = String::new();
    if mode_triplet & 0o4 != 0 {
        rights.push_str("FR");
    }
    if mode_triplet & 0o2 != 0 {
        rights.push_str("FW");
    }
    if mode_triplet & 0o1 != 0 {
        rights.push_str("FX");
    }
    (!rights.is_empty()).then_some(rights)
}

#[cfg(unix)]
fn allow_entry(rights: String, trustee: String) -> AccessEntry {
    AccessEntry {
        entry_type: AccessEntryType::Allow,
        flags: String::new(),
        rights,
        trustee,
    }
}

/// Property set captured ahead of time.
///
/// Used for sources whose metadata was collected during enumeration and
/// for exercising replay in tests. Kinds not populated report as
/// unsupported; kinds listed in `failing` report a read error when
/// queried.
#[derive(Debug, Clone, Default)]
pub struct StaticPropertySource {
    attributes: Option<FileAttributes>,
    creation_time: Option<SystemTime>,
    last_write_time: Option<SystemTime>,
    security_descriptor: Option<String>,
    failing: Vec<PropertyKind>,
}

impl StaticPropertySource {
    /// Set the attribute bits this source carries
    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set the creation time this source carries
    pub fn with_creation_time(mut self, time: SystemTime) -> Self {
        self.creation_time = Some(time);
        self
    }

    /// Set the last-write time this source carries
    pub fn with_last_write_time(mut self, time: SystemTime) -> Self {
        self.last_write_time = Some(time);
        self
    }

    /// Set the security descriptor string this source carries
    pub fn with_security_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.security_descriptor = Some(descriptor.into());
        self
    }

    /// Make one kind fail at read time (capability present, fetch broken)
    pub fn with_failing(mut self, kind: PropertyKind) -> Self {
        self.failing.push(kind);
        self
    }

    fn get<T: Clone>(&self, kind: PropertyKind, value: &Option<T>) -> Result<T> {
        if self.failing.contains(&kind) {
            return Err(CloudMoveError::property_read(kind, "source read failed"));
        }
        value
            .clone()
            .ok_or_else(|| CloudMoveError::property_read(kind, "not carried by this source"))
    }
}

impl PropertySource for StaticPropertySource {
    fn supports(&self, kind: PropertyKind) -> bool {
        match kind {
            PropertyKind::Attributes => self.attributes.is_some(),
            PropertyKind::CreationTime => self.creation_time.is_some(),
            PropertyKind::LastWriteTime => self.last_write_time.is_some(),
            PropertyKind::SecurityDescriptor => self.security_descriptor.is_some(),
        }
    }

    fn attributes(&self) -> Result<FileAttributes> {
        self.get(PropertyKind::Attributes, &self.attributes)
    }

    fn creation_time(&self) -> Result<SystemTime> {
        self.get(PropertyKind::CreationTime, &self.creation_time)
    }

    fn last_write_time(&self) -> Result<SystemTime> {
        self.get(PropertyKind::LastWriteTime, &self.last_write_time)
    }

    fn security_descriptor(&self) -> Result<String> {
        self.get(PropertyKind::SecurityDescriptor, &self.security_descriptor)
    }
}

impl SourceInfoProvider for StaticPropertySource {
    fn properties(&self) -> Option<Arc<dyn PropertySource>> {
        Some(Arc::new(self.clone()))
    }
}
