//! Property replay onto the destination
//!
//! Runs during a successful epilogue. Replay order is fixed: attribute
//! bits first, then timestamps, then access-control state last. Setting
//! access control can itself touch modify timestamps on some platforms,
//! so it must not run before the timestamps are in place.
//!
//! Replay never fails the transfer: the data is already durable by the
//! time it runs, so every problem is collected as a per-kind warning and
//! the result is reported as a degraded success.

use crate::error::{CloudMoveError, IoResultExt, Result};
use crate::properties::{
    FileAttributes, PropertyKind, PropertySnapshot, PropertySource, SecurityDescriptor,
};
use std::path::PathBuf;
use std::time::SystemTime;

/// Destination-side application of one property kind at a time.
///
/// Implementations decide what each kind means for their platform or
/// service; the replay driver only decides order and policy.
pub trait PropertyApplier {
    /// Apply OS attribute bits
    fn apply_attributes(&mut self, attributes: FileAttributes) -> Result<()>;

    /// Apply creation and/or last-write timestamps
    fn apply_times(
        &mut self,
        creation: Option<SystemTime>,
        last_write: Option<SystemTime>,
    ) -> Result<()>;

    /// Apply the decomposed access-control descriptor. Implementations may
    /// apply a subset of the components (e.g. owner+group+DACL, no SACL).
    fn apply_security(&mut self, descriptor: &SecurityDescriptor) -> Result<()>;
}

/// What property replay managed to do
#[derive(Debug, Clone, Default)]
pub struct PropertyReplayReport {
    /// Kinds applied to the destination
    pub applied: Vec<PropertyKind>,
    /// Kinds the source does not carry (capability absent, not a failure)
    pub skipped: Vec<PropertyKind>,
    /// Per-kind read/write problems; data stayed durable, result degraded
    pub warnings: Vec<(PropertyKind, String)>,
}

impl PropertyReplayReport {
    /// True if nothing went wrong (skips are fine)
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Replay all supported property kinds from `source` onto `applier`.
///
/// Fetches lazily through a [`PropertySnapshot`] (at most one read per
/// kind) and applies in the fixed order attributes → timestamps →
/// security descriptor.
pub fn replay_properties(
    source: &dyn PropertySource,
    applier: &mut dyn PropertyApplier,
) -> PropertyReplayReport {
    let mut report = PropertyReplayReport::default();
    let mut snapshot = PropertySnapshot::new(source);

    // Attribute bits go first: some destinations reset timestamps as a
    // side effect of attribute writes.
    if source.supports(PropertyKind::Attributes) {
        match snapshot.attributes() {
            Ok(attributes) => match applier.apply_attributes(attributes) {
                Ok(()) => report.applied.push(PropertyKind::Attributes),
                Err(e) => report.warnings.push((PropertyKind::Attributes, e.to_string())),
            },
            Err(e) => report.warnings.push((PropertyKind::Attributes, e.to_string())),
        }
    } else {
        report.skipped.push(PropertyKind::Attributes);
    }

    // Timestamps second. Creation and last-write are independently
    // optional; whatever is available goes out in one apply call.
    let creation = if source.supports(PropertyKind::CreationTime) {
        match snapshot.creation_time() {
            Ok(time) => Some(time),
            Err(e) => {
                report.warnings.push((PropertyKind::CreationTime, e.to_string()));
                None
            }
        }
    } else {
        report.skipped.push(PropertyKind::CreationTime);
        None
    };
    let last_write = if source.supports(PropertyKind::LastWriteTime) {
        match snapshot.last_write_time() {
            Ok(time) => Some(time),
            Err(e) => {
                report.warnings.push((PropertyKind::LastWriteTime, e.to_string()));
                None
            }
        }
    } else {
        report.skipped.push(PropertyKind::LastWriteTime);
        None
    };

    if creation.is_some() || last_write.is_some() {
        match applier.apply_times(creation, last_write) {
            Ok(()) => {
                if creation.is_some() {
                    report.applied.push(PropertyKind::CreationTime);
                }
                if last_write.is_some() {
                    report.applied.push(PropertyKind::LastWriteTime);
                }
            }
            Err(e) => {
                let kind = if last_write.is_some() {
                    PropertyKind::LastWriteTime
                } else {
                    PropertyKind::CreationTime
                };
                report.warnings.push((kind, e.to_string()));
            }
        }
    }

    // Access-control state last.
    if source.supports(PropertyKind::SecurityDescriptor) {
        match snapshot.security_descriptor() {
            Ok(raw) => match SecurityDescriptor::parse(&raw) {
                Ok(descriptor) => match applier.apply_security(&descriptor) {
                    Ok(()) => report.applied.push(PropertyKind::SecurityDescriptor),
                    Err(e) => report
                        .warnings
                        .push((PropertyKind::SecurityDescriptor, e.to_string())),
                },
                Err(e) => report
                    .warnings
                    .push((PropertyKind::SecurityDescriptor, e.to_string())),
            },
            Err(e) => report
                .warnings
                .push((PropertyKind::SecurityDescriptor, e.to_string())),
        }
    } else {
        report.skipped.push(PropertyKind::SecurityDescriptor);
    }

    report
}

/// Applies replayed properties to a local destination file.
///
/// Attribute bits map onto the unix permission model, timestamps go
/// through `filetime`, and the access-control components are stashed in
/// extended attributes (the same trick SMB servers use to persist NT ACLs
/// on a POSIX filesystem). Creation time is not settable on unix and is
/// quietly left to the filesystem.
pub struct LocalFileApplier {
    path: PathBuf,
}

impl LocalFileApplier {
    /// Create an applier for the destination file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PropertyApplier for LocalFileApplier {
    #[cfg(unix)]
    fn apply_attributes(&mut self, attributes: FileAttributes) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(&self.path).with_path(&self.path)?;
        let mut mode = metadata.permissions().mode();

        if attributes.has(FileAttributes::READ_ONLY) {
            mode &= !0o222;
        } else {
            mode |= 0o200;
        }

        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode)).map_err(
            |e| CloudMoveError::property_write(PropertyKind::Attributes, e.to_string()),
        )
    }

    #[cfg(not(unix))]
    fn apply_attributes(&mut self, _attributes: FileAttributes) -> Result<()> {
        Ok(())
    }

    fn apply_times(
        &mut self,
        creation: Option<SystemTime>,
        last_write: Option<SystemTime>,
    ) -> Result<()> {
        if creation.is_some() {
            // No portable way to set a creation time; the filesystem keeps
            // the one it assigned when the download materialized the file.
            tracing::debug!(path = %self.path.display(), "creation time not settable, skipping");
        }

        if let Some(last_write) = last_write {
            filetime::set_file_mtime(&self.path, filetime::FileTime::from_system_time(last_write))
                .map_err(|e| {
                    CloudMoveError::property_write(PropertyKind::LastWriteTime, e.to_string())
                })?;
        }

        Ok(())
    }

    #[cfg(unix)]
    fn apply_security(&mut self, descriptor: &SecurityDescriptor) -> Result<()> {
        let write = |name: &str, value: &str| {
            xattr::set(&self.path, name, value.as_bytes()).map_err(|e| {
                CloudMoveError::property_write(PropertyKind::SecurityDescriptor, e.to_string())
            })
        };

        // Components are applied independently; whatever the descriptor
        // carries gets its own attribute.
        if let Some(owner) = &descriptor.owner {
            write("user.cloudmove.owner", owner)?;
        }
        if let Some(group) = &descriptor.group {
            write("user.cloudmove.group", group)?;
        }
        if descriptor.dacl.is_some() {
            let dacl_only = SecurityDescriptor {
                dacl: descriptor.dacl.clone(),
                ..Default::default()
            };
            write("user.cloudmove.dacl", &dacl_only.to_string())?;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_security(&mut self, _descriptor: &SecurityDescriptor) -> Result<()> {
        Ok(())
    }
}
