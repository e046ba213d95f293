//! Directory-backed transport
//!
//! Treats a local directory as the remote service: objects are files under
//! the root, staged blocks are files in a hidden staging area, and commit
//! concatenates them in block order. Lets the CLI and integration tests
//! run the full engine against a real filesystem.

use crate::error::{CloudMoveError, IoResultExt, Result};
use crate::properties::{LocalFileApplier, PropertyApplier, RemoteProperties, SecurityDescriptor};
use crate::transport::RemoteTransport;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const STAGING_DIR: &str = ".cloudmove-staging";

/// Remote service backed by a directory on the local filesystem
pub struct LocalDirTransport {
    root: PathBuf,
}

impl LocalDirTransport {
    /// Create a transport rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).with_path(&root)?;
        Ok(Self { root })
    }

    fn object_path(&self, remote: &str) -> Result<PathBuf> {
        // Remote names are opaque keys; reject anything that would escape
        // the root.
        let relative = Path::new(remote);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CloudMoveError::transport(format!(
                "invalid remote name: {remote}"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn staging_path(&self, remote: &str) -> PathBuf {
        let sanitized: String = remote
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(STAGING_DIR).join(sanitized)
    }

    fn block_path(&self, remote: &str, block_index: u32) -> PathBuf {
        self.staging_path(remote).join(format!("block_{block_index:08}"))
    }
}

impl RemoteTransport for LocalDirTransport {
    fn exists(&self, remote: &str) -> Result<bool> {
        Ok(self.object_path(remote)?.is_file())
    }

    fn remote_size(&self, remote: &str) -> Result<u64> {
        let path = self.object_path(remote)?;
        let metadata = std::fs::metadata(&path).with_path(&path)?;
        Ok(metadata.len())
    }

    fn create_remote(&self, remote: &str, size: u64) -> Result<()> {
        let path = self.object_path(remote)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        let file = File::create(&path).with_path(&path)?;
        file.set_len(size).with_path(&path)?;
        Ok(())
    }

    fn write_range(&self, remote: &str, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let path = self.object_path(remote)?;
        let mut file = OpenOptions::new().write(true).open(&path).with_path(&path)?;
        file.seek(SeekFrom::Start(offset)).with_path(&path)?;
        file.write_all(data).with_path(&path)?;
        Ok(())
    }

    fn read_range(&self, remote: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        let path = self.object_path(remote)?;
        let mut file = File::open(&path).with_path(&path)?;
        file.seek(SeekFrom::Start(offset)).with_path(&path)?;

        let mut buffer = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let read = file.read(&mut buffer[filled..]).with_path(&path)?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    fn put_block(&self, remote: &str, block_index: u32, data: &[u8]) -> Result<()> {
        let staging = self.staging_path(remote);
        std::fs::create_dir_all(&staging).with_path(&staging)?;

        let path = self.block_path(remote, block_index);
        std::fs::write(&path, data).with_path(&path)?;
        Ok(())
    }

    fn commit_blocks(&self, remote: &str, order: &[u32], content_type: Option<&str>) -> Result<()> {
        let path = self.object_path(remote)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        let mut out = File::create(&path).with_path(&path)?;
        for index in order {
            let block = self.block_path(remote, *index);
            let data = std::fs::read(&block).map_err(|e| {
                CloudMoveError::transport(format!("block {index} was never staged: {e}"))
            })?;
            out.write_all(&data).with_path(&path)?;
        }
        drop(out);

        #[cfg(unix)]
        if let Some(content_type) = content_type {
            // The filesystem has no content-type header; stash the sniffed
            // type where tools expect it.
            let _ = xattr::set(&path, "user.mime_type", content_type.as_bytes());
        }
        #[cfg(not(unix))]
        let _ = content_type;

        let _ = std::fs::remove_dir_all(self.staging_path(remote));
        Ok(())
    }

    fn put_object(&self, remote: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let path = self.object_path(remote)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        std::fs::write(&path, data).with_path(&path)?;

        #[cfg(unix)]
        if let Some(content_type) = content_type {
            let _ = xattr::set(&path, "user.mime_type", content_type.as_bytes());
        }
        #[cfg(not(unix))]
        let _ = content_type;

        Ok(())
    }

    fn abort_staged(&self, remote: &str) -> Result<()> {
        match std::fs::remove_dir_all(self.staging_path(remote)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CloudMoveError::io(self.staging_path(remote), e)),
        }
    }

    fn delete_remote(&self, remote: &str) -> Result<()> {
        let path = self.object_path(remote)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CloudMoveError::io(path, e)),
        }
    }

    fn set_remote_properties(&self, remote: &str, properties: &RemoteProperties) -> Result<()> {
        let path = self.object_path(remote)?;
        let mut applier = LocalFileApplier::new(&path);

        if let Some(attributes) = properties.attributes {
            applier.apply_attributes(attributes)?;
        }
        if properties.creation_time.is_some() || properties.last_write_time.is_some() {
            applier.apply_times(properties.creation_time, properties.last_write_time)?;
        }
        if let Some(raw) = &properties.security_descriptor {
            let descriptor = SecurityDescriptor::parse(raw)?;
            applier.apply_security(&descriptor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_block_staging_and_commit() {
        let dir = TempDir::new().unwrap();
        let transport = LocalDirTransport::new(dir.path()).unwrap();

        transport.put_block("photo.jpg", 1, b"tail").unwrap();
        transport.put_block("photo.jpg", 0, b"head-").unwrap();
        assert!(!transport.exists("photo.jpg").unwrap());

        transport.commit_blocks("photo.jpg", &[0, 1], None).unwrap();
        assert!(transport.exists("photo.jpg").unwrap());
        assert_eq!(
            std::fs::read(dir.path().join("photo.jpg")).unwrap(),
            b"head-tail"
        );
        // Staging area cleaned up on commit.
        assert!(!dir.path().join(STAGING_DIR).join("photo.jpg").exists());
    }

    #[test]
    fn test_ranged_writes() {
        let dir = TempDir::new().unwrap();
        let transport = LocalDirTransport::new(dir.path()).unwrap();

        transport.create_remote("doc.bin", 10).unwrap();
        transport.write_range("doc.bin", 8, b"89").unwrap();
        transport.write_range("doc.bin", 0, b"01234567").unwrap();

        assert_eq!(std::fs::read(dir.path().join("doc.bin")).unwrap(), b"0123456789");
        assert_eq!(transport.remote_size("doc.bin").unwrap(), 10);
    }

    #[test]
    fn test_read_range_short_at_eof() {
        let dir = TempDir::new().unwrap();
        let transport = LocalDirTransport::new(dir.path()).unwrap();
        transport.put_object("small.txt", b"abc", None).unwrap();

        assert_eq!(transport.read_range("small.txt", 1, 16).unwrap(), b"bc");
    }

    #[test]
    fn test_abort_and_delete_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let transport = LocalDirTransport::new(dir.path()).unwrap();

        transport.abort_staged("never-staged").unwrap();
        transport.delete_remote("never-created").unwrap();

        transport.put_block("obj", 0, b"x").unwrap();
        transport.abort_staged("obj").unwrap();
        transport.abort_staged("obj").unwrap();
    }

    #[test]
    fn test_escaping_names_rejected() {
        let dir = TempDir::new().unwrap();
        let transport = LocalDirTransport::new(dir.path()).unwrap();

        assert!(transport.exists("../outside").is_err());
        assert!(transport.exists("/etc/passwd").is_err());
        assert!(transport.exists("nested/inside.txt").is_ok());
    }
}
