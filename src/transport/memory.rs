//! In-memory transport
//!
//! Hashmap-backed remote service used by the test suite. Fault injection
//! hooks let tests fail a specific block, the existence probe, or the
//! property write without touching the engine under test.

use crate::error::{CloudMoveError, Result};
use crate::properties::RemoteProperties;
use crate::transport::RemoteTransport;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct RemoteEntry {
    data: Vec<u8>,
    staged: BTreeMap<u32, Vec<u8>>,
    committed_order: Option<Vec<u32>>,
    content_type: Option<String>,
    properties: Vec<RemoteProperties>,
    visible: bool,
    aborted: bool,
}

/// In-memory remote service with fault injection
#[derive(Default)]
pub struct InMemoryTransport {
    entries: Mutex<HashMap<String, RemoteEntry>>,
    fail_block_index: Mutex<Option<u32>>,
    fail_probe: AtomicBool,
    fail_properties: AtomicBool,
    commit_calls: AtomicU32,
    abort_calls: AtomicU32,
}

impl InMemoryTransport {
    /// Create an empty service
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put_block` fail for the given block index
    pub fn fail_block(&self, block_index: u32) {
        *self.fail_block_index.lock().unwrap() = Some(block_index);
    }

    /// Make the existence probe fail (network error, not "absent")
    pub fn fail_probe(&self) {
        self.fail_probe.store(true, Ordering::SeqCst);
    }

    /// Make property writes fail
    pub fn fail_properties(&self) {
        self.fail_properties.store(true, Ordering::SeqCst);
    }

    /// Bytes of a committed/visible object, if present
    pub fn object_bytes(&self, remote: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(remote)
            .filter(|e| e.visible)
            .map(|e| e.data.clone())
    }

    /// Content type recorded for the object
    pub fn content_type(&self, remote: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries.get(remote).and_then(|e| e.content_type.clone())
    }

    /// Block order the commit was issued with
    pub fn committed_order(&self, remote: &str) -> Option<Vec<u32>> {
        let entries = self.entries.lock().unwrap();
        entries.get(remote).and_then(|e| e.committed_order.clone())
    }

    /// Property batches applied to the object, in arrival order
    pub fn applied_properties(&self, remote: &str) -> Vec<RemoteProperties> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(remote)
            .map(|e| e.properties.clone())
            .unwrap_or_default()
    }

    /// How many commits the service has seen, across all objects
    pub fn commit_calls(&self) -> u32 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    /// How many staged-abort requests the service has seen
    pub fn abort_calls(&self) -> u32 {
        self.abort_calls.load(Ordering::SeqCst)
    }

    /// True if staged state for the object was abandoned
    pub fn was_aborted(&self, remote: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.get(remote).map(|e| e.aborted).unwrap_or(false)
    }

    /// Seed a visible object (download-source setup)
    pub fn seed_object(&self, remote: &str, data: &[u8]) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            remote.to_string(),
            RemoteEntry {
                data: data.to_vec(),
                visible: true,
                ..Default::default()
            },
        );
    }
}

impl RemoteTransport for InMemoryTransport {
    fn exists(&self, remote: &str) -> Result<bool> {
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(CloudMoveError::probe(remote, "injected probe failure"));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(remote).map(|e| e.visible).unwrap_or(false))
    }

    fn remote_size(&self, remote: &str) -> Result<u64> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(remote)
            .filter(|e| e.visible)
            .map(|e| e.data.len() as u64)
            .ok_or_else(|| CloudMoveError::transport(format!("no such object: {remote}")))
    }

    fn create_remote(&self, remote: &str, size: u64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(remote.to_string()).or_default();
        entry.data = vec![0u8; size as usize];
        entry.visible = true;
        Ok(())
    }

    fn write_range(&self, remote: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(remote)
            .ok_or_else(|| CloudMoveError::transport(format!("no such object: {remote}")))?;

        let end = offset as usize + data.len();
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn read_range(&self, remote: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(remote)
            .filter(|e| e.visible)
            .ok_or_else(|| CloudMoveError::transport(format!("no such object: {remote}")))?;

        let start = (offset as usize).min(entry.data.len());
        let end = (start + length).min(entry.data.len());
        Ok(entry.data[start..end].to_vec())
    }

    fn put_block(&self, remote: &str, block_index: u32, data: &[u8]) -> Result<()> {
        if *self.fail_block_index.lock().unwrap() == Some(block_index) {
            return Err(CloudMoveError::transport(format!(
                "injected failure staging block {block_index}"
            )));
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(remote.to_string()).or_default();
        entry.staged.insert(block_index, data.to_vec());
        Ok(())
    }

    fn commit_blocks(&self, remote: &str, order: &[u32], content_type: Option<&str>) -> Result<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(remote)
            .ok_or_else(|| CloudMoveError::transport(format!("nothing staged for: {remote}")))?;

        let mut data = Vec::new();
        for index in order {
            let block = entry.staged.get(index).ok_or_else(|| {
                CloudMoveError::transport(format!("block {index} was never staged"))
            })?;
            data.extend_from_slice(block);
        }

        entry.data = data;
        entry.staged.clear();
        entry.committed_order = Some(order.to_vec());
        entry.content_type = content_type.map(str::to_string);
        entry.visible = true;
        Ok(())
    }

    fn put_object(&self, remote: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(remote.to_string()).or_default();
        entry.data = data.to_vec();
        entry.content_type = content_type.map(str::to_string);
        entry.visible = true;
        Ok(())
    }

    fn abort_staged(&self, remote: &str) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(remote) {
            entry.staged.clear();
            entry.aborted = true;
        }
        Ok(())
    }

    fn delete_remote(&self, remote: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(remote);
        Ok(())
    }

    fn set_remote_properties(&self, remote: &str, properties: &RemoteProperties) -> Result<()> {
        if self.fail_properties.load(Ordering::SeqCst) {
            let kind = properties
                .kinds()
                .first()
                .copied()
                .unwrap_or(crate::properties::PropertyKind::Attributes);
            return Err(CloudMoveError::property_write(kind, "injected failure"));
        }

        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(remote)
            .ok_or_else(|| CloudMoveError::transport(format!("no such object: {remote}")))?;
        entry.properties.push(properties.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_commit_in_index_order() {
        let transport = InMemoryTransport::new();

        transport.put_block("obj", 1, b"world").unwrap();
        transport.put_block("obj", 0, b"hello ").unwrap();
        transport.commit_blocks("obj", &[0, 1], Some("text/plain")).unwrap();

        assert_eq!(transport.object_bytes("obj").unwrap(), b"hello world");
        assert_eq!(transport.content_type("obj").unwrap(), "text/plain");
        assert_eq!(transport.commit_calls(), 1);
    }

    #[test]
    fn test_staged_blocks_are_not_visible() {
        let transport = InMemoryTransport::new();
        transport.put_block("obj", 0, b"partial").unwrap();

        assert!(!transport.exists("obj").unwrap());
        assert!(transport.object_bytes("obj").is_none());
    }

    #[test]
    fn test_ranged_writes_after_create() {
        let transport = InMemoryTransport::new();
        transport.create_remote("share/file", 10).unwrap();
        transport.write_range("share/file", 4, b"4567").unwrap();

        let data = transport.object_bytes("share/file").unwrap();
        assert_eq!(&data[4..8], b"4567");
        assert_eq!(data.len(), 10);
    }

    #[test]
    fn test_probe_fault_injection() {
        let transport = InMemoryTransport::new();
        transport.fail_probe();
        assert!(matches!(
            transport.exists("anything"),
            Err(CloudMoveError::ProbeFailed { .. })
        ));
    }

    #[test]
    fn test_read_range_short_at_end() {
        let transport = InMemoryTransport::new();
        transport.seed_object("obj", b"0123456789");

        assert_eq!(transport.read_range("obj", 8, 16).unwrap(), b"89");
        assert_eq!(transport.remote_size("obj").unwrap(), 10);
    }
}
