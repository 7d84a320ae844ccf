use crate::storage::{default_tiny_extent_ids, ExtentCrc, ExtentFilter, ExtentId, ExtentInfo, ExtentStore, ExtentStoreFactory};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const EIO: i32 = 5;

/// InMemoryExtentStore keeps every extent in a `Vec<u8>`. Useful for tests and for running a
/// node without disks. Disk failures can be simulated with [`InMemoryExtentStore::inject_io_failure`].
pub struct InMemoryExtentStore {
    tiny_extent_ids: RangeInclusive<ExtentId>,
    state: Mutex<StoreState>,
    failing: AtomicBool,
}

#[derive(Default)]
struct StoreState {
    extents: BTreeMap<ExtentId, StoredExtent>,
    available_tiny: VecDeque<ExtentId>,
    pending_tiny: BTreeSet<ExtentId>,
    marked_deleted: BTreeSet<ExtentId>,
    closed: bool,
}

struct StoredExtent {
    inode: u64,
    data: Vec<u8>,
}

impl InMemoryExtentStore {
    pub fn new() -> Self {
        Self::with_tiny_extent_ids(default_tiny_extent_ids())
    }

    /// Builds a store whose tiny extents occupy `tiny_extent_ids`. All of them start empty and
    /// available.
    pub fn with_tiny_extent_ids(tiny_extent_ids: RangeInclusive<ExtentId>) -> Self {
        let mut state = StoreState::default();
        for extent_id in tiny_extent_ids.clone() {
            state.extents.insert(extent_id, StoredExtent { inode: 0, data: Vec::new() });
            state.available_tiny.push_back(extent_id);
        }

        InMemoryExtentStore {
            tiny_extent_ids,
            state: Mutex::new(state),
            failing: AtomicBool::new(false),
        }
    }

    /// While enabled, every I/O call fails with `EIO`.
    pub fn inject_io_failure(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn extent_size(&self, extent_id: ExtentId) -> Option<u64> {
        self.lock().extents.get(&extent_id).map(|e| e.data.len() as u64)
    }

    pub fn extent_data(&self, extent_id: ExtentId) -> Option<Vec<u8>> {
        self.lock().extents.get(&extent_id).map(|e| e.data.clone())
    }

    pub fn mark_delete(&self, extent_id: ExtentId) {
        self.lock().marked_deleted.insert(extent_id);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("InMemoryExtentStore mutex guard poison")
    }

    fn check_io(&self) -> io::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(io::Error::from_raw_os_error(EIO));
        }
        Ok(())
    }

    fn not_found(extent_id: ExtentId) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("extent {} does not exist", extent_id))
    }
}

impl Default for InMemoryExtentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtentStore for InMemoryExtentStore {
    fn exists(&self, extent_id: ExtentId) -> bool {
        self.lock().extents.contains_key(&extent_id)
    }

    fn size(&self, extent_id: ExtentId) -> io::Result<u64> {
        self.check_io()?;
        self.lock()
            .extents
            .get(&extent_id)
            .map(|extent| extent.data.len() as u64)
            .ok_or_else(|| Self::not_found(extent_id))
    }

    fn create(&self, extent_id: ExtentId, inode: u64) -> io::Result<()> {
        self.check_io()?;
        let mut state = self.lock();
        if state.extents.contains_key(&extent_id) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("extent {} already exists", extent_id),
            ));
        }
        state.extents.insert(extent_id, StoredExtent { inode, data: Vec::new() });
        Ok(())
    }

    fn read(&self, extent_id: ExtentId, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.check_io()?;
        let state = self.lock();
        let extent = state.extents.get(&extent_id).ok_or_else(|| Self::not_found(extent_id))?;

        let start = offset as usize;
        let end = start + buf.len();
        if end > extent.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read [{}, {}) beyond extent {} of size {}",
                    start,
                    end,
                    extent_id,
                    extent.data.len()
                ),
            ));
        }
        buf.copy_from_slice(&extent.data[start..end]);
        Ok(buf.len())
    }

    fn write(&self, extent_id: ExtentId, offset: u64, data: &[u8]) -> io::Result<()> {
        self.check_io()?;
        let mut state = self.lock();
        let extent = state
            .extents
            .get_mut(&extent_id)
            .ok_or_else(|| Self::not_found(extent_id))?;

        let start = offset as usize;
        if start > extent.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write at {} leaves a hole in extent {}", start, extent_id),
            ));
        }
        let end = start + data.len();
        if end > extent.data.len() {
            extent.data.resize(end, 0);
        }
        extent.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn watermarks(&self, filter: ExtentFilter) -> io::Result<Vec<ExtentInfo>> {
        self.check_io()?;
        let state = self.lock();
        let infos = state
            .extents
            .iter()
            .filter(|&(id, _)| !state.marked_deleted.contains(id))
            .filter(|&(id, _)| match filter {
                ExtentFilter::All => true,
                ExtentFilter::Normal => !self.tiny_extent_ids.contains(id),
                ExtentFilter::Tiny => self.tiny_extent_ids.contains(id),
            })
            .map(|(id, extent)| ExtentInfo {
                file_id: *id,
                size: extent.data.len() as u64,
                inode: extent.inode,
                crc: crc32fast::hash(&extent.data),
                source: String::new(),
            })
            .collect();
        Ok(infos)
    }

    fn count(&self) -> usize {
        self.lock().extents.len()
    }

    fn used_size(&self) -> io::Result<u64> {
        self.check_io()?;
        Ok(self.lock().extents.values().map(|e| e.data.len() as u64).sum())
    }

    fn snapshot(&self) -> io::Result<Vec<ExtentCrc>> {
        self.check_io()?;
        let state = self.lock();
        Ok(state
            .extents
            .iter()
            .filter(|&(id, _)| !state.marked_deleted.contains(id))
            .map(|(id, extent)| ExtentCrc {
                extent_id: *id,
                size: extent.data.len() as u64,
                crc: crc32fast::hash(&extent.data),
            })
            .collect())
    }

    fn flush_delete(&self) -> io::Result<()> {
        self.check_io()?;
        let mut state = self.lock();
        let deleted: Vec<ExtentId> = state.marked_deleted.iter().copied().collect();
        for extent_id in deleted {
            if !self.tiny_extent_ids.contains(&extent_id) {
                state.extents.remove(&extent_id);
            }
        }
        state.marked_deleted.clear();
        Ok(())
    }

    fn tiny_extent_ids(&self) -> RangeInclusive<ExtentId> {
        self.tiny_extent_ids.clone()
    }

    fn pending_tiny_extents(&self) -> Vec<ExtentId> {
        self.lock().pending_tiny.iter().copied().collect()
    }

    fn promote_tiny_extents(&self, count: usize) -> usize {
        let mut state = self.lock();
        let mut moved = 0;
        while moved < count {
            match state.available_tiny.pop_front() {
                Some(extent_id) => {
                    state.pending_tiny.insert(extent_id);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    fn release_tiny_extents(&self, extent_ids: &[ExtentId]) {
        let mut state = self.lock();
        for extent_id in extent_ids {
            if state.pending_tiny.remove(extent_id) {
                state.available_tiny.push_back(*extent_id);
            }
        }
    }

    fn close(&self) {
        self.lock().closed = true;
    }
}

/// Hands out one [`InMemoryExtentStore`] per partition and remembers them, so tests can reach
/// into a node's stores.
pub struct InMemoryStoreFactory {
    tiny_extent_ids: RangeInclusive<ExtentId>,
    stores: Mutex<HashMap<u64, Arc<InMemoryExtentStore>>>,
}

impl InMemoryStoreFactory {
    pub fn new() -> Self {
        Self::with_tiny_extent_ids(default_tiny_extent_ids())
    }

    pub fn with_tiny_extent_ids(tiny_extent_ids: RangeInclusive<ExtentId>) -> Self {
        InMemoryStoreFactory {
            tiny_extent_ids,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, partition_id: u64) -> Option<Arc<InMemoryExtentStore>> {
        self.stores
            .lock()
            .expect("InMemoryStoreFactory mutex guard poison")
            .get(&partition_id)
            .cloned()
    }
}

impl Default for InMemoryStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtentStoreFactory for InMemoryStoreFactory {
    fn open(&self, _path: &Path, partition_id: u64, _partition_size: u64) -> io::Result<Arc<dyn ExtentStore>> {
        let mut stores = self.stores.lock().expect("InMemoryStoreFactory mutex guard poison");
        let store = stores
            .entry(partition_id)
            .or_insert_with(|| Arc::new(InMemoryExtentStore::with_tiny_extent_ids(self.tiny_extent_ids.clone())))
            .clone();
        Ok(store)
    }
}
