//! File-backed page store.
//!
//! Layout: file page 0 holds the header, tree page `p` lives at byte offset
//! `(p + 1) * page_size`, and the free-page list (if any) is appended after
//! the highest used page on flush. Every page read is one seek plus one read;
//! nothing is preloaded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::header::{TreeIndexHeader, HEADER_ENCODED_SIZE};
use super::node::Node;
use super::page_store::{free_list_byte_length, PageAllocator, PageStore};
use super::tree_types::{IndexError, IndexResult, PageId, PageStoreStats};

// ============================================================================
// Page with Checksum
// ============================================================================

/// Encodes a node behind a CRC32 of its serialized bytes.
pub struct PageWithChecksum;

impl PageWithChecksum {
    /// Bytes a page spends on the checksum in front of the node.
    pub const OVERHEAD: usize = 4;

    pub fn encode(node: &Node) -> IndexResult<Vec<u8>> {
        let body = bincode::serde::encode_to_vec(node, bincode::config::legacy())
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(Self::OVERHEAD + body.len());
        bytes.extend_from_slice(&Self::crc32(&body).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes a (possibly zero-padded) page and verifies its checksum.
    pub fn decode(bytes: &[u8]) -> IndexResult<Node> {
        if bytes.len() < Self::OVERHEAD {
            return Err(IndexError::Serialization("page shorter than checksum".into()));
        }
        let (checksum_bytes, body) = bytes.split_at(Self::OVERHEAD);
        let mut stored = [0u8; Self::OVERHEAD];
        stored.copy_from_slice(checksum_bytes);
        let stored = u32::from_le_bytes(stored);

        let (node, consumed): (Node, usize) =
            bincode::serde::decode_from_slice(body, bincode::config::legacy())
                .map_err(|e| IndexError::Serialization(e.to_string()))?;

        let expected = Self::crc32(&body[..consumed]);
        if stored != expected {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Page checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                    expected, stored
                ),
            )));
        }
        Ok(node)
    }

    /// CRC32-MPEG2
    fn crc32(data: &[u8]) -> u32 {
        let mut crc: u32 = 0xFFFFFFFF;
        const POLY: u32 = 0x04C11DB7;

        for &byte in data {
            crc ^= (byte as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x80000000 != 0 {
                    (crc << 1) ^ POLY
                } else {
                    crc << 1
                };
            }
        }

        crc ^ 0xFFFFFFFF
    }
}

// ============================================================================
// File Store
// ============================================================================

pub struct FilePageStore {
    file: RwLock<File>,
    path: PathBuf,
    page_size: usize,
    state: RwLock<FileStoreState>,
    page_reads: AtomicU64,
    page_writes: AtomicU64,
}

struct FileStoreState {
    header: Option<TreeIndexHeader>,
    allocator: PageAllocator,
}

impl FilePageStore {
    /// Create a new, empty store file (truncating any existing file).
    pub fn create(path: impl AsRef<Path>, page_size: usize) -> IndexResult<Self> {
        if page_size < HEADER_ENCODED_SIZE {
            return Err(IndexError::InvalidArgument(format!(
                "page size {} cannot hold the {}-byte header",
                page_size, HEADER_ENCODED_SIZE
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        log::debug!("Created page file at {:?}", path.as_ref());
        Ok(Self {
            file: RwLock::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            state: RwLock::new(FileStoreState {
                header: None,
                allocator: PageAllocator::default(),
            }),
            page_reads: AtomicU64::new(0),
            page_writes: AtomicU64::new(0),
        })
    }

    /// Open an existing store file. Only the header and the free-page list are
    /// read; nodes stay on disk until requested.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let mut buffer = vec![0u8; HEADER_ENCODED_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let header = TreeIndexHeader::from_bytes(&buffer)?;
        let page_size = header.page_size as usize;

        let next_page_id = header.highest_used_page_id + 1;
        let free_pages = if header.free_list_byte_length > 0 {
            let offset = (next_page_id + 1) * page_size as u64;
            let mut bytes = vec![0u8; header.free_list_byte_length as usize];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut bytes)?;
            bincode::serde::decode_from_slice::<Vec<PageId>, _>(&bytes, bincode::config::legacy())
                .map(|(pages, _)| pages)
                .map_err(|e| IndexError::Serialization(e.to_string()))?
        } else {
            Vec::new()
        };

        log::debug!(
            "Opened page file at {:?} ({} pages, {} free)",
            path.as_ref(),
            next_page_id,
            free_pages.len()
        );
        Ok(Self {
            file: RwLock::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            state: RwLock::new(FileStoreState {
                header: Some(header),
                allocator: PageAllocator::new(next_page_id, free_pages),
            }),
            page_reads: AtomicU64::new(0),
            page_writes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        (page_id + 1) * self.page_size as u64
    }

    fn write_header(&self, header: &TreeIndexHeader) -> IndexResult<()> {
        let mut padded = header.to_bytes()?;
        padded.resize(self.page_size, 0);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&padded)?;
        Ok(())
    }

    fn current_header(state: &FileStoreState) -> Option<TreeIndexHeader> {
        state.header.map(|mut header| {
            header.highest_used_page_id = state.allocator.highest_used_page_id();
            header.free_list_byte_length = free_list_byte_length(state.allocator.free_pages());
            header
        })
    }
}

impl PageStore for FilePageStore {
    fn initialize(&self, header: &TreeIndexHeader) -> IndexResult<bool> {
        let mut state = self.state.write();
        if let Some(stored) = &state.header {
            stored.validate_geometry(header)?;
            return Ok(false);
        }
        if header.page_size as usize != self.page_size {
            return Err(IndexError::HeaderMismatch {
                field: "page_size",
                stored: self.page_size as u64,
                expected: header.page_size as u64,
            });
        }
        state.header = Some(*header);
        if let Some(current) = Self::current_header(&state) {
            self.write_header(&current)?;
        }
        Ok(true)
    }

    fn read(&self, page_id: PageId) -> IndexResult<Node> {
        if !self.state.read().allocator.is_live(page_id) {
            return Err(IndexError::PageNotFound(page_id));
        }

        let mut buffer = vec![0u8; self.page_size];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(self.page_offset(page_id)))?;
            file.read_exact(&mut buffer)?;
        }
        self.page_reads.fetch_add(1, Ordering::Relaxed);

        PageWithChecksum::decode(&buffer).inspect_err(|e| {
            log::error!("Failed to read page {} from {:?}: {}", page_id, self.path, e);
        })
    }

    fn write(&self, node: &mut Node) -> IndexResult<PageId> {
        let mut state = self.state.write();
        let (page_id, fresh) = match node.page_id() {
            Some(page_id) if state.allocator.is_live(page_id) => (page_id, false),
            Some(page_id) => return Err(IndexError::PageNotFound(page_id)),
            None => (state.allocator.allocate(), true),
        };
        node.set_page_id(Some(page_id));

        let encoded = PageWithChecksum::encode(node).and_then(|bytes| {
            if bytes.len() > self.page_size {
                Err(IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "Node too large: {} bytes (max {})",
                        bytes.len(),
                        self.page_size
                    ),
                )))
            } else {
                Ok(bytes)
            }
        });
        let mut padded = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                if fresh {
                    state.allocator.release(page_id)?;
                    node.set_page_id(None);
                }
                return Err(e);
            }
        };
        padded.resize(self.page_size, 0);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(self.page_offset(page_id)))?;
        file.write_all(&padded)?;
        self.page_writes.fetch_add(1, Ordering::Relaxed);
        Ok(page_id)
    }

    fn delete(&self, page_id: PageId) -> IndexResult<()> {
        self.state.write().allocator.release(page_id)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn header(&self) -> Option<TreeIndexHeader> {
        Self::current_header(&self.state.read())
    }

    fn flush(&self) -> IndexResult<()> {
        let state = self.state.read();
        let header = match Self::current_header(&state) {
            Some(header) => header,
            None => return Ok(()),
        };
        self.write_header(&header)?;

        let mut end = self.page_offset(state.allocator.next_page_id());
        let free_pages = state.allocator.free_pages();
        let mut file = self.file.write();
        if !free_pages.is_empty() {
            let bytes = bincode::serde::encode_to_vec(free_pages, bincode::config::legacy())
                .map_err(|e| IndexError::Serialization(e.to_string()))?;
            file.seek(SeekFrom::Start(end))?;
            file.write_all(&bytes)?;
            end += bytes.len() as u64;
        }
        file.set_len(end)?;
        file.sync_all()?;
        Ok(())
    }

    fn stats(&self) -> PageStoreStats {
        PageStoreStats {
            page_reads: self.page_reads.load(Ordering::Relaxed),
            page_writes: self.page_writes.load(Ordering::Relaxed),
            ..PageStoreStats::default()
        }
    }
}

impl Drop for FilePageStore {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Err(e) = self.flush() {
            log::error!("Failed to flush page file {:?}: {}", self.path, e);
        }
    }
}
