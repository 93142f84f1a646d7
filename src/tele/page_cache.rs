use super::buffer_pool::BufferPool;
use super::page::Page;
use super::source::MemorySource;
use super::{ByteOrder, TeleError};
use crate::util::options::Options;
use crate::util::Address;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Pages of a target's memory, read through a [`MemorySource`] and kept until the source
/// moves to a later epoch.
///
/// Pages are created on first access, with buffers from the cache's own [`BufferPool`].
/// Each page has its own lock, so reads of different pages do not wait for each other.
pub struct RemotePageCache {
    source: Arc<dyn MemorySource>,
    pool: BufferPool,
    page_size: usize,
    pages: RwLock<HashMap<usize, Arc<Page>>>,
}

impl RemotePageCache {
    /// A cache with a buffer pool configured by `options`.
    pub fn new(source: Arc<dyn MemorySource>, options: &Options) -> Self {
        Self::with_pool(source, BufferPool::from_options(options))
    }

    pub fn with_pool(source: Arc<dyn MemorySource>, pool: BufferPool) -> Self {
        let page_size = source.page_size();
        assert!(
            page_size.is_power_of_two(),
            "page size {} is not a power of two",
            page_size
        );
        RemotePageCache {
            source,
            pool,
            page_size,
            pages: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &dyn MemorySource {
        self.source.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_index(&self, address: Address) -> usize {
        address.as_usize() / self.page_size
    }

    pub fn num_cached_pages(&self) -> usize {
        self.pages.read().unwrap().len()
    }

    /// The page at `index`, if it has been read before.
    pub fn cached_page(&self, index: usize) -> Option<Arc<Page>> {
        self.pages.read().unwrap().get(&index).cloned()
    }

    fn page(&self, index: usize) -> Arc<Page> {
        if let Some(page) = self.cached_page(index) {
            return page;
        }
        let mut pages = self.pages.write().unwrap();
        pages
            .entry(index)
            .or_insert_with(|| {
                Arc::new(Page::new(
                    index,
                    self.page_size,
                    self.pool.allocate(self.page_size),
                ))
            })
            .clone()
    }

    /// Fill `dst` with the memory at `address`.
    pub fn read_into(&self, address: Address, dst: &mut [u8]) -> Result<(), TeleError> {
        if address.as_usize().checked_add(dst.len()).is_none() {
            return Err(TeleError::Unmapped {
                address,
                length: dst.len(),
            });
        }
        let mut cursor = address;
        let mut done = 0;
        while done < dst.len() {
            let index = self.page_index(cursor);
            let offset = cursor.as_usize() & (self.page_size - 1);
            let n = (self.page_size - offset).min(dst.len() - done);
            self.page(index)
                .read(self.source.as_ref(), offset, &mut dst[done..done + n])?;
            done += n;
            cursor += n;
        }
        Ok(())
    }

    pub fn read(&self, address: Address, length: usize) -> Result<Vec<u8>, TeleError> {
        let mut bytes = vec![0u8; length];
        self.read_into(address, &mut bytes)?;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&self, address: Address) -> Result<[u8; N], TeleError> {
        let mut bytes = [0u8; N];
        self.read_into(address, &mut bytes)?;
        Ok(bytes)
    }

    fn byte_order(&self) -> ByteOrder {
        self.source.byte_order()
    }

    pub fn read_u8(&self, address: Address) -> Result<u8, TeleError> {
        Ok(self.read_array::<1>(address)?[0])
    }

    pub fn read_u16(&self, address: Address) -> Result<u16, TeleError> {
        Ok(self.byte_order().u16_from(self.read_array(address)?))
    }

    pub fn read_u32(&self, address: Address) -> Result<u32, TeleError> {
        Ok(self.byte_order().u32_from(self.read_array(address)?))
    }

    pub fn read_u64(&self, address: Address) -> Result<u64, TeleError> {
        Ok(self.byte_order().u64_from(self.read_array(address)?))
    }

    /// A word of the target, zero extended.
    pub fn read_word(&self, address: Address) -> Result<u64, TeleError> {
        match self.source.word_size() {
            4 => self.read_u32(address).map(u64::from),
            _ => self.read_u64(address),
        }
    }

    /// Make the next read of page `index` go to the source.
    pub fn invalidate(&self, index: usize) {
        if let Some(page) = self.cached_page(index) {
            page.invalidate();
        }
    }

    pub fn invalidate_range(&self, address: Address, length: usize) {
        if length == 0 {
            return;
        }
        let first = self.page_index(address);
        let last = self.page_index(address + (length - 1));
        let pages = self.pages.read().unwrap();
        for index in first..=last {
            if let Some(page) = pages.get(&index) {
                page.invalidate();
            }
        }
    }

    pub fn invalidate_all(&self) {
        for page in self.pages.read().unwrap().values() {
            page.invalidate();
        }
    }

    /// Write through the source. The written pages are read again on next access.
    pub fn write(&self, address: Address, bytes: &[u8]) -> Result<(), TeleError> {
        let result = self.source.write(address, bytes);
        // A failed write may still have changed part of the range.
        self.invalidate_range(address, bytes.len());
        result
    }
}
