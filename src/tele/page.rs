use super::buffer_pool::PageBuffer;
use super::source::MemorySource;
use super::TeleError;
use crate::util::Address;
use std::sync::Mutex;

struct PageState {
    buffer: PageBuffer,
    /// Epoch of the source as of the last refresh. `None` until the first refresh and
    /// after an invalidation, so the next read always refreshes.
    epoch: Option<u64>,
    refreshes: usize,
}

/// A cached page of the target's memory.
pub struct Page {
    index: usize,
    address: Address,
    state: Mutex<PageState>,
}

impl Page {
    pub fn new(index: usize, page_size: usize, buffer: PageBuffer) -> Self {
        debug_assert_eq!(buffer.len(), page_size);
        Page {
            index,
            address: unsafe { Address::from_usize(index * page_size) },
            state: Mutex::new(PageState {
                buffer,
                epoch: None,
                refreshes: 0,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Start of the page in the target.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn size(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    pub fn epoch(&self) -> Option<u64> {
        self.state.lock().unwrap().epoch
    }

    /// How many times the page was read from its source.
    pub fn refresh_count(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }

    /// Make the next read refresh the page, whatever the epoch of the source.
    pub fn invalidate(&self) {
        self.state.lock().unwrap().epoch = None;
    }

    /// Copy `dst.len()` bytes at `offset` into `dst`, reading the page from `source` first
    /// if the source has moved on since the last refresh.
    pub fn read(
        &self,
        source: &dyn MemorySource,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), TeleError> {
        let mut state = self.state.lock().unwrap();
        assert!(
            offset + dst.len() <= state.buffer.len(),
            "read of {} bytes at offset {} overruns page {}",
            dst.len(),
            offset,
            self.index
        );
        let source_epoch = source.epoch();
        if state.epoch.map_or(true, |epoch| epoch < source_epoch) {
            self.refresh(&mut state, source, source_epoch)?;
        }
        dst.copy_from_slice(&state.buffer.as_slice()[offset..offset + dst.len()]);
        Ok(())
    }

    /// Either the whole page is read and stamped with `source_epoch`, or the page keeps
    /// its previous contents and epoch.
    fn refresh(
        &self,
        state: &mut PageState,
        source: &dyn MemorySource,
        source_epoch: u64,
    ) -> Result<(), TeleError> {
        let mut scratch = vec![0u8; state.buffer.len()];
        source.read(self.address, &mut scratch)?;
        state.buffer.as_mut_slice().copy_from_slice(&scratch);
        trace!(
            "page {} at {} refreshed: epoch {:?} -> {}",
            self.index,
            self.address,
            state.epoch,
            source_epoch
        );
        state.epoch = Some(source_epoch);
        state.refreshes += 1;
        Ok(())
    }
}
