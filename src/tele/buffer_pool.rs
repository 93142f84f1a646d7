use crate::util::memory::AnonymousMapping;
use crate::util::options::Options;
use std::sync::{Arc, Mutex};

/// The memory a cached page is kept in.
pub enum PageBuffer {
    /// A slice of the shared pool mapping.
    Pooled {
        mapping: Arc<AnonymousMapping>,
        offset: usize,
        len: usize,
    },
    /// A buffer of its own, once the pool is used up or when the pool is disabled.
    Owned(Box<[u8]>),
}

impl PageBuffer {
    pub fn len(&self) -> usize {
        match self {
            PageBuffer::Pooled { len, .. } => *len,
            PageBuffer::Owned(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, PageBuffer::Pooled { .. })
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            PageBuffer::Pooled {
                mapping,
                offset,
                len,
            } => unsafe {
                std::slice::from_raw_parts((mapping.start() + *offset).to_ptr::<u8>(), *len)
            },
            PageBuffer::Owned(bytes) => bytes,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            // Slices handed out by the pool never overlap, and this one is only reachable
            // through `self`.
            PageBuffer::Pooled {
                mapping,
                offset,
                len,
            } => unsafe {
                std::slice::from_raw_parts_mut(
                    (mapping.start() + *offset).to_mut_ptr::<u8>(),
                    *len,
                )
            },
            PageBuffer::Owned(bytes) => bytes,
        }
    }
}

struct PoolState {
    mapping: Option<Arc<AnonymousMapping>>,
    /// Bytes of the mapping handed out so far.
    cursor: usize,
    /// Set when the mapping could not be created; every buffer is owned from then on.
    failed: bool,
}

/// A bounded pool of natively addressable memory that page buffers are carved from, one
/// page at a time. The pool is mapped on first use. When it is used up, or disabled with
/// `no_direct_buffers`, every page gets a buffer of its own.
pub struct BufferPool {
    pool_size: usize,
    no_direct_buffers: bool,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(pool_size: usize, no_direct_buffers: bool) -> Self {
        BufferPool {
            pool_size,
            no_direct_buffers,
            state: Mutex::new(PoolState {
                mapping: None,
                cursor: 0,
                failed: false,
            }),
        }
    }

    pub fn from_options(options: &Options) -> Self {
        BufferPool::new(options.direct_buffer_pool_size, options.no_direct_buffers)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Bytes of the pool handed out so far.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().unwrap().cursor
    }

    /// A zeroed buffer of `page_size` bytes.
    pub fn allocate(&self, page_size: usize) -> PageBuffer {
        if !self.no_direct_buffers {
            let mut state = self.state.lock().unwrap();
            if state.mapping.is_none() && !state.failed && self.pool_size >= page_size {
                match AnonymousMapping::new(self.pool_size) {
                    Ok(mapping) => {
                        debug!(
                            "page buffer pool of {} bytes at {}",
                            mapping.size(),
                            mapping.start()
                        );
                        state.mapping = Some(Arc::new(mapping));
                    }
                    Err(e) => {
                        warn!(
                            "failed to map a page buffer pool of {} bytes: {}",
                            self.pool_size, e
                        );
                        state.failed = true;
                    }
                }
            }
            if let Some(mapping) = state.mapping.clone() {
                // The mapping may be larger than asked for; only `pool_size` is handed out.
                if self.pool_size - state.cursor >= page_size {
                    let offset = state.cursor;
                    state.cursor += page_size;
                    return PageBuffer::Pooled {
                        mapping,
                        offset,
                        len: page_size,
                    };
                }
            }
        }
        PageBuffer::Owned(vec![0u8; page_size].into_boxed_slice())
    }
}
