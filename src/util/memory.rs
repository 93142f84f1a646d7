use crate::util::constants::BYTES_IN_PAGE;
use crate::util::conversions::raw_align_up;
use crate::util::Address;
use std::io::Result;
use std::ops::Range;

/// Ranges at least this large are zeroed by giving the pages back to the kernel.
const MADVISE_ZEROING_THRESHOLD: usize = 16 * BYTES_IN_PAGE;

/// Zero `len` bytes from `start`.
pub fn zero(start: Address, len: usize) {
    if len == 0 {
        return;
    }
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            if len >= MADVISE_ZEROING_THRESHOLD {
                // Private anonymous pages read back as zero after MADV_DONTNEED. The
                // partial pages at either end are cleared by hand.
                let inner_start = start.align_up(BYTES_IN_PAGE);
                let inner_end = (start + len).align_down(BYTES_IN_PAGE);
                if inner_start < inner_end
                    && dontneed(inner_start, inner_end - inner_start).is_ok()
                {
                    memset(start, inner_start - start);
                    memset(inner_end, (start + len) - inner_end);
                    return;
                }
            }
        }
    }
    memset(start, len)
}

fn memset(start: Address, len: usize) {
    if len > 0 {
        unsafe { std::ptr::write_bytes(start.to_mut_ptr::<u8>(), 0, len) }
    }
}

#[cfg(target_os = "linux")]
fn dontneed(start: Address, len: usize) -> Result<()> {
    wrap_libc_call(
        &|| unsafe { libc::madvise(start.to_mut_ptr(), len, libc::MADV_DONTNEED) },
        0,
    )
}

/// Anonymous, private, demand-zero mmap of `size` bytes anywhere in the address space.
/// The range is mapped without a swap reserve, so untouched pages cost nothing.
pub fn mmap_anonymous(size: usize) -> Result<Address> {
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), size, prot, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ptr))
    }
}

pub fn try_munmap(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

pub(crate) fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// An anonymous mapping owned by the heap or by the page buffer pool. The range is
/// unmapped when the mapping is dropped.
#[derive(Debug)]
pub struct AnonymousMapping {
    start: Address,
    size: usize,
}

impl AnonymousMapping {
    /// Map at least `size` bytes, rounded up to whole pages.
    pub fn new(size: usize) -> Result<Self> {
        let size = raw_align_up(size.max(1), BYTES_IN_PAGE);
        let start = mmap_anonymous(size)?;
        debug!("mapped {} bytes at {}", size, start);
        Ok(AnonymousMapping { start, size })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn range(&self) -> Range<Address> {
        self.start..self.end()
    }
}

impl Drop for AnonymousMapping {
    fn drop(&mut self) {
        if let Err(e) = try_munmap(self.start, self.size) {
            warn!("failed to unmap {} bytes at {}: {}", self.size, self.start, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_zeroed_and_writable() {
        let mapping = AnonymousMapping::new(BYTES_IN_PAGE * 4).unwrap();
        assert!(mapping.start().is_aligned_to(BYTES_IN_PAGE));
        assert_eq!(mapping.size(), BYTES_IN_PAGE * 4);
        unsafe {
            assert_eq!(mapping.start().load::<usize>(), 0);
            mapping.start().store(42usize);
            assert_eq!(mapping.start().load::<usize>(), 42);
        }
    }

    #[test]
    fn test_mapping_rounds_up_to_pages() {
        let mapping = AnonymousMapping::new(10).unwrap();
        assert_eq!(mapping.size(), BYTES_IN_PAGE);
        assert_eq!(mapping.end() - mapping.start(), BYTES_IN_PAGE);
    }

    #[test]
    fn test_zero_small_and_large_ranges() {
        let size = MADVISE_ZEROING_THRESHOLD * 2;
        let mapping = AnonymousMapping::new(size).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts_mut(mapping.start().to_mut_ptr::<u8>(), size) };
        bytes.fill(0xab);

        // Unaligned, below the madvise threshold.
        zero(mapping.start() + 3usize, 100);
        assert_eq!(bytes[2], 0xab);
        assert!(bytes[3..103].iter().all(|b| *b == 0));
        assert_eq!(bytes[103], 0xab);

        // Unaligned at both ends, above the threshold.
        bytes.fill(0xab);
        zero(mapping.start() + 7usize, size - 20);
        assert_eq!(bytes[6], 0xab);
        assert!(bytes[7..size - 13].iter().all(|b| *b == 0));
        assert_eq!(bytes[size - 13], 0xab);
    }
}
