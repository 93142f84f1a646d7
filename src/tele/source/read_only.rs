use super::MemorySource;
use crate::tele::boot_image::{BootImageError, BootImageHeader};
use crate::tele::{ByteOrder, ProcessState, TeleError};
use crate::util::Address;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;

/// The heap and code of a boot image file, mapped read-only and seen at the address the
/// heap was built for. There is no process: the memory never changes, the epoch never
/// advances, and every request to control the process fails.
pub struct ReadOnlyImage {
    header: BootImageHeader,
    mapping: Mmap,
}

impl ReadOnlyImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BootImageError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = BootImageHeader::read_from(&mut file)?;
        let actual = file.metadata()?.len();
        if actual < header.image_size() {
            return Err(BootImageError::Truncated {
                needed: header.image_size(),
                actual,
            });
        }
        let mapping = unsafe {
            MmapOptions::new()
                .offset(header.heap_offset)
                .len(header.mapped_size() as usize)
                .map(&file)?
        };
        info!(
            "mapped boot image {}: {} bytes of heap and code at {}",
            path.display(),
            header.mapped_size(),
            header.boot_heap_start()
        );
        Ok(ReadOnlyImage { header, mapping })
    }

    pub fn header(&self) -> &BootImageHeader {
        &self.header
    }

    pub fn start(&self) -> Address {
        self.header.boot_heap_start()
    }

    pub fn end(&self) -> Address {
        self.start() + self.mapping.len()
    }

    fn unsupported(operation: &'static str) -> TeleError {
        TeleError::UnsupportedOnReadOnlySource(operation)
    }
}

impl MemorySource for ReadOnlyImage {
    fn epoch(&self) -> u64 {
        0
    }

    fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    fn word_size(&self) -> usize {
        self.header.word_size as usize
    }

    fn state(&self) -> ProcessState {
        ProcessState::NoProcess
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> Result<(), TeleError> {
        let unmapped = TeleError::Unmapped {
            address,
            length: buf.len(),
        };
        if address < self.start() {
            return Err(unmapped);
        }
        let offset = address - self.start();
        match offset.checked_add(buf.len()) {
            Some(end) if end <= self.mapping.len() => {
                buf.copy_from_slice(&self.mapping[offset..end]);
                Ok(())
            }
            _ => Err(unmapped),
        }
    }

    fn write(&self, _address: Address, _bytes: &[u8]) -> Result<(), TeleError> {
        Err(Self::unsupported("write"))
    }

    fn suspend(&self) -> Result<(), TeleError> {
        Err(Self::unsupported("suspend"))
    }

    fn resume(&self) -> Result<(), TeleError> {
        Err(Self::unsupported("resume"))
    }

    fn kill(&self) -> Result<(), TeleError> {
        Err(Self::unsupported("kill"))
    }

    fn enumerate_threads(&self) -> Result<Vec<u64>, TeleError> {
        Err(Self::unsupported("enumerate the threads of"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BOOT_HEAP_START: Address = unsafe { Address::from_usize(0x4000_0000) };

    fn image_file(heap_and_code: &[u8], code_size: u64) -> tempfile::NamedTempFile {
        let header = BootImageHeader::new(
            ByteOrder::LittleEndian,
            8,
            4096,
            heap_and_code.len() as u64 - code_size,
            code_size,
            BOOT_HEAP_START,
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        header.write_image(&mut file, heap_and_code).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn serves_heap_and_code_at_the_boot_address() {
        let mut contents = vec![0u8; 3 * 4096];
        contents[0] = 0xaa;
        contents[2 * 4096] = 0xcc;
        let file = image_file(&contents, 4096);
        let image = ReadOnlyImage::open(file.path()).unwrap();
        assert_eq!(image.start(), BOOT_HEAP_START);
        assert_eq!(image.end(), BOOT_HEAP_START + 3 * 4096usize);
        assert_eq!(image.state(), ProcessState::NoProcess);

        let mut buf = [0u8; 1];
        image.read(BOOT_HEAP_START, &mut buf).unwrap();
        assert_eq!(buf[0], 0xaa);
        image.read(BOOT_HEAP_START + 2 * 4096usize, &mut buf).unwrap();
        assert_eq!(buf[0], 0xcc);
    }

    #[test]
    fn reads_outside_the_image_fail() {
        let file = image_file(&[0u8; 4096], 0);
        let image = ReadOnlyImage::open(file.path()).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            image.read(BOOT_HEAP_START - 8usize, &mut buf),
            Err(TeleError::Unmapped { .. })
        ));
        assert!(matches!(
            image.read(BOOT_HEAP_START + 4088usize, &mut buf),
            Err(TeleError::Unmapped { .. })
        ));
    }

    #[test]
    fn control_operations_are_unsupported() {
        let file = image_file(&[0u8; 4096], 0);
        let image = ReadOnlyImage::open(file.path()).unwrap();
        assert!(matches!(
            image.write(BOOT_HEAP_START, &[1]),
            Err(TeleError::UnsupportedOnReadOnlySource("write"))
        ));
        assert!(matches!(
            image.suspend(),
            Err(TeleError::UnsupportedOnReadOnlySource(_))
        ));
        assert!(matches!(
            image.resume(),
            Err(TeleError::UnsupportedOnReadOnlySource(_))
        ));
        assert!(matches!(
            image.kill(),
            Err(TeleError::UnsupportedOnReadOnlySource(_))
        ));
        assert!(matches!(
            image.enumerate_threads(),
            Err(TeleError::UnsupportedOnReadOnlySource(_))
        ));
        assert_eq!(image.epoch(), 0);
    }

    #[test]
    fn image_of_a_partial_page_is_refused() {
        let file = image_file(&[7u8; 100], 0);
        assert!(matches!(
            ReadOnlyImage::open(file.path()),
            Err(BootImageError::Unaligned {
                mapped_size: 100,
                ..
            })
        ));
    }

    #[test]
    fn truncated_image() {
        let header = BootImageHeader::new(
            ByteOrder::LittleEndian,
            8,
            4096,
            2 * 4096,
            0,
            BOOT_HEAP_START,
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&header.to_bytes()).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            ReadOnlyImage::open(file.path()),
            Err(BootImageError::Truncated {
                needed: 12288,
                actual: 48
            })
        ));
    }
}
