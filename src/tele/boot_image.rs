//! The header of a boot image file.
//!
//! ```text
//! offset size
//!      0    4  magic "BELT"
//!      4    1  byte order: 0 little endian, 1 big endian
//!      5    1  word width in bytes, 4 or 8
//!      6    2  reserved
//!      8    4  format version
//!     12    4  page size
//!     16    8  heap size
//!     24    8  code size
//!     32    8  file offset of the heap, followed by the code
//!     40    8  address the heap was built for
//! ```
//!
//! Every integer is in the byte order of the image.

use super::ByteOrder;
use crate::util::conversions::raw_align_up;
use crate::util::Address;
use std::io::{self, Read, Write};
use thiserror::Error;

pub const BOOT_IMAGE_MAGIC: [u8; 4] = *b"BELT";
pub const BOOT_IMAGE_VERSION: u32 = 1;
pub const BOOT_IMAGE_HEADER_SIZE: usize = 48;

#[derive(Debug, Error)]
pub enum BootImageError {
    #[error("error reading boot image: {0}")]
    Io(#[from] io::Error),
    #[error("not a boot image: magic {0:?}")]
    BadMagic([u8; 4]),
    #[error("unknown byte order flag {0}")]
    BadByteOrder(u8),
    #[error("unsupported word width {0}")]
    BadWordSize(u8),
    #[error("boot image version {0}, expected {expected}", expected = BOOT_IMAGE_VERSION)]
    UnsupportedVersion(u32),
    #[error("page size {0} is not a power of two")]
    BadPageSize(u32),
    #[error("heap at file offset {heap_offset} overlaps the header")]
    BadHeapOffset { heap_offset: u64 },
    #[error("heap at {boot_heap_start:#x} with {mapped_size} bytes of heap and code is not made of whole {page_size} byte pages")]
    Unaligned {
        boot_heap_start: u64,
        mapped_size: u64,
        page_size: u32,
    },
    #[error("boot image needs {needed} bytes, the file has {actual}")]
    Truncated { needed: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootImageHeader {
    pub byte_order: ByteOrder,
    pub word_size: u8,
    pub version: u32,
    pub page_size: u32,
    pub heap_size: u64,
    pub code_size: u64,
    pub heap_offset: u64,
    pub boot_heap_start: u64,
}

impl BootImageHeader {
    /// A header for a heap and code built for `boot_heap_start`, placed at the first page
    /// boundary after the header.
    pub fn new(
        byte_order: ByteOrder,
        word_size: u8,
        page_size: u32,
        heap_size: u64,
        code_size: u64,
        boot_heap_start: Address,
    ) -> Self {
        BootImageHeader {
            byte_order,
            word_size,
            version: BOOT_IMAGE_VERSION,
            page_size,
            heap_size,
            code_size,
            heap_offset: raw_align_up(BOOT_IMAGE_HEADER_SIZE, page_size as usize) as u64,
            boot_heap_start: boot_heap_start.as_usize() as u64,
        }
    }

    pub fn parse(bytes: &[u8; BOOT_IMAGE_HEADER_SIZE]) -> Result<Self, BootImageError> {
        let field = |offset: usize, len: usize| &bytes[offset..offset + len];
        let magic: [u8; 4] = bytes[0..4].try_into().unwrap();
        if magic != BOOT_IMAGE_MAGIC {
            return Err(BootImageError::BadMagic(magic));
        }
        let byte_order = match bytes[4] {
            0 => ByteOrder::LittleEndian,
            1 => ByteOrder::BigEndian,
            flag => return Err(BootImageError::BadByteOrder(flag)),
        };
        let word_size = bytes[5];
        if word_size != 4 && word_size != 8 {
            return Err(BootImageError::BadWordSize(word_size));
        }
        let u32_at = |offset| byte_order.u32_from(field(offset, 4).try_into().unwrap());
        let u64_at = |offset| byte_order.u64_from(field(offset, 8).try_into().unwrap());
        let header = BootImageHeader {
            byte_order,
            word_size,
            version: u32_at(8),
            page_size: u32_at(12),
            heap_size: u64_at(16),
            code_size: u64_at(24),
            heap_offset: u64_at(32),
            boot_heap_start: u64_at(40),
        };
        if header.version != BOOT_IMAGE_VERSION {
            return Err(BootImageError::UnsupportedVersion(header.version));
        }
        if !header.page_size.is_power_of_two() {
            return Err(BootImageError::BadPageSize(header.page_size));
        }
        // The page cache reads whole pages.
        let page_size = header.page_size as u64;
        if header.boot_heap_start % page_size != 0 || header.mapped_size() % page_size != 0 {
            return Err(BootImageError::Unaligned {
                boot_heap_start: header.boot_heap_start,
                mapped_size: header.mapped_size(),
                page_size: header.page_size,
            });
        }
        if header.heap_offset < BOOT_IMAGE_HEADER_SIZE as u64 {
            return Err(BootImageError::BadHeapOffset {
                heap_offset: header.heap_offset,
            });
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; BOOT_IMAGE_HEADER_SIZE] {
        let order = self.byte_order;
        let mut bytes = [0u8; BOOT_IMAGE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&BOOT_IMAGE_MAGIC);
        bytes[4] = match order {
            ByteOrder::LittleEndian => 0,
            ByteOrder::BigEndian => 1,
        };
        bytes[5] = self.word_size;
        bytes[8..12].copy_from_slice(&order.u32_to(self.version));
        bytes[12..16].copy_from_slice(&order.u32_to(self.page_size));
        bytes[16..24].copy_from_slice(&order.u64_to(self.heap_size));
        bytes[24..32].copy_from_slice(&order.u64_to(self.code_size));
        bytes[32..40].copy_from_slice(&order.u64_to(self.heap_offset));
        bytes[40..48].copy_from_slice(&order.u64_to(self.boot_heap_start));
        bytes
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self, BootImageError> {
        let mut bytes = [0u8; BOOT_IMAGE_HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        Self::parse(&bytes)
    }

    /// Write the header, padding up to the heap offset, then `heap_and_code`.
    pub fn write_image(&self, writer: &mut impl Write, heap_and_code: &[u8]) -> io::Result<()> {
        debug_assert_eq!(heap_and_code.len() as u64, self.mapped_size());
        writer.write_all(&self.to_bytes())?;
        let padding = self.heap_offset as usize - BOOT_IMAGE_HEADER_SIZE;
        writer.write_all(&vec![0u8; padding])?;
        writer.write_all(heap_and_code)
    }

    /// Bytes of heap and code, the part of the image an observer reads.
    pub fn mapped_size(&self) -> u64 {
        self.heap_size + self.code_size
    }

    /// The file size the header implies.
    pub fn image_size(&self) -> u64 {
        self.heap_offset + self.mapped_size()
    }

    pub fn boot_heap_start(&self) -> Address {
        unsafe { Address::from_usize(self.boot_heap_start as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(byte_order: ByteOrder) -> BootImageHeader {
        BootImageHeader::new(
            byte_order,
            8,
            4096,
            3 * 4096,
            4096,
            unsafe { Address::from_usize(0x4000_0000) },
        )
    }

    #[test]
    fn heap_starts_on_a_page() {
        let h = header(ByteOrder::LittleEndian);
        assert_eq!(h.heap_offset, 4096);
        assert_eq!(h.mapped_size(), 4 * 4096);
        assert_eq!(h.image_size(), 5 * 4096);
    }

    #[test]
    fn big_endian_layout() {
        let bytes = header(ByteOrder::BigEndian).to_bytes();
        assert_eq!(&bytes[0..4], b"BELT");
        assert_eq!(bytes[4], 1);
        assert_eq!(bytes[5], 8);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 1]);
        assert_eq!(&bytes[40..48], &[0, 0, 0, 0, 0x40, 0, 0, 0]);
        assert_eq!(
            BootImageHeader::parse(&bytes).unwrap(),
            header(ByteOrder::BigEndian)
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        let good = header(ByteOrder::LittleEndian).to_bytes();

        let mut bytes = good;
        bytes[0] = b'X';
        assert!(matches!(
            BootImageHeader::parse(&bytes),
            Err(BootImageError::BadMagic(_))
        ));

        let mut bytes = good;
        bytes[4] = 2;
        assert!(matches!(
            BootImageHeader::parse(&bytes),
            Err(BootImageError::BadByteOrder(2))
        ));

        let mut bytes = good;
        bytes[5] = 2;
        assert!(matches!(
            BootImageHeader::parse(&bytes),
            Err(BootImageError::BadWordSize(2))
        ));

        let mut bytes = good;
        bytes[8] = 2;
        assert!(matches!(
            BootImageHeader::parse(&bytes),
            Err(BootImageError::UnsupportedVersion(2))
        ));

        let mut bytes = good;
        bytes[32..40].copy_from_slice(&16u64.to_le_bytes());
        assert!(matches!(
            BootImageHeader::parse(&bytes),
            Err(BootImageError::BadHeapOffset { heap_offset: 16 })
        ));
    }

    #[test]
    fn rejects_partial_pages() {
        let mut short = header(ByteOrder::LittleEndian);
        short.code_size = 100;
        assert!(matches!(
            BootImageHeader::parse(&short.to_bytes()),
            Err(BootImageError::Unaligned {
                mapped_size: 12388,
                page_size: 4096,
                ..
            })
        ));

        let mut misplaced = header(ByteOrder::LittleEndian);
        misplaced.boot_heap_start += 8;
        assert!(matches!(
            BootImageHeader::parse(&misplaced.to_bytes()),
            Err(BootImageError::Unaligned {
                boot_heap_start: 0x4000_0008,
                ..
            })
        ));
    }

    #[test]
    fn version_mismatch_message() {
        assert_eq!(
            BootImageError::UnsupportedVersion(2).to_string(),
            "boot image version 2, expected 1"
        );
    }

    #[test]
    fn short_header() {
        let bytes = [0u8; 10];
        assert!(matches!(
            BootImageHeader::read_from(&mut &bytes[..]),
            Err(BootImageError::Io(_))
        ));
    }
}
