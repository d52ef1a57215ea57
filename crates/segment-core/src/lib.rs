#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

pub const HEADER_SIZE: usize = 48;
pub const MAGIC: [u8; 8] = *b"IMGSEG1\0";
pub const VERSION: u32 = 1;
pub const PAGE_SIZE: u64 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentError {
    InvalidMagic,
    InvalidVersion,
    TooSmall,
    ReservationTooSmall,
    MisalignedBase,
    ModuleOutOfBounds,
    AddressOverflow,
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidMagic => "not an image segment (bad magic)",
            Self::InvalidVersion => "unsupported segment version",
            Self::TooSmall => "segment size is smaller than its header",
            Self::ReservationTooSmall => "reserved size is smaller than segment size",
            Self::MisalignedBase => "base address is not page aligned",
            Self::ModuleOutOfBounds => "module object lies outside the segment",
            Self::AddressOverflow => "segment extends past the end of the address space",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SegmentError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub flags: u32,
    pub base_address: u64,
    pub size: u64,
    pub reserved_size: u64,
    pub module: u64,
}

impl SegmentHeader {
    /// Header for a segment of `size` bytes (header included) whose module
    /// object starts `module_offset` bytes into the segment.
    pub fn new(base_address: u64, size: u64, reserved_size: u64, module_offset: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            base_address,
            size,
            reserved_size,
            module: base_address.wrapping_add(module_offset),
        }
    }

    pub fn encode(self, out: &mut [u8; HEADER_SIZE]) {
        out.fill(0);
        out[0..8].copy_from_slice(&self.magic);
        write_u32(out, 8, self.version);
        write_u32(out, 12, self.flags);
        write_u64(out, 16, self.base_address);
        write_u64(out, 24, self.size);
        write_u64(out, 32, self.reserved_size);
        write_u64(out, 40, self.module);
    }

    pub fn decode(input: &[u8; HEADER_SIZE]) -> Result<Self, SegmentError> {
        let mut magic = [0_u8; 8];
        magic.copy_from_slice(&input[0..8]);
        let header = Self {
            magic,
            version: read_u32(input, 8),
            flags: read_u32(input, 12),
            base_address: read_u64(input, 16),
            size: read_u64(input, 24),
            reserved_size: read_u64(input, 32),
            module: read_u64(input, 40),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.magic != MAGIC {
            return Err(SegmentError::InvalidMagic);
        }
        if self.version != VERSION {
            return Err(SegmentError::InvalidVersion);
        }
        if self.size < HEADER_SIZE as u64 {
            return Err(SegmentError::TooSmall);
        }
        if self.reserved_size < self.size {
            return Err(SegmentError::ReservationTooSmall);
        }
        if self.base_address != page_align(self.base_address) {
            return Err(SegmentError::MisalignedBase);
        }
        let reservation_end = self
            .reserved_size
            .checked_add(PAGE_SIZE - 1)
            .and_then(|reserved| self.base_address.checked_add(reserved & !(PAGE_SIZE - 1)));
        if reservation_end.is_none() {
            return Err(SegmentError::AddressOverflow);
        }

        let first = self.base_address + HEADER_SIZE as u64;
        if self.module < first || self.module >= self.base_address + self.size {
            return Err(SegmentError::ModuleOutOfBounds);
        }
        Ok(())
    }

    /// Byte offset of the module object from the start of the segment.
    /// Only meaningful on a validated header.
    pub fn module_offset(&self) -> u64 {
        self.module.wrapping_sub(self.base_address)
    }

    /// Bytes that must be reserved in memory to host the segment.
    pub fn reservation(&self) -> u64 {
        page_align(self.reserved_size)
    }
}

/// Round `value` up to `alignment`, which must be a power of two.
pub fn align(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value.wrapping_add(alignment - 1)) & !(alignment - 1)
}

pub fn page_align(value: u64) -> u64 {
    align(value, PAGE_SIZE)
}

fn write_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(out: &mut [u8], offset: usize, value: u64) {
    out[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(input: &[u8], offset: usize) -> u32 {
    let mut bytes = [0_u8; 4];
    bytes.copy_from_slice(&input[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(input: &[u8], offset: usize) -> u64 {
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&input[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
