use bytemuck::Pod;
use core::fmt;
use core::ops::{Add, Sub};

/// A scalar matching the PE "natural word" for a given image class: `u32`
/// for PE32, `u64` for PE32+. Every VA, every thunk, and every TLS/config
/// pointer field is one of these.
pub trait BaseSize:
    Pod
    + Copy
    + Clone
    + fmt::Debug
    + Default
    + PartialEq
    + Eq
    + PartialOrd
    + Ord
    + Add<Output = Self>
    + Sub<Output = Self>
{
    /// The zero value, spelled out since `Default` alone doesn't guarantee it numerically.
    const ZERO: Self;
    /// Number of bytes this scalar occupies on disk.
    const SIZE: usize;

    fn from_u64(value: u64) -> Self;
    fn to_u64(self) -> u64;
    fn from_le_bytes(bytes: &[u8]) -> Self;
    fn write_le_bytes(self, out: &mut [u8]);
    fn checked_add(self, rhs: Self) -> Option<Self>;
}

impl BaseSize for u32 {
    const ZERO: Self = 0;
    const SIZE: usize = 4;

    fn from_u64(value: u64) -> Self {
        value as u32
    }

    fn to_u64(self) -> u64 {
        self as u64
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes[..4].try_into().expect("slice of 4 bytes"))
    }

    fn write_le_bytes(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        u32::checked_add(self, rhs)
    }
}

impl BaseSize for u64 {
    const ZERO: Self = 0;
    const SIZE: usize = 8;

    fn from_u64(value: u64) -> Self {
        value
    }

    fn to_u64(self) -> u64 {
        self
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        u64::from_le_bytes(bytes[..8].try_into().expect("slice of 8 bytes"))
    }

    fn write_le_bytes(self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        u64::checked_add(self, rhs)
    }
}

/// The five constants + record layouts that distinguish PE32 from PE32+,
/// per the "generic code over a trait/capability set" option noted for
/// the width polymorphism of the original design.
pub trait PeWidth: Copy + Clone + fmt::Debug + Default + 'static {
    /// `u32` for PE32, `u64` for PE32+.
    type BaseSize: BaseSize;
    /// `OptionalHeader32` or `OptionalHeader64`.
    type OptionalHeader: crate::optional::Optional<BaseSize = Self::BaseSize>;
    /// Width-specific TLS directory record.
    type TlsRecord: crate::tls::TlsRecord<Self::BaseSize>;
    /// Width-specific load config directory record.
    type ConfigRecord: crate::config::ConfigRecord<Self::BaseSize>;

    /// Optional-header magic for this width (`0x10B` or `0x20B`).
    const MAGIC: u16;
    /// High bit of `BaseSize` marking an ordinal import.
    const IMPORT_SNAP_FLAG: Self::BaseSize;
}

/// PE32 (32-bit) image class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Pe32;

/// PE32+ (64-bit) image class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Pe64;

impl PeWidth for Pe32 {
    type BaseSize = u32;
    type OptionalHeader = crate::optional::OptionalHeader32;
    type TlsRecord = crate::tls::TlsRecord32;
    type ConfigRecord = crate::config::ConfigRecord32;

    const MAGIC: u16 = 0x10b;
    const IMPORT_SNAP_FLAG: u32 = 0x8000_0000;
}

impl PeWidth for Pe64 {
    type BaseSize = u64;
    type OptionalHeader = crate::optional::OptionalHeader64;
    type TlsRecord = crate::tls::TlsRecord64;
    type ConfigRecord = crate::config::ConfigRecord64;

    const MAGIC: u16 = 0x20b;
    const IMPORT_SNAP_FLAG: u64 = 0x8000_0000_0000_0000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trips_through_le_bytes() {
        let value = 0x1122_3344u32;
        let mut buf = [0u8; 4];
        value.write_le_bytes(&mut buf);
        assert_eq!(buf, [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(u32::from_le_bytes(&buf), value);
    }

    #[test]
    fn u64_round_trips_through_le_bytes() {
        let value = 0x1122_3344_5566_7788u64;
        let mut buf = [0u8; 8];
        value.write_le_bytes(&mut buf);
        assert_eq!(u64::from_le_bytes(&buf), value);
    }

    #[test]
    fn checked_add_overflows_at_max() {
        assert_eq!(u32::MAX.checked_add(1), None);
        assert_eq!(0u32.checked_add(1), Some(1));
        assert_eq!(u64::MAX.checked_add(1), None);
    }

    #[test]
    fn from_u64_truncates_for_pe32_and_preserves_for_pe64() {
        let wide: u64 = 0x1_0000_0001;
        assert_eq!(u32::from_u64(wide), 1u32);
        assert_eq!(u64::from_u64(wide), wide);
    }

    #[test]
    fn magic_and_snap_flag_are_distinct_per_width() {
        assert_eq!(Pe32::MAGIC, 0x10b);
        assert_eq!(Pe64::MAGIC, 0x20b);
        assert_eq!(Pe32::IMPORT_SNAP_FLAG, 0x8000_0000);
        assert_eq!(Pe64::IMPORT_SNAP_FLAG, 0x8000_0000_0000_0000);
    }
}
