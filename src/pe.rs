use bytemuck::checked::try_from_bytes;
use core::fmt;
use core::marker::PhantomData;
use num_traits::FromPrimitive;

use crate::coff::{Characteristics, CoffFileHeader, MachineTypes};
use crate::error::Error;
use crate::optional::{DataDirectory, Magic, Optional};
use crate::section::{parse_section_table, Section, SectionHeader};
use crate::width::{BaseSize, Pe32, Pe64, PeWidth};

const IMAGE_DOS_PE_SIGNATURE_OFFSET: usize = 0x3c;

/// Index of the import directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
/// Index of the import directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
/// Index of the base relocation directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
/// Index of the TLS directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_TLS: usize = 9;
/// Index of the load-configuration directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG: usize = 10;
/// Index of the import-address-table directory entry within `DataDirectories`.
pub const IMAGE_DIRECTORY_ENTRY_IAT: usize = 12;

const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: u32 = 16;

fn max_dword() -> u64 {
    u32::MAX as u64
}

/// A parsed Portable Executable fixed to a single address width, `Pe32`
/// or `Pe64`. Holds the COFF header, the width's optional header, the
/// section table, and the section bodies the directory readers and
/// rebuilders operate against.
pub struct Pe<W: PeWidth> {
    /// COFF File Header (Object and Image)
    pub coff: CoffFileHeader,
    /// The width-specific optional header (PE32 or PE32+).
    pub optional_header: W::OptionalHeader,
    /// The image's sections, each owning its header and raw bytes.
    pub sections: Vec<Section>,
    _width: PhantomData<W>,
}

impl<W: PeWidth> Pe<W> {
    /// Builds the canonical empty PE32 image of spec §3.I7: `MZ`/`PE`
    /// magics, machine `0x14C`, image base `0x00400000`, file alignment
    /// `0x200`, section alignment `0x1000`, default subsystem version 5.1,
    /// default heap/stack reserve `0x100000`, commit `0x1000`, 16
    /// directory slots, characteristics `EXECUTABLE_IMAGE | RELOCS_STRIPPED
    /// | 32BIT_MACHINE`, subsystem `WINDOWS_GUI`.
    pub fn empty() -> Self
    where
        W: PeWidth<BaseSize = u32, OptionalHeader = crate::optional::OptionalHeader32>,
    {
        let characteristics = Characteristics::IMAGE_FILE_EXECUTABLE_IMAGE
            | Characteristics::IMAGE_FILE_RELOCS_STRIPPED
            | Characteristics::IMAGE_FILE_32BIT_MACHINE;

        let coff = CoffFileHeader {
            machine: MachineTypes::I386 as u16,
            number_of_sections: 0,
            time_date_stamp: 0,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: core::mem::size_of::<crate::optional::OptionalHeader32>() as u16,
            characteristics: characteristics.bits(),
        };

        let optional_header = crate::optional::OptionalHeader32 {
            magic: Pe32::MAGIC,
            major_linker_version: 0,
            minor_linker_version: 0,
            size_of_code: 0,
            size_of_initialized_data: 0,
            size_of_uninitialized_data: 0,
            address_of_entry_point: 0,
            base_of_code: 0,
            base_of_data: 0,
            image_base: 0x0040_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            major_operating_system_version: 5,
            minor_operating_system_version: 1,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 5,
            minor_subsystem_version: 1,
            win32_version_value: 0,
            size_of_image: 0,
            size_of_headers: 1024,
            check_sum: 0,
            subsystem: crate::optional::Subsystem::WindowsGUI as u16,
            dll_characteristics: 0,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            loader_flags: 0,
            number_of_rva_and_sizes: IMAGE_NUMBEROF_DIRECTORY_ENTRIES,
            data_directories: Default::default(),
        };

        Pe {
            coff,
            optional_header,
            sections: Vec::new(),
            _width: PhantomData,
        }
    }

    /// `id < NumberOfRvaAndSizes && DD[id].VirtualAddress != 0`.
    pub fn directory_exists(&self, id: usize) -> bool {
        (id as u32) < self.optional_header.number_of_rva_and_sizes()
            && self.directory_slot(id).map(DataDirectory::exists).unwrap_or(false)
    }

    /// The RVA of directory `id`. Fails if `id >= NumberOfRvaAndSizes`.
    pub fn get_directory_rva(&self, id: usize) -> Result<u32, Error> {
        Ok(self.require_directory(id)?.virtual_address)
    }

    /// The size of directory `id`. Fails if `id >= NumberOfRvaAndSizes`.
    pub fn get_directory_size(&self, id: usize) -> Result<u32, Error> {
        Ok(self.require_directory(id)?.size)
    }

    /// Writes a new RVA into directory `id`. Fails if `id >= NumberOfRvaAndSizes`.
    pub fn set_directory_rva(&mut self, id: usize, rva: u32) -> Result<(), Error> {
        self.require_directory_mut(id)?.virtual_address = rva;
        Ok(())
    }

    /// Writes a new size into directory `id`. Fails if `id >= NumberOfRvaAndSizes`.
    pub fn set_directory_size(&mut self, id: usize, size: u32) -> Result<(), Error> {
        self.require_directory_mut(id)?.size = size;
        Ok(())
    }

    /// Zeroes directory `id`. If `id` is the base-relocation directory,
    /// sets `RELOCS_STRIPPED` and clears `DYNAMIC_BASE`. If `id` is the
    /// export directory, clears the `DLL` file characteristic.
    pub fn remove_directory(&mut self, id: usize) {
        if !self.directory_exists(id) {
            return;
        }
        if let Some(dir) = self.directory_slot_mut(id) {
            dir.clear();
        }

        if id == IMAGE_DIRECTORY_ENTRY_BASERELOC {
            let mut characteristics = self
                .coff
                .get_characteristics()
                .unwrap_or(Characteristics::empty());
            characteristics.insert(Characteristics::IMAGE_FILE_RELOCS_STRIPPED);
            self.coff.characteristics = characteristics.bits();

            let mut dll_characteristics = self
                .optional_header
                .get_dll_characteristics()
                .unwrap_or(crate::optional::DLLCharacteristics::empty());
            dll_characteristics.remove(crate::optional::DLLCharacteristics::IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE);
            self.optional_header.set_dll_characteristics(dll_characteristics);
        } else if id == IMAGE_DIRECTORY_ENTRY_EXPORT {
            let mut characteristics = self
                .coff
                .get_characteristics()
                .unwrap_or(Characteristics::empty());
            characteristics.remove(Characteristics::IMAGE_FILE_DLL);
            self.coff.characteristics = characteristics.bits();
        }
    }

    /// Scans directories from the last slot down; stops at the first
    /// populated slot (IAT counted as empty when `strip_iat` is set), but
    /// never drops below `min_count`. Stores and returns the new count.
    pub fn strip_data_directories(&mut self, min_count: u32, strip_iat: bool) -> u32 {
        let mut i: i64 = self.optional_header.number_of_rva_and_sizes() as i64 - 1;

        loop {
            if i < 0 {
                break;
            }
            let populated = self
                .directory_slot(i as usize)
                .map(DataDirectory::exists)
                .unwrap_or(false)
                && !(i as usize == IMAGE_DIRECTORY_ENTRY_IAT && strip_iat);
            if populated {
                break;
            }
            if i <= min_count as i64 - 1 {
                break;
            }
            i -= 1;
        }

        if i == IMAGE_NUMBEROF_DIRECTORY_ENTRIES as i64 - 1 {
            self.optional_header
                .set_number_of_rva_and_sizes(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);
            return IMAGE_NUMBEROF_DIRECTORY_ENTRIES;
        }

        let new_count = (i + 1) as u32;
        self.optional_header.set_number_of_rva_and_sizes(new_count);
        new_count
    }

    /// The preferred load address of the image.
    pub fn image_base(&self) -> W::BaseSize {
        self.optional_header.image_base()
    }

    /// Sets the preferred load address of the image.
    pub fn set_image_base(&mut self, base: W::BaseSize) {
        self.optional_header.set_image_base(base);
    }

    /// `va - image_base`, rejecting the result if it doesn't fit a `u32`
    /// when `bound_check` is set.
    pub fn va_to_rva(&self, va: W::BaseSize, bound_check: bool) -> Result<u32, Error> {
        let image_base = self.image_base().to_u64();
        let va = va.to_u64();
        if bound_check && va.wrapping_sub(image_base) > max_dword() {
            return Err(Error::IncorrectAddressConversion);
        }
        Ok(va.wrapping_sub(image_base) as u32)
    }

    /// `rva + image_base`, returned in this image's natural word size.
    /// For PE32, fails on 32-bit overflow; for PE32+ this cannot overflow
    /// a `u64`.
    pub fn rva_to_va(&self, rva: u32) -> Result<W::BaseSize, Error> {
        let image_base = self.image_base().to_u64();
        let sum = (rva as u64)
            .checked_add(image_base)
            .ok_or(Error::IncorrectAddressConversion)?;
        if W::BaseSize::SIZE == 4 && sum > u32::MAX as u64 {
            return Err(Error::IncorrectAddressConversion);
        }
        Ok(W::BaseSize::from_u64(sum))
    }

    /// The section, if any, whose virtual window contains `rva`.
    pub fn section_containing_rva(&self, rva: u32) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// The section, if any, whose virtual window contains `rva`, mutably.
    pub fn section_containing_rva_mut(&mut self, rva: u32) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.contains_rva(rva))
    }

    /// Number of contiguous bytes available for read starting at `rva`,
    /// within whichever section contains it. Used to bound
    /// null-terminated reads (library/function names).
    pub fn section_data_length_from_rva(&self, rva: u32) -> Result<u32, Error> {
        let section = self.section_containing_rva(rva).ok_or(Error::AddressOutOfSection)?;
        Ok(section.header.virtual_end() - rva)
    }

    /// Reads `len` raw bytes starting at `rva`, bounds-checked against
    /// the containing section's raw-data window.
    pub fn read_bytes_at_rva(&self, rva: u32, len: usize) -> Result<&[u8], Error> {
        let section = self.section_containing_rva(rva).ok_or(Error::AddressOutOfSection)?;
        let section_offset = (rva - section.header.virtual_address) as usize;
        section.read_at(section_offset, len).map_err(|_| Error::AddressOutOfSection)
    }

    /// Reads a `BaseSize` value at `rva`.
    pub fn read_base_size_at_rva(&self, rva: u32) -> Result<W::BaseSize, Error> {
        let bytes = self.read_bytes_at_rva(rva, W::BaseSize::SIZE)?;
        Ok(W::BaseSize::from_le_bytes(bytes))
    }

    /// Reads a null-terminated ASCII string starting at `rva`. Fails if no
    /// null terminator is found within the containing section's window.
    pub fn read_c_string_at_rva(&self, rva: u32) -> Result<Vec<u8>, Error> {
        let max_len = self.section_data_length_from_rva(rva)?;
        let window = self.read_bytes_at_rva(rva, max_len as usize)?;
        let end = window.iter().position(|&b| b == 0).ok_or(Error::IncorrectImportDirectory)?;
        Ok(window[..end].to_vec())
    }

    fn directory_slot(&self, id: usize) -> Option<&DataDirectory> {
        self.optional_header.data_directories().get(id)
    }

    fn directory_slot_mut(&mut self, id: usize) -> Option<&mut DataDirectory> {
        self.optional_header.data_directories_mut().get_mut(id)
    }

    fn require_directory(&self, id: usize) -> Result<&DataDirectory, Error> {
        if (id as u32) >= self.number_of_rva_and_sizes() {
            return Err(Error::DirectoryDoesNotExist);
        }
        self.directory_slot(id).ok_or(Error::DirectoryDoesNotExist)
    }

    fn require_directory_mut(&mut self, id: usize) -> Result<&mut DataDirectory, Error> {
        if (id as u32) >= self.number_of_rva_and_sizes() {
            return Err(Error::DirectoryDoesNotExist);
        }
        self.directory_slot_mut(id).ok_or(Error::DirectoryDoesNotExist)
    }

    fn number_of_rva_and_sizes(&self) -> u32 {
        self.optional_header.number_of_rva_and_sizes()
    }

    /// Writes `data` at `rva`, bounds-checked against the containing
    /// section's raw-data window. Callers that may need more room than a
    /// section currently has should call [`Pe::expand_section`] first.
    pub(crate) fn write_bytes_at_rva(&mut self, rva: u32, data: &[u8]) -> Result<(), Error> {
        let section = self
            .section_containing_rva_mut(rva)
            .ok_or(Error::AddressOutOfSection)?;
        let section_offset = (rva - section.header.virtual_address) as usize;
        section.write_at(section_offset, data)
    }

    /// Bytes of raw (on-disk) data remaining from `rva` to the end of the
    /// containing section's raw-data window. Used to decide whether a
    /// rebuilder must fall back to writing only the virtually-backed tail.
    pub(crate) fn raw_len_remaining_at_rva(&self, rva: u32) -> Result<u32, Error> {
        let section = self.section_containing_rva(rva).ok_or(Error::AddressOutOfSection)?;
        let section_offset = rva - section.header.virtual_address;
        Ok(section.header.size_of_raw_data.saturating_sub(section_offset))
    }

    /// Grows the section containing `rva` so that `needed_len` bytes
    /// starting at `rva` are backed by raw data (`raw = true`) or at least
    /// by virtual space (`raw = false`). A no-op if the section is already
    /// large enough. Returns `Ok(())` without resizing if `rva` falls
    /// outside every section (the caller decides whether that's fatal).
    pub(crate) fn expand_section(&mut self, rva: u32, needed_len: u32, raw: bool) -> Result<(), Error> {
        let Some(section) = self.section_containing_rva_mut(rva) else {
            return Ok(());
        };
        let section_offset = rva - section.header.virtual_address;
        let needed_end = section_offset.saturating_add(needed_len);

        if needed_end > section.header.virtual_size {
            section.header.virtual_size = needed_end;
        }
        if raw && needed_end > section.header.size_of_raw_data {
            section.resize_raw_data(needed_end as usize);
        }
        Ok(())
    }
}

/// Rounds `value` up to the nearest multiple of `align` (`align` must be
/// nonzero). Used to place rebuilt directories on their natural boundary.
pub(crate) fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    let remainder = value % align;
    if remainder == 0 {
        value
    } else {
        value + (align - remainder)
    }
}

/// A parsed Portable Executable, with its address width (PE32 or PE32+)
/// resolved at parse time.
pub enum PortableExecutable {
    /// A 32-bit image.
    Pe32(Pe<Pe32>),
    /// A 64-bit image.
    Pe64(Pe<Pe64>),
}

impl PortableExecutable {
    /// Serializes the image back into a loadable byte buffer. The minimum
    /// necessary to exercise rebuild round-trips: a fixed-size DOS stub,
    /// `PE\0\0`, COFF header, optional header, section table, and each
    /// section's raw bytes padded to `FileAlignment`. Not a general-purpose
    /// writer (no Rich header, no checksum recomputation).
    pub fn write_to(&self) -> Vec<u8> {
        match self {
            PortableExecutable::Pe32(pe) => pe.write_to(),
            PortableExecutable::Pe64(pe) => pe.write_to(),
        }
    }
}

const DOS_STUB_SIZE: usize = 0x40;

macro_rules! impl_write_to {
    ($width:ty) => {
        impl Pe<$width> {
            /// Serializes this image back into a byte buffer, per
            /// [`PortableExecutable::write_to`].
            pub fn write_to(&self) -> Vec<u8> {
                let file_alignment = if self.optional_header.file_alignment == 0 {
                    0x200
                } else {
                    self.optional_header.file_alignment
                };

                let mut coff = self.coff;
                coff.number_of_sections = self.sections.len() as u16;
                coff.size_of_optional_header = core::mem::size_of_val(&self.optional_header) as u16;

                let headers_len = DOS_STUB_SIZE
                    + 4
                    + core::mem::size_of::<CoffFileHeader>()
                    + core::mem::size_of_val(&self.optional_header)
                    + self.sections.len() * core::mem::size_of::<SectionHeader>();
                let headers_padded = align_up(headers_len as u32, file_alignment) as usize;

                let mut out = vec![0u8; DOS_STUB_SIZE];
                out[IMAGE_DOS_PE_SIGNATURE_OFFSET..IMAGE_DOS_PE_SIGNATURE_OFFSET + 2]
                    .copy_from_slice(&(DOS_STUB_SIZE as u16).to_le_bytes());
                out.extend_from_slice(b"PE\0\0");
                out.extend_from_slice(bytemuck::bytes_of(&coff));
                out.extend_from_slice(bytemuck::bytes_of(&self.optional_header));

                let mut headers: Vec<SectionHeader> = self.sections.iter().map(|s| s.header).collect();
                let mut cursor = headers_padded as u32;
                let mut bodies: Vec<Vec<u8>> = Vec::with_capacity(self.sections.len());
                for (header, section) in headers.iter_mut().zip(self.sections.iter()) {
                    let raw_len = align_up(section.raw_data.len() as u32, file_alignment);
                    header.pointer_to_raw_data = if raw_len == 0 { 0 } else { cursor };
                    header.size_of_raw_data = raw_len;
                    let mut body = section.raw_data.clone();
                    body.resize(raw_len as usize, 0);
                    cursor += raw_len;
                    bodies.push(body);
                }

                for header in &headers {
                    out.extend_from_slice(bytemuck::bytes_of(header));
                }
                out.resize(headers_padded, 0);

                for body in bodies {
                    out.extend_from_slice(&body);
                }

                out
            }
        }
    };
}

impl_write_to!(Pe32);
impl_write_to!(Pe64);

/// Parse a Portable Executable from a given byte array.
pub fn parse(binary: &[u8]) -> Result<PortableExecutable, Error> {
    let mut offset: usize = read_u16(binary, IMAGE_DOS_PE_SIGNATURE_OFFSET)?.into();

    let slice = binary.get(offset..offset + 4).ok_or(Error::OffsetOutOfRange)?;
    let signature = String::from_utf8(slice.to_vec()).map_err(Error::BadString)?;
    if signature != "PE\0\0" {
        return Err(Error::MissingPeHeader);
    }
    offset += 4;

    let coff_slice = binary.get(offset..offset + 20).ok_or(Error::OffsetOutOfRange)?;
    let coff = *try_from_bytes::<CoffFileHeader>(coff_slice).map_err(|_| Error::MissingCoffHeader)?;
    offset += 20;

    if coff.size_of_optional_header == 0 {
        return Err(Error::MissingMagicNumber);
    }

    let magic = Magic::from_u16(read_u16(binary, offset)?).ok_or(Error::MissingMagicNumber)?;

    match magic {
        Magic::PE32 => {
            let optional_header = crate::optional::OptionalHeader32::parse_optional_header(binary, &mut offset)?;
            let headers = parse_section_table(binary, offset, coff.number_of_sections);
            let sections = materialize_sections(binary, &headers);
            Ok(PortableExecutable::Pe32(Pe {
                coff,
                optional_header,
                sections,
                _width: PhantomData,
            }))
        }
        Magic::PE64 => {
            let optional_header = crate::optional::OptionalHeader64::parse_optional_header(binary, &mut offset)?;
            let headers = parse_section_table(binary, offset, coff.number_of_sections);
            let sections = materialize_sections(binary, &headers);
            Ok(PortableExecutable::Pe64(Pe {
                coff,
                optional_header,
                sections,
                _width: PhantomData,
            }))
        }
    }
}

fn materialize_sections(binary: &[u8], headers: &[SectionHeader]) -> Vec<Section> {
    headers
        .iter()
        .map(|header| {
            let start = header.pointer_to_raw_data as usize;
            let len = header.size_of_raw_data as usize;
            let raw_data = binary
                .get(start..start.saturating_add(len))
                .map(|s| s.to_vec())
                .unwrap_or_default();
            Section::new(*header, raw_data)
        })
        .collect()
}

impl fmt::Display for PortableExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortableExecutable::Pe32(pe) => fmt_pe(pe, f),
            PortableExecutable::Pe64(pe) => fmt_pe(pe, f),
        }
    }
}

fn fmt_pe<W: PeWidth>(pe: &Pe<W>, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    W::OptionalHeader: fmt::Display,
{
    writeln!(f, "{}", pe.coff)?;
    writeln!(f, "{}", pe.optional_header)?;
    for section in pe.sections.iter() {
        writeln!(f, "{}", section.header)?;
    }
    Ok(())
}

fn read_u16(binary: &[u8], offset: usize) -> Result<u16, Error> {
    let array = binary.get(offset..offset + 2).ok_or(Error::OffsetOutOfRange)?;
    Ok(u16::from_le_bytes(array.try_into().expect("checked slice of 2 bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Section, SectionHeader};

    #[test]
    fn directory_exists_matches_rva_nonzero_for_every_valid_id() {
        let mut pe = Pe::<Pe32>::empty();
        for id in 0..16usize {
            assert!(!pe.directory_exists(id));
        }
        pe.set_directory_rva(3, 0x4000).unwrap();
        for id in 0..16usize {
            assert_eq!(pe.directory_exists(id), id == 3);
        }
    }

    #[test]
    fn directory_access_beyond_count_fails() {
        let mut pe = Pe::<Pe32>::empty();
        pe.optional_header.number_of_rva_and_sizes = 8;
        assert!(matches!(pe.get_directory_rva(10), Err(Error::DirectoryDoesNotExist)));
        assert!(matches!(pe.set_directory_size(10, 4), Err(Error::DirectoryDoesNotExist)));
    }

    #[test]
    fn rva_va_round_trip_holds_for_every_section_rva() {
        let mut pe = Pe::<Pe32>::empty();
        pe.sections.push(Section::new(
            SectionHeader { virtual_address: 0x1000, virtual_size: 0x3000, ..Default::default() },
            Vec::new(),
        ));

        for rva in [0x1000u32, 0x1500, 0x2fff] {
            let va = pe.rva_to_va(rva).unwrap();
            assert_eq!(pe.va_to_rva(va, true).unwrap(), rva);
        }
    }

    #[test]
    fn rebase_with_no_tables_only_moves_image_base() {
        let mut pe = Pe::<Pe32>::empty();
        pe.sections.push(Section::new(
            SectionHeader { virtual_address: 0x1000, virtual_size: 0x10, size_of_raw_data: 0x10, ..Default::default() },
            vec![0xaa; 0x10],
        ));
        let before = pe.sections[0].raw_data.clone();

        pe.rebase_image(&[], 0x0050_0000).unwrap();

        assert_eq!(pe.image_base(), 0x0050_0000);
        assert_eq!(pe.sections[0].raw_data, before);
    }

    #[test]
    fn strip_data_directories_never_drops_below_min_count() {
        let mut pe = Pe::<Pe32>::empty();
        assert_eq!(pe.strip_data_directories(1, false), 1);
        assert_eq!(pe.optional_header.number_of_rva_and_sizes, 1);

        let mut pe = Pe::<Pe32>::empty();
        pe.set_directory_rva(15, 0x9000).unwrap();
        assert_eq!(pe.strip_data_directories(0, false), 16);
    }

    #[test]
    fn remove_directory_is_idempotent() {
        let mut pe = Pe::<Pe32>::empty();
        pe.set_directory_rva(IMAGE_DIRECTORY_ENTRY_BASERELOC, 0x2000).unwrap();
        pe.remove_directory(IMAGE_DIRECTORY_ENTRY_BASERELOC);
        let characteristics_once = pe.coff.characteristics;
        let dll_characteristics_once = pe.optional_header.dll_characteristics;

        pe.remove_directory(IMAGE_DIRECTORY_ENTRY_BASERELOC);
        assert_eq!(pe.coff.characteristics, characteristics_once);
        assert_eq!(pe.optional_header.dll_characteristics, dll_characteristics_once);
    }

    #[test]
    fn write_to_round_trips_a_section_through_parse() {
        let mut pe = Pe::<Pe32>::empty();
        pe.sections.push(Section::new(
            SectionHeader {
                name: *b".text\0\0\0",
                virtual_address: 0x1000,
                virtual_size: 0x40,
                size_of_raw_data: 0x40,
                characteristics: 0x6000_0020,
                ..Default::default()
            },
            (0..0x40).collect(),
        ));

        let bytes = PortableExecutable::Pe32(pe).write_to();
        let reparsed = parse(&bytes).unwrap();
        match reparsed {
            PortableExecutable::Pe32(pe) => {
                assert_eq!(pe.sections.len(), 1);
                assert_eq!(pe.sections[0].header.virtual_address, 0x1000);
                assert_eq!(pe.sections[0].raw_data[..0x40], (0..0x40).collect::<Vec<u8>>()[..]);
            }
            PortableExecutable::Pe64(_) => panic!("expected PE32"),
        }
    }
}
