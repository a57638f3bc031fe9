use bytemuck::{Pod, Zeroable};

use crate::error::Error;
use crate::pe::{align_up, Pe};
use crate::width::{BaseSize, PeWidth};

/// Width-specific `IMAGE_TLS_DIRECTORY` accessors, implemented by
/// [`TlsRecord32`] and [`TlsRecord64`].
pub trait TlsRecord<B: BaseSize>: Pod + Zeroable + Copy + Default {
    /// `StartAddressOfRawData`.
    fn start_address_of_raw_data(&self) -> B;
    /// Sets `StartAddressOfRawData`.
    fn set_start_address_of_raw_data(&mut self, value: B);
    /// `EndAddressOfRawData`.
    fn end_address_of_raw_data(&self) -> B;
    /// Sets `EndAddressOfRawData`.
    fn set_end_address_of_raw_data(&mut self, value: B);
    /// `AddressOfIndex`.
    fn address_of_index(&self) -> B;
    /// Sets `AddressOfIndex`.
    fn set_address_of_index(&mut self, value: B);
    /// `AddressOfCallBacks`.
    fn address_of_callbacks(&self) -> B;
    /// Sets `AddressOfCallBacks`.
    fn set_address_of_callbacks(&mut self, value: B);
    /// `SizeOfZeroFill`.
    fn size_of_zero_fill(&self) -> u32;
    /// Sets `SizeOfZeroFill`.
    fn set_size_of_zero_fill(&mut self, value: u32);
    /// `Characteristics`.
    fn characteristics(&self) -> u32;
    /// Sets `Characteristics`.
    fn set_characteristics(&mut self, value: u32);
}

/// `IMAGE_TLS_DIRECTORY32`.
#[derive(Copy, Clone, Pod, Zeroable, Default)]
#[repr(C)]
pub struct TlsRecord32 {
    start_address_of_raw_data: u32,
    end_address_of_raw_data: u32,
    address_of_index: u32,
    address_of_callbacks: u32,
    size_of_zero_fill: u32,
    characteristics: u32,
}

/// `IMAGE_TLS_DIRECTORY64`.
#[derive(Copy, Clone, Pod, Zeroable, Default)]
#[repr(C)]
pub struct TlsRecord64 {
    start_address_of_raw_data: u64,
    end_address_of_raw_data: u64,
    address_of_index: u64,
    address_of_callbacks: u64,
    size_of_zero_fill: u32,
    characteristics: u32,
}

macro_rules! impl_tls_record {
    ($ty:ty, $base:ty) => {
        impl TlsRecord<$base> for $ty {
            fn start_address_of_raw_data(&self) -> $base {
                self.start_address_of_raw_data
            }
            fn set_start_address_of_raw_data(&mut self, value: $base) {
                self.start_address_of_raw_data = value;
            }
            fn end_address_of_raw_data(&self) -> $base {
                self.end_address_of_raw_data
            }
            fn set_end_address_of_raw_data(&mut self, value: $base) {
                self.end_address_of_raw_data = value;
            }
            fn address_of_index(&self) -> $base {
                self.address_of_index
            }
            fn set_address_of_index(&mut self, value: $base) {
                self.address_of_index = value;
            }
            fn address_of_callbacks(&self) -> $base {
                self.address_of_callbacks
            }
            fn set_address_of_callbacks(&mut self, value: $base) {
                self.address_of_callbacks = value;
            }
            fn size_of_zero_fill(&self) -> u32 {
                self.size_of_zero_fill
            }
            fn set_size_of_zero_fill(&mut self, value: u32) {
                self.size_of_zero_fill = value;
            }
            fn characteristics(&self) -> u32 {
                self.characteristics
            }
            fn set_characteristics(&mut self, value: u32) {
                self.characteristics = value;
            }
        }
    };
}

impl_tls_record!(TlsRecord32, u32);
impl_tls_record!(TlsRecord64, u64);

/// The in-memory TLS directory: RVA-translated addresses, the raw data
/// region's bytes, and the ordered callback list.
#[derive(Clone, Debug, Default)]
pub struct TlsInfo {
    /// RVA of the start of the raw TLS data template, `0` if none.
    pub start_rva: u32,
    /// RVA just past the end of the raw TLS data template.
    pub end_rva: u32,
    /// RVA of the `DWORD`/`QWORD` holding this module's TLS index.
    pub index_rva: u32,
    /// RVA of the zero-terminated callback VA array, `0` if none.
    pub callbacks_rva: u32,
    /// `SizeOfZeroFill`.
    pub size_of_zero_fill: u32,
    /// `Characteristics`.
    pub characteristics: u32,
    /// The raw TLS data template, copied in (`end_rva - start_rva` bytes).
    pub raw_data: Vec<u8>,
    /// The callback RVAs, in call order, excluding the trailing zero.
    pub callbacks: Vec<u32>,
}

/// Controls how [`Pe::rebuild_tls`] lays out a new TLS directory.
#[derive(Clone, Copy, Debug)]
pub struct TlsRebuilderSettings {
    /// Section-relative offset where the TLS record is written.
    pub offset_from_section_start: u32,
    /// Write the raw data template at `Start`.
    pub write_tls_data: bool,
    /// Write the callback VA array (plus trailing zero) at the callbacks RVA.
    pub write_tls_callbacks: bool,
    /// When the containing section needs to grow, also grow its raw
    /// (on-disk) data rather than only its virtual size.
    pub expand_raw: bool,
    /// Write the new directory's RVA/size back into `DD[TLS]`.
    pub save_to_pe_header: bool,
}

impl Default for TlsRebuilderSettings {
    fn default() -> Self {
        Self {
            offset_from_section_start: 0,
            write_tls_data: true,
            write_tls_callbacks: true,
            expand_raw: true,
            save_to_pe_header: true,
        }
    }
}

impl<W: PeWidth> Pe<W> {
    /// Reads the TLS directory named by `DD[TLS]`, if any.
    pub fn get_tls_info(&self) -> Result<Option<TlsInfo>, Error> {
        if !self.directory_exists(crate::pe::IMAGE_DIRECTORY_ENTRY_TLS) {
            return Ok(None);
        }

        let record_rva = self.get_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_TLS)?;
        let record_size = core::mem::size_of::<W::TlsRecord>();
        let bytes = self
            .read_bytes_at_rva(record_rva, record_size)
            .map_err(|_| Error::IncorrectTlsDirectory)?;
        let record: W::TlsRecord = *bytemuck::try_from_bytes(bytes).map_err(|_| Error::IncorrectTlsDirectory)?;

        let mut start_va = record.start_address_of_raw_data();
        let mut end_va = record.end_address_of_raw_data();

        if start_va == end_va {
            if self.va_to_rva(end_va, true).is_err() {
                start_va = W::BaseSize::ZERO;
                end_va = W::BaseSize::ZERO;
            }
        }

        let start_rva = self.va_to_rva(start_va, false)?;
        let end_rva = self.va_to_rva(end_va, false)?;

        let raw_data = if start_va != W::BaseSize::ZERO && start_va != end_va {
            let len = (end_rva - start_rva) as usize;
            if self.section_data_length_from_rva(start_rva)? < len as u32 {
                return Err(Error::IncorrectTlsDirectory);
            }
            self.read_bytes_at_rva(start_rva, len)
                .map_err(|_| Error::IncorrectTlsDirectory)?
                .to_vec()
        } else {
            Vec::new()
        };

        let index_rva = self.va_to_rva(record.address_of_index(), false)?;
        let callbacks_va = record.address_of_callbacks();
        let callbacks_rva = if callbacks_va == W::BaseSize::ZERO {
            0
        } else {
            self.va_to_rva(callbacks_va, false)?
        };

        let mut callbacks = Vec::new();
        if callbacks_rva != 0 {
            let base_size = W::BaseSize::SIZE as u32;
            let mut cursor = callbacks_rva;
            loop {
                let callback_va = self.read_base_size_at_rva(cursor)?;
                if callback_va == W::BaseSize::ZERO {
                    break;
                }
                callbacks.push(self.va_to_rva(callback_va, false)?);
                cursor += base_size;
            }
        }

        Ok(Some(TlsInfo {
            start_rva: if start_va == W::BaseSize::ZERO { 0 } else { start_rva },
            end_rva: if start_va == W::BaseSize::ZERO { 0 } else { end_rva },
            index_rva,
            callbacks_rva,
            size_of_zero_fill: record.size_of_zero_fill(),
            characteristics: record.characteristics(),
            raw_data,
            callbacks,
        }))
    }

    /// Serializes `info` into the given section, writing the TLS record
    /// and (per `settings`) the raw data template and callback array.
    pub fn rebuild_tls(
        &mut self,
        info: &TlsInfo,
        section_index: usize,
        settings: &TlsRebuilderSettings,
    ) -> Result<crate::optional::DataDirectory, Error> {
        let section_rva = self.sections.get(section_index).ok_or(Error::SectionNotAttached)?.header.virtual_address;
        let is_last_section = section_index + 1 == self.sections.len();
        let base_size = W::BaseSize::SIZE as u32;
        let record_size = core::mem::size_of::<W::TlsRecord>() as u32;

        let record_offset = align_up(settings.offset_from_section_start, base_size);
        let record_rva = section_rva + record_offset;

        {
            let section = &self.sections[section_index];
            let available = section.header.size_of_raw_data.saturating_sub(record_offset);
            if !is_last_section && available < record_size {
                return Err(Error::InsufficientSpace);
            }
        }
        self.expand_section(record_rva, record_size, true)?;

        let mut record = W::TlsRecord::default();
        record.set_start_address_of_raw_data(if info.start_rva != 0 { self.rva_to_va(info.start_rva)? } else { W::BaseSize::ZERO });
        record.set_end_address_of_raw_data(if info.end_rva != 0 { self.rva_to_va(info.end_rva)? } else { W::BaseSize::ZERO });
        record.set_address_of_index(self.rva_to_va(info.index_rva)?);
        record.set_address_of_callbacks(if info.callbacks_rva != 0 { self.rva_to_va(info.callbacks_rva)? } else { W::BaseSize::ZERO });
        record.set_size_of_zero_fill(info.size_of_zero_fill);
        record.set_characteristics(info.characteristics);
        self.write_bytes_at_rva(record_rva, bytemuck::bytes_of(&record))?;

        if settings.write_tls_data && info.start_rva != 0 && !info.raw_data.is_empty() {
            self.expand_section(info.start_rva, info.raw_data.len() as u32, settings.expand_raw)?;
            let available = self.raw_len_remaining_at_rva(info.start_rva)?;
            let writable = (available as usize).min(info.raw_data.len());
            if writable == 0 && !info.raw_data.is_empty() {
                return Err(Error::InsufficientSpace);
            }
            self.write_bytes_at_rva(info.start_rva, &info.raw_data[..writable])?;
        }

        if settings.write_tls_callbacks && info.callbacks_rva != 0 {
            let needed_callback_size = (info.callbacks.len() as u32 + 1) * base_size;
            self.expand_section(info.callbacks_rva, needed_callback_size, true)?;
            let raw_available = self.raw_len_remaining_at_rva(info.callbacks_rva)?;
            if raw_available < needed_callback_size.saturating_sub(base_size) {
                return Err(Error::InsufficientSpace);
            }

            let mut cursor = info.callbacks_rva;
            for &callback_rva in &info.callbacks {
                let va = self.rva_to_va(callback_rva)?;
                let mut bytes = vec![0u8; base_size as usize];
                va.write_le_bytes(&mut bytes);
                self.write_bytes_at_rva(cursor, &bytes)?;
                cursor += base_size;
            }
            self.write_bytes_at_rva(cursor, &vec![0u8; base_size as usize])?;
        }

        let directory = crate::optional::DataDirectory { virtual_address: record_rva, size: record_size };
        if settings.save_to_pe_header {
            self.set_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_TLS, directory.virtual_address)?;
            self.set_directory_size(crate::pe::IMAGE_DIRECTORY_ENTRY_TLS, directory.size)?;
        }
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Section, SectionHeader};
    use crate::width::Pe32;

    fn pe_with_section() -> Pe<Pe32> {
        let mut pe = Pe::<Pe32>::empty();
        pe.sections.push(Section::new(
            SectionHeader {
                virtual_address: 0x1000,
                virtual_size: 0x200,
                size_of_raw_data: 0x200,
                ..Default::default()
            },
            vec![0u8; 0x200],
        ));
        pe
    }

    #[test]
    fn rebuild_then_read_round_trips_tls_directory() {
        let mut pe = pe_with_section();
        let info = TlsInfo {
            start_rva: 0x1100,
            end_rva: 0x1110,
            index_rva: 0x1120,
            callbacks_rva: 0x1130,
            size_of_zero_fill: 4,
            characteristics: 0,
            raw_data: vec![0xaa; 16],
            callbacks: vec![0x1200, 0x1300],
        };

        pe.rebuild_tls(&info, 0, &TlsRebuilderSettings::default()).unwrap();
        let parsed = pe.get_tls_info().unwrap().unwrap();

        assert_eq!(parsed.start_rva, 0x1100);
        assert_eq!(parsed.end_rva, 0x1110);
        assert_eq!(parsed.raw_data, vec![0xaa; 16]);
        assert_eq!(parsed.callbacks, vec![0x1200, 0x1300]);
    }

    #[test]
    fn no_tls_directory_yields_none() {
        let pe = Pe::<Pe32>::empty();
        assert!(pe.get_tls_info().unwrap().is_none());
    }
}
