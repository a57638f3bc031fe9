use bytemuck::{Pod, Zeroable};

use crate::error::Error;
use crate::pe::{align_up, Pe};
use crate::width::{BaseSize, PeWidth};

/// Width-specific `IMAGE_LOAD_CONFIG_DIRECTORY` accessors, implemented by
/// [`ConfigRecord32`] and [`ConfigRecord64`]. Only the classic (pre-CFG)
/// fields are modeled: the SEH handler table and the lock-prefix table.
pub trait ConfigRecord<B: BaseSize>: Pod + Zeroable + Copy + Default {
    /// `Size`.
    fn size(&self) -> u32;
    /// Sets `Size`.
    fn set_size(&mut self, value: u32);
    /// `TimeDateStamp`.
    fn time_date_stamp(&self) -> u32;
    /// Sets `TimeDateStamp`.
    fn set_time_date_stamp(&mut self, value: u32);
    /// `MajorVersion`/`MinorVersion`.
    fn version(&self) -> (u16, u16);
    /// Sets `MajorVersion`/`MinorVersion`.
    fn set_version(&mut self, major: u16, minor: u16);
    /// `GlobalFlagsClear`.
    fn global_flags_clear(&self) -> u32;
    /// Sets `GlobalFlagsClear`.
    fn set_global_flags_clear(&mut self, value: u32);
    /// `GlobalFlagsSet`.
    fn global_flags_set(&self) -> u32;
    /// Sets `GlobalFlagsSet`.
    fn set_global_flags_set(&mut self, value: u32);
    /// `CriticalSectionDefaultTimeout`.
    fn critical_section_default_timeout(&self) -> u32;
    /// Sets `CriticalSectionDefaultTimeout`.
    fn set_critical_section_default_timeout(&mut self, value: u32);
    /// `DeCommitFreeBlockThreshold`.
    fn decommit_free_block_threshold(&self) -> B;
    /// Sets `DeCommitFreeBlockThreshold`.
    fn set_decommit_free_block_threshold(&mut self, value: B);
    /// `DeCommitTotalFreeThreshold`.
    fn decommit_total_free_threshold(&self) -> B;
    /// Sets `DeCommitTotalFreeThreshold`.
    fn set_decommit_total_free_threshold(&mut self, value: B);
    /// `SecurityCookie`.
    fn security_cookie(&self) -> B;
    /// Sets `SecurityCookie`.
    fn set_security_cookie(&mut self, value: B);
    /// `SEHandlerTable`.
    fn se_handler_table(&self) -> B;
    /// Sets `SEHandlerTable`.
    fn set_se_handler_table(&mut self, value: B);
    /// `SEHandlerCount`.
    fn se_handler_count(&self) -> B;
    /// Sets `SEHandlerCount`.
    fn set_se_handler_count(&mut self, value: B);
    /// `LockPrefixTable`.
    fn lock_prefix_table(&self) -> B;
    /// Sets `LockPrefixTable`.
    fn set_lock_prefix_table(&mut self, value: B);
}

/// `IMAGE_LOAD_CONFIG_DIRECTORY32` (classic layout, through `SEHandlerCount`).
#[derive(Copy, Clone, Pod, Zeroable, Default)]
#[repr(C)]
pub struct ConfigRecord32 {
    size: u32,
    time_date_stamp: u32,
    major_version: u16,
    minor_version: u16,
    global_flags_clear: u32,
    global_flags_set: u32,
    critical_section_default_timeout: u32,
    decommit_free_block_threshold: u32,
    decommit_total_free_threshold: u32,
    lock_prefix_table: u32,
    maximum_allocation_size: u32,
    virtual_memory_threshold: u32,
    process_heap_flags: u32,
    process_affinity_mask: u32,
    csd_version: u16,
    reserved: u16,
    edit_list: u32,
    security_cookie: u32,
    se_handler_table: u32,
    se_handler_count: u32,
}

/// `IMAGE_LOAD_CONFIG_DIRECTORY64` (classic layout, through `SEHandlerCount`).
#[derive(Copy, Clone, Pod, Zeroable, Default)]
#[repr(C)]
pub struct ConfigRecord64 {
    size: u32,
    time_date_stamp: u32,
    major_version: u16,
    minor_version: u16,
    global_flags_clear: u32,
    global_flags_set: u32,
    critical_section_default_timeout: u32,
    decommit_free_block_threshold: u64,
    decommit_total_free_threshold: u64,
    lock_prefix_table: u64,
    maximum_allocation_size: u64,
    virtual_memory_threshold: u64,
    process_affinity_mask: u64,
    process_heap_flags: u32,
    csd_version: u16,
    reserved: u16,
    edit_list: u64,
    security_cookie: u64,
    se_handler_table: u64,
    se_handler_count: u64,
}

macro_rules! impl_config_record {
    ($ty:ty, $base:ty) => {
        impl ConfigRecord<$base> for $ty {
            fn size(&self) -> u32 {
                self.size
            }
            fn set_size(&mut self, value: u32) {
                self.size = value;
            }
            fn time_date_stamp(&self) -> u32 {
                self.time_date_stamp
            }
            fn set_time_date_stamp(&mut self, value: u32) {
                self.time_date_stamp = value;
            }
            fn version(&self) -> (u16, u16) {
                (self.major_version, self.minor_version)
            }
            fn set_version(&mut self, major: u16, minor: u16) {
                self.major_version = major;
                self.minor_version = minor;
            }
            fn global_flags_clear(&self) -> u32 {
                self.global_flags_clear
            }
            fn set_global_flags_clear(&mut self, value: u32) {
                self.global_flags_clear = value;
            }
            fn global_flags_set(&self) -> u32 {
                self.global_flags_set
            }
            fn set_global_flags_set(&mut self, value: u32) {
                self.global_flags_set = value;
            }
            fn critical_section_default_timeout(&self) -> u32 {
                self.critical_section_default_timeout
            }
            fn set_critical_section_default_timeout(&mut self, value: u32) {
                self.critical_section_default_timeout = value;
            }
            fn decommit_free_block_threshold(&self) -> $base {
                self.decommit_free_block_threshold
            }
            fn set_decommit_free_block_threshold(&mut self, value: $base) {
                self.decommit_free_block_threshold = value;
            }
            fn decommit_total_free_threshold(&self) -> $base {
                self.decommit_total_free_threshold
            }
            fn set_decommit_total_free_threshold(&mut self, value: $base) {
                self.decommit_total_free_threshold = value;
            }
            fn security_cookie(&self) -> $base {
                self.security_cookie
            }
            fn set_security_cookie(&mut self, value: $base) {
                self.security_cookie = value;
            }
            fn se_handler_table(&self) -> $base {
                self.se_handler_table
            }
            fn set_se_handler_table(&mut self, value: $base) {
                self.se_handler_table = value;
            }
            fn se_handler_count(&self) -> $base {
                self.se_handler_count
            }
            fn set_se_handler_count(&mut self, value: $base) {
                self.se_handler_count = value;
            }
            fn lock_prefix_table(&self) -> $base {
                self.lock_prefix_table
            }
            fn set_lock_prefix_table(&mut self, value: $base) {
                self.lock_prefix_table = value;
            }
        }
    };
}

impl_config_record!(ConfigRecord32, u32);
impl_config_record!(ConfigRecord64, u64);

/// The in-memory load-configuration directory: scalar fields plus the two
/// RVA-translated handler lists the rebuilder is responsible for laying out.
#[derive(Clone, Debug, Default)]
pub struct ImageConfigInfo {
    /// `TimeDateStamp`.
    pub time_date_stamp: u32,
    /// `(MajorVersion, MinorVersion)`.
    pub version: (u16, u16),
    /// `GlobalFlagsClear`.
    pub global_flags_clear: u32,
    /// `GlobalFlagsSet`.
    pub global_flags_set: u32,
    /// `CriticalSectionDefaultTimeout`.
    pub critical_section_default_timeout: u32,
    /// `DeCommitFreeBlockThreshold`.
    pub decommit_free_block_threshold: u64,
    /// `DeCommitTotalFreeThreshold`.
    pub decommit_total_free_threshold: u64,
    /// `SecurityCookie`, as a VA. `0` if unset.
    pub security_cookie_va: u64,
    /// The SEH handler RVAs, ascending order. Empty if the record's
    /// `SEHandlerTable`/`SEHandlerCount` fields were zero.
    pub seh_handlers: Vec<u32>,
    /// The lock-prefix target RVAs, in on-disk order, excluding the
    /// trailing zero terminator. Empty if `LockPrefixTable` was zero.
    pub lock_prefixes: Vec<u32>,
    /// `SEHandlerTable`'s VA as read.
    pub se_handler_table_va: u64,
    /// `LockPrefixTable`'s VA as read, preserved verbatim when the list
    /// couldn't be walked.
    pub lock_prefix_table_va: u64,
}

/// Controls how [`Pe::rebuild_image_config`] lays out a new load-config
/// directory.
#[derive(Clone, Copy, Debug)]
pub struct ConfigRebuilderSettings {
    /// Section-relative offset where the directory record is written.
    pub offset_from_section_start: u32,
    /// Write a fresh, ascending-sorted SEH handler table.
    pub write_seh_handlers: bool,
    /// Write a fresh, zero-terminated lock-prefix table.
    pub write_lock_prefixes: bool,
    /// Write the new directory's RVA/size back into `DD[LOAD_CONFIG]`.
    pub save_to_pe_header: bool,
}

impl Default for ConfigRebuilderSettings {
    fn default() -> Self {
        Self {
            offset_from_section_start: 0,
            write_seh_handlers: true,
            write_lock_prefixes: true,
            save_to_pe_header: true,
        }
    }
}

impl<W: PeWidth> Pe<W> {
    /// Reads the load-configuration directory named by `DD[LOAD_CONFIG]`,
    /// if any.
    pub fn get_image_config(&self) -> Result<Option<ImageConfigInfo>, Error> {
        if !self.directory_exists(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG) {
            return Ok(None);
        }

        let record_rva = self.get_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG)?;
        let record_size = core::mem::size_of::<W::ConfigRecord>();

        let bytes = self
            .read_bytes_at_rva(record_rva, record_size)
            .map_err(|_| Error::IncorrectConfigDirectory)?;
        let record: W::ConfigRecord = *bytemuck::try_from_bytes(bytes).map_err(|_| Error::IncorrectConfigDirectory)?;

        if record.size() as usize != record_size {
            return Err(Error::IncorrectConfigDirectory);
        }

        let se_handler_table_va = record.se_handler_table().to_u64();
        let se_handler_count = record.se_handler_count().to_u64();
        let mut seh_handlers = Vec::new();
        if se_handler_table_va != 0 && se_handler_count > 0 {
            let table_rva = self.va_to_rva(record.se_handler_table(), true).map_err(|_| Error::IncorrectConfigDirectory)?;
            let count = u32::try_from(se_handler_count).map_err(|_| Error::IncorrectConfigDirectory)?;
            if count >= u32::MAX / 4 {
                return Err(Error::IncorrectConfigDirectory);
            }
            let table_len = count.checked_mul(4).ok_or(Error::IncorrectConfigDirectory)?;
            table_rva.checked_add(table_len).ok_or(Error::IncorrectConfigDirectory)?;

            let mut handlers = Vec::with_capacity(count as usize);
            for i in 0..count {
                let entry_rva = table_rva.checked_add(i.checked_mul(4).ok_or(Error::IncorrectConfigDirectory)?).ok_or(Error::IncorrectConfigDirectory)?;
                let value = self.read_bytes_at_rva(entry_rva, 4).map_err(|_| Error::IncorrectConfigDirectory)?;
                let value = u32::from_le_bytes(value.try_into().unwrap());
                handlers.push(value);
            }
            seh_handlers = handlers;
        }

        let lock_prefix_table_va = record.lock_prefix_table().to_u64();
        let mut lock_prefixes = Vec::new();
        if lock_prefix_table_va != 0 {
            if let Ok(table_rva) = self.va_to_rva(record.lock_prefix_table(), true) {
                let base_size = W::BaseSize::SIZE as u32;
                let mut cursor = table_rva;
                loop {
                    match self.read_base_size_at_rva(cursor) {
                        Ok(value) if value != W::BaseSize::ZERO => {
                            match self.va_to_rva(value, true) {
                                Ok(rva) => lock_prefixes.push(rva),
                                Err(_) => break,
                            }
                            cursor += base_size;
                        }
                        _ => break,
                    }
                }
            }
        }

        Ok(Some(ImageConfigInfo {
            time_date_stamp: record.time_date_stamp(),
            version: record.version(),
            global_flags_clear: record.global_flags_clear(),
            global_flags_set: record.global_flags_set(),
            critical_section_default_timeout: record.critical_section_default_timeout(),
            decommit_free_block_threshold: record.decommit_free_block_threshold().to_u64(),
            decommit_total_free_threshold: record.decommit_total_free_threshold().to_u64(),
            security_cookie_va: record.security_cookie().to_u64(),
            seh_handlers,
            lock_prefixes,
            se_handler_table_va,
            lock_prefix_table_va,
        }))
    }

    /// Serializes `info` into the given section, writing the directory
    /// record and (per `settings`) the SEH handler and lock-prefix tables.
    pub fn rebuild_image_config(
        &mut self,
        info: &ImageConfigInfo,
        section_index: usize,
        settings: &ConfigRebuilderSettings,
    ) -> Result<crate::optional::DataDirectory, Error> {
        let section_rva = self.sections.get(section_index).ok_or(Error::SectionNotAttached)?.header.virtual_address;
        let is_last_section = section_index + 1 == self.sections.len();
        let base_size = W::BaseSize::SIZE as u32;
        let record_size = core::mem::size_of::<W::ConfigRecord>() as u32;

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

        let mut seh_table_va = W::BaseSize::from_u64(info.se_handler_table_va);
        let mut seh_count = W::BaseSize::from_u64(info.seh_handlers.len() as u64);
        if settings.write_seh_handlers && !info.seh_handlers.is_empty() {
            let mut sorted = info.seh_handlers.clone();
            sorted.sort_unstable();

            let table_offset = align_up(record_offset + record_size, base_size);
            let table_rva = section_rva + table_offset;
            let table_len = sorted.len() as u32 * 4;

            self.expand_section(table_rva, table_len, true)?;
            let available = self.raw_len_remaining_at_rva(table_rva)?;
            if !is_last_section && available < table_len {
                return Err(Error::InsufficientSpace);
            }

            let mut cursor = table_rva;
            for &handler_rva in &sorted {
                self.write_bytes_at_rva(cursor, &handler_rva.to_le_bytes())?;
                cursor += 4;
            }

            seh_table_va = self.rva_to_va(table_rva)?;
            seh_count = W::BaseSize::from_u64(sorted.len() as u64);
        }

        let mut lock_prefix_va = W::BaseSize::from_u64(info.lock_prefix_table_va);
        if settings.write_lock_prefixes && !info.lock_prefixes.is_empty() {
            let needed = (info.lock_prefixes.len() as u32 + 1) * base_size;
            let table_offset = align_up(record_offset + record_size + 0x1000, base_size);
            let table_rva = section_rva + table_offset;

            self.expand_section(table_rva, needed, true)?;
            let available = self.raw_len_remaining_at_rva(table_rva)?;
            if !is_last_section && available < needed {
                return Err(Error::InsufficientSpace);
            }

            let mut cursor = table_rva;
            for &target_rva in &info.lock_prefixes {
                let va = self.rva_to_va(target_rva)?;
                let mut bytes = vec![0u8; base_size as usize];
                va.write_le_bytes(&mut bytes);
                self.write_bytes_at_rva(cursor, &bytes)?;
                cursor += base_size;
            }
            self.write_bytes_at_rva(cursor, &vec![0u8; base_size as usize])?;

            lock_prefix_va = self.rva_to_va(table_rva)?;
        }

        let mut record = W::ConfigRecord::default();
        record.set_size(record_size);
        record.set_time_date_stamp(info.time_date_stamp);
        record.set_version(info.version.0, info.version.1);
        record.set_global_flags_clear(info.global_flags_clear);
        record.set_global_flags_set(info.global_flags_set);
        record.set_critical_section_default_timeout(info.critical_section_default_timeout);
        record.set_decommit_free_block_threshold(W::BaseSize::from_u64(info.decommit_free_block_threshold));
        record.set_decommit_total_free_threshold(W::BaseSize::from_u64(info.decommit_total_free_threshold));
        record.set_security_cookie(W::BaseSize::from_u64(info.security_cookie_va));
        record.set_se_handler_table(seh_table_va);
        record.set_se_handler_count(seh_count);
        record.set_lock_prefix_table(lock_prefix_va);
        self.write_bytes_at_rva(record_rva, bytemuck::bytes_of(&record))?;

        let directory = crate::optional::DataDirectory { virtual_address: record_rva, size: record_size };
        if settings.save_to_pe_header {
            self.set_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, directory.virtual_address)?;
            self.set_directory_size(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, directory.size)?;
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
                virtual_size: 0x3000,
                size_of_raw_data: 0x3000,
                ..Default::default()
            },
            vec![0u8; 0x3000],
        ));
        pe
    }

    #[test]
    fn rebuild_then_read_round_trips_config_directory() {
        let mut pe = pe_with_section();
        let info = ImageConfigInfo {
            time_date_stamp: 0x1234_5678,
            version: (1, 0),
            global_flags_clear: 0,
            global_flags_set: 0,
            critical_section_default_timeout: 0,
            decommit_free_block_threshold: 0,
            decommit_total_free_threshold: 0,
            security_cookie_va: 0,
            seh_handlers: vec![0x1500, 0x1200, 0x1400],
            lock_prefixes: vec![0x1600, 0x1610],
            se_handler_table_va: 0,
            lock_prefix_table_va: 0,
        };

        pe.rebuild_image_config(&info, 0, &ConfigRebuilderSettings::default()).unwrap();
        let parsed = pe.get_image_config().unwrap().unwrap();

        assert_eq!(parsed.seh_handlers, vec![0x1200, 0x1400, 0x1500]);
        assert_eq!(parsed.lock_prefixes, vec![0x1600, 0x1610]);
        assert_eq!(parsed.time_date_stamp, 0x1234_5678);
    }

    #[test]
    fn no_load_config_directory_yields_none() {
        let pe = Pe::<Pe32>::empty();
        assert!(pe.get_image_config().unwrap().is_none());
    }

    #[test]
    fn truncated_size_field_is_rejected() {
        let mut pe = pe_with_section();
        let mut record = ConfigRecord32::default();
        record.set_size(4);
        pe.write_bytes_at_rva(0x1000, bytemuck::bytes_of(&record)).unwrap();
        pe.set_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, 0x1000).unwrap();
        pe.set_directory_size(crate::pe::IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, core::mem::size_of::<ConfigRecord32>() as u32).unwrap();

        assert!(matches!(pe.get_image_config(), Err(Error::IncorrectConfigDirectory)));
    }
}
