use bytemuck::{Pod, Zeroable};

use crate::error::Error;
use crate::pe::Pe;
use crate::width::{BaseSize, PeWidth};

/// A single function imported from a library, either by name or by
/// ordinal. `iat_va` is the raw value read from the IAT slot at parse
/// time (the loader-patched VA once the image has been loaded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportedFunction {
    /// Imported by name, via an `ImportByName` (hint, name) record.
    Named {
        /// The function's exported name.
        name: String,
        /// The hint into the exporting DLL's export table.
        hint: u16,
        /// The raw IAT slot value at the time this function was read.
        iat_va: u64,
    },
    /// Imported by ordinal only.
    Ordinal {
        /// The exporting DLL's ordinal for this function.
        ordinal: u16,
        /// The raw IAT slot value at the time this function was read.
        iat_va: u64,
    },
}

/// One library's import descriptor together with the functions pulled
/// from it.
#[derive(Clone, Debug, Default)]
pub struct ImportedLibrary {
    /// The library's file name (e.g. `KERNEL32.dll`).
    pub name: String,
    /// The descriptor's `TimeDateStamp` field.
    pub timestamp: u32,
    /// The descriptor's `ForwarderChain` field.
    pub forwarder_chain: u32,
    /// RVA of this library's IAT (`FirstThunk`), `0` if the library
    /// was synthesized rather than parsed from an image.
    pub rva_to_iat: u32,
    /// RVA of this library's original IAT (`OriginalFirstThunk`),
    /// `0` if none was present.
    pub rva_to_original_iat: u32,
    /// The functions imported from this library, in thunk order.
    pub functions: Vec<ImportedFunction>,
}

/// The on-disk `IMAGE_IMPORT_DESCRIPTOR`. Its layout does not depend
/// on image width — only the thunk tables it points at do.
#[derive(Copy, Clone, Pod, Zeroable, Default)]
#[repr(C)]
struct RawImportDescriptor {
    original_first_thunk: u32,
    time_date_stamp: u32,
    forwarder_chain: u32,
    name: u32,
    first_thunk: u32,
}

const IMPORT_DESCRIPTOR_SIZE: u32 = 20;

/// Controls how [`Pe::rebuild_imports`] lays out and links a new
/// import directory.
#[derive(Clone, Debug)]
pub struct ImportRebuilderSettings {
    /// Section-relative offset where the directory's strings region starts.
    pub offset_from_section_start: u32,
    /// Emit an original-IAT (OFT) table alongside the IAT.
    pub build_original_iat: bool,
    /// Reuse each library's existing `FirstThunk`/`OriginalFirstThunk`
    /// RVAs rather than allocating fresh thunk blocks.
    pub save_iat_and_original_iat_rvas: bool,
    /// When RVAs are preserved, also overwrite the bytes at those RVAs
    /// with freshly computed thunks.
    pub rewrite_iat_and_original_iat_contents: bool,
    /// Allocate an original-IAT for libraries that were parsed with
    /// `rva_to_original_iat == 0`.
    pub fill_missing_original_iats: bool,
    /// Write the new directory's RVA/size back into `DD[IMPORT]`.
    pub auto_set_to_pe_headers: bool,
    /// Also zero `DD[IAT]` once the new directory is written.
    pub zero_directory_entry_iat: bool,
}

impl Default for ImportRebuilderSettings {
    fn default() -> Self {
        Self {
            offset_from_section_start: 0,
            build_original_iat: true,
            save_iat_and_original_iat_rvas: true,
            rewrite_iat_and_original_iat_contents: false,
            fill_missing_original_iats: false,
            auto_set_to_pe_headers: true,
            zero_directory_entry_iat: false,
        }
    }
}

impl<W: PeWidth> Pe<W> {
    /// Walks the import descriptor array and the IAT/OIAT thunk tables,
    /// materializing each library and its imported functions.
    pub fn get_imported_functions(&self) -> Result<Vec<ImportedLibrary>, Error> {
        if !self.directory_exists(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT) {
            return Ok(Vec::new());
        }

        let mut libraries = Vec::new();
        let mut desc_rva = self.get_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT)?;
        let base_size = W::BaseSize::SIZE as u32;

        loop {
            let bytes = self
                .read_bytes_at_rva(desc_rva, IMPORT_DESCRIPTOR_SIZE as usize)
                .map_err(|_| Error::IncorrectImportDirectory)?;
            let descriptor: RawImportDescriptor =
                *bytemuck::try_from_bytes(bytes).map_err(|_| Error::IncorrectImportDirectory)?;

            if descriptor.name == 0 {
                break;
            }

            let name = String::from_utf8(self.read_c_string_at_rva(descriptor.name)?)
                .map_err(Error::BadString)?;

            let mut iat_cursor = descriptor.first_thunk;
            let oft_synonym = descriptor.original_first_thunk == 0;
            let mut oft_cursor = if oft_synonym { descriptor.first_thunk } else { descriptor.original_first_thunk };

            let mut functions = Vec::new();
            loop {
                let iat_value = self.read_base_size_at_rva(iat_cursor)?;
                if iat_value == W::BaseSize::ZERO {
                    break;
                }
                let lookup = self.read_base_size_at_rva(oft_cursor)?;
                iat_cursor += base_size;
                oft_cursor += base_size;

                if lookup == W::BaseSize::ZERO {
                    continue;
                }

                let is_ordinal = lookup.to_u64() & W::IMPORT_SNAP_FLAG.to_u64() == W::IMPORT_SNAP_FLAG.to_u64();
                let function = if is_ordinal {
                    ImportedFunction::Ordinal {
                        ordinal: (lookup.to_u64() & 0xffff) as u16,
                        iat_va: iat_value.to_u64(),
                    }
                } else {
                    let name_rva = lookup.to_u64() as u32;
                    let hint_bytes = self.read_bytes_at_rva(name_rva, 2)?;
                    let hint = u16::from_le_bytes([hint_bytes[0], hint_bytes[1]]);
                    let name = String::from_utf8(self.read_c_string_at_rva(name_rva + 2)?)
                        .map_err(Error::BadString)?;
                    ImportedFunction::Named {
                        name,
                        hint,
                        iat_va: iat_value.to_u64(),
                    }
                };
                functions.push(function);
            }

            libraries.push(ImportedLibrary {
                name,
                timestamp: descriptor.time_date_stamp,
                forwarder_chain: descriptor.forwarder_chain,
                rva_to_iat: descriptor.first_thunk,
                rva_to_original_iat: if oft_synonym { 0 } else { descriptor.original_first_thunk },
                functions,
            });

            desc_rva += IMPORT_DESCRIPTOR_SIZE;
        }

        Ok(libraries)
    }

    /// Serializes `imports` into the given section, in the layout
    /// documented for this rebuilder: strings, then the descriptor
    /// array, then the IAT (and optionally OIAT) thunk blocks. Returns
    /// the `{RVA, Size}` of the descriptor array; the strings region is
    /// deliberately excluded from the reported size.
    pub fn rebuild_imports(
        &mut self,
        imports: &[ImportedLibrary],
        section_index: usize,
        settings: &ImportRebuilderSettings,
    ) -> Result<crate::optional::DataDirectory, Error> {
        let section = self.sections.get(section_index).ok_or(Error::SectionNotAttached)?;
        let section_rva = section.header.virtual_address;
        let is_last_section = section_index + 1 == self.sections.len();
        let base_size = W::BaseSize::SIZE as u32;

        let mut strings_len: u32 = 0;
        for lib in imports {
            strings_len += lib.name.len() as u32 + 1;
            for function in &lib.functions {
                if let ImportedFunction::Named { name, .. } = function {
                    strings_len += 2 + name.len() as u32 + 1;
                }
            }
        }

        let descriptors_len = (imports.len() as u32 + 1) * IMPORT_DESCRIPTOR_SIZE;

        let mut iat_len: u32 = 0;
        for lib in imports {
            iat_len += (lib.functions.len() as u32 + 1) * base_size;
        }
        let oiat_len = if settings.build_original_iat { iat_len } else { 0 };

        let strings_start = settings.offset_from_section_start;
        let descriptors_start = strings_start + strings_len;
        let iat_start = crate::pe::align_up(descriptors_start + descriptors_len, base_size);
        let oiat_start = iat_start + iat_len;
        let total_len = (oiat_start + oiat_len) - strings_start;

        let section = self.sections.get(section_index).ok_or(Error::SectionNotAttached)?;
        let available = section.header.size_of_raw_data.saturating_sub(strings_start);
        if !is_last_section && (section.raw_data.is_empty() || available < total_len) {
            return Err(Error::InsufficientSpace);
        }

        let required_len = (strings_start + total_len) as usize;
        if is_last_section {
            self.sections[section_index].resize_raw_data(required_len.max(self.sections[section_index].raw_data.len()));
        }

        let mut string_pos = strings_start;
        let mut descriptor_pos = descriptors_start;
        let mut iat_pos = iat_start;
        let mut oiat_pos = oiat_start;

        for lib in imports {
            let name_rva = section_rva + string_pos;
            let mut name_bytes = lib.name.clone().into_bytes();
            name_bytes.push(0);
            self.write_bytes_at_rva(name_rva, &name_bytes)?;
            string_pos += name_bytes.len() as u32;

            let save_iats = settings.save_iat_and_original_iat_rvas && lib.rva_to_iat != 0;
            let has_original = lib.rva_to_original_iat != 0;
            let write_original_iat =
                (!save_iats && settings.build_original_iat) || (save_iats && settings.fill_missing_original_iats && !has_original);

            let iat_rva = if save_iats { lib.rva_to_iat } else { section_rva + iat_pos };
            let write_original_at_preserved_rva = save_iats && has_original;
            let original_iat_rva = if write_original_at_preserved_rva {
                lib.rva_to_original_iat
            } else if write_original_iat {
                section_rva + oiat_pos
            } else {
                0
            };

            let mut iat_cursor = iat_rva;
            let mut oiat_cursor = original_iat_rva;

            for function in &lib.functions {
                let thunk_value = match function {
                    ImportedFunction::Ordinal { ordinal, .. } => {
                        W::BaseSize::from_u64(W::IMPORT_SNAP_FLAG.to_u64() | *ordinal as u64)
                    }
                    ImportedFunction::Named { hint, name, .. } => {
                        let import_by_name_rva = section_rva + string_pos;
                        let mut record = hint.to_le_bytes().to_vec();
                        record.extend_from_slice(name.as_bytes());
                        record.push(0);
                        self.write_bytes_at_rva(import_by_name_rva, &record)?;
                        string_pos += record.len() as u32;
                        W::BaseSize::from_u64(import_by_name_rva as u64)
                    }
                };

                let mut bytes = vec![0u8; base_size as usize];
                thunk_value.write_le_bytes(&mut bytes);

                if !save_iats || settings.rewrite_iat_and_original_iat_contents {
                    self.write_bytes_at_rva(iat_cursor, &bytes)?;
                }
                if write_original_iat {
                    self.write_bytes_at_rva(oiat_cursor, &bytes)?;
                }

                iat_cursor += base_size;
                oiat_cursor += base_size;
            }

            if !save_iats {
                self.write_bytes_at_rva(iat_cursor, &vec![0u8; base_size as usize])?;
                iat_pos += (lib.functions.len() as u32 + 1) * base_size;
            }
            if write_original_iat && !write_original_at_preserved_rva {
                self.write_bytes_at_rva(oiat_cursor, &vec![0u8; base_size as usize])?;
                oiat_pos += (lib.functions.len() as u32 + 1) * base_size;
            }

            let descriptor = RawImportDescriptor {
                original_first_thunk: original_iat_rva,
                time_date_stamp: lib.timestamp,
                forwarder_chain: lib.forwarder_chain,
                name: name_rva,
                first_thunk: iat_rva,
            };
            self.write_bytes_at_rva(section_rva + descriptor_pos, bytemuck::bytes_of(&descriptor))?;
            descriptor_pos += IMPORT_DESCRIPTOR_SIZE;
        }

        self.write_bytes_at_rva(section_rva + descriptor_pos, &vec![0u8; IMPORT_DESCRIPTOR_SIZE as usize])?;

        let directory = crate::optional::DataDirectory {
            virtual_address: section_rva + descriptors_start,
            size: (oiat_start + oiat_len) - descriptors_start,
        };

        if settings.auto_set_to_pe_headers {
            self.set_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT, directory.virtual_address)?;
            self.set_directory_size(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT, directory.size)?;
            if settings.zero_directory_entry_iat {
                self.remove_directory(crate::pe::IMAGE_DIRECTORY_ENTRY_IAT);
            }
        }

        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Section, SectionHeader};
    use crate::width::Pe32;

    fn pe_with_section(raw_len: usize) -> Pe<Pe32> {
        let mut pe = Pe::<Pe32>::empty();
        pe.sections.push(Section::new(
            SectionHeader {
                virtual_address: 0x1000,
                virtual_size: raw_len as u32,
                size_of_raw_data: raw_len as u32,
                ..Default::default()
            },
            vec![0u8; raw_len],
        ));
        pe
    }

    #[test]
    fn rebuild_then_read_round_trips_named_and_ordinal_imports() {
        let mut pe = pe_with_section(0x400);
        let imports = vec![ImportedLibrary {
            name: "KERNEL32.dll".to_string(),
            timestamp: 0,
            forwarder_chain: 0,
            rva_to_iat: 0,
            rva_to_original_iat: 0,
            functions: vec![
                ImportedFunction::Named { name: "ExitProcess".to_string(), hint: 42, iat_va: 0 },
                ImportedFunction::Ordinal { ordinal: 7, iat_va: 0 },
            ],
        }];

        let settings = ImportRebuilderSettings::default();
        pe.rebuild_imports(&imports, 0, &settings).unwrap();

        let parsed = pe.get_imported_functions().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "KERNEL32.dll");
        assert_eq!(parsed[0].functions.len(), 2);
        assert!(matches!(&parsed[0].functions[0], ImportedFunction::Named { name, hint: 42, .. } if name == "ExitProcess"));
        assert!(matches!(&parsed[0].functions[1], ImportedFunction::Ordinal { ordinal: 7, .. }));
    }

    #[test]
    fn rebuild_imports_into_non_last_section_without_room_fails() {
        let mut pe = pe_with_section(4);
        pe.sections.push(Section::new(
            SectionHeader { virtual_address: 0x2000, virtual_size: 0x10, size_of_raw_data: 0x10, ..Default::default() },
            vec![0u8; 0x10],
        ));

        let imports = vec![ImportedLibrary {
            name: "a.dll".to_string(),
            functions: vec![ImportedFunction::Ordinal { ordinal: 1, iat_va: 0 }],
            ..Default::default()
        }];

        let result = pe.rebuild_imports(&imports, 0, &ImportRebuilderSettings::default());
        assert!(matches!(result, Err(Error::InsufficientSpace)));
    }

    #[test]
    fn no_import_directory_yields_empty_library_list() {
        let pe = Pe::<Pe32>::empty();
        assert!(pe.get_imported_functions().unwrap().is_empty());
    }

    /// S3 — the snap flag distinguishes an ordinal thunk
    /// (`0x8000_0000_0000_0002` -> ordinal 2) from a named-import thunk
    /// (`0x0000_0000_0000_2000` -> hint/name read from RVA `0x2000`).
    #[test]
    fn snap_flag_distinguishes_ordinal_from_named_thunk_pe64() {
        use crate::width::Pe64;

        let mut pe = Pe::<Pe64>::empty();
        pe.sections.push(Section::new(
            SectionHeader { virtual_address: 0x1000, virtual_size: 0x1000, size_of_raw_data: 0x1000, ..Default::default() },
            vec![0u8; 0x1000],
        ));

        // Hint/name pair at RVA 0x2000: hint=0x0005, name="Fn\0".
        pe.write_bytes_at_rva(0x2000, &5u16.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(0x2002, b"Fn\0").unwrap();

        // Descriptor's name string and two-entry OFT/IAT thunk pair.
        pe.write_bytes_at_rva(0x2100, b"lib.dll\0").unwrap();

        let oft_rva = 0x2200u32;
        let iat_rva = 0x2300u32;
        pe.write_bytes_at_rva(oft_rva, &0x8000_0000_0000_0002u64.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(oft_rva + 8, &0x0000_0000_0000_2000u64.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(oft_rva + 16, &0u64.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(iat_rva, &0x8000_0000_0000_0002u64.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(iat_rva + 8, &0x0000_0000_0000_2000u64.to_le_bytes()).unwrap();
        pe.write_bytes_at_rva(iat_rva + 16, &0u64.to_le_bytes()).unwrap();

        let descriptor = RawImportDescriptor {
            original_first_thunk: oft_rva,
            time_date_stamp: 0,
            forwarder_chain: 0,
            name: 0x2100,
            first_thunk: iat_rva,
        };
        pe.write_bytes_at_rva(0x2400, bytemuck::bytes_of(&descriptor)).unwrap();
        pe.write_bytes_at_rva(0x2400 + IMPORT_DESCRIPTOR_SIZE, &[0u8; IMPORT_DESCRIPTOR_SIZE as usize]).unwrap();

        pe.set_directory_rva(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT, 0x2400).unwrap();
        pe.set_directory_size(crate::pe::IMAGE_DIRECTORY_ENTRY_IMPORT, 2 * IMPORT_DESCRIPTOR_SIZE).unwrap();

        let libraries = pe.get_imported_functions().unwrap();
        assert_eq!(libraries.len(), 1);
        assert_eq!(libraries[0].name, "lib.dll");
        assert_eq!(libraries[0].functions.len(), 2);
        assert!(matches!(libraries[0].functions[0], ImportedFunction::Ordinal { ordinal: 2, .. }));
        assert!(matches!(&libraries[0].functions[1], ImportedFunction::Named { name, hint: 5, .. } if name == "Fn"));
    }
}
