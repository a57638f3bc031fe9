//! Integration tests driving the crate through its public surface only:
//! build an image in memory, serialize it, and parse the bytes back.

use pe_rebuild::imports::{ImportRebuilderSettings, ImportedFunction, ImportedLibrary};
use pe_rebuild::optional::Optional;
use pe_rebuild::pe::{self, Pe, PortableExecutable};
use pe_rebuild::relocation::{RelocationEntry, RelocationTable};
use pe_rebuild::section::{Section, SectionHeader};
use pe_rebuild::width::Pe32;

fn pe_with_one_section(raw_len: usize) -> Pe<Pe32> {
    let mut pe = Pe::<Pe32>::empty();
    pe.sections.push(Section::new(
        SectionHeader {
            name: *b".data\0\0\0",
            virtual_address: 0x1000,
            virtual_size: raw_len as u32,
            size_of_raw_data: raw_len as u32,
            characteristics: 0xC000_0040,
            ..Default::default()
        },
        vec![0u8; raw_len],
    ));
    pe
}

/// S1 — default-constructed PE32 matches the documented empty-image invariant.
#[test]
fn empty_pe32_matches_canonical_defaults() {
    let pe = Pe::<Pe32>::empty();
    assert_eq!(pe.optional_header.magic, 0x010b);
    assert_eq!(pe.optional_header.image_base, 0x0040_0000);
    assert_eq!(pe.optional_header.file_alignment, 0x200);
    assert_eq!(pe.optional_header.section_alignment, 0x1000);
    assert_eq!(pe.optional_header.major_operating_system_version, 5);
    assert_eq!(pe.optional_header.minor_operating_system_version, 1);
    assert_eq!(pe.optional_header.major_subsystem_version, 5);
    assert_eq!(pe.optional_header.minor_subsystem_version, 1);
    assert_eq!(pe.optional_header.size_of_headers, 1024);
    assert_eq!(pe.optional_header.number_of_rva_and_sizes, 16);
    assert_eq!(pe.coff.machine, 0x14c);

    let characteristics = pe.coff.get_characteristics().unwrap();
    assert!(characteristics.contains(pe_rebuild::coff::Characteristics::IMAGE_FILE_EXECUTABLE_IMAGE));
    assert!(characteristics.contains(pe_rebuild::coff::Characteristics::IMAGE_FILE_RELOCS_STRIPPED));
    assert!(characteristics.contains(pe_rebuild::coff::Characteristics::IMAGE_FILE_32BIT_MACHINE));

    let subsystem = pe.optional_header.get_subsystem().unwrap();
    assert_eq!(subsystem, pe_rebuild::optional::Subsystem::WindowsGUI);
}

/// S2 — RVA/VA address math against a `0x00400000` image base.
#[test]
fn address_math_matches_documented_values() {
    let pe = Pe::<Pe32>::empty();
    assert_eq!(pe.rva_to_va(0x1000).unwrap(), 0x0040_1000);
    assert_eq!(pe.va_to_rva(0x0040_1000, true).unwrap(), 0x1000);
    assert!(pe.rva_to_va(0xFFFF_F000).is_err());
}

/// S4 — stripping trailing empty directories stops at the last populated slot.
#[test]
fn strip_data_directories_stops_at_last_populated_slot() {
    let mut pe = Pe::<Pe32>::empty();
    pe.set_directory_rva(1, 0x2000).unwrap();
    pe.set_directory_rva(2, 0x3000).unwrap();
    pe.set_directory_rva(5, 0x4000).unwrap();

    assert_eq!(pe.strip_data_directories(1, false), 6);
    assert_eq!(pe.optional_header.number_of_rva_and_sizes, 6);

    pe.optional_header.number_of_rva_and_sizes = 16;
    assert_eq!(pe.strip_data_directories(10, false), 10);
}

/// S5 — removing the base relocation directory sets RELOCS_STRIPPED and
/// clears DYNAMIC_BASE.
#[test]
fn remove_base_relocation_directory_updates_characteristics() {
    let mut pe = Pe::<Pe32>::empty();
    pe.coff.characteristics &= !pe_rebuild::coff::Characteristics::IMAGE_FILE_RELOCS_STRIPPED.bits();
    pe.optional_header
        .set_dll_characteristics(pe_rebuild::optional::DLLCharacteristics::IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE);
    pe.set_directory_rva(pe::IMAGE_DIRECTORY_ENTRY_BASERELOC, 0x5000).unwrap();

    pe.remove_directory(pe::IMAGE_DIRECTORY_ENTRY_BASERELOC);

    assert!(!pe.directory_exists(pe::IMAGE_DIRECTORY_ENTRY_BASERELOC));
    assert!(pe.coff.get_characteristics().unwrap().contains(pe_rebuild::coff::Characteristics::IMAGE_FILE_RELOCS_STRIPPED));
    assert!(!pe
        .optional_header
        .get_dll_characteristics()
        .unwrap()
        .contains(pe_rebuild::optional::DLLCharacteristics::IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE));
}

/// S6 — rebasing patches a HIGHLOW relocation target and the stored image base.
#[test]
fn rebase_patches_relocation_and_image_base() {
    let mut pe = pe_with_one_section(0x1000);
    pe.sections[0].write_at(0x10, &0x0040_2000u32.to_le_bytes()).unwrap();

    let tables = vec![RelocationTable::new(0x1000, vec![RelocationEntry::new((3 << 12) | 0x10)])];
    pe.rebase_image(&tables, 0x0050_0000).unwrap();

    assert_eq!(pe.read_base_size_at_rva(0x1010).unwrap(), 0x0050_2000);
    assert_eq!(pe.image_base(), 0x0050_0000);
}

/// Serialize then parse, and confirm the image's empty-PE invariants survive
/// the round trip.
#[test]
fn write_to_then_parse_round_trips_empty_image() {
    let pe = Pe::<Pe32>::empty();
    let bytes = PortableExecutable::Pe32(pe).write_to();

    let parsed = pe::parse(&bytes).expect("round-tripped bytes should parse");
    match parsed {
        PortableExecutable::Pe32(pe) => {
            assert_eq!(pe.optional_header.magic, 0x010b);
            assert_eq!(pe.optional_header.image_base, 0x0040_0000);
            assert_eq!(pe.sections.len(), 0);
        }
        PortableExecutable::Pe64(_) => panic!("expected a PE32 image"),
    }
}

/// Serializing a one-section image preserves the section's raw bytes and
/// virtual address across a parse round trip.
#[test]
fn write_to_then_parse_preserves_section_bytes() {
    let mut pe = pe_with_one_section(0x20);
    pe.sections[0].raw_data[0..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

    let bytes = PortableExecutable::Pe32(pe).write_to();
    let parsed = pe::parse(&bytes).expect("round-tripped bytes should parse");

    match parsed {
        PortableExecutable::Pe32(pe) => {
            assert_eq!(pe.sections.len(), 1);
            assert_eq!(pe.sections[0].header.virtual_address, 0x1000);
            assert_eq!(&pe.sections[0].raw_data[0..4], &[0xde, 0xad, 0xbe, 0xef]);
        }
        PortableExecutable::Pe64(_) => panic!("expected a PE32 image"),
    }
}

/// Round-trip: functions pulled via `get_imported_functions` after
/// `rebuild_imports` name, hint, and ordinal-match the originals.
#[test]
fn rebuild_imports_then_reread_preserves_names_hints_and_ordinals() {
    let mut pe = pe_with_one_section(0x400);
    let imports = vec![
        ImportedLibrary {
            name: "KERNEL32.dll".to_string(),
            functions: vec![
                ImportedFunction::Named { name: "ExitProcess".to_string(), hint: 10, iat_va: 0 },
                ImportedFunction::Named { name: "GetLastError".to_string(), hint: 20, iat_va: 0 },
            ],
            ..Default::default()
        },
        ImportedLibrary {
            name: "USER32.dll".to_string(),
            functions: vec![ImportedFunction::Ordinal { ordinal: 42, iat_va: 0 }],
            ..Default::default()
        },
    ];

    let settings = ImportRebuilderSettings {
        build_original_iat: true,
        save_iat_and_original_iat_rvas: false,
        ..ImportRebuilderSettings::default()
    };
    pe.rebuild_imports(&imports, 0, &settings).unwrap();

    let reread = pe.get_imported_functions().unwrap();
    assert_eq!(reread.len(), 2);
    assert_eq!(reread[0].name, "KERNEL32.dll");
    assert_eq!(reread[1].name, "USER32.dll");
    assert!(matches!(&reread[0].functions[0], ImportedFunction::Named { name, hint: 10, .. } if name == "ExitProcess"));
    assert!(matches!(&reread[0].functions[1], ImportedFunction::Named { name, hint: 20, .. } if name == "GetLastError"));
    assert!(matches!(&reread[1].functions[0], ImportedFunction::Ordinal { ordinal: 42, .. }));
}
