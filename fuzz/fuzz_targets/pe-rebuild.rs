#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate pe_rebuild;

use libfuzzer_sys::fuzz_target;
use pe_rebuild::pe::PortableExecutable;

fuzz_target!(|data: &[u8]| {
    let Ok(image) = pe_rebuild::pe::parse(data) else { return };

    match &image {
        PortableExecutable::Pe32(pe) => {
            let _ = pe.get_imported_functions();
            let _ = pe.get_tls_info();
            let _ = pe.get_image_config();
        }
        PortableExecutable::Pe64(pe) => {
            let _ = pe.get_imported_functions();
            let _ = pe.get_tls_info();
            let _ = pe.get_image_config();
        }
    }
});
