//! # pe-rebuild: read, mutate, and rewrite Windows PE32/PE32+ images.
//!
//! `pe-rebuild` parses a Portable Executable into native, documented
//! structs, resolved to either [`width::Pe32`] or [`width::Pe64`] at parse
//! time, and provides the directory readers and rebuilders needed to
//! mutate one: imports, TLS, load configuration, and image rebase.
//!
//! - Everything parsed into native, documented structs
//! - Directory readers resolve RVAs/VAs into owned, walkable records
//! - Directory rebuilders lay records back into a section and hand back
//!   the `DataDirectory` to install
//! - Every header can be printed with ease
//!
//! ## Examples
//! ```
//! use pe_rebuild::pe::{self, PortableExecutable};
//!
//! # fn main() -> Result<(), pe_rebuild::error::Error> {
//! # let binary: Vec<u8> = Vec::new();
//! # if binary.is_empty() { return Ok(()); }
//! // Parse it!
//! let executable = pe::parse(binary.as_slice())?;
//! // Print all that technical goodness
//! match &executable {
//!     PortableExecutable::Pe32(image) => print!("{}", image.coff),
//!     PortableExecutable::Pe64(image) => print!("{}", image.coff),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// COFF file header definitions and helper functions.
pub mod coff;
/// Load-configuration directory reader and rebuilder.
pub mod config;
/// The crate's error type.
pub mod error;
/// Import directory reader and rebuilder.
pub mod imports;
/// Optional header definitions and helper functions.
pub mod optional;
/// Base relocation types and image rebase.
pub mod relocation;
/// Section header definitions and helper functions.
pub mod section;
/// Thread-local storage directory reader and rebuilder.
pub mod tls;
/// Monolith struct containing all the information you will ever need,
/// generalized over address width.
pub mod pe;
/// The PE32/PE32+ width polymorphism: `BaseSize` and `PeWidth`.
pub mod width;
