use core::fmt;

/// Errors produced while parsing, inspecting, or rebuilding a Portable Executable.
#[derive(Debug)]
pub enum Error {
    /// An offset computed during parsing fell outside the bounds of the input slice.
    OffsetOutOfRange,
    /// The `e_lfanew` signature did not point at `"PE\0\0"`.
    MissingPeHeader,
    /// The COFF file header could not be read from its slice.
    MissingCoffHeader,
    /// The optional header's magic value was neither `0x10B` nor `0x20B`.
    MissingMagicNumber,
    /// The optional header could not be cast from its slice.
    BadOptionalHeader,
    /// A length-prefixed or null-terminated string was not valid UTF-8.
    BadString(std::string::FromUtf8Error),
    /// A directory entry was requested that does not exist for this image
    /// (its `DataDirectory` is zeroed, or `number_of_rva_and_sizes` is too small).
    DirectoryDoesNotExist,
    /// An RVA/VA/file-offset conversion produced a value outside the representable range
    /// for this image's address width.
    IncorrectAddressConversion,
    /// An address did not fall within any section, and therefore has no file offset.
    AddressOutOfSection,
    /// An import directory's descriptors, thunks, or name table were inconsistent
    /// with each other or with the sections that back them.
    IncorrectImportDirectory,
    /// A TLS directory's raw-data range or callback list was malformed.
    IncorrectTlsDirectory,
    /// A load-configuration directory's declared size didn't match a known layout,
    /// or a field it governs (SEH handler table, lock-prefix table) was inconsistent.
    IncorrectConfigDirectory,
    /// An operation that requires image sections was attempted on an image with none.
    SectionNotAttached,
    /// A rebuilder could not fit its output into the space made available to it
    /// (the growable last section, or a directory with no room to expand in place).
    InsufficientSpace,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OffsetOutOfRange => write!(f, "offset out of range of the input slice"),
            Error::MissingPeHeader => write!(f, "missing or invalid PE\\0\\0 signature"),
            Error::MissingCoffHeader => write!(f, "could not read COFF file header"),
            Error::MissingMagicNumber => write!(f, "optional header magic is neither PE32 nor PE32+"),
            Error::BadOptionalHeader => write!(f, "could not read optional header"),
            Error::BadString(e) => write!(f, "invalid UTF-8 string: {e}"),
            Error::DirectoryDoesNotExist => write!(f, "requested data directory does not exist"),
            Error::IncorrectAddressConversion => write!(f, "address conversion out of representable range"),
            Error::AddressOutOfSection => write!(f, "address does not fall within any section"),
            Error::IncorrectImportDirectory => write!(f, "import directory is malformed"),
            Error::IncorrectTlsDirectory => write!(f, "TLS directory is malformed"),
            Error::IncorrectConfigDirectory => write!(f, "load configuration directory is malformed"),
            Error::SectionNotAttached => write!(f, "operation requires at least one section"),
            Error::InsufficientSpace => write!(f, "not enough space to rebuild this directory"),
        }
    }
}

impl std::error::Error for Error {}
