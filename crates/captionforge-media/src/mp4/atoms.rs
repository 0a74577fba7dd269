//! MP4 atom definitions.

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const SIDX: Self = Self(*b"sidx");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether atoms of this type hold child atoms we descend into.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV
                | Self::TRAK
                | Self::MDIA
                | Self::MINF
                | Self::STBL
                | Self::MVEX
                | Self::MOOF
                | Self::TRAF
        )
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header, positioned inside an in-memory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Offset of the atom header within the buffer.
    pub offset: usize,
    /// Atom size including header.
    pub size: usize,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Offset where the atom data starts (after the header).
    pub fn data_offset(&self) -> usize {
        self.offset + self.header_size as usize
    }

    /// Offset one past the last byte of the atom.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Text,
    Subtitle,
    ClosedCaption,
    Meta,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"text" => Self::Text,
            b"subt" => Self::Subtitle,
            b"clcp" => Self::ClosedCaption,
            b"meta" => Self::Meta,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    /// Whether the track carries timed text samples.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text | Self::Subtitle | Self::ClosedCaption)
    }
}
