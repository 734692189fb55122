use std::fmt;

/// Column types, as recorded by the storage engine's catalog.
///
/// Codes 14 and 15 are absent from older engine documentation and their
/// meaning varies between versions (see [`crate::exec::decode`] for how each
/// one is interpreted). Codes outside of the known range are preserved as
/// [`ColumnType::Unknown`] so they can be reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Nil,
    Bit,
    UnsignedByte,
    Short,
    Long,
    Currency,
    IeeeSingle,
    IeeeDouble,
    DateTime,
    Binary,
    Text,
    LongBinary,
    LongText,
    Slv,
    /// Code 14.
    UnsignedLong,
    /// Code 15.
    LongLong,
    Guid,
    UnsignedShort,
    Unknown(u32),
}

impl ColumnType {
    /// Builds the column type from its on-disk code.
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => ColumnType::Nil,
            1 => ColumnType::Bit,
            2 => ColumnType::UnsignedByte,
            3 => ColumnType::Short,
            4 => ColumnType::Long,
            5 => ColumnType::Currency,
            6 => ColumnType::IeeeSingle,
            7 => ColumnType::IeeeDouble,
            8 => ColumnType::DateTime,
            9 => ColumnType::Binary,
            10 => ColumnType::Text,
            11 => ColumnType::LongBinary,
            12 => ColumnType::LongText,
            13 => ColumnType::Slv,
            14 => ColumnType::UnsignedLong,
            15 => ColumnType::LongLong,
            16 => ColumnType::Guid,
            17 => ColumnType::UnsignedShort,
            other => ColumnType::Unknown(other),
        }
    }

    /// Returns the on-disk code.
    pub const fn code(self) -> u32 {
        match self {
            ColumnType::Nil => 0,
            ColumnType::Bit => 1,
            ColumnType::UnsignedByte => 2,
            ColumnType::Short => 3,
            ColumnType::Long => 4,
            ColumnType::Currency => 5,
            ColumnType::IeeeSingle => 6,
            ColumnType::IeeeDouble => 7,
            ColumnType::DateTime => 8,
            ColumnType::Binary => 9,
            ColumnType::Text => 10,
            ColumnType::LongBinary => 11,
            ColumnType::LongText => 12,
            ColumnType::Slv => 13,
            ColumnType::UnsignedLong => 14,
            ColumnType::LongLong => 15,
            ColumnType::Guid => 16,
            ColumnType::UnsignedShort => 17,
            ColumnType::Unknown(code) => code,
        }
    }

    /// Returns the canonical type name.
    pub const fn name(self) -> &'static str {
        match self {
            ColumnType::Nil => "nil",
            ColumnType::Bit => "bit",
            ColumnType::UnsignedByte => "unsigned_byte",
            ColumnType::Short => "short",
            ColumnType::Long => "long",
            ColumnType::Currency => "currency",
            ColumnType::IeeeSingle => "ieee_single",
            ColumnType::IeeeDouble => "ieee_double",
            ColumnType::DateTime => "date_time",
            ColumnType::Binary => "binary",
            ColumnType::Text => "text",
            ColumnType::LongBinary => "long_binary",
            ColumnType::LongText => "long_text",
            ColumnType::Slv => "slv",
            ColumnType::UnsignedLong => "unsigned_long",
            ColumnType::LongLong => "long_long",
            ColumnType::Guid => "guid",
            ColumnType::UnsignedShort => "unsigned_short",
            ColumnType::Unknown(_) => "unknown",
        }
    }

    /// Whether values of this type are fetched as text.
    pub const fn is_textual(self) -> bool {
        matches!(
            self,
            ColumnType::Currency
                | ColumnType::Binary
                | ColumnType::Text
                | ColumnType::LongBinary
                | ColumnType::LongText
        )
    }

    /// Whether values of this type hold opaque binary data.
    pub const fn is_binary(self) -> bool {
        matches!(self, ColumnType::Binary | ColumnType::LongBinary)
    }
}

impl From<u32> for ColumnType {
    fn from(code: u32) -> Self {
        ColumnType::from_code(code)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Unknown(code) => write!(f, "unknown({code})"),
            known => f.write_str(known.name()),
        }
    }
}

impl serde::Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
