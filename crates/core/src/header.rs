//! Typed codec (C2) for the two on-flash header layouts.
//!
//! A [`Header`] is a sum type over the two classes the medium can hold,
//! with shared accessors so [`crate::scanner`] and [`crate::ops`] rarely
//! need to match on the variant themselves. All field offsets and
//! endianness live here; nobody else does pointer arithmetic.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use crate::data::{DataCursor, DataCursorTrait, Endian, EndianRead, EndianWrite};
use crate::error::{BadMagicSnafu, Error, Result, ShortSnafu};

/// Magic discriminator for a [`ClassBHeader`], `0xBAD00B1E`.
pub const MAGIC_CLASS_B: u32 = 0xBAD0_0B1E;
/// Magic discriminator for a [`ClassAHeader`], `0x07158805`.
pub const MAGIC_CLASS_A: u32 = 0x0715_8805;

/// On-disk size in bytes of a Class B header.
pub const CLASS_B_SIZE: usize = 64;
/// On-disk size in bytes of a Class A header.
pub const CLASS_A_SIZE: usize = 128;

const CLASS_B_NAME_LEN: usize = 48;
const CLASS_A_NAME_LEN: usize = 64;

/// Bit 0 of [`ClassBHeader::flags`]: clear means the slot is deleted.
pub const FLAG_B_DELETED: u16 = 0x0001;
/// Bit 1 of [`ClassBHeader::flags`]: clear means a `date` is present.
pub const FLAG_B_HASDATE: u16 = 0x0002;

/// Value of [`ClassAHeader::flag2`] that marks a slot deleted.
pub const CLASS_A_DELETED: u32 = 0xFFFE_FFFF;
/// Nominal value of [`ClassAHeader::flag1`] on a freshly written slot.
pub const CLASS_A_FLAG1_DEFAULT: u32 = 0xFFFF_FFF8;

bitflags::bitflags! {
    /// Raw bits of [`ClassBHeader::flags`], for display purposes.
    ///
    /// These mirror the on-flash bits directly, not their meaning: per the
    /// clear-to-assert convention, `DELETED` set means the slot is *not*
    /// deleted, and `HASDATE` set means no date is present. Prefer
    /// [`Header::deleted`] to interpret a slot's state; this type exists so
    /// a caller formatting raw flags (as `cffs dir` does) doesn't hand-roll
    /// bit tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassBFlags: u16 {
        const DELETED = FLAG_B_DELETED;
        const HASDATE = FLAG_B_HASDATE;
    }
}

/// The "Class B" header layout, 64 bytes, magic `0xBAD00B1E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBHeader {
    pub length: u32,
    pub chksum: u16,
    pub flags: u16,
    pub date: u32,
    pub name: String,
}

/// The "Class A" header layout, 128 bytes, magic `0x07158805`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAHeader {
    pub filenum: u32,
    pub name: String,
    pub length: u32,
    pub seek: u32,
    pub crc: u32,
    pub r#type: u32,
    pub date: u32,
    pub unk: u32,
    pub flag1: u32,
    pub flag2: u32,
}

/// Either on-flash header layout, with accessors common to both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    B(ClassBHeader),
    A(ClassAHeader),
}

impl Header {
    /// Fixed on-disk size of this header's class.
    #[must_use]
    pub fn header_size(&self) -> usize {
        match self {
            Self::B(_) => CLASS_B_SIZE,
            Self::A(_) => CLASS_A_SIZE,
        }
    }

    /// The slot's filename.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::B(h) => &h.name,
            Self::A(h) => &h.name,
        }
    }

    /// Length in bytes of the payload following this header.
    #[must_use]
    pub fn length(&self) -> u32 {
        match self {
            Self::B(h) => h.length,
            Self::A(h) => h.length,
        }
    }

    /// Whether this slot has been logically deleted.
    #[must_use]
    pub fn deleted(&self) -> bool {
        match self {
            Self::B(h) => h.flags & FLAG_B_DELETED == 0,
            Self::A(h) => h.flag2 == CLASS_A_DELETED,
        }
    }

    /// The slot's stored date, seconds since the Unix epoch, if present.
    #[must_use]
    pub fn date(&self) -> u32 {
        match self {
            Self::B(h) => h.date,
            Self::A(h) => h.date,
        }
    }
}

/// Decodes a header at the start of `bytes`.
///
/// Reads the 4-byte magic first to pick a class, then the remainder of that
/// class's fixed-size record.
///
/// # Errors
/// Returns [`Error::Short`] if fewer bytes than the class requires were
/// given, or [`Error::BadMagic`] if the first word matches neither class.
pub fn decode(bytes: &[u8], offset: u64) -> Result<Header> {
    if bytes.len() < 4 {
        return ShortSnafu { offset }.fail();
    }
    let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    match magic {
        MAGIC_CLASS_B => decode_class_b(bytes, offset).map(Header::B),
        MAGIC_CLASS_A => decode_class_a(bytes, offset).map(Header::A),
        word => BadMagicSnafu { offset, word }.fail(),
    }
}

fn read_name(cursor: &mut DataCursor, capacity: usize, offset: u64) -> Result<String> {
    let raw = cursor.get_slice(capacity).map_err(|_| Error::Short { offset })?;
    let nul = raw.iter().position(|&b| b == 0).unwrap_or(capacity - 1);
    Ok(String::from_utf8_lossy(&raw[..nul]).into_owned())
}

fn decode_class_b(bytes: &[u8], offset: u64) -> Result<ClassBHeader> {
    if bytes.len() < CLASS_B_SIZE {
        return ShortSnafu { offset }.fail();
    }
    let mut cursor = DataCursor::new(bytes[..CLASS_B_SIZE].to_vec(), Endian::Big);
    cursor.set_position(4);

    let length = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let chksum = cursor.read_u16().map_err(|_| Error::Short { offset })?;
    let flags = cursor.read_u16().map_err(|_| Error::Short { offset })?;
    let date = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let name = read_name(&mut cursor, CLASS_B_NAME_LEN, offset)?;

    Ok(ClassBHeader { length, chksum, flags, date, name })
}

fn decode_class_a(bytes: &[u8], offset: u64) -> Result<ClassAHeader> {
    if bytes.len() < CLASS_A_SIZE {
        return ShortSnafu { offset }.fail();
    }
    let mut cursor = DataCursor::new(bytes[..CLASS_A_SIZE].to_vec(), Endian::Big);
    cursor.set_position(4);

    let filenum = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let name = read_name(&mut cursor, CLASS_A_NAME_LEN, offset)?;
    let length = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let seek = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let crc = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let r#type = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let date = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let unk = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let flag1 = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    let flag2 = cursor.read_u32().map_err(|_| Error::Short { offset })?;
    // 24 bytes of reserved zero padding follow; not retained.

    Ok(ClassAHeader { filenum, name, length, seek, crc, r#type, date, unk, flag1, flag2 })
}

/// Encodes `header` into a freshly allocated, zero-filled buffer of exactly
/// its class's fixed size.
///
/// Filenames longer than the class's capacity are truncated; the buffer is
/// always NUL-padded and the final name byte is forced to NUL.
#[must_use]
pub fn encode(header: &Header) -> Box<[u8]> {
    match header {
        Header::B(h) => encode_class_b(h),
        Header::A(h) => encode_class_a(h),
    }
}

fn write_name(cursor: &mut DataCursor, name: &str, capacity: usize) {
    let bytes = name.as_bytes();
    let copy_len = bytes.len().min(capacity - 1);
    cursor
        .write_slice(&bytes[..copy_len])
        .expect("name fits within header capacity");
    let pad = capacity - copy_len;
    cursor
        .write_slice(&vec![0u8; pad])
        .expect("padding fits within header capacity");
}

fn encode_class_b(h: &ClassBHeader) -> Box<[u8]> {
    let mut cursor = DataCursor::zeroed(CLASS_B_SIZE, Endian::Big);
    cursor.write_u32(MAGIC_CLASS_B).expect("header buffer is large enough");
    cursor.write_u32(h.length).expect("header buffer is large enough");
    cursor.write_u16(h.chksum).expect("header buffer is large enough");
    cursor.write_u16(h.flags).expect("header buffer is large enough");
    cursor.write_u32(h.date).expect("header buffer is large enough");
    write_name(&mut cursor, &h.name, CLASS_B_NAME_LEN);
    cursor.into_inner()
}

fn encode_class_a(h: &ClassAHeader) -> Box<[u8]> {
    let mut cursor = DataCursor::zeroed(CLASS_A_SIZE, Endian::Big);
    cursor.write_u32(MAGIC_CLASS_A).expect("header buffer is large enough");
    cursor.write_u32(h.filenum).expect("header buffer is large enough");
    write_name(&mut cursor, &h.name, CLASS_A_NAME_LEN);
    cursor.write_u32(h.length).expect("header buffer is large enough");
    cursor.write_u32(h.seek).expect("header buffer is large enough");
    cursor.write_u32(h.crc).expect("header buffer is large enough");
    cursor.write_u32(h.r#type).expect("header buffer is large enough");
    cursor.write_u32(h.date).expect("header buffer is large enough");
    cursor.write_u32(h.unk).expect("header buffer is large enough");
    cursor.write_u32(h.flag1).expect("header buffer is large enough");
    cursor.write_u32(h.flag2).expect("header buffer is large enough");
    // Remaining 24 bytes stay zeroed.
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_b_roundtrips() {
        let h = Header::B(ClassBHeader {
            length: 2,
            chksum: 0x6768,
            flags: 0xFFFD,
            date: 1_700_000_000,
            name: "hello".into(),
        });
        let bytes = encode(&h);
        assert_eq!(bytes.len(), CLASS_B_SIZE);
        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn class_a_roundtrips() {
        let h = Header::A(ClassAHeader {
            filenum: 1,
            name: "config".into(),
            length: 10,
            seek: 138,
            crc: 0,
            r#type: 1,
            date: 1_700_000_000,
            unk: 0,
            flag1: CLASS_A_FLAG1_DEFAULT,
            flag2: 0xFFFF_FFFF,
        });
        let bytes = encode(&h);
        assert_eq!(bytes.len(), CLASS_A_SIZE);
        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn unknown_magic_is_bad_magic() {
        let mut bytes = vec![0u8; CLASS_B_SIZE];
        bytes[..4].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let err = decode(&bytes, 16).unwrap_err();
        assert!(matches!(err, Error::BadMagic { offset: 16, word: 0xDEAD_BEEF }));
    }

    #[test]
    fn truncated_header_is_short() {
        let bytes = MAGIC_CLASS_B.to_be_bytes();
        let err = decode(&bytes, 32).unwrap_err();
        assert!(matches!(err, Error::Short { offset: 32 }));
    }

    #[test]
    fn deleted_accessors() {
        let live = Header::B(ClassBHeader {
            length: 0,
            chksum: 0xFFFF,
            flags: 0xFFFD,
            date: 0,
            name: "f".into(),
        });
        assert!(!live.deleted());
        let dead = Header::B(ClassBHeader { flags: 0xFFFC, ..match live {
            Header::B(h) => h,
            Header::A(_) => unreachable!(),
        } });
        assert!(Header::B(dead).deleted());

        let a_live = Header::A(ClassAHeader {
            filenum: 0,
            name: "f".into(),
            length: 0,
            seek: 0,
            crc: 0,
            r#type: 1,
            date: 0,
            unk: 0,
            flag1: CLASS_A_FLAG1_DEFAULT,
            flag2: 0xFFFF_FFFF,
        });
        assert!(!a_live.deleted());
    }
}
