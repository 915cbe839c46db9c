//! Sequential scan (C3) over a backing store's log-structured region.
//!
//! [`Scanner`] walks a [`BackingStore`] from offset 0, yielding one [`Slot`]
//! per live header until it hits the end-of-filesystem sentinel, runs off
//! the end of the device, or trips over bytes it cannot decode. It never
//! reads payload bytes itself -- callers that need a slot's payload issue a
//! separate positioned read through the same store.

use crate::error::{CorruptSnafu, Error, Result};
use crate::header::{self, CLASS_A_SIZE, CLASS_B_SIZE, Header, MAGIC_CLASS_A, MAGIC_CLASS_B};
use crate::store::BackingStore;

/// The end-of-filesystem sentinel: a fully erased 32-bit word.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// One decoded header plus the byte range of its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Offset of the header's first byte, always 4-byte aligned.
    pub offset: u64,
    /// The decoded header.
    pub header: Header,
    /// Offset of the first payload byte (`offset + header.header_size()`).
    pub payload_offset: u64,
    /// Length of the payload in bytes (`header.length()`).
    pub payload_len: u64,
}

/// How a [`Scanner`] stopped producing slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The scan found the `0xFFFFFFFF` end-of-filesystem sentinel at this offset.
    Sentinel(u64),
    /// The scan ran off the end of the device before finding a sentinel.
    Eod(u64),
}

/// Walks a [`BackingStore`] from offset 0, yielding [`Slot`]s in order.
///
/// Restartable only from the beginning: construct a new `Scanner` to scan
/// again. Holds no state shared with [`crate::ops`] beyond its own cursor.
pub struct Scanner<'s, S: ?Sized> {
    store: &'s S,
    pos: u64,
    size: u64,
    termination: Option<Termination>,
}

impl<'s, S: BackingStore + ?Sized> Scanner<'s, S> {
    /// Creates a scanner positioned at the start of `store`.
    ///
    /// # Errors
    /// Propagates any error from querying the store's size.
    pub fn new(store: &'s S) -> Result<Self> {
        let size = store.size()?;
        Ok(Self { store, pos: 0, size, termination: None })
    }

    /// How the scan stopped, once it has. `None` while slots remain.
    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// The offset the scan has reached so far.
    ///
    /// Once exhausted, this is the append tail when [`Termination::Sentinel`]
    /// was reached, or the device size when it ran off the end.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<'s, S: BackingStore + ?Sized> Iterator for Scanner<'s, S> {
    type Item = Result<Slot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.termination.is_some() {
            return None;
        }

        debug_assert_eq!(self.pos % 4, 0, "scanner cursor must stay 4-byte aligned");
        let offset = self.pos;

        if offset + 4 > self.size {
            self.termination = Some(Termination::Eod(offset));
            return None;
        }

        let mut word = [0u8; 4];
        if let Err(e) = self.store.read(offset, &mut word) {
            self.termination = Some(Termination::Eod(offset));
            return Some(Err(e));
        }

        if word == SENTINEL.to_be_bytes() {
            self.termination = Some(Termination::Sentinel(offset));
            return None;
        }

        let magic = u32::from_be_bytes(word);
        let header_size = match magic {
            MAGIC_CLASS_B => CLASS_B_SIZE,
            MAGIC_CLASS_A => CLASS_A_SIZE,
            _ => {
                self.termination = Some(Termination::Eod(offset));
                return Some(
                    CorruptSnafu { offset, reason: format!("unrecognized magic 0x{magic:08X}") }
                        .fail(),
                );
            }
        };

        if offset + header_size as u64 > self.size {
            self.termination = Some(Termination::Eod(offset));
            return Some(Err(Error::Short { offset }));
        }

        let mut buf = vec![0u8; header_size];
        if let Err(e) = self.store.read(offset, &mut buf) {
            self.termination = Some(Termination::Eod(offset));
            return Some(Err(e));
        }

        let header = match header::decode(&buf, offset) {
            Ok(h) => h,
            Err(e) => {
                self.termination = Some(Termination::Eod(offset));
                return Some(Err(e));
            }
        };

        let payload_offset = offset + header_size as u64;
        let payload_len = u64::from(header.length());
        self.pos = (payload_offset + payload_len + 3) & !3;

        Some(Ok(Slot { offset, header, payload_offset, payload_len }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ClassBHeader, MAGIC_CLASS_B};
    use crate::store::MemStore;

    fn write_class_b(store: &MemStore, offset: u64, name: &str, payload: &[u8]) {
        let header = Header::B(ClassBHeader {
            length: payload.len() as u32,
            chksum: crate::checksum::calc_chk16(payload),
            flags: 0xFFFD,
            date: 1_700_000_000,
            name: name.into(),
        });
        let bytes = header::encode(&header);
        store.write(offset, &bytes).unwrap();
        store.write(offset + bytes.len() as u64, payload).unwrap();
    }

    #[test]
    fn empty_device_yields_no_slots() {
        let store = MemStore::new(64 * 1024, 4096);
        let mut scanner = Scanner::new(&store).unwrap();
        assert!(scanner.next().is_none());
        assert_eq!(scanner.termination(), Some(Termination::Sentinel(0)));
    }

    #[test]
    fn two_files_scan_in_order() {
        let store = MemStore::new(4096, 4096);
        write_class_b(&store, 0, "one", b"hi");
        write_class_b(&store, 72, "two", b"abc");

        let mut scanner = Scanner::new(&store).unwrap();
        let first = scanner.next().unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(first.payload_offset, 64);
        assert_eq!(first.payload_len, 2);

        let second = scanner.next().unwrap().unwrap();
        assert_eq!(second.offset, 72);
        assert_eq!(second.payload_offset, 136);
        assert_eq!(second.payload_len, 3);

        assert!(scanner.next().is_none());
        assert_eq!(scanner.termination(), Some(Termination::Sentinel(140)));
    }

    #[test]
    fn bad_magic_mid_scan_is_corrupt() {
        let store = MemStore::new(128, 4096);
        store.write(0, &0xDEAD_BEEFu32.to_be_bytes()).unwrap();
        let mut scanner = Scanner::new(&store).unwrap();
        let err = scanner.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Corrupt { offset: 0, .. }));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn device_filled_to_last_byte_ends_at_eod() {
        // A single file whose payload runs to the very last byte of the device;
        // no room remains for a sentinel word.
        let store = MemStore::new(68, 4096);
        write_class_b(&store, 0, "full", b"ab"); // 64 + 2 = 66, leaves 2 trailing bytes (< 4)
        let mut scanner = Scanner::new(&store).unwrap();
        let slot = scanner.next().unwrap().unwrap();
        assert_eq!(slot.payload_len, 2);
        assert!(scanner.next().is_none());
        assert!(matches!(scanner.termination(), Some(Termination::Eod(_))));
    }

    #[test]
    fn scan_matches_class_b_magic_constant() {
        assert_eq!(MAGIC_CLASS_B, 0xBAD0_0B1E);
    }
}
