//! Operations (C4): list, extract, insert, delete, fsck, erase.
//!
//! Each operation is built only out of [`crate::scanner::Scanner`],
//! [`crate::header`], [`crate::checksum`], and a [`BackingStore`]. None of
//! them touch a terminal, a confirmation prompt, or a concrete device --
//! those stay in the CLI binary, which calls these and renders/collects
//! whatever a human needs.

use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::checksum::calc_chk16;
use crate::error::{
    IllegalBitTransitionSnafu, NoSpaceSnafu, Result, TailCorruptSnafu,
};
use crate::header::{
    self, CLASS_A_DELETED, CLASS_A_FLAG1_DEFAULT, CLASS_A_SIZE, CLASS_B_SIZE, ClassAHeader,
    ClassBHeader, FLAG_B_DELETED, FLAG_B_HASDATE, Header,
};
use crate::scanner::{Scanner, Termination};
use crate::store::BackingStore;
use snafu::prelude::*;

/// Which header class a new slot should be written as.
///
/// `spec.md` §4.4.3 pins Class B as the default and has new inserts inherit
/// whatever class an existing live slot already uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderClass {
    A,
    B,
}

impl From<&Header> for HeaderClass {
    fn from(header: &Header) -> Self {
        match header {
            Header::A(_) => Self::A,
            Header::B(_) => Self::B,
        }
    }
}

/// Builds a glob matcher set from raw patterns, for `list`/`extract`/`delete`
/// name filters.
///
/// # Errors
/// Returns [`Error::Corrupt`](crate::error::Error::Corrupt) wrapping the
/// underlying glob parse failure if a pattern is malformed. `Corrupt` is
/// reused here rather than adding a one-off variant, since both describe
/// input this crate cannot make sense of.
fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| crate::error::Error::Corrupt {
                offset: 0,
                reason: format!("invalid glob pattern {p:?}: {e}"),
            })
        })
        .collect()
}

fn name_matches(name: &str, patterns: &[Pattern]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| p.matches(name))
}

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub offset: u64,
    pub header: Header,
    /// Whether the slot's payload checksum mismatched the stored one.
    ///
    /// Only meaningful for Class B, which is the only class carrying a
    /// checksum; always `false` for Class A.
    pub bad_chksum: bool,
}

/// Lists slots whose name matches every pattern in `patterns` (an empty set
/// matches everything), halting at the end-of-filesystem sentinel.
///
/// # Errors
/// Propagates any scan or read error. A checksum mismatch does not stop the
/// listing; it is reported via [`ListEntry::bad_chksum`] instead.
pub fn list<S: BackingStore + ?Sized>(store: &S, patterns: &[String]) -> Result<Vec<ListEntry>> {
    let patterns = compile_patterns(patterns)?;
    let mut entries = Vec::new();

    let scanner = Scanner::new(store)?;
    for slot in scanner {
        let slot = slot?;
        if !name_matches(slot.header.name(), &patterns) {
            continue;
        }

        let mut payload = vec![0u8; slot.payload_len as usize];
        store.read(slot.payload_offset, &mut payload)?;
        let computed = calc_chk16(&payload);

        let bad_chksum = match &slot.header {
            Header::B(h) => h.chksum != computed,
            Header::A(_) => false,
        };

        entries.push(ListEntry { offset: slot.offset, header: slot.header, bad_chksum });
    }

    Ok(entries)
}

/// What to do when `extract` would overwrite an existing host file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExists {
    Overwrite,
    Skip,
    Fail,
}

/// Outcome of extracting a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The payload was written to this host path.
    Written(PathBuf),
    /// A host file already existed there and [`OnExists::Skip`] was in effect.
    Skipped(PathBuf),
}

/// Extracts every slot matching `patterns` into `dest_dir`, naming each
/// output file after the slot's on-flash name.
///
/// # Errors
/// Propagates scan/read errors, and any host filesystem error. Under
/// [`OnExists::Fail`], also errors (`ErrorKind::AlreadyExists`) if the
/// destination file already exists.
pub fn extract<S: BackingStore + ?Sized>(
    store: &S,
    patterns: &[String],
    dest_dir: &Path,
    on_exists: OnExists,
) -> Result<Vec<ExtractOutcome>> {
    let patterns = compile_patterns(patterns)?;
    let mut outcomes = Vec::new();

    let scanner = Scanner::new(store)?;
    for slot in scanner {
        let slot = slot?;
        if slot.header.deleted() || !name_matches(slot.header.name(), &patterns) {
            continue;
        }

        let dest = dest_dir.join(OsStr::from_bytes(slot.header.name().as_bytes()));

        if dest.exists() {
            match on_exists {
                OnExists::Skip => {
                    outcomes.push(ExtractOutcome::Skipped(dest));
                    continue;
                }
                OnExists::Fail => {
                    return Err(std::io::Error::from(std::io::ErrorKind::AlreadyExists).into());
                }
                OnExists::Overwrite => {}
            }
        }

        let mut payload = vec![0u8; slot.payload_len as usize];
        store.read(slot.payload_offset, &mut payload)?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .mode(0o600)
            .open(&dest)?;
        std::io::Write::write_all(&mut file, &payload)?;

        outcomes.push(ExtractOutcome::Written(dest));
    }

    Ok(outcomes)
}

/// Scans to the append tail, and remembers the class of the first
/// non-deleted slot seen along the way (if any).
fn locate_append_tail<S: BackingStore + ?Sized>(
    store: &S,
) -> Result<(u64, Option<HeaderClass>)> {
    let mut inherited = None;
    let mut scanner = Scanner::new(store)?;

    for slot in &mut scanner {
        let slot = slot?;
        if inherited.is_none() && !slot.header.deleted() {
            inherited = Some(HeaderClass::from(&slot.header));
        }
    }

    let tail = match scanner.termination() {
        Some(Termination::Sentinel(offset) | Termination::Eod(offset)) => offset,
        None => unreachable!("scanner always terminates once exhausted"),
    };
    Ok((tail, inherited))
}

fn build_header(class: HeaderClass, name: &str, length: u32, chksum: u16, date: u32, offset: u64) -> Header {
    match class {
        HeaderClass::B => Header::B(ClassBHeader {
            length,
            chksum,
            flags: 0xFFFF & !FLAG_B_HASDATE,
            date,
            name: truncate_name(name, 47),
        }),
        HeaderClass::A => Header::A(ClassAHeader {
            filenum: 1,
            name: truncate_name(name, 63),
            length,
            seek: offset + CLASS_A_SIZE as u64,
            crc: 0,
            r#type: 1,
            date,
            unk: 0,
            flag1: CLASS_A_FLAG1_DEFAULT,
            flag2: 0xFFFF_FFFF,
        }),
    }
}

fn truncate_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let mut end = max_len;
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

fn header_size(class: HeaderClass) -> u64 {
    match class {
        HeaderClass::A => CLASS_A_SIZE as u64,
        HeaderClass::B => CLASS_B_SIZE as u64,
    }
}

/// Appends a new slot for `payload`, named `name`, at the current append
/// tail, inheriting the device's existing header class (Class B on a blank
/// device). `date` is the slot's stamped creation time, seconds since the
/// Unix epoch.
///
/// The payload is written before the header so a crash mid-append leaves no
/// header claiming a payload that was never fully committed; a subsequent
/// `fsck` can only ever find unclaimed garbage past the real tail, never a
/// header pointing at garbage.
///
/// # Errors
/// Returns [`Error::NoSpace`](crate::error::Error::NoSpace) if the payload
/// and header do not fit in the remaining tail. Propagates scan/write errors.
pub fn insert<S: BackingStore + ?Sized>(
    store: &S,
    name: &str,
    payload: &[u8],
    date: u32,
) -> Result<u64> {
    let (tail, inherited) = locate_append_tail(store)?;
    let class = inherited.unwrap_or(HeaderClass::B);
    let needed = header_size(class) + payload.len() as u64;
    let size = store.size()?;
    let available = size.saturating_sub(tail);

    ensure!(needed <= available, NoSpaceSnafu { needed, available });

    let chksum = calc_chk16(payload);
    let header = build_header(class, name, payload.len() as u32, chksum, date, tail);
    let encoded = header::encode(&header);

    store.write(tail + encoded.len() as u64, payload)?;
    store.write(tail, &encoded)?;

    Ok(tail)
}

/// Clears the deleted bit(s) for every live slot matching `patterns`.
///
/// Idempotent: re-deleting an already-deleted slot is a no-op, since the
/// bits it would clear are already clear.
///
/// # Errors
/// Returns [`Error::IllegalBitTransition`](crate::error::Error::IllegalBitTransition)
/// if the computed new value would set any bit the stored value had clear
/// (a `0 -> 1` transition, which no real flash medium can perform without a
/// full erase). Propagates scan/read/write errors.
pub fn delete<S: BackingStore + ?Sized>(store: &S, patterns: &[String]) -> Result<usize> {
    let patterns = compile_patterns(patterns)?;
    let mut count = 0;

    let scanner = Scanner::new(store)?;
    for slot in scanner {
        let slot = slot?;
        if !name_matches(slot.header.name(), &patterns) {
            continue;
        }

        match &slot.header {
            Header::B(h) => {
                let old = h.flags;
                let new = old & !FLAG_B_DELETED;
                if new == old {
                    continue; // already deleted
                }
                ensure!(
                    new & !old == 0,
                    IllegalBitTransitionSnafu { offset: slot.offset + 10 }
                );
                store.write(slot.offset + 10, &new.to_be_bytes())?;
                count += 1;
            }
            Header::A(_) => {
                let offset = slot.offset + 100;
                let mut old_bytes = [0u8; 4];
                store.read(offset, &mut old_bytes)?;
                let old = u32::from_be_bytes(old_bytes);
                let new = CLASS_A_DELETED;
                if new == old {
                    continue;
                }
                ensure!(new & !old == 0, IllegalBitTransitionSnafu { offset });
                store.write(offset, &new.to_be_bytes())?;
                count += 1;
            }
        }
    }

    Ok(count)
}

/// One file's checksum verdict in an [`FsckReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckEntry {
    pub name: String,
    pub chksum_ok: bool,
}

/// The structured result of [`fsck`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckReport {
    pub per_file: Vec<FsckEntry>,
    pub free_bytes: u64,
    pub tail_ok: bool,
    /// First offset past the sentinel found not to be `0xFF`, if any.
    pub tail_bad_at: Option<u64>,
}

const TAIL_CHECK_CHUNK: usize = 16 << 10;

/// Walks every slot verifying payload checksums, then verifies the free
/// tail from the sentinel to the end of the device is entirely `0xFF`.
///
/// Unlike `list`, a checksum mismatch does not stop the walk: every problem
/// found is collected into the returned report rather than short-circuiting
/// on the first one. A scan error (bad magic, truncated header) does still
/// abort immediately, since at that point there is no tail to locate.
///
/// # Errors
/// Propagates scan/read errors encountered while walking live slots.
pub fn fsck<S: BackingStore + ?Sized>(store: &S) -> Result<FsckReport> {
    let mut per_file = Vec::new();

    let mut scanner = Scanner::new(store)?;
    for slot in &mut scanner {
        let slot = slot?;
        let mut payload = vec![0u8; slot.payload_len as usize];
        store.read(slot.payload_offset, &mut payload)?;
        let computed = calc_chk16(&payload);

        if let Header::B(h) = &slot.header {
            per_file.push(FsckEntry { name: h.name.clone(), chksum_ok: h.chksum == computed });
        }
    }

    let size = store.size()?;
    let tail_start = match scanner.termination() {
        Some(Termination::Sentinel(offset) | Termination::Eod(offset)) => offset,
        None => unreachable!("scanner always terminates once exhausted"),
    };

    let mut to_check = size.saturating_sub(tail_start);
    let free_bytes = to_check;
    let mut pos = tail_start;
    let mut tail_bad_at = None;
    let mut buf = vec![0u8; TAIL_CHECK_CHUNK];

    while to_check > 0 && tail_bad_at.is_none() {
        let chunk = to_check.min(TAIL_CHECK_CHUNK as u64) as usize;
        store.read(pos, &mut buf[..chunk])?;
        if let Some(bad) = buf[..chunk].iter().position(|&b| b != 0xFF) {
            tail_bad_at = Some(pos + bad as u64);
        }
        pos += chunk as u64;
        to_check -= chunk as u64;
    }

    Ok(FsckReport { per_file, free_bytes, tail_ok: tail_bad_at.is_none(), tail_bad_at })
}

/// Confirms the tail-blank invariant [`fsck`] checks, returning the same
/// [`Error::TailCorrupt`](crate::error::Error::TailCorrupt) the taxonomy
/// promises when a caller wants a hard error rather than a report field.
pub fn ensure_tail_blank<S: BackingStore + ?Sized>(store: &S) -> Result<()> {
    let report = fsck(store)?;
    if let Some(offset) = report.tail_bad_at {
        return TailCorruptSnafu { offset }.fail();
    }
    Ok(())
}

/// Erases every erase block on `store`, from offset 0, calling `progress`
/// with `(block_index, block_count)` after each one completes.
///
/// # Errors
/// Propagates any error from querying geometry or erasing a block.
pub fn erase<S: BackingStore + ?Sized>(
    store: &S,
    mut progress: impl FnMut(u32, u32),
) -> Result<()> {
    let geometry = store.geometry()?;
    let blocks = (geometry.size / u64::from(geometry.erase_block_size)) as u32;

    for i in 0..blocks {
        store.erase_block(u64::from(i) * u64::from(geometry.erase_block_size))?;
        progress(i + 1, blocks);
    }

    Ok(())
}
