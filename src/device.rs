//! A [`BackingStore`] over a real MTD character device (or a plain file,
//! for testing against a captured image).
//!
//! `spec.md` §1 treats the flash device as an external collaborator: the
//! engine only sees a byte-addressable, seekable store that additionally
//! answers `geometry()` and `erase_block(offset)`. This is that collaborator
//! for the CLI binary; `cffs-core` never links against `libc` or knows an
//! ioctl number.
//!
//! Geometry and erase both go through the same `MEMGETINFO`/`MEMERASE`
//! ioctls `tools/cffs.c` uses directly against `/dev/mtd/N`; against a plain
//! regular file (useful for tests or working from a dumped image) these
//! ioctls fail and we fall back to the file's length with a 64KiB nominal
//! erase-block size.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use cffs_core::store::{BackingStore, Geometry};

const MTD_CHAR_MAJOR_IOCTL_TYPE: u8 = b'M';

// Linux ioctl encoding, mirroring <asm-generic/ioctl.h>'s _IOR/_IOW macros.
const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> libc::c_ulong {
    const IOC_NRBITS: u32 = 8;
    const IOC_TYPEBITS: u32 = 8;
    const IOC_SIZEBITS: u32 = 14;
    const IOC_DIRSHIFT: u32 = IOC_NRBITS + IOC_TYPEBITS + IOC_SIZEBITS;
    const IOC_TYPESHIFT: u32 = IOC_NRBITS;
    const IOC_SIZESHIFT: u32 = IOC_NRBITS + IOC_TYPEBITS;

    ((dir << IOC_DIRSHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRBITS)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const IOC_READ: u32 = 2;
const IOC_WRITE: u32 = 1;

/// `struct mtd_info_user` from `<mtd/mtd-abi.h>`.
#[repr(C)]
#[derive(Debug, Default)]
#[allow(dead_code)]
struct MtdInfoUser {
    kind: u8,
    flags: u32,
    size: u32,
    erasesize: u32,
    writesize: u32,
    oobsize: u32,
    padding: u64,
}

/// `struct erase_info_user` from `<mtd/mtd-abi.h>`.
#[repr(C)]
struct EraseInfoUser {
    start: u32,
    length: u32,
}

fn memgetinfo() -> libc::c_ulong {
    ioc(IOC_READ, MTD_CHAR_MAJOR_IOCTL_TYPE, 1, std::mem::size_of::<MtdInfoUser>())
}

fn memerase() -> libc::c_ulong {
    ioc(IOC_WRITE, MTD_CHAR_MAJOR_IOCTL_TYPE, 2, std::mem::size_of::<EraseInfoUser>())
}

/// A [`BackingStore`] backed by an open file descriptor, using positioned
/// reads/writes so no shared seek cursor exists between this and a
/// concurrently-held [`cffs_core::scanner::Scanner`].
pub struct FileStore {
    file: File,
    geometry: Geometry,
}

impl FileStore {
    /// Opens `path` for reading and writing and queries its geometry.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the path cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> cffs_core::error::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let geometry = query_geometry(&file)?;
        Ok(Self { file, geometry })
    }
}

fn query_geometry(file: &File) -> cffs_core::error::Result<Geometry> {
    let mut info = MtdInfoUser::default();
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), memgetinfo(), &mut info) };

    if rc == 0 {
        return Ok(Geometry { size: u64::from(info.size), erase_block_size: info.erasesize });
    }

    // Not an MTD char device (e.g. a plain file holding a captured image).
    // Pick the largest power-of-two erase-block size up to 64KiB that still
    // evenly divides the file length, so `erase` always covers the whole
    // file without a short last block; an empty or oddly-sized file falls
    // back to treating itself as a single block.
    let len = file.metadata()?.len();
    const MAX_FALLBACK_ERASE_BLOCK: u64 = 64 << 10;
    let mut erase_block_size = MAX_FALLBACK_ERASE_BLOCK.min(len.max(1));
    while erase_block_size > 1 && len % erase_block_size != 0 {
        erase_block_size /= 2;
    }

    Ok(Geometry { size: len, erase_block_size: erase_block_size as u32 })
}

impl BackingStore for FileStore {
    fn size(&self) -> cffs_core::error::Result<u64> {
        Ok(self.geometry.size)
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> cffs_core::error::Result<()> {
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> cffs_core::error::Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn geometry(&self) -> cffs_core::error::Result<Geometry> {
        Ok(self.geometry)
    }

    fn erase_block(&self, offset: u64) -> cffs_core::error::Result<()> {
        let mut erase = EraseInfoUser { start: offset as u32, length: self.geometry.erase_block_size };
        let rc = unsafe {
            libc::ioctl(self.file.as_raw_fd(), memerase(), &mut erase)
        };

        if rc == 0 {
            return Ok(());
        }

        // Plain-file fallback: emulate the erase directly.
        let block = vec![0xFFu8; self.geometry.erase_block_size as usize];
        self.file.write_all_at(&block, offset)?;
        Ok(())
    }
}
