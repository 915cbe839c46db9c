//! Convenient re-exports of the types most callers need.
//!
//! ```
//! use cffs_core::prelude::*;
//! ```

#[doc(inline)]
pub use crate::data::{DataCursor, DataCursorTrait, Endian, EndianRead, EndianWrite};
pub use crate::error::Error;
pub use crate::header::{ClassAHeader, ClassBHeader, Header};

#[cfg(feature = "std")]
pub use crate::ops::{FsckReport, ListEntry, OnExists};
#[cfg(feature = "std")]
pub use crate::scanner::{Scanner, Slot};
#[cfg(feature = "std")]
pub use crate::store::BackingStore;

pub mod util {
    pub use crate::util::format_size;
}

#[cfg(all(feature = "time", feature = "std"))]
pub mod time {
    pub use crate::time::*;
}
