//! Byte buffers for decoded tile data.
//!
//! A [`Buffer`] either owns its region (strong) or borrows a caller-owned
//! region (weak). Strong buffers grow on demand; weak buffers never resize
//! and writes past their capacity fail. Once a buffer is finished it is
//! published as a [`SharedBuffer`] and treated as immutable.

use std::fmt;
use std::sync::Arc;

use crate::error::{SlideError, SlideResult};

/// Reference-counted published form of a finished buffer.
///
/// Cache entries and render-path reads hold this; cloning is cheap and keeps
/// the pixel data alive past eviction.
pub type SharedBuffer = Arc<Buffer<'static>>;

/// Ownership mode of a buffer's backing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The buffer owns its region and frees it on drop.
    Strong,
    /// The region belongs to the caller and is never freed or grown here.
    Weak,
}

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed { region: &'a mut [u8], len: usize },
}

/// Contiguous byte container for decoded tile pixels.
///
/// Strong buffers (`new`, `with_capacity`, `copy_from`) own heap storage and
/// grow with amortized reallocation. Weak buffers (`wrap_weak`) view a
/// caller-owned region whose lifetime the borrow checker enforces; writing
/// past a weak buffer's capacity fails with [`SlideError::Overflow`] instead
/// of resizing.
pub struct Buffer<'a> {
    storage: Storage<'a>,
}

impl Buffer<'static> {
    /// Create an empty strong buffer with no backing region.
    pub fn new() -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
        }
    }

    /// Create a strong buffer with `capacity` bytes pre-allocated and length 0.
    pub fn with_capacity(capacity: usize) -> SlideResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| SlideError::Allocation {
                requested: capacity,
            })?;
        Ok(Self {
            storage: Storage::Owned(data),
        })
    }

    /// Create a strong buffer holding a copy of `src`.
    ///
    /// The source may be dropped immediately after this returns.
    pub fn copy_from(src: &[u8]) -> SlideResult<Self> {
        let mut buffer = Self::with_capacity(src.len())?;
        if let Storage::Owned(data) = &mut buffer.storage {
            data.extend_from_slice(src);
        }
        Ok(buffer)
    }
}

impl<'a> Buffer<'a> {
    /// Wrap a caller-owned region as a weak buffer, without copying.
    ///
    /// The buffer starts fully written (`len == capacity`), viewing the
    /// region's current contents. Call [`clear`](Self::clear) to reuse the
    /// region as writable scratch space.
    pub fn wrap_weak(region: &'a mut [u8]) -> Self {
        let len = region.len();
        Self {
            storage: Storage::Borrowed { region, len },
        }
    }

    /// Ownership mode of the backing region.
    pub fn ownership(&self) -> Ownership {
        match self.storage {
            Storage::Owned(_) => Ownership::Strong,
            Storage::Borrowed { .. } => Ownership::Weak,
        }
    }

    /// Bytes logically written so far.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(data) => data.len(),
            Storage::Borrowed { len, .. } => *len,
        }
    }

    /// True if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes available without growing (for a weak buffer, ever).
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Owned(data) => data.capacity(),
            Storage::Borrowed { region, .. } => region.len(),
        }
    }

    /// View of the written bytes. Does not transfer ownership.
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data,
            Storage::Borrowed { region, len } => &region[..*len],
        }
    }

    /// Reserve the next `additional` bytes and return them as writable space,
    /// advancing the buffer length.
    ///
    /// A strong buffer grows its capacity as needed (amortized, doubling).
    /// A weak buffer never resizes: if fewer than `additional` bytes remain
    /// the write fails with [`SlideError::Overflow`] and nothing changes.
    pub fn write(&mut self, additional: usize) -> SlideResult<&mut [u8]> {
        match &mut self.storage {
            Storage::Owned(data) => {
                let start = data.len();
                data.try_reserve(additional)
                    .map_err(|_| SlideError::Allocation {
                        requested: additional,
                    })?;
                data.resize(start + additional, 0);
                Ok(&mut data[start..])
            }
            Storage::Borrowed { region, len } => {
                let writable = region.len() - *len;
                if additional > writable {
                    return Err(SlideError::Overflow {
                        requested: additional,
                        writable,
                    });
                }
                let start = *len;
                *len += additional;
                Ok(&mut region[start..start + additional])
            }
        }
    }

    /// Reset the length to 0 without releasing or shrinking the region.
    pub fn clear(&mut self) {
        match &mut self.storage {
            Storage::Owned(data) => data.clear(),
            Storage::Borrowed { len, .. } => *len = 0,
        }
    }

    /// Promote to a strong buffer.
    ///
    /// A weak buffer's written bytes are copied into newly owned storage;
    /// a strong buffer is returned as-is. Demotion in the other direction
    /// does not exist.
    pub fn into_owned(self) -> SlideResult<Buffer<'static>> {
        match self.storage {
            Storage::Owned(data) => Ok(Buffer {
                storage: Storage::Owned(data),
            }),
            Storage::Borrowed { region, len } => Buffer::copy_from(&region[..len]),
        }
    }
}

impl Default for Buffer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Buffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("ownership", &self.ownership())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
