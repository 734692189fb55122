use std::fmt;

mod impls;

/// Represents a type that may be decoded from (and encoded to) its on-disk
/// little-endian byte representation.
pub trait AsBytes: Sized {
    /// The serialized representation.
    type Repr;

    /// Serializes the type to its byte representation.
    fn serialize(&self) -> Self::Repr;

    /// Deserializes the byte representation to its corresponding type.
    fn deserialize(src: Self::Repr) -> Self;
}

/// A fixed-size buffer (buff, aka. buf fixed) with a cursor.
///
/// # Panics
///
/// `read` and `write` panic if there is not enough capacity. Use the `try_*` variants when the buffer length comes from
/// untrusted input (e.g. a column value handed over by the storage engine).
pub struct Buff<'a> {
    inner: &'a mut [u8],
    offset: usize,
}

impl<'a> Buff<'a> {
    /// Creates a new fixed-size buffer, `Buff`.
    pub fn new(inner: &'a mut [u8]) -> Buff<'a> {
        Buff { inner, offset: 0 }
    }

    /// Returns the buffer capacity.
    pub fn capacity(&self) -> usize {
        self.inner.len()
    }

    /// Returns the remaining available bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    /// Changes the underlying cursor offset position.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Reads the type represented by [`AsBytes`].
    pub fn read<const S: usize, T>(&mut self) -> T
    where
        T: AsBytes<Repr = [u8; S]>,
    {
        let mut buf = [0; S];
        buf.copy_from_slice(self.slice_to(S));
        T::deserialize(buf)
    }

    /// Same as [`Self::read`], but returns `None` (without advancing the
    /// cursor) if fewer than `S` bytes remain.
    pub fn try_read<const S: usize, T>(&mut self) -> Option<T>
    where
        T: AsBytes<Repr = [u8; S]>,
    {
        if self.remaining() < S {
            return None;
        }
        Some(self.read())
    }

    /// Reads a value at the given absolute offset, leaving the cursor right
    /// after it.
    pub fn read_at<const S: usize, T>(&mut self, offset: usize) -> Option<T>
    where
        T: AsBytes<Repr = [u8; S]>,
    {
        if offset > self.capacity() {
            return None;
        }
        self.seek(offset);
        self.try_read()
    }

    /// Writes the type represented by [`AsBytes`].
    pub fn write<T>(&mut self, src: T)
    where
        T: AsBytes,
        T::Repr: AsRef<[u8]>,
    {
        let data = src.serialize();
        let data = data.as_ref();
        self.slice_to(data.len()).copy_from_slice(data);
    }
}

// Private utilities.
impl Buff<'_> {
    /// Attempts to get the slice with length `count` starting at the current
    /// offset. Asserts that the current buffer has enough capacity to fit
    /// `count` more bytes.
    ///
    /// This method also increments `self.offset` by `count`.
    #[inline(always)]
    fn slice_to(&mut self, count: usize) -> &mut [u8] {
        let lo = self.offset;
        let hi = lo + count;
        if hi > self.capacity() {
            panic!("not enough capacity for {count} more bytes");
        }
        self.offset = hi;
        &mut self.inner[lo..hi]
    }
}

impl fmt::Debug for Buff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buff")
            .field("offset", &self.offset)
            .field("remaining", &self.remaining())
            .field("capacity", &self.capacity())
            .field("inner", &"<bytes>")
            .finish()
    }
}
