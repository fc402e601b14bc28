//! Immutable cached value

use bytes::Bytes;

use super::store::Value;

/// Immutable view over a cached byte sequence.
///
/// The cache owns the underlying buffer. [`ByteView::byte_slice`] hands out
/// a fresh copy, so nothing a caller does can reach cached state.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    b: Bytes,
}

impl ByteView {
    /// Clone `data` into a new view.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            b: Bytes::copy_from_slice(data),
        }
    }

    /// Number of bytes in the view
    #[inline]
    pub fn len(&self) -> usize {
        self.b.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Copy of the cached bytes
    pub fn byte_slice(&self) -> Vec<u8> {
        self.b.to_vec()
    }

    /// Read-only borrow of the cached bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.b
    }

    /// Shared handle to the buffer (reference counted; read-only)
    pub fn to_bytes(&self) -> Bytes {
        self.b.clone()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(v: Vec<u8>) -> Self {
        Self { b: Bytes::from(v) }
    }
}

impl From<Bytes> for ByteView {
    fn from(b: Bytes) -> Self {
        Self { b }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl Value for ByteView {
    #[inline]
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl std::fmt::Display for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.b))
    }
}

impl std::fmt::Debug for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteView").field("len", &self.len()).finish()
    }
}
