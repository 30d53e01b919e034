use std::hash::Hasher;

use seahash::SeaHasher;

/// A hasher whose output is stable across releases and platforms, suitable
/// for deriving on-disk cache keys.
///
/// The default [`Hasher`] implementations in the standard library are
/// explicitly documented as unstable across Rust versions, so anything that
/// outlives the process goes through this wrapper instead.
#[derive(Clone, Default)]
pub struct StableHasher {
    inner: SeaHasher,
}

impl StableHasher {
    pub fn new() -> Self {
        Self {
            inner: SeaHasher::new(),
        }
    }
}

impl Hasher for StableHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.inner.finish()
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.inner.write_u8(i);
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.inner.write_u32(i);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.inner.write_u64(i);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.inner.write_usize(i);
    }
}
