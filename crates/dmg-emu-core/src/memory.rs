/// Fixed-size RAM addressed through a power-of-two mask.
///
/// Any address is valid: out-of-range bits are discarded, which is how the
/// hardware mirrors VRAM, WRAM and HRAM.
#[derive(Clone)]
pub struct Memory<const N: usize> {
    bytes: Box<[u8; N]>,
}

impl<const N: usize> Memory<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "memory size must be a power of two");
        N - 1
    };

    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; N]),
        }
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize & Self::MASK]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u8) {
        self.bytes[addr as usize & Self::MASK] = val;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl<const N: usize> Default for Memory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for Memory<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory").field("size", &N).finish()
    }
}

/// Byte image of arbitrary length (cartridge ROM or external RAM) addressed
/// by absolute offset with modulo wrapping. An empty image reads as 0xFF and
/// ignores writes.
#[derive(Clone, Default)]
pub struct BankedMemory {
    bytes: Vec<u8>,
}

impl BankedMemory {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u8 {
        if self.bytes.is_empty() {
            0xFF
        } else {
            self.bytes[offset % self.bytes.len()]
        }
    }

    #[inline]
    pub fn write(&mut self, offset: usize, val: u8) {
        if !self.bytes.is_empty() {
            let len = self.bytes.len();
            self.bytes[offset % len] = val;
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy `data` over the start of the image, ignoring any excess.
    pub fn load(&mut self, data: &[u8]) {
        let n = data.len().min(self.bytes.len());
        self.bytes[..n].copy_from_slice(&data[..n]);
    }
}

impl std::fmt::Debug for BankedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankedMemory")
            .field("len", &self.bytes.len())
            .finish()
    }
}
