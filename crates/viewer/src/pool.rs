//! Consumer interface for pooled vertex buffers.
//!
//! The renderer uploads assembled point data into device buffers; this
//! pool reuses released buffers of the same size and usage class so a
//! reload does not allocate a fresh multi-hundred-megabyte buffer every
//! time. The device itself is an external collaborator behind
//! [`VertexBuffers`].

use std::collections::HashMap;

/// Opaque identity of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Usage class a buffer was allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    Static,
    /// Rewritten between draws.
    Dynamic,
}

/// The device-side allocator the pool draws from.
pub trait VertexBuffers {
    /// Allocates a buffer of `size` bytes.
    fn create(&mut self, size: u64, usage: BufferUsage) -> BufferHandle;

    /// Uploads `data` into an allocated buffer, starting at offset zero.
    fn upload(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Frees a buffer. The handle is dead afterwards.
    fn destroy(&mut self, buffer: BufferHandle);
}

/// Reuse pool keyed by `(size, usage)`.
///
/// `acquire` hands back a previously released buffer of the same key when
/// one exists and only then asks the device for a new allocation;
/// `cleanup` frees everything, released and outstanding alike.
pub struct BufferPool<D: VertexBuffers> {
    device: D,
    free: HashMap<(u64, BufferUsage), Vec<BufferHandle>>,
    outstanding: HashMap<BufferHandle, (u64, BufferUsage)>,
}

impl<D: VertexBuffers> BufferPool<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            free: HashMap::new(),
            outstanding: HashMap::new(),
        }
    }

    /// Hands out a buffer for exactly `size` bytes of `usage` data.
    pub fn acquire(&mut self, size: u64, usage: BufferUsage) -> BufferHandle {
        let key = (size, usage);
        let handle = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(handle) => handle,
            None => self.device.create(size, usage),
        };
        self.outstanding.insert(handle, key);
        handle
    }

    /// Uploads into a buffer this pool handed out.
    pub fn upload(&mut self, handle: BufferHandle, data: &[u8]) {
        debug_assert!(self.outstanding.contains_key(&handle));
        self.device.upload(handle, data);
    }

    /// Returns a buffer to the pool for reuse. Unknown handles are
    /// ignored rather than corrupting the free lists.
    pub fn release(&mut self, handle: BufferHandle) {
        if let Some(key) = self.outstanding.remove(&handle) {
            self.free.entry(key).or_default().push(handle);
        } else {
            tracing::debug!(?handle, "release of a handle the pool never issued");
        }
    }

    /// Frees every buffer the pool knows about, released or not.
    pub fn cleanup(&mut self) {
        for handles in self.free.values() {
            for &handle in handles {
                self.device.destroy(handle);
            }
        }
        self.free.clear();
        for (&handle, _) in self.outstanding.iter() {
            self.device.destroy(handle);
        }
        self.outstanding.clear();
    }

    pub fn device(&mut self) -> &mut D {
        &mut self.device
    }
}
