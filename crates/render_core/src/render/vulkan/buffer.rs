//! Buffer management for vertex data, indices and staging
//!
//! Memory management following RAII patterns: a [`Buffer`] owns its handle and
//! its allocation and releases both together.

use ash::vk;
use crate::render::vulkan::commands::submit_instant_commands;
use crate::render::vulkan::{AllocationKey, DeviceRef, MemoryUsage, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: DeviceRef,
    handles: Option<(vk::Buffer, AllocationKey)>,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: &DeviceRef,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_usage: MemoryUsage,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid("buffer size must be non-zero"));
        }
        let (buffer, allocation) = device.create_buffer(size, usage, memory_usage)?;
        log::trace!("Created buffer of {} bytes ({:?})", size, usage);
        Ok(Self {
            device: device.clone(),
            handles: Some((buffer, allocation)),
            size,
        })
    }

    /// Host-visible transfer source filled with `data`
    pub fn staging(device: &DeviceRef, data: &[u8]) -> VulkanResult<Self> {
        let buffer = Self::new(
            device,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryUsage::HostUpload,
        )?;
        buffer.write_data(data)?;
        Ok(buffer)
    }

    /// Copy `data` to the start of the buffer through a mapping
    pub fn write_data(&self, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid(format!(
                "write of {} bytes exceeds buffer size {}",
                data.len(),
                self.size
            )));
        }
        let allocation = self
            .allocation()
            .ok_or_else(|| VulkanError::invalid("write to destroyed buffer"))?;
        let mut mapped = MappedMemory::map(&self.device, allocation, self.size as usize)?;
        mapped.write(0, data)
    }

    /// Get buffer handle, null once destroyed
    pub fn handle(&self) -> vk::Buffer {
        self.handles.map_or(vk::Buffer::null(), |(buffer, _)| buffer)
    }

    /// Allocation backing the buffer
    pub fn allocation(&self) -> Option<AllocationKey> {
        self.handles.map(|(_, allocation)| allocation)
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Release the buffer and its allocation
    pub fn destroy(&mut self) {
        if let Some((buffer, allocation)) = self.handles.take() {
            self.device.destroy_buffer(buffer, allocation);
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Host mapping of an allocation, unmapped on drop
///
/// Every access is checked against the mapped length given to [`MappedMemory::map`].
pub struct MappedMemory<'a> {
    device: &'a DeviceRef,
    allocation: AllocationKey,
    ptr: *mut u8,
    len: usize,
}

impl<'a> MappedMemory<'a> {
    /// Map the first `len` bytes of `allocation`
    pub fn map(device: &'a DeviceRef, allocation: AllocationKey, len: usize) -> VulkanResult<Self> {
        let ptr = device.map_memory(allocation)?;
        if ptr.is_null() {
            device.unmap_memory(allocation);
            return Err(VulkanError::invalid("allocation mapped to a null pointer"));
        }
        Ok(Self {
            device,
            allocation,
            ptr,
            len,
        })
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_range(&self, offset: usize, len: usize) -> VulkanResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(VulkanError::invalid(format!(
                "mapped range {}+{} exceeds mapping of {} bytes",
                offset, len, self.len
            ))),
        }
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> VulkanResult<&[u8]> {
        self.check_range(offset, len)?;
        // SAFETY: range checked above; the pointer stays valid until unmap in Drop.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) })
    }

    /// Copy `data` into the mapping at `offset`
    pub fn write(&mut self, offset: usize, data: &[u8]) -> VulkanResult<()> {
        self.check_range(offset, data.len())?;
        // SAFETY: as for `read`; the source slice cannot alias device memory.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
        Ok(())
    }
}

impl<'a> Drop for MappedMemory<'a> {
    fn drop(&mut self) {
        self.device.unmap_memory(self.allocation);
    }
}

/// Allocate a buffer
pub fn create_buffer(
    device: &DeviceRef,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_usage: MemoryUsage,
) -> VulkanResult<Buffer> {
    Buffer::new(device, size, usage, memory_usage)
}

/// Copy `size` bytes between buffers and wait for completion
pub fn copy_buffer(device: &DeviceRef, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
    if size > src.size() || size > dst.size() {
        return Err(VulkanError::invalid(format!(
            "copy of {} bytes exceeds buffer sizes ({} -> {})",
            size,
            src.size(),
            dst.size()
        )));
    }
    submit_instant_commands(device, |recorder| {
        recorder.copy_buffer(src.handle(), dst.handle(), size);
        Ok(())
    })
}

/// Upload raw vertex bytes into a device-local vertex buffer
pub fn create_vertex_buffer(device: &DeviceRef, vertex_data: &[u8]) -> VulkanResult<Buffer> {
    upload_device_local(device, vertex_data, vk::BufferUsageFlags::VERTEX_BUFFER)
}

/// Upload 32-bit indices into a device-local index buffer
pub fn create_index_buffer(device: &DeviceRef, indices: &[u32]) -> VulkanResult<Buffer> {
    upload_device_local(device, bytemuck::cast_slice(indices), vk::BufferUsageFlags::INDEX_BUFFER)
}

fn upload_device_local(device: &DeviceRef, data: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
    let staging = Buffer::staging(device, data)?;
    let buffer = Buffer::new(
        device,
        staging.size(),
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryUsage::DeviceLocal,
    )?;
    copy_buffer(device, &staging, &buffer, staging.size())?;
    Ok(buffer)
}
