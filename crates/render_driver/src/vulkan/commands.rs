//! Command pool and one-shot transfer submission

use ash::{vk, Device};

use super::sync::{Fence, INFINITE_TIMEOUT};
use crate::error::{DriverError, DriverResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually and are short-lived
    pub fn new(device: Device, queue_family_index: u32) -> DriverResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            )
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Command pool creation failed: {e:?}")))?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> DriverResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(DriverError::allocation("command buffer"))
        }
    }

    /// Return command buffers to the pool
    ///
    /// # Safety
    /// None of the buffers may be pending execution.
    pub unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            self.device
                .free_command_buffers(self.command_pool, command_buffers);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffers; none may still be executing.
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Blocking one-shot submissions for uploads and copies
///
/// Each submission records into a fresh command buffer, waits on a dedicated
/// fence and frees the buffer before returning.
pub struct TransferContext {
    device: Device,
    queue: vk::Queue,
    pool: CommandPool,
    fence: Fence,
}

impl TransferContext {
    /// Create a transfer context on the given queue
    pub fn new(device: Device, queue: vk::Queue, queue_family_index: u32) -> DriverResult<Self> {
        let pool = CommandPool::new(device.clone(), queue_family_index)?;
        let fence = Fence::new(device.clone(), true)?;

        Ok(Self {
            device,
            queue,
            pool,
            fence,
        })
    }

    /// Record commands with `record`, submit them and wait for completion
    ///
    /// Nothing is submitted if `record` fails.
    pub fn submit_and_wait<F>(&self, record: F) -> DriverResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> DriverResult<()>,
    {
        let command_buffers = self.pool.allocate_command_buffers(1)?;
        let command_buffer = command_buffers[0];

        let result = self.record_and_submit(command_buffer, record);

        unsafe { self.pool.free_command_buffers(&command_buffers) };
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> DriverResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> DriverResult<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(DriverError::Api)?;
        }

        record(&self.device, command_buffer)?;

        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(DriverError::Api)?;
        }

        self.fence.reset()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], self.fence.handle())
                .map_err(DriverError::Submission)?;
        }

        self.fence.wait(INFINITE_TIMEOUT)
    }
}
