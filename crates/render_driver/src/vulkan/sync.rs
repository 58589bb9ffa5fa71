//! Vulkan synchronization primitives and frame pacing
//!
//! Frame pacing runs a fixed ring of [`FRAMES_IN_FLIGHT`] slots. Each slot owns
//! a command buffer, an in-flight fence and an image-available semaphore.
//! A slot is only handed out again after the wait on its fence has observed
//! the previous submission complete; the fence is reset right after that wait.
//!
//! ```text
//! Idle -> Waiting(fence) -> Recording -> Submitted -> Presented -> Idle
//! ```
//!
//! The swapchain image is acquired later, when the rendering scope begins, so
//! slot count (CPU pacing) and image count (presentation depth) are independent.

use ash::{vk, Device};

use super::commands::CommandPool;
use crate::error::{DriverError, DriverResult};

/// Number of frame slots in the ring
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Timeout used for every blocking wait
pub const INFINITE_TIMEOUT: u64 = u64::MAX;

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> DriverResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Semaphore creation failed: {e:?}")))?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> DriverResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Fence creation failed: {e:?}")))?
        };

        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> DriverResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(DriverError::Submission)
        }
    }

    /// Reset fence
    pub fn reset(&self) -> DriverResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(DriverError::Submission)
        }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Fence operations frame pacing relies on
pub trait SlotFence {
    /// Block until the slot's previous submission has completed
    fn wait_complete(&self) -> DriverResult<()>;

    /// Return the fence to the unsignaled state
    fn reset(&self) -> DriverResult<()>;
}

/// Lifecycle of a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing pending; the fence is signaled
    Idle,
    /// Blocked on the slot's fence
    Waiting,
    /// Handed to the caller for recording
    Recording,
    /// Submitted to the queue, fence pending
    Submitted,
    /// Submitted and queued for presentation
    Presented,
}

/// How a queue submission relates to the current frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSubmission {
    /// Submitted on the slot's own fence
    SlotFence,
    /// The slot's command buffer went out on some other fence, so the slot
    /// fence has to be signaled separately before the slot can be reused
    ForeignFence,
    /// Nothing to do with the current slot
    Unrelated,
}

/// Flight-index bookkeeping for the slot ring
#[derive(Debug, Clone)]
pub struct FramePacer {
    flight_index: usize,
    states: [SlotState; FRAMES_IN_FLIGHT],
}

impl FramePacer {
    /// Create a pacer whose first acquisition yields slot 0
    pub const fn new() -> Self {
        Self {
            flight_index: FRAMES_IN_FLIGHT - 1,
            states: [SlotState::Idle; FRAMES_IN_FLIGHT],
        }
    }

    /// Advance to the next slot, wait on its fence and reset it
    ///
    /// A slot left in `Recording` was never submitted, so its fence is
    /// already reset and nothing is pending; waiting on it would block forever.
    pub fn acquire<F: SlotFence>(&mut self, fences: &[F]) -> DriverResult<usize> {
        let index = (self.flight_index + 1) % FRAMES_IN_FLIGHT;
        self.flight_index = index;
        let fence = fences.get(index).ok_or_else(|| DriverError::InvalidOperation {
            reason: format!("Frame slot {index} has no fence"),
        })?;

        if self.states[index] == SlotState::Recording {
            log::warn!("Frame slot {} reused without being submitted", index);
        } else {
            self.states[index] = SlotState::Waiting;
            fence.wait_complete()?;
            self.states[index] = SlotState::Idle;
            fence.reset()?;
        }

        self.states[index] = SlotState::Recording;
        Ok(index)
    }

    /// Classify a submission against the current slot
    pub fn classify_submission(&self, is_slot_command_buffer: bool, is_slot_fence: bool) -> SlotSubmission {
        if is_slot_fence {
            SlotSubmission::SlotFence
        } else if is_slot_command_buffer && self.states[self.flight_index] == SlotState::Recording {
            SlotSubmission::ForeignFence
        } else {
            SlotSubmission::Unrelated
        }
    }

    /// Record that the current slot's work reached the queue
    pub fn mark_submitted(&mut self) {
        self.transition(SlotState::Recording, SlotState::Submitted);
    }

    /// Record that the current slot's image was queued for presentation
    pub fn mark_presented(&mut self) {
        self.transition(SlotState::Submitted, SlotState::Presented);
    }

    fn transition(&mut self, expected: SlotState, next: SlotState) {
        let state = &mut self.states[self.flight_index];
        if *state != expected {
            log::warn!(
                "Frame slot {} moved to {:?} from {:?}, expected {:?}",
                self.flight_index,
                next,
                state,
                expected
            );
        }
        *state = next;
    }

    /// Index of the slot most recently acquired
    pub const fn current(&self) -> usize {
        self.flight_index
    }

    /// State of a slot
    pub fn state(&self, index: usize) -> SlotState {
        self.states[index % FRAMES_IN_FLIGHT]
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the frame ring
pub struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    in_flight: Fence,
    image_available: Semaphore,
}

impl FrameSlot {
    /// Pre-allocated command buffer of this slot
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Fence signaled when the slot's submission completes
    pub const fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Semaphore signaled when the acquired swapchain image is ready
    pub const fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }
}

impl SlotFence for FrameSlot {
    fn wait_complete(&self) -> DriverResult<()> {
        self.in_flight.wait(INFINITE_TIMEOUT)
    }

    fn reset(&self) -> DriverResult<()> {
        self.in_flight.reset()
    }
}

/// Fixed ring of frame slots used to pace CPU submission against the GPU
pub struct FrameSyncRing {
    slots: Vec<FrameSlot>,
    pacer: FramePacer,
}

impl FrameSyncRing {
    /// Allocate command buffers and sync objects for every slot
    ///
    /// Fences start signaled so the first wait on each slot returns at once.
    pub fn new(device: &Device, pool: &CommandPool) -> DriverResult<Self> {
        let command_buffers = pool.allocate_command_buffers(FRAMES_IN_FLIGHT as u32)?;

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    command_buffer,
                    in_flight: Fence::new(device.clone(), true)?,
                    image_available: Semaphore::new(device.clone())?,
                })
            })
            .collect::<DriverResult<Vec<_>>>()?;

        Ok(Self {
            slots,
            pacer: FramePacer::new(),
        })
    }

    /// Advance to the next slot once its previous work has completed
    pub fn acquire_next(&mut self) -> DriverResult<&FrameSlot> {
        let index = self.pacer.acquire(&self.slots)?;
        Ok(&self.slots[index])
    }

    /// Slot most recently acquired
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.pacer.current()]
    }

    /// Pacing state
    pub const fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Mutable pacing state
    pub fn pacer_mut(&mut self) -> &mut FramePacer {
        &mut self.pacer
    }
}
