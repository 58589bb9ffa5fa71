//! Vulkan backend building blocks
//!
//! Leaves first: loader and instance, device, allocator, swapchain, frame
//! synchronization, command submission, layout barriers, shaders and the
//! fixed graphics pipeline.

pub mod allocator;
pub mod barrier;
pub mod commands;
pub mod device;
pub mod instance;
pub mod loader;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use allocator::{MemoryAllocator, MemoryLocality};
pub use barrier::{LayoutTransition, TextureLayout};
pub use commands::{CommandPool, TransferContext};
pub use device::{DeviceContext, PhysicalDeviceInfo};
pub use instance::InstanceContext;
pub use pipeline::{GraphicsPipeline, Vertex};
pub use shader::{ShaderModule, ShaderStage};
pub use swapchain::{Swapchain, SwapchainManager, SwapchainPlan};
pub use sync::{Fence, FrameSlot, FrameSyncRing, Semaphore, FRAMES_IN_FLIGHT};
