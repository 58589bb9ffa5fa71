//! # Render Driver
//!
//! A Vulkan rendering-resource and frame-lifecycle driver.
//!
//! ## Features
//!
//! - **Bring-up**: instance, physical device selection, one combined graphics+present queue
//! - **Swapchain**: FIFO presentation with in-place rebuild on surface resize
//! - **Frame pacing**: a two-slot ring of command buffers, fences and semaphores
//! - **Resources**: generation-checked handles for buffers, 2D textures and pipelines
//! - **Recording**: dynamic rendering scopes, layout barriers, submit and present
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_driver::prelude::*;
//! # fn surface_from_host(_: &InstanceContext) -> ash::vk::SurfaceKHR { unimplemented!() }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DriverConfig::default();
//!     let instance = InstanceContext::new(&config, &[])?;
//!     let surface = surface_from_host(&instance);
//!     let mut driver = RenderDriver::initialize(instance, surface, config)?;
//!
//!     let pipeline = driver.create_pipeline("simple")?;
//!     loop {
//!         let cmd = driver.acquire_next_frame()?;
//!         driver.begin_command_buffer(cmd)?;
//!         driver.cmd_begin_rendering(cmd)?;
//!         driver.cmd_bind_pipeline(cmd, pipeline)?;
//!         driver.cmd_draw(cmd, 3, 1, 0, 0);
//!         driver.cmd_end_rendering(cmd)?;
//!         driver.end_command_buffer(cmd)?;
//!         driver.submit_and_present_frame(cmd)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod driver;
pub mod error;
pub mod foundation;
pub mod resources;
pub mod vulkan;

pub use driver::RenderDriver;
pub use error::{DriverError, DriverResult};

/// Common imports for driver users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, DriverConfig},
        driver::RenderDriver,
        error::{DriverError, DriverResult},
        resources::{BufferHandle, MemoryLocality, PipelineHandle, Texture2DHandle},
        vulkan::{
            barrier::TextureLayout,
            instance::InstanceContext,
            pipeline::Vertex,
            sync::FRAMES_IN_FLIGHT,
        },
    };
}
