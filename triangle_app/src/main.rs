//! Spinning triangle demo
//!
//! Opens a window, brings the render driver up on it and draws one
//! vertex-colored triangle per frame, rotated through a push-constant matrix.
//! Shaders are looked up as `simple.vert.spv` / `simple.frag.spv` in the
//! configured shader directory. An optional `driver.toml` in the working
//! directory overrides the defaults.

mod window;

use glfw::{Action, Key, WindowEvent};
use nalgebra::{Matrix4, Vector3};
use render_driver::config::Config;
use render_driver::foundation::logging;
use render_driver::prelude::*;
use render_driver::vulkan::pipeline::PUSH_CONSTANT_STAGES;
use std::path::Path;
use std::time::Instant;

use window::Window;

const CONFIG_PATH: &str = "driver.toml";
const SHADER_NAME: &str = "simple";
/// Where build.rs puts compiled shaders, relative to the workspace root
const DEFAULT_SHADER_DIR: &str = "target/shaders";

const TRIANGLE: [Vertex; 3] = [
    Vertex::new([0.0, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, 0.5], [0.0, 0.0, 1.0]),
];

/// Rotation about Z, squeezed horizontally so the triangle keeps its shape
fn triangle_transform(angle: f32, aspect_ratio: f32) -> Matrix4<f32> {
    Matrix4::new_nonuniform_scaling(&Vector3::new(1.0 / aspect_ratio, 1.0, 1.0))
        * Matrix4::from_axis_angle(&Vector3::z_axis(), angle)
}

struct TriangleApp {
    // The driver owns the surface, so it must drop before the window.
    driver: RenderDriver,
    window: Window,
    pipeline: PipelineHandle,
    vertex_buffer: BufferHandle,
    start_time: Instant,
}

impl TriangleApp {
    fn new(config: DriverConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let (width, height) = config.fallback_extent;
        let mut window = Window::new(&config.application_name, width, height)?;

        let extensions = window.required_instance_extensions()?;
        let instance = InstanceContext::new(&config, &extensions)?;
        let surface = window.create_surface(instance.handle())?;
        let mut driver = RenderDriver::initialize(instance, surface, config)?;

        let pipeline = driver.create_pipeline(SHADER_NAME)?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE);
        let vertex_buffer = driver.create_buffer(
            vertex_bytes.len() as u64,
            ash::vk::BufferUsageFlags::VERTEX_BUFFER | ash::vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        driver.write_buffer(vertex_buffer, vertex_bytes)?;

        log::info!(
            "Triangle ready: {:?} swapchain, {} images",
            driver.swapchain_extent()?,
            driver.image_count()?
        );

        Ok(Self {
            driver,
            window,
            pipeline,
            vertex_buffer,
            start_time: Instant::now(),
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();

            // Minimized: nothing to present until the window has area again.
            let (width, height) = self.window.framebuffer_size();
            if width == 0 || height == 0 {
                self.window.wait_events();
                continue;
            }

            self.render_frame()?;
        }

        self.driver.device_wait_idle()?;
        Ok(())
    }

    fn handle_events(&mut self) {
        let events: Vec<WindowEvent> = self.window.flush_events().map(|(_, event)| event).collect();
        for event in events {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                    self.window.set_should_close(true);
                }
                WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    self.driver
                        .set_surface_extent(width.max(0) as u32, height.max(0) as u32);
                }
                _ => {}
            }
        }
    }

    fn render_frame(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let angle = self.start_time.elapsed().as_secs_f32();
        let cmd = self.driver.acquire_next_frame()?;
        let mvp = triangle_transform(angle, self.driver.swapchain_aspect_ratio()?);

        self.driver.begin_command_buffer(cmd)?;
        self.driver.cmd_begin_rendering(cmd)?;
        self.driver.cmd_bind_pipeline(cmd, self.pipeline)?;
        self.driver.cmd_bind_vertex_buffer(cmd, self.vertex_buffer, 0)?;
        self.driver.cmd_push_constants(
            cmd,
            self.pipeline,
            PUSH_CONSTANT_STAGES,
            0,
            bytemuck::cast_slice(mvp.as_slice()),
        )?;
        self.driver.cmd_draw(cmd, TRIANGLE.len() as u32, 1, 0, 0);
        self.driver.cmd_end_rendering(cmd)?;
        self.driver.end_command_buffer(cmd)?;
        self.driver.submit_and_present_frame(cmd)?;
        Ok(())
    }
}

impl Drop for TriangleApp {
    fn drop(&mut self) {
        // An early error out of run() can leave frames referencing these.
        if let Err(e) = self.driver.device_wait_idle() {
            log::warn!("Failed to wait for device idle: {}", e);
        }
        if let Err(e) = self.driver.destroy_buffer(self.vertex_buffer) {
            log::warn!("Failed to destroy vertex buffer: {}", e);
        }
        if let Err(e) = self.driver.destroy_pipeline(self.pipeline) {
            log::warn!("Failed to destroy pipeline: {}", e);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {:?}", panic_info);

        if let Some(location) = panic_info.location() {
            eprintln!("Panic location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    logging::init_with_level(logging::LevelFilter::Info);

    let config = if Path::new(CONFIG_PATH).exists() {
        DriverConfig::load_from_file(CONFIG_PATH)?
    } else {
        DriverConfig::new("Triangle").with_shader_dir(DEFAULT_SHADER_DIR)
    };
    log::info!("Starting {} (validation: {})", config.application_name, config.validation_enabled());

    let mut app = TriangleApp::new(config)?;
    match app.run() {
        Ok(()) => {
            log::info!("Triangle demo finished");
            Ok(())
        }
        Err(e) => {
            log::error!("Triangle demo failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_fits_push_constant_block() {
        let mvp = triangle_transform(0.3, 1.5);
        let bytes: &[u8] = bytemuck::cast_slice(mvp.as_slice());
        assert_eq!(bytes.len(), 64);
        assert!(render_driver::vulkan::pipeline::validate_push_constant_range(0, bytes.len()).is_ok());
    }

    #[test]
    fn test_transform_corrects_aspect() {
        let mvp = triangle_transform(0.0, 2.0);
        let right = mvp.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        let up = mvp.transform_point(&nalgebra::Point3::new(0.0, 1.0, 0.0));
        assert!((right.x - 0.5).abs() < 1e-6);
        assert!((up.y - 1.0).abs() < 1e-6);
    }
}
