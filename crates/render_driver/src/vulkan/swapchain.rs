//! Vulkan swapchain management
//!
//! [`SwapchainManager`] owns the presentable image chain and rebuilds it in
//! place when the surface extent changes. A rebuild creates the new chain
//! against the old handle first and tears the old one down only afterwards,
//! so there is always a live chain to present to.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use super::device::DeviceContext;
use super::sync::Semaphore;
use crate::error::{DriverError, DriverResult};

/// Format/color-space pair picked when the surface offers it
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// `min + 1` images, clamped to `max` unless `max` is 0 (unbounded)
pub fn negotiate_image_count(min_image_count: u32, max_image_count: u32) -> u32 {
    let desired = min_image_count.saturating_add(1);
    if max_image_count > 0 {
        desired.min(max_image_count)
    } else {
        desired
    }
}

/// Preferred format if supported, else the first one offered
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| {
            sf.format == PREFERRED_SURFACE_FORMAT.format
                && sf.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Surface-reported extent, or `fallback` clamped to the surface limits when
/// the surface leaves the choice to the swapchain
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: fallback
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: fallback
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

/// Everything negotiated from the surface before a chain is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Requested minimum image count
    pub min_image_count: u32,
    /// Color format and space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Surface transform passed through unchanged
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Negotiate a plan from surface capabilities and formats
    pub fn negotiate(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        fallback_extent: vk::Extent2D,
    ) -> DriverResult<Self> {
        let surface_format = choose_surface_format(formats).ok_or_else(|| {
            DriverError::Initialization("Surface reports no formats".to_string())
        })?;

        Ok(Self {
            min_image_count: negotiate_image_count(caps.min_image_count, caps.max_image_count),
            surface_format,
            extent: choose_extent(caps, fallback_extent),
            pre_transform: caps.current_transform,
        })
    }

    /// Whether the surface currently has no drawable area (e.g. minimized)
    pub const fn is_zero_area(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }
}

/// Creates and destroys what a chain keeps alongside each of its images
pub trait ImageResourceFactory {
    /// Per-image view
    type View;
    /// Per-image semaphore; released by dropping it
    type Signal;

    /// Create the view for `image`
    fn create_view(&mut self, image: vk::Image) -> DriverResult<Self::View>;

    /// Create the signal presentation waits on for one image
    fn create_signal(&mut self) -> DriverResult<Self::Signal>;

    /// Destroy a view created by this factory
    fn destroy_view(&mut self, view: Self::View);
}

/// Views and render-finished signals sized from a chain's image list
///
/// Either every image has both, or nothing is held: a failed build releases
/// what it created before returning the error.
#[derive(Debug)]
pub struct PerImageResources<V, S> {
    views: Vec<V>,
    signals: Vec<S>,
}

impl<V, S> PerImageResources<V, S> {
    /// Holds nothing
    pub const fn empty() -> Self {
        Self {
            views: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// One view and one signal for each of `images`
    pub fn build<F>(images: &[vk::Image], factory: &mut F) -> DriverResult<Self>
    where
        F: ImageResourceFactory<View = V, Signal = S>,
    {
        let mut resources = Self {
            views: Vec::with_capacity(images.len()),
            signals: Vec::with_capacity(images.len()),
        };

        for &image in images {
            let view = match factory.create_view(image) {
                Ok(view) => view,
                Err(e) => {
                    resources.release(factory);
                    return Err(e);
                }
            };
            let signal = match factory.create_signal() {
                Ok(signal) => signal,
                Err(e) => {
                    factory.destroy_view(view);
                    resources.release(factory);
                    return Err(e);
                }
            };
            resources.views.push(view);
            resources.signals.push(signal);
        }

        Ok(resources)
    }

    /// Destroy every view and drop every signal
    pub fn release<F>(&mut self, factory: &mut F)
    where
        F: ImageResourceFactory<View = V, Signal = S>,
    {
        for view in self.views.drain(..) {
            factory.destroy_view(view);
        }
        self.signals.clear();
    }

    /// Number of images covered
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// View by image index
    pub fn view(&self, index: usize) -> Option<&V> {
        self.views.get(index)
    }

    /// Signal by image index
    pub fn signal(&self, index: usize) -> Option<&S> {
        self.signals.get(index)
    }
}

/// Color views and binary semaphores on a real device
struct DeviceImageResources<'a> {
    device: &'a Device,
    format: vk::Format,
}

impl ImageResourceFactory for DeviceImageResources<'_> {
    type View = vk::ImageView;
    type Signal = Semaphore;

    fn create_view(&mut self, image: vk::Image) -> DriverResult<vk::ImageView> {
        Swapchain::create_view(self.device, image, self.format)
    }

    fn create_signal(&mut self) -> DriverResult<Semaphore> {
        Semaphore::new(self.device.clone())
    }

    fn destroy_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }
}

/// Swapchain wrapper with RAII cleanup
///
/// Owns the chain handle, one view per image and one render-finished
/// semaphore per image.
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    per_image: PerImageResources<vk::ImageView, Semaphore>,
    plan: SwapchainPlan,
}

impl Swapchain {
    /// Create a chain for `plan`, passing `old_swapchain` to the driver for reuse
    pub fn new(
        device: &DeviceContext,
        surface: vk::SurfaceKHR,
        plan: SwapchainPlan,
        old_swapchain: vk::SwapchainKHR,
    ) -> DriverResult<Self> {
        let swapchain_loader = device.swapchain_loader().clone();
        let device = device.device().clone();

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(plan.min_image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Swapchain creation failed: {e:?}")))?
        };

        // From here on, partially built state is released by Drop.
        let mut chain = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            per_image: PerImageResources::empty(),
            plan,
        };

        chain.images = unsafe {
            chain
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(DriverError::Api)?
        };

        let mut factory = DeviceImageResources {
            device: &chain.device,
            format: plan.surface_format.format,
        };
        chain.per_image = PerImageResources::build(&chain.images, &mut factory)?;

        log::info!(
            "Swapchain ready: {}x{}, {} images, {:?}",
            plan.extent.width,
            plan.extent.height,
            chain.images.len(),
            plan.surface_format.format
        );

        Ok(chain)
    }

    fn create_view(device: &Device, image: vk::Image, format: vk::Format) -> DriverResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            device
                .create_image_view(&create_info, None)
                .map_err(DriverError::allocation("swapchain image view"))
        }
    }

    /// Get swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Get surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.plan.surface_format
    }

    /// Minimum image count requested at creation
    pub const fn min_image_count(&self) -> u32 {
        self.plan.min_image_count
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Swapchain image by index
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Image view by index
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.per_image.view(index as usize).copied()
    }

    /// Render-finished semaphore by image index
    pub fn render_finished(&self, index: u32) -> Option<vk::Semaphore> {
        self.per_image.signal(index as usize).map(Semaphore::handle)
    }

    /// Get swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub const fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let mut factory = DeviceImageResources {
            device: &self.device,
            format: self.plan.surface_format.format,
        };
        self.per_image.release(&mut factory);
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image index ready to render into
    Image(u32),
    /// The chain no longer matches the surface and must be rebuilt
    OutOfDate,
}

/// Owns the current chain and rebuilds it when the surface changes
pub struct SwapchainManager {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: vk::PhysicalDevice,
    fallback_extent: vk::Extent2D,
    current: Option<Swapchain>,
    needs_rebuild: bool,
}

impl SwapchainManager {
    /// Build the initial chain for `surface`
    pub fn new(
        device: &DeviceContext,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        fallback_extent: vk::Extent2D,
    ) -> DriverResult<Self> {
        let mut manager = Self {
            surface,
            surface_loader: surface_loader.clone(),
            physical_device: device.physical_device(),
            fallback_extent,
            current: None,
            needs_rebuild: false,
        };

        let plan = manager.plan()?;
        if plan.is_zero_area() {
            return Err(DriverError::Initialization(
                "Surface has zero area at swapchain creation".to_string(),
            ));
        }
        manager.current = Some(Swapchain::new(device, surface, plan, vk::SwapchainKHR::null())?);
        Ok(manager)
    }

    fn capabilities(&self) -> DriverResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(DriverError::Api)
        }
    }

    fn plan(&self) -> DriverResult<SwapchainPlan> {
        let caps = self.capabilities()?;
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
                .map_err(DriverError::Api)?
        };
        SwapchainPlan::negotiate(&caps, &formats, self.fallback_extent)
    }

    /// Current chain
    pub fn swapchain(&self) -> DriverResult<&Swapchain> {
        self.current.as_ref().ok_or_else(|| DriverError::InvalidOperation {
            reason: "Swapchain has been released".to_string(),
        })
    }

    /// Extent used when the surface does not dictate one
    pub fn set_fallback_extent(&mut self, extent: vk::Extent2D) {
        if extent != self.fallback_extent {
            self.fallback_extent = extent;
            self.needs_rebuild = true;
        }
    }

    /// Flag the chain for rebuild at the next opportunity
    pub fn mark_out_of_date(&mut self) {
        self.needs_rebuild = true;
    }

    /// Whether the chain must be rebuilt before the next frame
    ///
    /// Polls the surface: a current extent different from the chain's extent
    /// counts as a resize.
    pub fn needs_rebuild(&self) -> DriverResult<bool> {
        if self.needs_rebuild {
            return Ok(true);
        }
        let caps = self.capabilities()?;
        let cached = self.swapchain()?.extent();
        Ok(caps.current_extent.width != u32::MAX && caps.current_extent != cached)
    }

    /// Rebuild the chain against the current surface state
    ///
    /// Waits for the device to go idle first. Returns `false` without touching
    /// the chain when the surface has zero area.
    pub fn rebuild(&mut self, device: &DeviceContext) -> DriverResult<bool> {
        device.wait_idle()?;

        let plan = self.plan()?;
        if plan.is_zero_area() {
            log::debug!("Surface has zero area, deferring swapchain rebuild");
            self.needs_rebuild = true;
            return Ok(false);
        }

        let old_handle = self.swapchain()?.handle();
        let replacement = Swapchain::new(device, self.surface, plan, old_handle)?;
        // Replacing drops the old chain: views and semaphores, then the handle.
        self.current = Some(replacement);
        self.needs_rebuild = false;

        log::info!("Swapchain rebuilt at {}x{}", plan.extent.width, plan.extent.height);
        Ok(true)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&mut self, semaphore: vk::Semaphore, timeout: u64) -> DriverResult<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        let result = unsafe {
            swapchain
                .loader()
                .acquire_next_image(swapchain.handle(), timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.needs_rebuild = true;
                }
                Ok(AcquireOutcome::Image(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(DriverError::Submission(e)),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphore` signals
    pub fn present(&mut self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> DriverResult<()> {
        let swapchain = self.swapchain()?;
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { swapchain.loader().queue_present(queue, &present_info) };
        match result {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(())
            }
            Err(e) => Err(DriverError::Submission(e)),
        }
    }

    /// Destroy the chain ahead of the surface
    pub fn release(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::Cell;
    use std::rc::Rc;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    const FALLBACK: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_image_count_negotiation() {
        assert_eq!(negotiate_image_count(2, 3), 3);
        assert_eq!(negotiate_image_count(2, 8), 3);
        assert_eq!(negotiate_image_count(3, 3), 3);
        // Zero max means no upper bound.
        assert_eq!(negotiate_image_count(2, 0), 3);
    }

    #[test]
    fn test_preferred_format_wins() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));
    }

    #[test]
    fn test_first_format_is_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_extent_follows_surface() {
        let extent = choose_extent(&caps(2, 3, (1024, 768)), FALLBACK);
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_extent_sentinel_uses_clamped_fallback() {
        let mut c = caps(2, 3, (u32::MAX, u32::MAX));
        assert_eq!(choose_extent(&c, FALLBACK), FALLBACK);

        c.max_image_extent = vk::Extent2D { width: 640, height: 480 };
        assert_eq!(
            choose_extent(&c, FALLBACK),
            vk::Extent2D { width: 640, height: 480 }
        );
    }

    #[test]
    fn test_plan_after_resize_tracks_fresh_capabilities() {
        let formats = [format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let before = SwapchainPlan::negotiate(&caps(2, 0, (800, 600)), &formats, FALLBACK).unwrap();
        let after = SwapchainPlan::negotiate(&caps(3, 4, (1280, 720)), &formats, FALLBACK).unwrap();

        assert_eq!(before.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(after.extent, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(before.min_image_count, 3);
        assert_eq!(after.min_image_count, 4);
        assert_eq!(after.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn test_plan_requires_a_format() {
        assert!(SwapchainPlan::negotiate(&caps(2, 3, (800, 600)), &[], FALLBACK).is_err());
    }

    #[test]
    fn test_zero_area_detection() {
        let formats = [format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let minimized = SwapchainPlan::negotiate(&caps(2, 3, (0, 0)), &formats, FALLBACK).unwrap();
        assert!(minimized.is_zero_area());
    }

    #[derive(Default)]
    struct LiveCounts {
        views: Cell<usize>,
        signals: Cell<usize>,
    }

    impl LiveCounts {
        fn get(&self) -> (usize, usize) {
            (self.views.get(), self.signals.get())
        }
    }

    struct MockSignal(Rc<LiveCounts>);

    impl Drop for MockSignal {
        fn drop(&mut self) {
            self.0.signals.set(self.0.signals.get() - 1);
        }
    }

    struct MockImageFactory {
        live: Rc<LiveCounts>,
        signals_created: usize,
        fail_signal_at: Option<usize>,
    }

    impl MockImageFactory {
        fn new(live: &Rc<LiveCounts>) -> Self {
            Self {
                live: Rc::clone(live),
                signals_created: 0,
                fail_signal_at: None,
            }
        }
    }

    impl ImageResourceFactory for MockImageFactory {
        type View = vk::Image;
        type Signal = MockSignal;

        fn create_view(&mut self, image: vk::Image) -> DriverResult<vk::Image> {
            self.live.views.set(self.live.views.get() + 1);
            Ok(image)
        }

        fn create_signal(&mut self) -> DriverResult<MockSignal> {
            if self.fail_signal_at == Some(self.signals_created) {
                return Err(DriverError::Allocation {
                    what: "semaphore",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            self.signals_created += 1;
            self.live.signals.set(self.live.signals.get() + 1);
            Ok(MockSignal(Rc::clone(&self.live)))
        }

        fn destroy_view(&mut self, _view: vk::Image) {
            self.live.views.set(self.live.views.get() - 1);
        }
    }

    fn images(count: u64) -> Vec<vk::Image> {
        (1..=count).map(vk::Image::from_raw).collect()
    }

    #[test]
    fn test_rebuild_sizes_resources_to_new_images_and_releases_old() {
        let live = Rc::new(LiveCounts::default());
        let mut factory = MockImageFactory::new(&live);

        let old_images = images(3);
        let mut old = PerImageResources::build(&old_images, &mut factory).unwrap();
        assert_eq!(old.len(), old_images.len());
        assert_eq!(live.get(), (3, 3));

        // The replacement is created while the old chain is still alive.
        let new_images = images(4);
        let current = PerImageResources::build(&new_images, &mut factory).unwrap();
        assert_eq!(live.get(), (7, 7));

        old.release(&mut factory);
        assert!(old.is_empty());
        assert_eq!(live.get(), (4, 4));

        assert_eq!(current.len(), new_images.len());
        assert_eq!(current.view(3), Some(&new_images[3]));
        assert!(current.signal(3).is_some());
        assert!(current.view(4).is_none());
        assert!(current.signal(4).is_none());
    }

    #[test]
    fn test_failed_build_leaves_nothing_behind() {
        let live = Rc::new(LiveCounts::default());
        let mut factory = MockImageFactory::new(&live);
        factory.fail_signal_at = Some(2);

        let result = PerImageResources::build(&images(4), &mut factory);
        assert!(matches!(result, Err(DriverError::Allocation { what: "semaphore", .. })));
        assert_eq!(live.get(), (0, 0));
    }
}
