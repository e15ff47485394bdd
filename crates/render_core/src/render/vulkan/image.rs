//! Image ownership wrappers
//!
//! Three variants form a containment hierarchy: [`Image`] (image + allocation),
//! [`ImageView`] (owns an `Image` and a view) and [`ImageViewSampler`] (owns an
//! `Image`, a view and a sampler). Each releases its handles on drop in reverse
//! acquisition order; `destroy()` does the same eagerly and is idempotent.

use ash::vk;
use crate::render::vulkan::{AllocationKey, DeviceRef, MemoryUsage, VulkanResult};

/// Parameters of a 2D image allocation
///
/// Every field maps directly onto the image creation descriptor. The constructor
/// fills in one mip level, one sample, optimal tiling, sampled usage, device-local
/// memory and the color aspect; call sites override what they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// Sample count
    pub sample_count: vk::SampleCountFlags,
    /// Texel format
    pub format: vk::Format,
    /// Tiling mode
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Memory placement hint
    pub memory_usage: MemoryUsage,
    /// Aspect used when a view is created for the image
    pub aspect: vk::ImageAspectFlags,
}

impl ImageConfig {
    /// Single-mip, single-sample, optimal-tiled, device-local color image
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            sample_count: vk::SampleCountFlags::TYPE_1,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::SAMPLED,
            memory_usage: MemoryUsage::DeviceLocal,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// Set the mip level count
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the sample count
    pub fn sample_count(mut self, sample_count: vk::SampleCountFlags) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Set the tiling mode
    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.tiling = tiling;
        self
    }

    /// Set the usage flags
    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Set the memory placement hint
    pub fn memory_usage(mut self, memory_usage: MemoryUsage) -> Self {
        self.memory_usage = memory_usage;
        self
    }

    /// Set the view aspect
    pub fn aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// Extent as a 2D rectangle size
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Mip levels the sampler may reach
    pub mip_levels: u32,
    /// Address mode along U
    pub address_mode_u: vk::SamplerAddressMode,
    /// Address mode along V
    pub address_mode_v: vk::SamplerAddressMode,
    /// Address mode along W
    pub address_mode_w: vk::SamplerAddressMode,
}

impl SamplerConfig {
    /// Sampler with the same address mode on every axis
    pub fn new(
        min_filter: vk::Filter,
        mag_filter: vk::Filter,
        mip_levels: u32,
        address_mode: vk::SamplerAddressMode,
    ) -> Self {
        Self {
            min_filter,
            mag_filter,
            mip_levels,
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
        }
    }
}

/// Image plus its memory allocation
pub struct Image {
    device: DeviceRef,
    handles: Option<(vk::Image, AllocationKey)>,
    config: ImageConfig,
}

impl Image {
    /// Allocate an image described by `config`
    pub fn new(device: &DeviceRef, config: ImageConfig) -> VulkanResult<Self> {
        let (image, allocation) = device.create_image(&config)?;
        log::trace!(
            "Created image {}x{} {:?} ({} mips)",
            config.width,
            config.height,
            config.format,
            config.mip_levels
        );
        Ok(Self {
            device: device.clone(),
            handles: Some((image, allocation)),
            config,
        })
    }

    /// Get image handle, null once destroyed
    pub fn handle(&self) -> vk::Image {
        self.handles.map_or(vk::Image::null(), |(image, _)| image)
    }

    /// Allocation backing the image
    pub fn allocation(&self) -> Option<AllocationKey> {
        self.handles.map(|(_, allocation)| allocation)
    }

    /// Parameters the image was created with
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Whether the image still holds its handles
    pub fn is_valid(&self) -> bool {
        self.handles.is_some()
    }

    /// Release the image and its allocation
    pub fn destroy(&mut self) {
        if let Some((image, allocation)) = self.handles.take() {
            self.device.destroy_image(image, allocation);
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Image plus a view over all of its mip levels
pub struct ImageView {
    image: Image,
    view: vk::ImageView,
}

impl ImageView {
    /// Allocate an image and create its view
    pub fn new(device: &DeviceRef, config: ImageConfig) -> VulkanResult<Self> {
        let image = Image::new(device, config)?;
        let view = device.create_image_view(image.handle(), config.format, config.aspect, config.mip_levels)?;
        Ok(Self { image, view })
    }

    /// Get the view handle, null once destroyed
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the image handle
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    /// Underlying image
    pub fn inner(&self) -> &Image {
        &self.image
    }

    /// Texel format of the view
    pub fn format(&self) -> vk::Format {
        self.image.config().format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.image.config().extent()
    }

    /// Release the view, then the image
    pub fn destroy(&mut self) {
        if self.view != vk::ImageView::null() {
            self.image.device.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        self.image.destroy();
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Image plus view plus sampler, the shape of a sampled texture
pub struct ImageViewSampler {
    image: Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl ImageViewSampler {
    /// Assemble from an image whose contents are already in place
    pub fn from_image(image: Image, sampler_config: &SamplerConfig) -> VulkanResult<Self> {
        let config = *image.config();
        let view = image
            .device
            .create_image_view(image.handle(), config.format, config.aspect, config.mip_levels)?;
        let sampler = match image.device.create_sampler(sampler_config) {
            Ok(sampler) => sampler,
            Err(e) => {
                image.device.destroy_image_view(view);
                return Err(e);
            }
        };
        Ok(Self { image, view, sampler })
    }

    /// Get the view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Get the image handle
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    /// Underlying image
    pub fn inner(&self) -> &Image {
        &self.image
    }

    /// Release the sampler, then the view, then the image
    pub fn destroy(&mut self) {
        if self.sampler != vk::Sampler::null() {
            self.image.device.destroy_sampler(self.sampler);
            self.sampler = vk::Sampler::null();
        }
        if self.view != vk::ImageView::null() {
            self.image.device.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        self.image.destroy();
    }
}

impl Drop for ImageViewSampler {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{MockDevice, ObjectKind};
    use std::sync::Arc;

    fn mock() -> (Arc<MockDevice>, DeviceRef) {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        (mock, device)
    }

    #[test]
    fn test_image_view_releases_view_before_image() {
        let (mock, device) = mock();
        let config = ImageConfig::new(64, 32, vk::Format::R8G8B8A8_UNORM);
        let mut image_view = ImageView::new(&device, config).unwrap();
        assert_eq!(image_view.extent().width, 64);
        assert_eq!(mock.live(ObjectKind::Image), 1);
        assert_eq!(mock.live(ObjectKind::ImageView), 1);

        image_view.destroy();
        let order = mock.destroy_order();
        assert_eq!(order, vec![ObjectKind::ImageView, ObjectKind::Image]);
        assert_eq!(mock.live_allocations(), 0);

        image_view.destroy();
        drop(image_view);
        assert_eq!(mock.double_frees(), 0);
        assert_eq!(mock.destroy_order().len(), 2);
    }

    #[test]
    fn test_image_view_sampler_release_order() {
        let (mock, device) = mock();
        let image = Image::new(&device, ImageConfig::new(4, 4, vk::Format::R8G8B8A8_UNORM)).unwrap();
        let sampler = SamplerConfig::new(vk::Filter::LINEAR, vk::Filter::LINEAR, 1, vk::SamplerAddressMode::REPEAT);
        let texture = ImageViewSampler::from_image(image, &sampler).unwrap();
        assert_ne!(texture.sampler(), vk::Sampler::null());
        drop(texture);

        assert_eq!(
            mock.destroy_order(),
            vec![ObjectKind::Sampler, ObjectKind::ImageView, ObjectKind::Image]
        );
        assert_eq!(mock.total_live(), 0);
    }

    #[test]
    fn test_sampler_failure_releases_view() {
        let (mock, device) = mock();
        let image = Image::new(&device, ImageConfig::new(4, 4, vk::Format::R8G8B8A8_UNORM)).unwrap();
        mock.fail_next(ObjectKind::Sampler);
        let sampler = SamplerConfig::new(vk::Filter::NEAREST, vk::Filter::NEAREST, 1, vk::SamplerAddressMode::REPEAT);
        assert!(ImageViewSampler::from_image(image, &sampler).is_err());
        assert_eq!(mock.total_live(), 0);
        assert_eq!(mock.live_allocations(), 0);
    }

    #[test]
    fn test_config_builder_overrides() {
        let config = ImageConfig::new(8, 8, vk::Format::D32_SFLOAT)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .aspect(vk::ImageAspectFlags::DEPTH)
            .tiling(vk::ImageTiling::OPTIMAL)
            .mip_levels(1);
        assert_eq!(config.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(config.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(config.memory_usage, MemoryUsage::DeviceLocal);
    }
}
