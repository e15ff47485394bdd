//! 2D texture asset
//!
//! The persisted part of a [`Texture2D`] is its metadata and raw pixel bytes.
//! [`Texture2D::inflate`] turns those bytes into a sampled GPU image.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::assets::AssetError;
use crate::render::vulkan::{
    create_image_view_sampler, mip_level_count, DeviceRef, ImageViewSampler, SamplerConfig, VulkanResult,
};

/// What a texture is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureType {
    /// Color data sampled by materials
    Color,
    /// Non-color data (normals, masks, lookup tables)
    Data,
    /// Image-based lighting data, never mipmapped
    Ibl,
}

/// Texel layout of the raw pixel bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    /// One 8-bit unorm channel
    R8,
    /// Two 8-bit unorm channels
    RG8,
    /// Four 8-bit unorm channels
    RGBA8,
    /// Two 16-bit float channels
    RG16,
    /// Four 16-bit float channels
    RGBA16,
    /// Four 32-bit float channels
    RGBA32,
}

impl PixelType {
    /// Device format holding this pixel layout
    pub fn format(self) -> vk::Format {
        match self {
            Self::R8 => vk::Format::R8_UNORM,
            Self::RG8 => vk::Format::R8G8_UNORM,
            Self::RGBA8 => vk::Format::R8G8B8A8_UNORM,
            Self::RG16 => vk::Format::R16G16_SFLOAT,
            Self::RGBA16 => vk::Format::R16G16B16A16_SFLOAT,
            Self::RGBA32 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }

    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::RG8 => 2,
            Self::RGBA8 | Self::RG16 => 4,
            Self::RGBA16 => 8,
            Self::RGBA32 => 16,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::R8 => "R8",
            Self::RG8 => "RG8",
            Self::RGBA8 => "RGBA8",
            Self::RG16 => "RG16",
            Self::RGBA16 => "RGBA16",
            Self::RGBA32 => "RGBA32",
        };
        f.write_str(tag)
    }
}

/// Sampler addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressMode {
    /// Wrap around
    Repeat,
    /// Wrap around, mirrored every other repeat
    MirroredRepeat,
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to the border color
    ClampToBorder,
}

impl AddressMode {
    /// Device address mode
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
            Self::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            Self::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

/// 2D texture asset
#[derive(Serialize, Deserialize)]
pub struct Texture2D {
    /// Logical asset identifier
    pub url: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Addressing along U
    pub address_mode_u: AddressMode,
    /// Addressing along V
    pub address_mode_v: AddressMode,
    /// Addressing along W
    pub address_mode_w: AddressMode,
    /// Usage kind
    pub texture_type: TextureType,
    /// Pixel layout
    pub pixel_type: PixelType,
    /// Mip levels of the GPU image, set by `inflate`
    pub mip_levels: u32,
    /// Raw pixel bytes, `width * height * bytes_per_pixel` long
    #[serde(skip)]
    pub image_data: Vec<u8>,
    #[serde(skip)]
    image_view_sampler: Option<ImageViewSampler>,
}

impl Texture2D {
    /// Empty RGBA8 color texture
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: 0,
            height: 0,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            texture_type: TextureType::Color,
            pixel_type: PixelType::RGBA8,
            mip_levels: 1,
            image_data: Vec::new(),
            image_view_sampler: None,
        }
    }

    /// Same address mode on every axis
    pub fn set_address_mode(&mut self, mode: AddressMode) {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
    }

    /// Byte length the pixel data must have
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_type.bytes_per_pixel()
    }

    /// Check the pixel data against the metadata
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.width == 0 || self.height == 0 {
            return Err(AssetError::InvalidTexture {
                url: self.url.clone(),
                reason: "zero extent".to_string(),
            });
        }
        if self.image_data.len() != self.expected_size() {
            return Err(AssetError::InvalidTexture {
                url: self.url.clone(),
                reason: format!(
                    "{} bytes of pixel data, {}x{} {} needs {}",
                    self.image_data.len(),
                    self.width,
                    self.height,
                    self.pixel_type,
                    self.expected_size()
                ),
            });
        }
        Ok(())
    }

    /// Upload the pixel data into a sampled GPU image
    ///
    /// IBL textures get a single mip level; other textures get a full chain
    /// when the format supports linear blits.
    pub fn inflate(&mut self, device: &DeviceRef) -> VulkanResult<()> {
        self.validate()?;
        let format = self.pixel_type.format();
        self.mip_levels = if self.texture_type == TextureType::Ibl || !device.supports_linear_blit(format) {
            1
        } else {
            mip_level_count(self.width, self.height)
        };

        let sampler = SamplerConfig {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            mip_levels: self.mip_levels,
            address_mode_u: self.address_mode_u.to_vk(),
            address_mode_v: self.address_mode_v.to_vk(),
            address_mode_w: self.address_mode_w.to_vk(),
        };
        let texture = create_image_view_sampler(
            device,
            self.width,
            self.height,
            &self.image_data,
            format,
            self.mip_levels,
            &sampler,
        )?;
        log::debug!("Inflated texture {} ({} mips)", self.url, self.mip_levels);
        self.image_view_sampler = Some(texture);
        Ok(())
    }

    /// GPU image, present after `inflate`
    pub fn image_view_sampler(&self) -> Option<&ImageViewSampler> {
        self.image_view_sampler.as_ref()
    }

    /// Release the GPU image, keeping the pixel data
    pub fn release_gpu(&mut self) {
        self.image_view_sampler = None;
    }
}

impl fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture2D")
            .field("url", &self.url)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("texture_type", &self.texture_type)
            .field("pixel_type", &self.pixel_type)
            .field("mip_levels", &self.mip_levels)
            .field("image_data_len", &self.image_data.len())
            .field("inflated", &self.image_view_sampler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{MockDevice, ObjectKind};
    use crate::render::vulkan::VulkanError;
    use std::sync::Arc;

    fn lut(size: u32) -> Texture2D {
        let mut texture = Texture2D::new("asset/test/lut.tex");
        texture.width = size;
        texture.height = size;
        texture.texture_type = TextureType::Ibl;
        texture.pixel_type = PixelType::RG16;
        texture.set_address_mode(AddressMode::ClampToEdge);
        texture.image_data = vec![0; texture.expected_size()];
        texture
    }

    #[test]
    fn test_pixel_tags() {
        let tags: Vec<String> = [
            PixelType::R8,
            PixelType::RG8,
            PixelType::RGBA8,
            PixelType::RG16,
            PixelType::RGBA16,
            PixelType::RGBA32,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(tags, vec!["R8", "RG8", "RGBA8", "RG16", "RGBA16", "RGBA32"]);
        assert_eq!(PixelType::RG16.format(), vk::Format::R16G16_SFLOAT);
        assert_eq!(PixelType::RG16.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_ibl_texture_inflates_single_mip() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let mut texture = lut(16);
        texture.inflate(&device).unwrap();
        assert_eq!(texture.mip_levels, 1);
        assert!(texture.image_view_sampler().is_some());
        assert_eq!(mock.live(ObjectKind::Sampler), 1);

        texture.release_gpu();
        assert_eq!(mock.total_live(), 0);
    }

    #[test]
    fn test_color_texture_gets_mip_chain() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let mut texture = Texture2D::new("asset/test/albedo.tex");
        texture.width = 64;
        texture.height = 32;
        texture.image_data = vec![255; texture.expected_size()];
        texture.inflate(&device).unwrap();
        assert_eq!(texture.mip_levels, 7);
    }

    #[test]
    fn test_color_texture_without_linear_blit_stays_single_mip() {
        let mock = Arc::new(MockDevice::new());
        mock.disable_linear_blit();
        let device: DeviceRef = mock.clone();
        let mut texture = Texture2D::new("asset/test/albedo.tex");
        texture.width = 8;
        texture.height = 8;
        texture.image_data = vec![255; texture.expected_size()];
        texture.inflate(&device).unwrap();
        assert_eq!(texture.mip_levels, 1);
    }

    #[test]
    fn test_size_mismatch_is_rejected_before_upload() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let mut texture = lut(8);
        texture.image_data.pop();
        let err = texture.inflate(&device).unwrap_err();
        assert!(matches!(err, VulkanError::Asset(AssetError::InvalidTexture { .. })));
        assert_eq!(mock.created(ObjectKind::Buffer), 0);
    }
}
