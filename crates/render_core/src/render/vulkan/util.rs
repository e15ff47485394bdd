//! Image upload, layout transition and mip chain helpers
//!
//! Every public function here runs inside its own instant command context and
//! returns only once the device has executed the work. The `record_*` variants
//! write into an existing recorder instead, for callers that batch.

use ash::vk;
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{color_layers, submit_instant_commands, CommandRecorder, ImageBarrier};
use crate::render::vulkan::image::{Image, ImageConfig, ImageView, ImageViewSampler, SamplerConfig};
use crate::render::vulkan::transitions::{barrier_aspect, format_texel_size, transition_masks};
use crate::render::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Number of levels in a full mip chain for `width` x `height`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Record a layout transition barrier over `level_count` mips starting at `base_mip`
pub fn record_transition(
    recorder: &mut CommandRecorder<'_>,
    image: vk::Image,
    format: vk::Format,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    base_mip: u32,
    level_count: u32,
) -> VulkanResult<()> {
    let masks = transition_masks(old_layout, new_layout)?;
    let barrier = ImageBarrier {
        image,
        old_layout,
        new_layout,
        src_access: masks.src_access,
        dst_access: masks.dst_access,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: barrier_aspect(new_layout, format),
            base_mip_level: base_mip,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        },
    };
    recorder.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    Ok(())
}

/// Transition every mip level of `image` from `old_layout` to `new_layout`
pub fn transition_image_layout(
    device: &DeviceRef,
    image: vk::Image,
    format: vk::Format,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
) -> VulkanResult<()> {
    // Reject before a command buffer is allocated.
    transition_masks(old_layout, new_layout)?;
    submit_instant_commands(device, |recorder| {
        record_transition(recorder, image, format, old_layout, new_layout, 0, mip_levels)
    })
}

/// Copy a tightly packed buffer into mip 0 of an image in `TRANSFER_DST_OPTIMAL`
pub fn copy_buffer_to_image(
    device: &DeviceRef,
    buffer: &Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> VulkanResult<()> {
    submit_instant_commands(device, |recorder| {
        recorder.copy_buffer_to_image(buffer.handle(), image, width, height);
        Ok(())
    })
}

/// Record the successive half-resolution blits of a mip chain
///
/// Expects every level in `TRANSFER_DST_OPTIMAL` with level 0 filled. Leaves
/// the last level in `SHADER_READ_ONLY_OPTIMAL` and all others in
/// `TRANSFER_SRC_OPTIMAL`.
pub fn record_image_mipmaps(
    recorder: &mut CommandRecorder<'_>,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> VulkanResult<()> {
    let to_offset = |extent: u32| {
        i32::try_from(extent)
            .map_err(|_| VulkanError::invalid(format!("mip chain extent {} exceeds the blit offset range", extent)))
    };
    let mut mip_width = to_offset(width)?;
    let mut mip_height = to_offset(height)?;

    for level in 1..mip_levels {
        record_transition(
            recorder,
            image,
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            level - 1,
            1,
        )?;

        let next_width = (mip_width / 2).max(1);
        let next_height = (mip_height / 2).max(1);
        let blit = vk::ImageBlit::builder()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
            ])
            .src_subresource(color_layers(level - 1))
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: next_width, y: next_height, z: 1 },
            ])
            .dst_subresource(color_layers(level))
            .build();
        recorder.blit_image(image, image, blit, vk::Filter::LINEAR);

        mip_width = next_width;
        mip_height = next_height;
    }

    record_transition(
        recorder,
        image,
        format,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        mip_levels.saturating_sub(1),
        1,
    )
}

/// Generate a full mip chain from level 0
///
/// Fails with [`VulkanError::UnsupportedFormat`] when the format cannot be
/// blitted with linear filtering.
pub fn create_image_mipmaps(
    device: &DeviceRef,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> VulkanResult<()> {
    if !device.supports_linear_blit(format) {
        return Err(VulkanError::UnsupportedFormat {
            format,
            reason: "texture image format does not support linear blitting".to_string(),
        });
    }
    submit_instant_commands(device, |recorder| {
        record_image_mipmaps(recorder, image, format, width, height, mip_levels)
    })
}

/// Allocate an image
pub fn create_image(device: &DeviceRef, config: ImageConfig) -> VulkanResult<Image> {
    Image::new(device, config)
}

/// Allocate an image with a view over all of its mips
pub fn create_image_and_view(device: &DeviceRef, config: ImageConfig) -> VulkanResult<ImageView> {
    ImageView::new(device, config)
}

/// Upload `data` into a new sampled image and wrap it with a view and sampler
///
/// The image ends up in `SHADER_READ_ONLY_OPTIMAL` on every level. With more
/// than one mip level the chain is generated on the device.
pub fn create_image_view_sampler(
    device: &DeviceRef,
    width: u32,
    height: u32,
    data: &[u8],
    format: vk::Format,
    mip_levels: u32,
    sampler: &SamplerConfig,
) -> VulkanResult<ImageViewSampler> {
    if let Some(texel) = format_texel_size(format) {
        let expected = width as usize * height as usize * texel as usize;
        if data.len() < expected {
            return Err(VulkanError::invalid(format!(
                "texture data has {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
    }
    let mip_levels = mip_levels.max(1);
    if mip_levels > 1 && !device.supports_linear_blit(format) {
        return Err(VulkanError::UnsupportedFormat {
            format,
            reason: "texture image format does not support linear blitting".to_string(),
        });
    }

    let staging = Buffer::staging(device, data)?;
    let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
    if mip_levels > 1 {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    let image = Image::new(
        device,
        ImageConfig::new(width, height, format)
            .mip_levels(mip_levels)
            .usage(usage),
    )?;

    transition_image_layout(
        device,
        image.handle(),
        format,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        mip_levels,
    )?;
    copy_buffer_to_image(device, &staging, image.handle(), width, height)?;

    if mip_levels > 1 {
        create_image_mipmaps(device, image.handle(), format, width, height, mip_levels)?;
        // Bring the source levels in line with the last one.
        transition_image_layout(
            device,
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            mip_levels - 1,
        )?;
    } else {
        transition_image_layout(
            device,
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            1,
        )?;
    }
    drop(staging);

    ImageViewSampler::from_image(image, sampler)
}
