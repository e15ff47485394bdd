//! Image layout transition table and format predicates

use ash::vk;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Stage and access masks guarding one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Stages that must finish before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags,
    /// Writes made available by the barrier
    pub src_access: vk::AccessFlags,
    /// Accesses made visible by the barrier
    pub dst_access: vk::AccessFlags,
}

/// Look up the barrier masks for an `(old, new)` layout pair
///
/// Pure function over a fixed table. Pairs outside the table are rejected
/// instead of guessed.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (src_stage, dst_stage, src_access, dst_access) = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_WRITE)
        }
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::TOP_OF_PIPE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::empty(),
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (S::TRANSFER, S::FRAGMENT_SHADER, A::TRANSFER_WRITE, A::SHADER_READ)
        }
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (S::TRANSFER, S::TRANSFER, A::TRANSFER_WRITE, A::TRANSFER_READ)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (S::TRANSFER, S::FRAGMENT_SHADER, A::TRANSFER_READ, A::SHADER_READ)
        }
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (S::FRAGMENT_SHADER, S::TRANSFER, A::SHADER_READ, A::TRANSFER_READ)
        }
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => {
            (S::FRAGMENT_SHADER, S::TRANSFER, A::SHADER_READ, A::TRANSFER_WRITE)
        }
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            S::FRAGMENT_SHADER,
            A::COLOR_ATTACHMENT_WRITE,
            A::SHADER_READ,
        ),
        (old, new) => return Err(VulkanError::UnsupportedTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_stage,
        dst_stage,
        src_access,
        dst_access,
    })
}

/// Aspect mask a barrier into `new_layout` must cover for `format`
pub fn barrier_aspect(new_layout: vk::ImageLayout, format: vk::Format) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL || has_depth(format) {
        depth_aspect(format)
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Depth aspect, plus stencil when the format carries one
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Whether `format` has a stencil component
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Whether `format` has a depth component
pub fn has_depth(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Size in bytes of one texel of an uncompressed color format
pub fn format_texel_size(format: vk::Format) -> Option<u32> {
    use vk::Format as F;
    let size = match format {
        F::R8_UNORM | F::R8_SRGB => 1,
        F::R8G8_UNORM | F::R8G8_SRGB | F::R16_SFLOAT | F::R16_UNORM => 2,
        F::R8G8B8A8_UNORM
        | F::R8G8B8A8_SRGB
        | F::B8G8R8A8_UNORM
        | F::B8G8R8A8_SRGB
        | F::R16G16_SFLOAT
        | F::R16G16_UNORM
        | F::R32_SFLOAT
        | F::D32_SFLOAT
        | F::D24_UNORM_S8_UINT => 4,
        F::R16G16B16A16_SFLOAT | F::R32G32_SFLOAT => 8,
        F::R32G32B32A32_SFLOAT => 16,
        _ => return None,
    };
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transition_masks() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn test_readback_round_trip_masks_mirror_each_other() {
        let to_src = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        let back = transition_masks(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_src.src_stage, back.dst_stage);
        assert_eq!(to_src.dst_stage, back.src_stage);
        assert_eq!(to_src.src_access, back.dst_access);
        assert_eq!(to_src.dst_access, back.src_access);
    }

    #[test]
    fn test_transition_lookup_is_deterministic() {
        let layouts = [
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ];
        let mut supported = 0;
        for &old in &layouts {
            for &new in &layouts {
                match (transition_masks(old, new), transition_masks(old, new)) {
                    (Ok(a), Ok(b)) => {
                        assert_eq!(a, b);
                        supported += 1;
                    }
                    (Err(VulkanError::UnsupportedTransition { old: o, new: n }), Err(_)) => {
                        assert_eq!((o, n), (old, new));
                    }
                    other => panic!("inconsistent lookup for {:?} -> {:?}: {:?}", old, new, other),
                }
            }
        }
        assert_eq!(supported, 9);
    }

    #[test]
    fn test_unsupported_pair_is_rejected() {
        let err = transition_masks(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, VulkanError::UnsupportedTransition { .. }));
    }

    #[test]
    fn test_stencil_predicate() {
        assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil(vk::Format::D32_SFLOAT));
        assert!(!has_stencil(vk::Format::R16G16_SFLOAT));
    }

    #[test]
    fn test_barrier_aspect() {
        assert_eq!(
            barrier_aspect(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            barrier_aspect(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(format_texel_size(vk::Format::R16G16_SFLOAT), Some(4));
        assert_eq!(format_texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(format_texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }
}
