use ash::vk;

use crate::graphics_hardware_interface::{self, ClearValue, DescriptorType, Encodings, Formats, IndexTypes, PipelineBindPoints, ResourceStates, Stages};
use crate::transition::{Transition, TransitionKinds};

/// Access, stages and layout of a resource in one state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) struct NativeState {
	pub(super) access: vk::AccessFlags2,
	pub(super) stages: vk::PipelineStageFlags2,
	pub(super) layout: vk::ImageLayout,
}

fn shader_stages(ray_tracing: bool) -> vk::PipelineStageFlags2 {
	let stages = vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER;
	if ray_tracing { stages | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR } else { stages }
}

/// Translates a resource state. `format` is `None` for buffers. `general` marks textures that can be written from shaders,
/// those are read through the general layout so read and unordered access share one representation.
/// Returns `None` if the state can't be used on this device.
pub(super) fn to_native_state(state: ResourceStates, format: Option<Formats>, general: bool, ray_tracing: bool) -> Option<NativeState> {
	let depth = format.map_or(false, |format| format.is_depth());
	let stencil = format.map_or(false, |format| format.has_stencil());

	let (access, stages, layout) = match state {
		ResourceStates::Undefined => (vk::AccessFlags2::NONE, vk::PipelineStageFlags2::NONE, vk::ImageLayout::UNDEFINED),
		ResourceStates::Common => (vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE, vk::PipelineStageFlags2::ALL_COMMANDS, vk::ImageLayout::GENERAL),
		ResourceStates::VertexBuffer => (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, vk::ImageLayout::UNDEFINED),
		ResourceStates::IndexBuffer => (vk::AccessFlags2::INDEX_READ, vk::PipelineStageFlags2::INDEX_INPUT, vk::ImageLayout::UNDEFINED),
		ResourceStates::ConstantBuffer => (vk::AccessFlags2::UNIFORM_READ, shader_stages(ray_tracing), vk::ImageLayout::UNDEFINED),
		ResourceStates::ColorWrite => (vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
		ResourceStates::DepthWrite => (
			vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
			vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
			if stencil { vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL } else { vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL },
		),
		ResourceStates::DepthRead => (
			vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_SAMPLED_READ,
			vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS | shader_stages(ray_tracing),
			if stencil { vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL } else { vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL },
		),
		ResourceStates::ShaderRead => {
			let layout = if format.is_none() {
				vk::ImageLayout::UNDEFINED
			} else if general {
				vk::ImageLayout::GENERAL
			} else if depth {
				vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
			} else {
				vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
			};

			(vk::AccessFlags2::SHADER_READ, shader_stages(ray_tracing), layout)
		}
		ResourceStates::UnorderedAccess => (vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE, shader_stages(ray_tracing), if format.is_some() { vk::ImageLayout::GENERAL } else { vk::ImageLayout::UNDEFINED }),
		ResourceStates::IndirectArgument => (vk::AccessFlags2::INDIRECT_COMMAND_READ, vk::PipelineStageFlags2::DRAW_INDIRECT, vk::ImageLayout::UNDEFINED),
		ResourceStates::CopySource => (vk::AccessFlags2::TRANSFER_READ, vk::PipelineStageFlags2::COPY, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
		ResourceStates::CopyDestination => (vk::AccessFlags2::TRANSFER_WRITE, vk::PipelineStageFlags2::COPY, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
		ResourceStates::Present => (vk::AccessFlags2::NONE, vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::ImageLayout::PRESENT_SRC_KHR),
		ResourceStates::AccelerationStructure => {
			if !ray_tracing { return None; }

			(
				vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
				vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
				vk::ImageLayout::UNDEFINED,
			)
		}
	};

	Some(NativeState { access, stages, layout })
}

/// Source and destination halves of a barrier.
/// Presentation barriers only order against the presentation engine, so they are scoped to the ends of the pipe.
pub(super) fn to_barrier_states(transition: &Transition, format: Option<Formats>, general: bool, ray_tracing: bool) -> Option<(NativeState, NativeState)> {
	let mut source = to_native_state(transition.previous, format, general, ray_tracing)?;
	let mut destination = to_native_state(transition.next, format, general, ray_tracing)?;

	if transition.kind == TransitionKinds::Presentation {
		if transition.previous == ResourceStates::Present {
			source.access = vk::AccessFlags2::NONE;
			source.stages = vk::PipelineStageFlags2::TOP_OF_PIPE;
		} else {
			destination.access = vk::AccessFlags2::NONE;
			destination.stages = vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
		}
	}

	if transition.previous == ResourceStates::Undefined {
		source.stages = vk::PipelineStageFlags2::TOP_OF_PIPE;
	}

	Some((source, destination))
}

#[derive(Clone, Copy, Debug)]
pub(super) enum NativeBarrier {
	/// Execution and memory dependency without a layout transition.
	Memory(vk::MemoryBarrier2<'static>),
	Image(vk::ImageMemoryBarrier2<'static>),
	Buffer(vk::BufferMemoryBarrier2<'static>),
}

pub(super) fn texture_barrier(image: vk::Image, format: Formats, mip_levels: u32, array_layers: u32, transition: &Transition, general: bool, ray_tracing: bool) -> Option<NativeBarrier> {
	let (source, destination) = to_barrier_states(transition, Some(format), general, ray_tracing)?;

	// Buffer only states have no image layout, and an image can't be moved back to undefined.
	if destination.layout == vk::ImageLayout::UNDEFINED { return None; }
	if source.layout == vk::ImageLayout::UNDEFINED && transition.previous != ResourceStates::Undefined { return None; }

	if transition.kind == TransitionKinds::General {
		return Some(NativeBarrier::Memory(vk::MemoryBarrier2::default()
			.src_stage_mask(source.stages)
			.src_access_mask(source.access)
			.dst_stage_mask(destination.stages)
			.dst_access_mask(destination.access)
		));
	}

	Some(NativeBarrier::Image(vk::ImageMemoryBarrier2::default()
		.src_stage_mask(source.stages)
		.src_access_mask(source.access)
		.old_layout(source.layout)
		.dst_stage_mask(destination.stages)
		.dst_access_mask(destination.access)
		.new_layout(destination.layout)
		.src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
		.dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
		.image(image)
		.subresource_range(vk::ImageSubresourceRange {
			aspect_mask: to_image_aspect(format),
			base_mip_level: 0,
			level_count: mip_levels,
			base_array_layer: 0,
			layer_count: array_layers,
		})
	))
}

pub(super) fn buffer_barrier(buffer: vk::Buffer, transition: &Transition, ray_tracing: bool) -> Option<NativeBarrier> {
	let (source, destination) = to_barrier_states(transition, None, false, ray_tracing)?;

	if transition.kind == TransitionKinds::General {
		return Some(NativeBarrier::Memory(vk::MemoryBarrier2::default()
			.src_stage_mask(source.stages)
			.src_access_mask(source.access)
			.dst_stage_mask(destination.stages)
			.dst_access_mask(destination.access)
		));
	}

	Some(NativeBarrier::Buffer(vk::BufferMemoryBarrier2::default()
		.src_stage_mask(source.stages)
		.src_access_mask(source.access)
		.dst_stage_mask(destination.stages)
		.dst_access_mask(destination.access)
		.src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
		.dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
		.buffer(buffer)
		.offset(0)
		.size(vk::WHOLE_SIZE)
	))
}

pub(super) fn to_image_aspect(format: Formats) -> vk::ImageAspectFlags {
	match format {
		Formats::Depth32 => vk::ImageAspectFlags::DEPTH,
		Formats::Depth24Stencil8 => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
		_ => vk::ImageAspectFlags::COLOR,
	}
}

pub(super) fn to_clear_value(clear: ClearValue) -> vk::ClearValue {
	match clear {
		ClearValue::None => vk::ClearValue::default(),
		ClearValue::Color(clear) => vk::ClearValue { color: vk::ClearColorValue { float32: [clear.r, clear.g, clear.b, clear.a], }, },
		ClearValue::Depth(clear) => vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: clear, stencil: 0, }, },
		ClearValue::Integer(r, g, b, a) => vk::ClearValue { color: vk::ClearColorValue { uint32: [r, g, b, a], }, },
	}
}

pub(super) fn to_load_operation(value: bool) -> vk::AttachmentLoadOp {	if value { vk::AttachmentLoadOp::LOAD } else { vk::AttachmentLoadOp::CLEAR } }

pub(super) fn to_store_operation(value: bool) -> vk::AttachmentStoreOp { if value { vk::AttachmentStoreOp::STORE } else { vk::AttachmentStoreOp::DONT_CARE } }

pub(super) fn to_format(format: Formats) -> vk::Format {
	match format {
		Formats::R8(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::UNDEFINED }
				Encodings::UnsignedNormalized => { vk::Format::R8_UNORM }
				Encodings::SignedNormalized => { vk::Format::R8_SNORM }
				Encodings::sRGB => { vk::Format::R8_SRGB }
			}
		}
		Formats::R16(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::R16_SFLOAT }
				Encodings::UnsignedNormalized => { vk::Format::R16_UNORM }
				Encodings::SignedNormalized => { vk::Format::R16_SNORM }
				Encodings::sRGB => { vk::Format::UNDEFINED }
			}
		}
		Formats::R32(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::R32_SFLOAT }
				Encodings::UnsignedNormalized => { vk::Format::R32_UINT }
				Encodings::SignedNormalized => { vk::Format::R32_SINT }
				Encodings::sRGB => { vk::Format::UNDEFINED }
			}
		}
		Formats::RG8(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::UNDEFINED }
				Encodings::UnsignedNormalized => { vk::Format::R8G8_UNORM }
				Encodings::SignedNormalized => { vk::Format::R8G8_SNORM }
				Encodings::sRGB => { vk::Format::R8G8_SRGB }
			}
		}
		Formats::RG16(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::R16G16_SFLOAT }
				Encodings::UnsignedNormalized => { vk::Format::R16G16_UNORM }
				Encodings::SignedNormalized => { vk::Format::R16G16_SNORM }
				Encodings::sRGB => { vk::Format::UNDEFINED }
			}
		}
		Formats::RGBA8(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::UNDEFINED }
				Encodings::UnsignedNormalized => { vk::Format::R8G8B8A8_UNORM }
				Encodings::SignedNormalized => { vk::Format::R8G8B8A8_SNORM }
				Encodings::sRGB => { vk::Format::R8G8B8A8_SRGB }
			}
		}
		Formats::RGBA16(encoding) => {
			match encoding {
				Encodings::FloatingPoint => { vk::Format::R16G16B16A16_SFLOAT }
				Encodings::UnsignedNormalized => { vk::Format::R16G16B16A16_UNORM }
				Encodings::SignedNormalized => { vk::Format::R16G16B16A16_SNORM }
				Encodings::sRGB => { vk::Format::UNDEFINED }
			}
		}
		Formats::RGBu10u10u11 => vk::Format::B10G11R11_UFLOAT_PACK32,
		Formats::BGRAu8 => vk::Format::B8G8R8A8_UNORM,
		Formats::BGRAsRGB => vk::Format::B8G8R8A8_SRGB,
		Formats::Depth32 => vk::Format::D32_SFLOAT,
		Formats::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
		Formats::U32 => vk::Format::R32_UINT,
	}
}

pub(super) fn to_descriptor_type(descriptor_type: DescriptorType) -> vk::DescriptorType {
	match descriptor_type {
		DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
		DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
		DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
		DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
		DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
	}
}

pub(super) fn to_shader_stage_flags(stages: Stages) -> vk::ShaderStageFlags {
	let mut flags = vk::ShaderStageFlags::empty();

	if stages.contains(Stages::VERTEX) { flags |= vk::ShaderStageFlags::VERTEX; }
	if stages.contains(Stages::TASK) { flags |= vk::ShaderStageFlags::TASK_EXT; }
	if stages.contains(Stages::MESH) { flags |= vk::ShaderStageFlags::MESH_EXT; }
	if stages.contains(Stages::FRAGMENT) { flags |= vk::ShaderStageFlags::FRAGMENT; }
	if stages.contains(Stages::COMPUTE) { flags |= vk::ShaderStageFlags::COMPUTE; }
	if stages.contains(Stages::RAYGEN) { flags |= vk::ShaderStageFlags::RAYGEN_KHR; }
	if stages.contains(Stages::CLOSEST_HIT) { flags |= vk::ShaderStageFlags::CLOSEST_HIT_KHR; }
	if stages.contains(Stages::ANY_HIT) { flags |= vk::ShaderStageFlags::ANY_HIT_KHR; }
	if stages.contains(Stages::INTERSECTION) { flags |= vk::ShaderStageFlags::INTERSECTION_KHR; }
	if stages.contains(Stages::MISS) { flags |= vk::ShaderStageFlags::MISS_KHR; }
	if stages.contains(Stages::CALLABLE) { flags |= vk::ShaderStageFlags::CALLABLE_KHR; }

	flags
}

pub(super) fn to_pipeline_bind_point(bind_point: PipelineBindPoints) -> vk::PipelineBindPoint {
	match bind_point {
		PipelineBindPoints::Graphics => vk::PipelineBindPoint::GRAPHICS,
		PipelineBindPoints::Compute => vk::PipelineBindPoint::COMPUTE,
		PipelineBindPoints::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
	}
}

pub(super) fn to_index_type(index_type: IndexTypes) -> vk::IndexType {
	match index_type {
		IndexTypes::U16 => vk::IndexType::UINT16,
		IndexTypes::U32 => vk::IndexType::UINT32,
	}
}

pub(super) fn to_extent_3d(extent: utils::Extent) -> vk::Extent3D {
	vk::Extent3D { width: extent.width(), height: extent.height(), depth: extent.depth() }
}

pub(super) fn to_viewport(viewport: &graphics_hardware_interface::Viewport) -> vk::Viewport {
	// Negative height, +Y points up.
	vk::Viewport { x: viewport.x, y: viewport.y + viewport.height, width: viewport.width, height: -viewport.height, min_depth: viewport.min_depth, max_depth: viewport.max_depth }
}

pub(super) fn to_rect(rect: &graphics_hardware_interface::Rect) -> vk::Rect2D {
	vk::Rect2D { offset: vk::Offset2D { x: rect.x, y: rect.y }, extent: vk::Extent2D { width: rect.width, height: rect.height } }
}
