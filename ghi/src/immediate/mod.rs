//! # Immediate backend
//!
//! Serves native APIs without command buffers. Command lists record into a tape which the queue replays
//! on the thread owning the immediate context.

pub mod fence;
pub mod queue;
pub mod tape;
pub mod utils;

pub use fence::CpuFence;
pub use queue::ImmediateQueue;
pub use tape::{Command, CommandTape, EmulatedCommandList};
pub use self::utils::BindFlags;

use crate::graphics_hardware_interface::{BufferBinding, BufferHandle, Capabilities, Descriptor, DescriptorType, FrameBuffer, IndexBufferBinding, Pipeline, QueryPoolHandle, Rect, ResourceHandle, ShaderBindingTables, TextureCopyRegion, TextureHandle, Viewport};
use crate::swap_chain::PresentSurface;

/// Consecutive descriptor slots of one type, bound with a single native call.
#[derive(Clone, PartialEq, Debug)]
pub struct DescriptorRange {
	pub descriptor_type: DescriptorType,
	pub first_slot: u32,
	pub descriptors: Vec<Descriptor>,
}

/// The native immediate context. Every call takes effect right away, in call order.
pub trait ImmediateContext {
	/// Optional functionality of the context. None by default.
	fn capabilities(&self) -> Capabilities { Capabilities::default() }

	fn set_pipeline(&mut self, pipeline: &Pipeline);

	fn bind_descriptors(&mut self, pipeline: &Pipeline, ranges: &[DescriptorRange]);

	fn set_viewports(&mut self, viewports: &[Viewport]);

	fn set_scissors(&mut self, scissors: &[Rect]);

	fn set_blend_constants(&mut self, constants: [f32; 4]);

	fn set_stencil_reference(&mut self, reference: u32);

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]);

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding);

	fn set_constants(&mut self, pipeline: &Pipeline, offset: u32, data: &[u8]);

	/// Binds the attachments of `frame_buffer`, clearing the ones that don't load their contents.
	fn set_render_targets(&mut self, frame_buffer: &FrameBuffer);

	fn unset_render_targets(&mut self);

	/// Moves `resource` to the given bind points, detaching it from conflicting ones.
	fn transition_resource(&mut self, resource: ResourceHandle, flags: BindFlags);

	fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

	fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32);

	/// Issues a single draw with arguments read from `buffer`.
	fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64);

	/// Issues a single indexed draw with arguments read from `buffer`.
	fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64);

	fn dispatch(&mut self, x: u32, y: u32, z: u32);

	fn dispatch_indirect(&mut self, buffer: BufferHandle, offset: u64);

	fn dispatch_mesh(&mut self, _x: u32, _y: u32, _z: u32) {
		log::warn!("Mesh shading is not supported by this context.");
	}

	fn dispatch_mesh_indirect(&mut self, _buffer: BufferHandle, _offset: u64) {
		log::warn!("Mesh shading is not supported by this context.");
	}

	fn trace_rays(&mut self, _tables: &ShaderBindingTables, _width: u32, _height: u32, _depth: u32) {
		log::warn!("Ray tracing is not supported by this context.");
	}

	fn copy_texture_region(&mut self, source: TextureHandle, destination: TextureHandle, region: &TextureCopyRegion);

	fn copy_buffer_region(&mut self, source: BufferHandle, source_offset: u64, destination: BufferHandle, destination_offset: u64, size: u64);

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32);

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32);

	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: BufferHandle, offset: u64);

	fn begin_event(&mut self, name: &str);

	fn end_event(&mut self);

	/// Hands all issued work to the driver.
	fn flush(&mut self);

	/// Blocks until the driver has drained all issued work.
	fn wait_idle(&mut self) -> bool;
}

/// A presentation target driven by an immediate context.
pub trait ImmediateSurface: PresentSurface {
	/// Presents the current backbuffer and moves on to the next one.
	fn present(&mut self) -> bool;

	/// The backbuffer the next frame renders into.
	fn current_buffer_index(&self) -> u32;
}
