//! # Command List
//!
//! Recording state machine and descriptor binding shared by the backends that own native command buffers.
//! The native side is reached through the `CommandEncoder` trait, this module decides what gets recorded and when.

use std::sync::Arc;

use utils::Extent;

use crate::descriptor_heap::{DescriptorHeap, DescriptorTable};
use crate::graphics_hardware_interface::{Buffer, BufferBinding, BufferHandle, Capabilities, CommandList, Descriptor, DescriptorSetLayout, DescriptorWrite, FrameBuffer, IndexBufferBinding, Pipeline, QueryPoolHandle, Rect, RecordingStates, ResourceStates, SamplerHandle, ShaderBindingTables, Texture, TextureCopyRegion, View, Viewport, DEFAULT_BLEND_CONSTANTS, MAX_DESCRIPTORS};
use crate::queue::Submittable;
use crate::transition::Transition;

/// Last descriptor set on every slot, written to the native descriptor representation right before the next draw or dispatch.
#[derive(Clone, Debug)]
pub struct DescriptorBindingCache {
	entries: [Option<Descriptor>; MAX_DESCRIPTORS],
	dirty: bool,
}

impl DescriptorBindingCache {
	pub fn new() -> Self {
		Self {
			entries: [None; MAX_DESCRIPTORS],
			dirty: false,
		}
	}

	/// Stores `descriptor` in `slot` and marks the cache dirty. Returns false if the slot is out of range.
	pub fn set(&mut self, slot: u32, descriptor: Descriptor) -> bool {
		match self.entries.get_mut(slot as usize) {
			Some(entry) => {
				*entry = Some(descriptor);
				self.dirty = true;
				true
			}
			None => {
				log::error!("Descriptor slot {} is out of range. Only {} slots are available.", slot, MAX_DESCRIPTORS);
				false
			}
		}
	}

	pub fn get(&self, slot: u32) -> Option<&Descriptor> {
		self.entries.get(slot as usize).and_then(|entry| entry.as_ref())
	}

	pub fn is_dirty(&self) -> bool { self.dirty }

	pub fn mark_dirty(&mut self) { self.dirty = true; }

	/// Forgets every descriptor.
	pub fn clear(&mut self) {
		self.entries = [None; MAX_DESCRIPTORS];
		self.dirty = false;
	}

	/// Collects the descriptors `layout` reads. Slots with nothing bound, or with a descriptor of the wrong kind, are left out.
	pub fn writes(&self, layout: &DescriptorSetLayout) -> Vec<DescriptorWrite> {
		let mut writes = Vec::with_capacity(layout.descriptor_count() as usize);

		for binding in layout.bindings() {
			for array_element in 0..binding.descriptor_count {
				let slot = binding.binding + array_element;

				let Some(descriptor) = self.get(slot) else { continue; };

				if !descriptor.is_compatible(binding.descriptor_type) {
					log::warn!("Descriptor in slot {} doesn't match the {:?} binding of the bound layout. Skipping it.", slot, binding.descriptor_type);
					continue;
				}

				writes.push(DescriptorWrite { binding: binding.binding, array_element, descriptor_type: binding.descriptor_type, descriptor: *descriptor });
			}
		}

		writes
	}

	/// Returns the writes to issue if the cache is dirty and a layout is bound, and marks it clean.
	/// Without a layout the cache stays dirty until one is bound.
	pub fn flush(&mut self, layout: Option<&DescriptorSetLayout>) -> Option<Vec<DescriptorWrite>> {
		if !self.dirty { return None; }

		let layout = layout?;

		self.dirty = false;

		Some(self.writes(layout))
	}
}

impl Default for DescriptorBindingCache {
	fn default() -> Self { Self::new() }
}

/// How a batch of descriptors reaches the native command buffer.
pub enum DescriptorUpdate<'a> {
	/// Pushed inline into the command buffer.
	Push(&'a [DescriptorWrite]),
	/// Written into a table of the descriptor heap which is then bound.
	Table(&'a DescriptorTable),
}

/// The native command buffer of an explicit backend.
/// Implementations record exactly what they are told, validation happens in `ExplicitCommandList`.
pub trait CommandEncoder {
	type Submission;

	fn capabilities(&self) -> Capabilities;

	/// Resets the native command buffer and starts recording into it.
	fn begin(&mut self) -> bool;

	fn end(&mut self) -> bool;

	/// The native object the queue executes.
	fn submission(&self) -> Self::Submission;

	fn bind_pipeline(&mut self, pipeline: &Pipeline);

	/// Issues one native descriptor update for the bound pipeline.
	fn update_descriptors(&mut self, pipeline: &Pipeline, update: DescriptorUpdate<'_>);

	fn set_viewports(&mut self, viewports: &[Viewport]);

	fn set_scissors(&mut self, scissors: &[Rect]);

	fn set_blend_constants(&mut self, constants: [f32; 4]);

	fn set_stencil_reference(&mut self, reference: u32);

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]);

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding);

	fn set_constants(&mut self, pipeline: &Pipeline, offset: u32, data: &[u8]);

	/// Starts rendering into the frame buffer. Returns false if nothing was recorded.
	fn begin_rendering(&mut self, frame_buffer: &FrameBuffer) -> bool;

	fn end_rendering(&mut self);

	/// Records a single barrier for a transition which is not a no-op.
	fn texture_barrier(&mut self, texture: &Texture, transition: Transition);

	/// Records a single barrier for a transition which is not a no-op.
	fn buffer_barrier(&mut self, buffer: &Buffer, transition: Transition);

	fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

	fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32);

	fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32);

	fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32);

	fn dispatch(&mut self, x: u32, y: u32, z: u32);

	fn dispatch_indirect(&mut self, buffer: BufferHandle, offset: u64);

	fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32);

	fn dispatch_mesh_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32);

	fn trace_rays(&mut self, tables: &ShaderBindingTables, width: u32, height: u32, depth: u32);

	fn copy_texture_region(&mut self, source: &Texture, destination: &Texture, region: &TextureCopyRegion);

	fn copy_buffer_region(&mut self, source: BufferHandle, source_offset: u64, destination: BufferHandle, destination_offset: u64, size: u64);

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32);

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32);

	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: BufferHandle, offset: u64);

	fn begin_event(&mut self, name: &str);

	fn end_event(&mut self);
}

/// Recording state of a command list, with the checks every operation runs before recording.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordingTracker {
	pub(crate) state: RecordingStates,
}

impl RecordingTracker {
	pub(crate) fn new() -> Self {
		Self { state: RecordingStates::Initial }
	}

	/// Only fresh or closed command lists can start recording.
	pub(crate) fn can_begin(&self) -> bool {
		if matches!(self.state, RecordingStates::Recording | RecordingStates::RenderPass) {
			log::error!("Command list is already recording.");
			return false;
		}

		true
	}

	pub(crate) fn recording(&self, operation: &str) -> bool {
		match self.state {
			RecordingStates::Recording | RecordingStates::RenderPass => true,
			_ => {
				log::error!("`{}` recorded while the command list is {:?}. Ignoring it.", operation, self.state);
				false
			}
		}
	}

	pub(crate) fn render_pass(&self, operation: &str) -> bool {
		if self.state == RecordingStates::RenderPass {
			true
		} else {
			log::error!("`{}` requires a bound frame buffer but the command list is {:?}. Ignoring it.", operation, self.state);
			false
		}
	}

	pub(crate) fn outside_render_pass(&self, operation: &str) -> bool {
		if self.state == RecordingStates::Recording {
			true
		} else {
			log::error!("`{}` can't be recorded while the command list is {:?}. Ignoring it.", operation, self.state);
			false
		}
	}
}

/// A command list recording into a native command buffer.
/// Descriptors are pushed when the encoder supports it, otherwise they are written into tables carved out of a shared descriptor heap.
/// Work that can't run while rendering splits the native rendering of the bound frame buffer, which is resumed at the next draw.
pub struct ExplicitCommandList<E: CommandEncoder> {
	encoder: E,
	tracker: RecordingTracker,
	submitted: bool,
	frame_buffer: Option<FrameBuffer>,
	/// Whether the native command buffer is inside a rendering scope.
	rendering: bool,
	pipeline: Option<Pipeline>,
	cache: DescriptorBindingCache,
	descriptor_heap: Option<Arc<DescriptorHeap>>,
	tables: Vec<DescriptorTable>,
	event_depth: u32,
}

impl<E: CommandEncoder> ExplicitCommandList<E> {
	/// Wraps an encoder. A descriptor heap is required if the encoder can't push descriptors.
	pub fn new(encoder: E, descriptor_heap: Option<Arc<DescriptorHeap>>) -> Result<Self, &'static str> {
		if !encoder.capabilities().push_descriptor && descriptor_heap.is_none() {
			return Err("A descriptor heap is required when descriptors can't be pushed");
		}

		Ok(Self {
			encoder,
			tracker: RecordingTracker::new(),
			submitted: false,
			frame_buffer: None,
			rendering: false,
			pipeline: None,
			cache: DescriptorBindingCache::new(),
			descriptor_heap,
			tables: Vec::new(),
			event_depth: 0,
		})
	}

	pub fn encoder(&self) -> &E { &self.encoder }

	fn release_tables(&mut self) {
		if let Some(heap) = &self.descriptor_heap {
			for table in self.tables.drain(..) {
				heap.free_table(table);
			}
		}
	}

	/// Ends native rendering before work that can't be recorded inside it.
	fn suspend_rendering(&mut self) {
		if !self.rendering { return; }

		if self.frame_buffer.as_ref().map_or(false, FrameBuffer::discards) {
			log::warn!("Rendering is split while attachments don't store their contents. Their contents are lost at the split.");
		}

		self.encoder.end_rendering();
		self.rendering = false;
	}

	/// Makes sure the native command buffer is rendering into the bound frame buffer. Returns false if the work must be skipped.
	fn resume_rendering(&mut self, operation: &str) -> bool {
		if self.rendering { return true; }

		let Some(frame_buffer) = &self.frame_buffer else {
			log::error!("`{}` needs a bound frame buffer on this backend. Ignoring it.", operation);
			return false;
		};

		if !self.encoder.begin_rendering(&frame_buffer.resumed()) {
			log::error!("Failed to resume rendering for `{}`. Ignoring it.", operation);
			return false;
		}

		self.rendering = true;

		true
	}

	/// Writes the dirty descriptor cache as one native update. Returns false if the work that needs the descriptors must be skipped.
	fn flush_descriptors(&mut self) -> bool {
		let Some(pipeline) = &self.pipeline else {
			return true;
		};

		let Some(writes) = self.cache.flush(Some(pipeline.layout())) else {
			return true;
		};

		if writes.is_empty() { return true; }

		if self.encoder.capabilities().push_descriptor {
			self.encoder.update_descriptors(pipeline, DescriptorUpdate::Push(&writes));
			return true;
		}

		let Some(heap) = &self.descriptor_heap else {
			return false;
		};

		match heap.allocate_table(pipeline.layout.descriptor_count(), writes) {
			Some(table) => {
				self.encoder.update_descriptors(pipeline, DescriptorUpdate::Table(&table));
				self.tables.push(table);
				true
			}
			None => {
				// Leave the cache dirty so a later draw can retry once tables are returned.
				self.cache.mark_dirty();
				false
			}
		}
	}
}

impl<E: CommandEncoder> Drop for ExplicitCommandList<E> {
	fn drop(&mut self) {
		self.release_tables();
	}
}

impl<E: CommandEncoder> CommandList for ExplicitCommandList<E> {
	fn state(&self) -> RecordingStates { self.tracker.state }

	fn begin(&mut self) -> bool {
		if !self.tracker.can_begin() { return false; }

		self.release_tables();

		if !self.encoder.begin() {
			log::error!("Failed to begin the native command buffer.");
			self.tracker.state = RecordingStates::Initial;
			return false;
		}

		self.tracker.state = RecordingStates::Recording;
		self.submitted = false;
		self.frame_buffer = None;
		self.rendering = false;
		self.pipeline = None;
		self.cache.clear();
		self.event_depth = 0;

		self.encoder.set_viewports(&[Viewport::from_extent(Extent::square(1))]);
		self.encoder.set_scissors(&[Rect::from_extent(Extent::square(1))]);
		self.encoder.set_blend_constants(DEFAULT_BLEND_CONSTANTS);
		self.encoder.set_stencil_reference(0);

		true
	}

	fn end(&mut self) -> bool {
		if !self.tracker.recording("end") { return false; }

		if self.rendering {
			self.encoder.end_rendering();
			self.rendering = false;
		}

		self.frame_buffer = None;

		if self.event_depth > 0 {
			log::warn!("Command list ended with {} open debug events.", self.event_depth);
			for _ in 0..self.event_depth { self.encoder.end_event(); }
			self.event_depth = 0;
		}

		if !self.encoder.end() {
			log::error!("Failed to end the native command buffer.");
			self.tracker.state = RecordingStates::Initial;
			return false;
		}

		self.tracker.state = RecordingStates::Ended;

		true
	}

	fn begin_frame_buffer(&mut self, frame_buffer: &FrameBuffer) {
		if !self.tracker.outside_render_pass("begin_frame_buffer") { return; }

		if frame_buffer.color.is_empty() && frame_buffer.depth.is_none() {
			log::trace!("Skipping frame buffer without attachments.");
			return;
		}

		if !self.encoder.begin_rendering(frame_buffer) {
			log::error!("Failed to begin rendering into the frame buffer. It stays unbound.");
			return;
		}

		self.encoder.set_viewports(&[Viewport::from_extent(frame_buffer.extent)]);
		self.encoder.set_scissors(&[Rect::from_extent(frame_buffer.extent)]);

		self.frame_buffer = Some(frame_buffer.clone());
		self.rendering = true;
		self.tracker.state = RecordingStates::RenderPass;
	}

	fn end_frame_buffer(&mut self) {
		if !self.tracker.render_pass("end_frame_buffer") { return; }

		if self.rendering {
			self.encoder.end_rendering();
			self.rendering = false;
		}

		self.frame_buffer = None;
		self.tracker.state = RecordingStates::Recording;
	}

	fn set_pipeline_state(&mut self, pipeline: &Pipeline) {
		if !self.tracker.recording("set_pipeline_state") { return; }

		self.encoder.bind_pipeline(pipeline);
		self.pipeline = Some(pipeline.clone());
		self.cache.mark_dirty();
	}

	fn set_view(&mut self, slot: u32, view: &View) {
		if !self.tracker.recording("set_view") { return; }

		self.cache.set(slot, Descriptor::from(view));
	}

	fn set_sampler(&mut self, slot: u32, sampler: SamplerHandle) {
		if !self.tracker.recording("set_sampler") { return; }

		self.cache.set(slot, Descriptor::Sampler(sampler));
	}

	fn set_viewports(&mut self, viewports: &[Viewport]) {
		if !self.tracker.recording("set_viewports") || viewports.is_empty() { return; }

		self.encoder.set_viewports(viewports);
	}

	fn set_scissors(&mut self, scissors: &[Rect]) {
		if !self.tracker.recording("set_scissors") || scissors.is_empty() { return; }

		self.encoder.set_scissors(scissors);
	}

	fn set_blend_constants(&mut self, constants: [f32; 4]) {
		if !self.tracker.recording("set_blend_constants") { return; }

		self.encoder.set_blend_constants(constants);
	}

	fn set_stencil_reference(&mut self, reference: u32) {
		if !self.tracker.recording("set_stencil_reference") { return; }

		self.encoder.set_stencil_reference(reference);
	}

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]) {
		if !self.tracker.recording("set_vertex_buffers") || bindings.is_empty() { return; }

		self.encoder.set_vertex_buffers(first_slot, bindings);
	}

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding) {
		if !self.tracker.recording("set_index_buffer") { return; }

		self.encoder.set_index_buffer(binding);
	}

	fn set_constants(&mut self, offset: u32, data: &[u8]) {
		if !self.tracker.recording("set_constants") || data.is_empty() { return; }

		let Some(pipeline) = &self.pipeline else {
			log::error!("Push constants written without a bound pipeline. Ignoring them.");
			return;
		};

		self.encoder.set_constants(pipeline, offset, data);
	}

	fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
		if !self.tracker.recording("draw_instanced") { return; }
		if vertex_count == 0 || instance_count == 0 { log::trace!("Skipping empty draw."); return; }
		if !self.resume_rendering("draw_instanced") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.draw(vertex_count, instance_count, first_vertex, first_instance);
	}

	fn draw_indexed_instanced(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32) {
		if !self.tracker.recording("draw_indexed_instanced") { return; }
		if index_count == 0 || instance_count == 0 { log::trace!("Skipping empty indexed draw."); return; }
		if !self.resume_rendering("draw_indexed_instanced") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance);
	}

	fn draw_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("draw_instanced_indirect") { return; }
		if draw_count == 0 { log::trace!("Skipping empty indirect draw."); return; }
		if !self.resume_rendering("draw_instanced_indirect") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.draw_indirect(buffer.handle, offset, draw_count, stride);
	}

	fn draw_indexed_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("draw_indexed_instanced_indirect") { return; }
		if draw_count == 0 { log::trace!("Skipping empty indexed indirect draw."); return; }
		if !self.resume_rendering("draw_indexed_instanced_indirect") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.draw_indexed_indirect(buffer.handle, offset, draw_count, stride);
	}

	fn dispatch(&mut self, x: u32, y: u32, z: u32) {
		if !self.tracker.recording("dispatch") { return; }
		if x == 0 || y == 0 || z == 0 { log::trace!("Skipping empty dispatch."); return; }
		self.suspend_rendering();
		if !self.flush_descriptors() { return; }

		self.encoder.dispatch(x, y, z);
	}

	fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
		if !self.tracker.recording("dispatch_indirect") { return; }
		self.suspend_rendering();
		if !self.flush_descriptors() { return; }

		self.encoder.dispatch_indirect(buffer.handle, offset);
	}

	fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32) {
		if !self.tracker.recording("dispatch_mesh") { return; }
		if !self.encoder.capabilities().mesh_shading { log::warn!("Mesh shading is not supported by this device. Ignoring mesh dispatch."); return; }
		if x == 0 || y == 0 || z == 0 { log::trace!("Skipping empty mesh dispatch."); return; }
		if !self.resume_rendering("dispatch_mesh") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.dispatch_mesh(x, y, z);
	}

	fn dispatch_mesh_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("dispatch_mesh_indirect") { return; }
		if !self.encoder.capabilities().mesh_shading { log::warn!("Mesh shading is not supported by this device. Ignoring indirect mesh dispatch."); return; }
		if draw_count == 0 { log::trace!("Skipping empty indirect mesh dispatch."); return; }
		if !self.resume_rendering("dispatch_mesh_indirect") { return; }
		if !self.flush_descriptors() { return; }

		self.encoder.dispatch_mesh_indirect(buffer.handle, offset, draw_count, stride);
	}

	fn trace_rays(&mut self, tables: &ShaderBindingTables, width: u32, height: u32, depth: u32) {
		if !self.tracker.recording("trace_rays") { return; }
		if !self.encoder.capabilities().ray_tracing { log::warn!("Ray tracing is not supported by this device. Ignoring trace rays."); return; }
		if width == 0 || height == 0 || depth == 0 { log::trace!("Skipping empty trace rays."); return; }
		self.suspend_rendering();
		if !self.flush_descriptors() { return; }

		self.encoder.trace_rays(tables, width, height, depth);
	}

	fn texture_barrier(&mut self, texture: &Texture, previous: ResourceStates, next: ResourceStates) {
		if !self.tracker.recording("texture_barrier") { return; }

		let transition = Transition::new(previous, next, texture.description.uses);

		if transition.is_no_op() { return; }

		self.suspend_rendering();
		self.encoder.texture_barrier(texture, transition);
	}

	fn buffer_barrier(&mut self, buffer: &Buffer, previous: ResourceStates, next: ResourceStates) {
		if !self.tracker.recording("buffer_barrier") { return; }

		let transition = Transition::new(previous, next, buffer.uses);

		if transition.is_no_op() { return; }

		self.suspend_rendering();
		self.encoder.buffer_barrier(buffer, transition);
	}

	fn copy_texture_region(&mut self, source: &Texture, destination: &Texture, region: &TextureCopyRegion) {
		if !self.tracker.recording("copy_texture_region") { return; }
		if region.extent.is_empty() { log::trace!("Skipping empty texture copy."); return; }

		self.suspend_rendering();
		self.encoder.copy_texture_region(source, destination, region);
	}

	fn copy_buffer_region(&mut self, source: &Buffer, source_offset: u64, destination: &Buffer, destination_offset: u64, size: u64) {
		if !self.tracker.recording("copy_buffer_region") { return; }
		if size == 0 { log::trace!("Skipping empty buffer copy."); return; }

		self.suspend_rendering();
		self.encoder.copy_buffer_region(source.handle, source_offset, destination.handle, destination_offset, size);
	}

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32) {
		if !self.tracker.recording("begin_query") { return; }

		self.encoder.begin_query(pool, index);
	}

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32) {
		if !self.tracker.recording("end_query") { return; }

		self.encoder.end_query(pool, index);
	}

	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: &Buffer, offset: u64) {
		if !self.tracker.recording("resolve_query_data") { return; }
		if count == 0 { log::trace!("Skipping empty query resolve."); return; }

		self.suspend_rendering();
		self.encoder.resolve_query_data(pool, first, count, destination.handle, offset);
	}

	fn begin_event(&mut self, name: &str) {
		if !self.tracker.recording("begin_event") { return; }

		self.encoder.begin_event(name);
		self.event_depth += 1;
	}

	fn end_event(&mut self) {
		if !self.tracker.recording("end_event") { return; }

		if self.event_depth == 0 {
			log::error!("`end_event` without a matching `begin_event`. Ignoring it.");
			return;
		}

		self.encoder.end_event();
		self.event_depth -= 1;
	}
}

impl<E: CommandEncoder> Submittable for ExplicitCommandList<E> {
	type Submission = E::Submission;

	fn recording_state(&self) -> RecordingStates { self.tracker.state }

	fn is_submitted(&self) -> bool { self.submitted }

	fn take_submission(&mut self) -> Self::Submission {
		self.submitted = true;
		self.encoder.submission()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use utils::{Extent, RGBA};

	use super::*;
	use crate::graphics_hardware_interface::{tests::{color_texture, graphics_pipeline, record_compute, record_triangle, storage_texture}, Attachment, BufferHandle, ClearValue, Encodings, Formats, PipelineHandle, TextureDescription, TextureHandle, Uses};
	use crate::transition::TransitionKinds;

	#[derive(Clone, Debug, PartialEq)]
	pub(crate) enum Call {
		Begin,
		End,
		BindPipeline(PipelineHandle),
		Push(Vec<DescriptorWrite>),
		Table { offset: u32, writes: usize },
		Viewports(Vec<Viewport>),
		Scissors(Vec<Rect>),
		BlendConstants([f32; 4]),
		StencilReference(u32),
		VertexBuffers(u32, usize),
		IndexBuffer,
		Constants(u32, usize),
		/// Whether every attachment loads its previous contents.
		BeginRendering(bool),
		EndRendering,
		TextureBarrier(TextureHandle, Transition),
		BufferBarrier(BufferHandle, Transition),
		Draw(u32, u32, u32, u32),
		DrawIndexed(u32, u32),
		DrawIndirect(u32),
		Dispatch(u32, u32, u32),
		DispatchIndirect,
		DispatchMesh(u32, u32, u32),
		TraceRays,
		CopyTexture(TextureCopyRegion),
		CopyBuffer(u64, u64, u64),
		BeginQuery(u32),
		EndQuery(u32),
		ResolveQuery(u32, u32),
		BeginEvent(String),
		EndEvent,
	}

	#[derive(Default)]
	pub(crate) struct RecordingEncoder {
		pub(crate) calls: Vec<Call>,
		pub(crate) capabilities: Capabilities,
		pub(crate) id: u64,
		/// Makes `begin_rendering` fail, as if an attachment couldn't be found.
		pub(crate) fail_rendering: bool,
	}

	impl RecordingEncoder {
		pub(crate) fn new(capabilities: Capabilities) -> Self {
			Self { calls: Vec::new(), capabilities, id: 0, fail_rendering: false }
		}

		pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
			self.calls.iter().filter(|call| predicate(call)).count()
		}
	}

	impl CommandEncoder for RecordingEncoder {
		type Submission = u64;

		fn capabilities(&self) -> Capabilities { self.capabilities }
		fn begin(&mut self) -> bool { self.calls.clear(); self.calls.push(Call::Begin); true }
		fn end(&mut self) -> bool { self.calls.push(Call::End); true }
		fn submission(&self) -> u64 { self.id }
		fn bind_pipeline(&mut self, pipeline: &Pipeline) { self.calls.push(Call::BindPipeline(pipeline.handle)); }
		fn update_descriptors(&mut self, _: &Pipeline, update: DescriptorUpdate<'_>) {
			match update {
				DescriptorUpdate::Push(writes) => self.calls.push(Call::Push(writes.to_vec())),
				DescriptorUpdate::Table(table) => self.calls.push(Call::Table { offset: table.offset(), writes: table.writes().len() }),
			}
		}
		fn set_viewports(&mut self, viewports: &[Viewport]) { self.calls.push(Call::Viewports(viewports.to_vec())); }
		fn set_scissors(&mut self, scissors: &[Rect]) { self.calls.push(Call::Scissors(scissors.to_vec())); }
		fn set_blend_constants(&mut self, constants: [f32; 4]) { self.calls.push(Call::BlendConstants(constants)); }
		fn set_stencil_reference(&mut self, reference: u32) { self.calls.push(Call::StencilReference(reference)); }
		fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]) { self.calls.push(Call::VertexBuffers(first_slot, bindings.len())); }
		fn set_index_buffer(&mut self, _: &IndexBufferBinding) { self.calls.push(Call::IndexBuffer); }
		fn set_constants(&mut self, _: &Pipeline, offset: u32, data: &[u8]) { self.calls.push(Call::Constants(offset, data.len())); }
		fn begin_rendering(&mut self, frame_buffer: &FrameBuffer) -> bool {
			if self.fail_rendering { return false; }

			let loads = frame_buffer.color_attachments().iter().chain(frame_buffer.depth_attachment()).all(|attachment| attachment.load && attachment.clear == ClearValue::None);
			self.calls.push(Call::BeginRendering(loads));
			true
		}
		fn end_rendering(&mut self) { self.calls.push(Call::EndRendering); }
		fn texture_barrier(&mut self, texture: &Texture, transition: Transition) { self.calls.push(Call::TextureBarrier(texture.handle, transition)); }
		fn buffer_barrier(&mut self, buffer: &Buffer, transition: Transition) { self.calls.push(Call::BufferBarrier(buffer.handle, transition)); }
		fn draw(&mut self, a: u32, b: u32, c: u32, d: u32) { self.calls.push(Call::Draw(a, b, c, d)); }
		fn draw_indexed(&mut self, index_count: u32, instance_count: u32, _: u32, _: i32, _: u32) { self.calls.push(Call::DrawIndexed(index_count, instance_count)); }
		fn draw_indirect(&mut self, _: BufferHandle, _: u64, draw_count: u32, _: u32) { self.calls.push(Call::DrawIndirect(draw_count)); }
		fn draw_indexed_indirect(&mut self, _: BufferHandle, _: u64, draw_count: u32, _: u32) { self.calls.push(Call::DrawIndirect(draw_count)); }
		fn dispatch(&mut self, x: u32, y: u32, z: u32) { self.calls.push(Call::Dispatch(x, y, z)); }
		fn dispatch_indirect(&mut self, _: BufferHandle, _: u64) { self.calls.push(Call::DispatchIndirect); }
		fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32) { self.calls.push(Call::DispatchMesh(x, y, z)); }
		fn dispatch_mesh_indirect(&mut self, _: BufferHandle, _: u64, _: u32, _: u32) { self.calls.push(Call::DispatchMesh(0, 0, 0)); }
		fn trace_rays(&mut self, _: &ShaderBindingTables, _: u32, _: u32, _: u32) { self.calls.push(Call::TraceRays); }
		fn copy_texture_region(&mut self, _: &Texture, _: &Texture, region: &TextureCopyRegion) { self.calls.push(Call::CopyTexture(*region)); }
		fn copy_buffer_region(&mut self, _: BufferHandle, source_offset: u64, _: BufferHandle, destination_offset: u64, size: u64) { self.calls.push(Call::CopyBuffer(source_offset, destination_offset, size)); }
		fn begin_query(&mut self, _: QueryPoolHandle, index: u32) { self.calls.push(Call::BeginQuery(index)); }
		fn end_query(&mut self, _: QueryPoolHandle, index: u32) { self.calls.push(Call::EndQuery(index)); }
		fn resolve_query_data(&mut self, _: QueryPoolHandle, first: u32, count: u32, _: BufferHandle, _: u64) { self.calls.push(Call::ResolveQuery(first, count)); }
		fn begin_event(&mut self, name: &str) { self.calls.push(Call::BeginEvent(name.to_string())); }
		fn end_event(&mut self) { self.calls.push(Call::EndEvent); }
	}

	fn push_command_list() -> ExplicitCommandList<RecordingEncoder> {
		ExplicitCommandList::new(RecordingEncoder::new(Capabilities { push_descriptor: true, ..Capabilities::default() }), None).unwrap()
	}

	fn is_descriptor_update(call: &Call) -> bool {
		matches!(call, Call::Push(_) | Call::Table { .. })
	}

	#[test]
	fn begin_binds_default_state() {
		let mut command_list = push_command_list();

		assert_eq!(command_list.state(), RecordingStates::Initial);
		assert!(command_list.begin());

		let calls = &command_list.encoder().calls;
		assert_eq!(calls[0], Call::Begin);
		assert_eq!(calls[1], Call::Viewports(vec![Viewport::from_extent(Extent::square(1))]));
		assert_eq!(calls[2], Call::Scissors(vec![Rect::from_extent(Extent::square(1))]));
		assert_eq!(calls[3], Call::BlendConstants(DEFAULT_BLEND_CONSTANTS));
		assert_eq!(calls[4], Call::StencilReference(0));

		assert!(!command_list.begin());
	}

	#[test]
	fn triangle_flushes_descriptors_once_before_draw() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::rectangle(1920, 1080));
		let source = color_texture(2, Extent::square(256));

		record_triangle(&mut command_list, &target, &source);

		let calls = &command_list.encoder().calls;

		let push = calls.iter().position(is_descriptor_update).unwrap();
		let draw = calls.iter().position(|call| matches!(call, Call::Draw(3, 1, 0, 0))).unwrap();
		assert!(push < draw);
		assert_eq!(command_list.encoder().count(is_descriptor_update), 1);

		match &calls[push] {
			Call::Push(writes) => {
				assert_eq!(writes.len(), 1);
				assert_eq!(writes[0].descriptor(), &Descriptor::Texture { handle: source.handle(), general: false });
			}
			call => panic!("unexpected call {:?}", call),
		}

		let barriers = calls.iter().filter_map(|call| match call { Call::TextureBarrier(_, transition) => Some(transition.kind), _ => None }).collect::<Vec<_>>();
		assert_eq!(barriers, vec![TransitionKinds::Presentation, TransitionKinds::Presentation]);

		assert!(calls.contains(&Call::Viewports(vec![Viewport::from_extent(Extent::rectangle(1920, 1080))])));
		assert_eq!(calls.last(), Some(&Call::End));
	}

	#[test]
	fn many_views_one_update() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.set_pipeline_state(&graphics_pipeline());

		for slot in 2..6 {
			command_list.set_view(slot, &View::texture(&color_texture(10 + slot as u64, Extent::square(8))));
		}

		assert_eq!(command_list.encoder().count(is_descriptor_update), 0);

		command_list.draw_instanced(3, 1, 0, 0);
		assert_eq!(command_list.encoder().count(is_descriptor_update), 1);

		match command_list.encoder().calls.iter().find(|call| is_descriptor_update(call)) {
			Some(Call::Push(writes)) => {
				assert_eq!(writes.len(), 4);
				assert!(writes.iter().all(|write| write.binding() == 2));
				assert_eq!(writes.iter().map(DescriptorWrite::array_element).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
			}
			call => panic!("unexpected call {:?}", call),
		}

		// Nothing changed, nothing to write.
		command_list.draw_instanced(3, 1, 0, 0);
		assert_eq!(command_list.encoder().count(is_descriptor_update), 1);

		// A new pipeline may read the slots differently.
		command_list.set_pipeline_state(&graphics_pipeline());
		command_list.draw_instanced(3, 1, 0, 0);
		assert_eq!(command_list.encoder().count(is_descriptor_update), 2);
	}

	#[test]
	fn flush_without_layout_is_a_no_op() {
		let mut command_list = push_command_list();
		let target = storage_texture(1, Extent::square(64));

		command_list.begin();
		command_list.set_view(0, &View::texture(&target));
		command_list.dispatch(1, 1, 1);

		assert_eq!(command_list.encoder().count(is_descriptor_update), 0);
		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::Dispatch(1, 1, 1))), 1);
	}

	#[test]
	fn equal_states_record_nothing() {
		let mut command_list = push_command_list();
		let texture = storage_texture(1, Extent::square(64));
		let buffer = Buffer::new(BufferHandle(7), 1024, Uses::Storage);

		command_list.begin();
		let recorded = command_list.encoder().calls.len();

		for state in [ResourceStates::Undefined, ResourceStates::ColorWrite, ResourceStates::ShaderRead, ResourceStates::UnorderedAccess, ResourceStates::CopyDestination, ResourceStates::Present, ResourceStates::IndirectArgument] {
			command_list.texture_barrier(&texture, state, state);
			command_list.buffer_barrier(&buffer, state, state);
		}

		assert_eq!(command_list.encoder().calls.len(), recorded);

		command_list.buffer_barrier(&buffer, ResourceStates::CopyDestination, ResourceStates::IndirectArgument);
		assert_eq!(command_list.encoder().calls.len(), recorded + 1);
	}

	#[test]
	fn compute_uses_general_transition() {
		let mut command_list = push_command_list();
		let target = storage_texture(3, Extent::square(64));

		record_compute(&mut command_list, &target);

		let calls = &command_list.encoder().calls;
		let kinds = calls.iter().filter_map(|call| match call { Call::TextureBarrier(_, transition) => Some(transition.kind), _ => None }).collect::<Vec<_>>();
		assert_eq!(kinds, vec![TransitionKinds::Standard, TransitionKinds::General]);

		match calls.iter().find(|call| is_descriptor_update(call)) {
			Some(Call::Push(writes)) => assert_eq!(writes[0].descriptor(), &Descriptor::Texture { handle: target.handle(), general: true }),
			call => panic!("unexpected call {:?}", call),
		}
	}

	#[test]
	fn descriptor_tables_are_returned_on_begin() {
		let heap = Arc::new(DescriptorHeap::new(16));
		let mut command_list = ExplicitCommandList::new(RecordingEncoder::new(Capabilities::default()), Some(heap.clone())).unwrap();
		let target = color_texture(1, Extent::square(64));

		record_triangle(&mut command_list, &target, &color_texture(2, Extent::square(8)));

		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::Table { offset: 0, writes: 1 })), 1);
		assert_eq!(heap.used(), graphics_pipeline().layout().descriptor_count());

		command_list.begin();
		assert_eq!(heap.used(), 0);

		drop(command_list);
		assert_eq!(heap.used(), 0);
	}

	#[test]
	fn exhausted_heap_skips_draw() {
		let heap = Arc::new(DescriptorHeap::new(4));
		let mut command_list = ExplicitCommandList::new(RecordingEncoder::new(Capabilities::default()), Some(heap)).unwrap();
		let target = color_texture(1, Extent::square(64));

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.set_pipeline_state(&graphics_pipeline()); // Needs 7 descriptors.
		command_list.set_view(0, &View::texture(&target));
		command_list.draw_instanced(3, 1, 0, 0);

		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::Draw(..))), 0);
	}

	#[test]
	fn requires_heap_without_push_descriptors() {
		assert!(ExplicitCommandList::new(RecordingEncoder::new(Capabilities::default()), None).is_err());
	}

	#[test]
	fn copies_are_split_into_subresources() {
		let mut command_list = push_command_list();

		let source = Texture::new(TextureHandle(1), TextureDescription::new(Extent::square(64), Formats::RGBA8(Encodings::UnsignedNormalized), Uses::TransferSource).mip_levels(3).array_layers(2));
		let destination = Texture::new(TextureHandle(2), TextureDescription::new(Extent::square(32), Formats::RGBA8(Encodings::UnsignedNormalized), Uses::TransferDestination).mip_levels(2).array_layers(4));

		command_list.begin();
		command_list.copy_texture(&source, &destination);

		let regions = command_list.encoder().calls.iter().filter_map(|call| match call { Call::CopyTexture(region) => Some(*region), _ => None }).collect::<Vec<_>>();

		assert_eq!(regions.len(), 4);
		assert_eq!(regions[0], TextureCopyRegion::subresource(0, 0, Extent::square(32)));
		assert_eq!(regions[3], TextureCopyRegion::subresource(1, 1, Extent::square(16)));

		let small = Buffer::new(BufferHandle(3), 128, Uses::TransferSource);
		let large = Buffer::new(BufferHandle(4), 512, Uses::TransferDestination);

		command_list.copy_buffer(&large, &small);
		assert!(command_list.encoder().calls.contains(&Call::CopyBuffer(0, 0, 128)));
	}

	#[test]
	fn degenerate_input_records_nothing() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));
		let buffer = Buffer::new(BufferHandle(3), 0, Uses::TransferSource);

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		let recorded = command_list.encoder().calls.len();

		command_list.draw_instanced(0, 1, 0, 0);
		command_list.draw_indexed_instanced(3, 0, 0, 0, 0);
		command_list.draw_instanced_indirect(&buffer, 0, 0, 16);
		command_list.set_viewports(&[]);
		command_list.set_vertex_buffers(0, &[]);
		command_list.set_constants(0, &[]);

		assert_eq!(command_list.encoder().calls.len(), recorded);

		command_list.end_frame_buffer();
		let recorded = command_list.encoder().calls.len();

		command_list.dispatch(0, 1, 1);
		command_list.copy_buffer(&buffer, &buffer);
		command_list.resolve_query_data(QueryPoolHandle(0), 0, 0, &buffer, 0);

		assert_eq!(command_list.encoder().calls.len(), recorded);
	}

	#[test]
	fn state_violations_are_ignored() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));

		command_list.texture_barrier(&target, ResourceStates::Undefined, ResourceStates::ColorWrite);
		assert!(command_list.encoder().calls.is_empty());
		assert!(!command_list.end());

		command_list.begin();
		let recorded = command_list.encoder().calls.len();

		command_list.draw_instanced(3, 1, 0, 0); // No frame buffer to render into.
		command_list.end_frame_buffer();
		command_list.end_event();

		assert_eq!(command_list.encoder().calls.len(), recorded);

		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		let recorded = command_list.encoder().calls.len();

		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));

		assert_eq!(command_list.encoder().calls.len(), recorded);
	}

	#[test]
	fn failed_rendering_leaves_frame_buffer_unbound() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));

		command_list.begin();
		command_list.encoder.fail_rendering = true;
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));

		assert_eq!(command_list.state(), RecordingStates::Recording);

		command_list.end_frame_buffer();
		command_list.draw_instanced(3, 1, 0, 0);
		assert!(command_list.end());

		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::BeginRendering(_) | Call::EndRendering | Call::Draw(..))), 0);
	}

	#[test]
	fn work_outside_rendering_splits_the_frame_buffer() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));
		let source = storage_texture(2, Extent::square(64));

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target).clear(ClearValue::Color(RGBA::black()))]));
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.texture_barrier(&source, ResourceStates::UnorderedAccess, ResourceStates::CopySource);
		command_list.draw_instanced(6, 1, 0, 0);
		command_list.dispatch(1, 1, 1);
		command_list.end_frame_buffer();

		assert_eq!(command_list.state(), RecordingStates::Recording);

		let rendering = command_list.encoder().calls.iter().filter(|call| matches!(call, Call::BeginRendering(_) | Call::EndRendering | Call::TextureBarrier(..) | Call::Draw(..) | Call::Dispatch(..))).cloned().collect::<Vec<_>>();
		assert_eq!(rendering, vec![
			Call::BeginRendering(false),
			Call::Draw(3, 1, 0, 0),
			Call::EndRendering,
			Call::TextureBarrier(source.handle(), Transition::new(ResourceStates::UnorderedAccess, ResourceStates::CopySource, source.description().uses)),
			Call::BeginRendering(true),
			Call::Draw(6, 1, 0, 0),
			Call::EndRendering,
			Call::Dispatch(1, 1, 1),
		]);
	}

	#[test]
	fn end_closes_open_frame_buffer_and_events() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));

		command_list.begin();
		command_list.begin_event("Frame");
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));

		assert!(command_list.end());

		let calls = &command_list.encoder().calls;
		let tail = &calls[calls.len() - 3..];
		assert_eq!(tail, &[Call::EndRendering, Call::EndEvent, Call::End]);
		assert!(!command_list.end());
	}

	#[test]
	fn optional_capabilities() {
		let mut command_list = push_command_list();
		let target = color_texture(1, Extent::square(64));
		let buffer = Buffer::new(BufferHandle(3), 64, Uses::Indirect);

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.dispatch_mesh(1, 1, 1);
		command_list.dispatch_mesh_indirect(&buffer, 0, 1, 12);

		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::DispatchMesh(..))), 0);

		let mut command_list = ExplicitCommandList::new(RecordingEncoder::new(Capabilities { push_descriptor: true, mesh_shading: true, ray_tracing: false }), None).unwrap();

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.dispatch_mesh(4, 1, 1);

		assert_eq!(command_list.encoder().count(|call| matches!(call, Call::DispatchMesh(4, 1, 1))), 1);
	}

	#[test]
	fn submission_marks_list() {
		let mut command_list = push_command_list();

		command_list.begin();
		command_list.end();

		assert!(!command_list.is_submitted());
		assert_eq!(command_list.take_submission(), 0);
		assert!(command_list.is_submitted());

		command_list.begin();
		assert!(!command_list.is_submitted());
	}
}
