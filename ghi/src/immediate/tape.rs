//! # Command tape
//!
//! Command lists of the immediate backend append their operations to a tape. The queue replays closed tapes on the
//! immediate context, resolving descriptors and barriers at replay time.

use std::sync::Arc;

use utils::Extent;

use crate::command_list::{DescriptorBindingCache, RecordingTracker};
use crate::graphics_hardware_interface::{Buffer, BufferBinding, BufferHandle, Capabilities, CommandList, Descriptor, DescriptorType, DescriptorWrite, FrameBuffer, IndexBufferBinding, Pipeline, QueryPoolHandle, Rect, RecordingStates, ResourceHandle, ResourceStates, SamplerHandle, ShaderBindingTables, Texture, TextureCopyRegion, TextureHandle, Uses, View, Viewport, DEFAULT_BLEND_CONSTANTS};
use crate::queue::Submittable;
use crate::transition::{Transition, TransitionKinds};

use super::utils::{to_bind_flags, to_resource_state, uses_to_bind_flags};
use super::{DescriptorRange, ImmediateContext};

/// One recorded operation.
#[derive(Clone, Debug)]
pub enum Command {
	Begin,
	End,
	SetPipeline(Pipeline),
	SetView { slot: u32, descriptor: Descriptor },
	SetSampler { slot: u32, sampler: SamplerHandle },
	SetViewports(Vec<Viewport>),
	SetScissors(Vec<Rect>),
	SetBlendConstants([f32; 4]),
	SetStencilReference(u32),
	SetVertexBuffers { first_slot: u32, bindings: Vec<BufferBinding> },
	SetIndexBuffer(IndexBufferBinding),
	SetConstants { offset: u32, data: Vec<u8> },
	BeginFrameBuffer(FrameBuffer),
	EndFrameBuffer,
	Barrier { resource: ResourceHandle, transition: Transition },
	Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
	DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32 },
	DrawIndirect { buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32 },
	DrawIndexedIndirect { buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32 },
	Dispatch { x: u32, y: u32, z: u32 },
	DispatchIndirect { buffer: BufferHandle, offset: u64 },
	DispatchMesh { x: u32, y: u32, z: u32 },
	DispatchMeshIndirect { buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32 },
	TraceRays { tables: ShaderBindingTables, width: u32, height: u32, depth: u32 },
	BeginQuery { pool: QueryPoolHandle, index: u32 },
	EndQuery { pool: QueryPoolHandle, index: u32 },
	ResolveQueryData { pool: QueryPoolHandle, first: u32, count: u32, destination: BufferHandle, offset: u64 },
	CopyTextureRegion { source: TextureHandle, destination: TextureHandle, region: TextureCopyRegion },
	CopyBufferRegion { source: BufferHandle, source_offset: u64, destination: BufferHandle, destination_offset: u64, size: u64 },
	BeginEvent(String),
	EndEvent,
	ExecuteBundle(Arc<CommandTape>),
}

/// A closed, immutable sequence of commands.
#[derive(Debug)]
pub struct CommandTape {
	commands: Vec<Command>,
}

impl CommandTape {
	pub fn commands(&self) -> &[Command] { &self.commands }

	/// Replays the tape on `context`, in order.
	pub fn execute<C: ImmediateContext>(&self, context: &mut C) {
		let mut replayer = Replayer { context, pipeline: None, cache: DescriptorBindingCache::new() };
		replayer.replay(&self.commands, false);
	}
}

/// Groups descriptor writes into runs of consecutive slots of the same type.
pub fn descriptor_ranges(writes: &[DescriptorWrite]) -> Vec<DescriptorRange> {
	let mut ranges = Vec::new();

	for descriptor_type in [DescriptorType::UniformBuffer, DescriptorType::StorageBuffer, DescriptorType::SampledImage, DescriptorType::StorageImage, DescriptorType::Sampler] {
		let mut of_type = writes.iter().filter(|write| write.descriptor_type() == descriptor_type).copied().collect::<Vec<_>>();

		if of_type.is_empty() { continue; }

		of_type.sort_by_key(DescriptorWrite::slot);

		for (first_slot, run) in utils::partition(&of_type, |write| write.slot() as usize) {
			ranges.push(DescriptorRange { descriptor_type, first_slot: first_slot as u32, descriptors: run.iter().map(|write| *write.descriptor()).collect() });
		}
	}

	ranges
}

struct Replayer<'c, C: ImmediateContext> {
	context: &'c mut C,
	pipeline: Option<Pipeline>,
	cache: DescriptorBindingCache,
}

impl<'c, C: ImmediateContext> Replayer<'c, C> {
	fn flush(&mut self) {
		let Some(pipeline) = &self.pipeline else { return; };

		let Some(writes) = self.cache.flush(Some(pipeline.layout())) else { return; };

		if writes.is_empty() { return; }

		self.context.bind_descriptors(pipeline, &descriptor_ranges(&writes));
	}

	/// Bundles replay inline and inherit the bound state, so their own begin and end are skipped.
	fn replay(&mut self, commands: &[Command], bundle: bool) {
		for command in commands {
			match command {
				Command::Begin => {
					if bundle { continue; }

					self.pipeline = None;
					self.cache.clear();

					self.context.set_viewports(&[Viewport::from_extent(Extent::square(1))]);
					self.context.set_scissors(&[Rect::from_extent(Extent::square(1))]);
					self.context.set_blend_constants(DEFAULT_BLEND_CONSTANTS);
					self.context.set_stencil_reference(0);
				}
				Command::End => {}
				Command::SetPipeline(pipeline) => {
					self.context.set_pipeline(pipeline);
					self.pipeline = Some(pipeline.clone());
					self.cache.mark_dirty();
				}
				Command::SetView { slot, descriptor } => { self.cache.set(*slot, *descriptor); }
				Command::SetSampler { slot, sampler } => { self.cache.set(*slot, Descriptor::Sampler(*sampler)); }
				Command::SetViewports(viewports) => self.context.set_viewports(viewports),
				Command::SetScissors(scissors) => self.context.set_scissors(scissors),
				Command::SetBlendConstants(constants) => self.context.set_blend_constants(*constants),
				Command::SetStencilReference(reference) => self.context.set_stencil_reference(*reference),
				Command::SetVertexBuffers { first_slot, bindings } => self.context.set_vertex_buffers(*first_slot, bindings),
				Command::SetIndexBuffer(binding) => self.context.set_index_buffer(binding),
				Command::SetConstants { offset, data } => {
					if let Some(pipeline) = &self.pipeline {
						self.context.set_constants(pipeline, *offset, data);
					}
				}
				Command::BeginFrameBuffer(frame_buffer) => {
					self.context.set_render_targets(frame_buffer);
					self.context.set_viewports(&[Viewport::from_extent(frame_buffer.extent())]);
					self.context.set_scissors(&[Rect::from_extent(frame_buffer.extent())]);
				}
				Command::EndFrameBuffer => self.context.unset_render_targets(),
				Command::Barrier { resource, transition } => {
					// Both states share the same bind point.
					if transition.kind == TransitionKinds::General { continue; }

					match to_bind_flags(transition.next) {
						Some(flags) => self.context.transition_resource(*resource, flags),
						None => log::error!("{:?} can't be expressed by an immediate context. Skipping the transition of {:?}.", transition.next, resource),
					}
				}
				Command::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
					self.flush();
					self.context.draw(*vertex_count, *instance_count, *first_vertex, *first_instance);
				}
				Command::DrawIndexed { index_count, instance_count, first_index, base_vertex, first_instance } => {
					self.flush();
					self.context.draw_indexed(*index_count, *instance_count, *first_index, *base_vertex, *first_instance);
				}
				Command::DrawIndirect { buffer, offset, draw_count, stride } => {
					self.flush();
					for i in 0..*draw_count as u64 {
						self.context.draw_indirect(*buffer, offset + i * *stride as u64);
					}
				}
				Command::DrawIndexedIndirect { buffer, offset, draw_count, stride } => {
					self.flush();
					for i in 0..*draw_count as u64 {
						self.context.draw_indexed_indirect(*buffer, offset + i * *stride as u64);
					}
				}
				Command::Dispatch { x, y, z } => {
					self.flush();
					self.context.dispatch(*x, *y, *z);
				}
				Command::DispatchIndirect { buffer, offset } => {
					self.flush();
					self.context.dispatch_indirect(*buffer, *offset);
				}
				Command::DispatchMesh { x, y, z } => {
					self.flush();
					self.context.dispatch_mesh(*x, *y, *z);
				}
				Command::DispatchMeshIndirect { buffer, offset, draw_count, stride } => {
					self.flush();
					for i in 0..*draw_count as u64 {
						self.context.dispatch_mesh_indirect(*buffer, offset + i * *stride as u64);
					}
				}
				Command::TraceRays { tables, width, height, depth } => {
					self.flush();
					self.context.trace_rays(tables, *width, *height, *depth);
				}
				Command::BeginQuery { pool, index } => self.context.begin_query(*pool, *index),
				Command::EndQuery { pool, index } => self.context.end_query(*pool, *index),
				Command::ResolveQueryData { pool, first, count, destination, offset } => self.context.resolve_query_data(*pool, *first, *count, *destination, *offset),
				Command::CopyTextureRegion { source, destination, region } => self.context.copy_texture_region(*source, *destination, region),
				Command::CopyBufferRegion { source, source_offset, destination, destination_offset, size } => self.context.copy_buffer_region(*source, *source_offset, *destination, *destination_offset, *size),
				Command::BeginEvent(name) => self.context.begin_event(name),
				Command::EndEvent => self.context.end_event(),
				Command::ExecuteBundle(tape) => self.replay(&tape.commands, true),
			}
		}
	}
}

/// A command list recording onto a tape.
/// Draws don't need a bound frame buffer, they render into whatever targets are bound when the tape replays.
pub struct EmulatedCommandList {
	tracker: RecordingTracker,
	capabilities: Capabilities,
	/// Bundles replay inside another command list and render into its frame buffer.
	bundle: bool,
	commands: Vec<Command>,
	tape: Option<Arc<CommandTape>>,
	submitted: bool,
	pipeline_bound: bool,
	event_depth: u32,
}

impl EmulatedCommandList {
	/// Creates a command list for a context with the given capabilities.
	pub fn new(capabilities: Capabilities) -> Self {
		Self {
			tracker: RecordingTracker::new(),
			capabilities,
			bundle: false,
			commands: Vec::new(),
			tape: None,
			submitted: false,
			pipeline_bound: false,
			event_depth: 0,
		}
	}

	/// Creates a bundle. Bundles can't bind frame buffers or be submitted, they only run through `execute_bundle`.
	pub fn bundle(capabilities: Capabilities) -> Self {
		Self { bundle: true, ..Self::new(capabilities) }
	}

	/// The tape closed by the last `end`.
	pub fn tape(&self) -> Option<&Arc<CommandTape>> { self.tape.as_ref() }

	/// Replays a closed command list inline when this list executes. The bundle inherits the bound state.
	pub fn execute_bundle(&mut self, bundle: &EmulatedCommandList) {
		if !self.tracker.recording("execute_bundle") { return; }

		if self.bundle {
			log::error!("Bundles can't execute other bundles. Ignoring it.");
			return;
		}

		if !bundle.bundle {
			log::error!("Only command lists created as bundles can be executed as bundles. Ignoring it.");
			return;
		}

		let Some(tape) = bundle.tape.as_ref().filter(|_| bundle.tracker.state == RecordingStates::Ended) else {
			log::error!("Only ended command lists can be executed as bundles. The bundle is {:?}.", bundle.tracker.state);
			return;
		};

		self.commands.push(Command::ExecuteBundle(tape.clone()));
	}

	fn record(&mut self, command: Command) {
		self.commands.push(command);
	}

	/// Resources of an immediate context are created attached to the bind points of their uses,
	/// so a transition out of `Undefined` starts from that state.
	fn barrier(&mut self, resource: ResourceHandle, uses: Uses, previous: ResourceStates, next: ResourceStates) {
		if !self.tracker.recording("barrier") { return; }

		let previous = if previous == ResourceStates::Undefined { to_resource_state(uses_to_bind_flags(uses)) } else { previous };
		let transition = Transition::new(previous, next, uses);

		if transition.is_no_op() { return; }

		if to_bind_flags(transition.next).is_none() && transition.kind != TransitionKinds::General {
			log::error!("{:?} can't be expressed by an immediate context. Ignoring the transition of {:?}.", transition.next, resource);
			return;
		}

		self.record(Command::Barrier { resource, transition });
	}
}

impl CommandList for EmulatedCommandList {
	fn state(&self) -> RecordingStates { self.tracker.state }

	fn begin(&mut self) -> bool {
		if !self.tracker.can_begin() { return false; }

		self.commands.clear();
		self.tape = None;
		self.submitted = false;
		self.pipeline_bound = false;
		self.event_depth = 0;
		self.tracker.state = RecordingStates::Recording;

		self.record(Command::Begin);

		true
	}

	fn end(&mut self) -> bool {
		if !self.tracker.recording("end") { return false; }

		if self.tracker.state == RecordingStates::RenderPass {
			self.record(Command::EndFrameBuffer);
		}

		if self.event_depth > 0 {
			log::warn!("Command list ended with {} open debug events.", self.event_depth);
			for _ in 0..self.event_depth { self.record(Command::EndEvent); }
			self.event_depth = 0;
		}

		self.record(Command::End);

		self.tape = Some(Arc::new(CommandTape { commands: std::mem::take(&mut self.commands) }));
		self.tracker.state = RecordingStates::Ended;

		true
	}

	fn begin_frame_buffer(&mut self, frame_buffer: &FrameBuffer) {
		if !self.tracker.outside_render_pass("begin_frame_buffer") { return; }

		if self.bundle {
			log::error!("Bundles render into the frame buffer of the command list executing them. Ignoring `begin_frame_buffer`.");
			return;
		}

		if frame_buffer.color_attachments().is_empty() && frame_buffer.depth_attachment().is_none() {
			log::trace!("Skipping frame buffer without attachments.");
			return;
		}

		self.record(Command::BeginFrameBuffer(frame_buffer.clone()));
		self.tracker.state = RecordingStates::RenderPass;
	}

	fn end_frame_buffer(&mut self) {
		if !self.tracker.render_pass("end_frame_buffer") { return; }

		self.record(Command::EndFrameBuffer);
		self.tracker.state = RecordingStates::Recording;
	}

	fn set_pipeline_state(&mut self, pipeline: &Pipeline) {
		if !self.tracker.recording("set_pipeline_state") { return; }

		self.record(Command::SetPipeline(pipeline.clone()));
		self.pipeline_bound = true;
	}

	fn set_view(&mut self, slot: u32, view: &View) {
		if !self.tracker.recording("set_view") { return; }

		if slot as usize >= crate::graphics_hardware_interface::MAX_DESCRIPTORS {
			log::error!("Descriptor slot {} is out of range. Ignoring it.", slot);
			return;
		}

		self.record(Command::SetView { slot, descriptor: Descriptor::from(view) });
	}

	fn set_sampler(&mut self, slot: u32, sampler: SamplerHandle) {
		if !self.tracker.recording("set_sampler") { return; }

		if slot as usize >= crate::graphics_hardware_interface::MAX_DESCRIPTORS {
			log::error!("Descriptor slot {} is out of range. Ignoring it.", slot);
			return;
		}

		self.record(Command::SetSampler { slot, sampler });
	}

	fn set_viewports(&mut self, viewports: &[Viewport]) {
		if !self.tracker.recording("set_viewports") || viewports.is_empty() { return; }

		self.record(Command::SetViewports(viewports.to_vec()));
	}

	fn set_scissors(&mut self, scissors: &[Rect]) {
		if !self.tracker.recording("set_scissors") || scissors.is_empty() { return; }

		self.record(Command::SetScissors(scissors.to_vec()));
	}

	fn set_blend_constants(&mut self, constants: [f32; 4]) {
		if !self.tracker.recording("set_blend_constants") { return; }

		self.record(Command::SetBlendConstants(constants));
	}

	fn set_stencil_reference(&mut self, reference: u32) {
		if !self.tracker.recording("set_stencil_reference") { return; }

		self.record(Command::SetStencilReference(reference));
	}

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]) {
		if !self.tracker.recording("set_vertex_buffers") || bindings.is_empty() { return; }

		self.record(Command::SetVertexBuffers { first_slot, bindings: bindings.to_vec() });
	}

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding) {
		if !self.tracker.recording("set_index_buffer") { return; }

		self.record(Command::SetIndexBuffer(*binding));
	}

	fn set_constants(&mut self, offset: u32, data: &[u8]) {
		if !self.tracker.recording("set_constants") || data.is_empty() { return; }

		if !self.pipeline_bound {
			log::error!("Push constants written without a bound pipeline. Ignoring them.");
			return;
		}

		self.record(Command::SetConstants { offset, data: data.to_vec() });
	}

	fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
		if !self.tracker.recording("draw_instanced") { return; }
		if vertex_count == 0 || instance_count == 0 { log::trace!("Skipping empty draw."); return; }

		self.record(Command::Draw { vertex_count, instance_count, first_vertex, first_instance });
	}

	fn draw_indexed_instanced(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32) {
		if !self.tracker.recording("draw_indexed_instanced") { return; }
		if index_count == 0 || instance_count == 0 { log::trace!("Skipping empty indexed draw."); return; }

		self.record(Command::DrawIndexed { index_count, instance_count, first_index, base_vertex, first_instance });
	}

	fn draw_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("draw_instanced_indirect") { return; }
		if draw_count == 0 { log::trace!("Skipping empty indirect draw."); return; }

		self.record(Command::DrawIndirect { buffer: buffer.handle(), offset, draw_count, stride });
	}

	fn draw_indexed_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("draw_indexed_instanced_indirect") { return; }
		if draw_count == 0 { log::trace!("Skipping empty indexed indirect draw."); return; }

		self.record(Command::DrawIndexedIndirect { buffer: buffer.handle(), offset, draw_count, stride });
	}

	fn dispatch(&mut self, x: u32, y: u32, z: u32) {
		if !self.tracker.recording("dispatch") { return; }
		if x == 0 || y == 0 || z == 0 { log::trace!("Skipping empty dispatch."); return; }

		self.record(Command::Dispatch { x, y, z });
	}

	fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
		if !self.tracker.recording("dispatch_indirect") { return; }

		self.record(Command::DispatchIndirect { buffer: buffer.handle(), offset });
	}

	fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32) {
		if !self.tracker.recording("dispatch_mesh") { return; }
		if !self.capabilities.mesh_shading { log::warn!("Mesh shading is not supported by this context. Ignoring mesh dispatch."); return; }
		if x == 0 || y == 0 || z == 0 { log::trace!("Skipping empty mesh dispatch."); return; }

		self.record(Command::DispatchMesh { x, y, z });
	}

	fn dispatch_mesh_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
		if !self.tracker.recording("dispatch_mesh_indirect") { return; }
		if !self.capabilities.mesh_shading { log::warn!("Mesh shading is not supported by this context. Ignoring indirect mesh dispatch."); return; }
		if draw_count == 0 { log::trace!("Skipping empty indirect mesh dispatch."); return; }

		self.record(Command::DispatchMeshIndirect { buffer: buffer.handle(), offset, draw_count, stride });
	}

	fn trace_rays(&mut self, tables: &ShaderBindingTables, width: u32, height: u32, depth: u32) {
		if !self.tracker.recording("trace_rays") { return; }
		if !self.capabilities.ray_tracing { log::warn!("Ray tracing is not supported by this context. Ignoring trace rays."); return; }
		if width == 0 || height == 0 || depth == 0 { log::trace!("Skipping empty trace rays."); return; }

		self.record(Command::TraceRays { tables: *tables, width, height, depth });
	}

	fn texture_barrier(&mut self, texture: &Texture, previous: ResourceStates, next: ResourceStates) {
		self.barrier(ResourceHandle::Texture(texture.handle()), texture.description().uses(), previous, next);
	}

	fn buffer_barrier(&mut self, buffer: &Buffer, previous: ResourceStates, next: ResourceStates) {
		self.barrier(ResourceHandle::Buffer(buffer.handle()), buffer.uses(), previous, next);
	}

	fn copy_texture_region(&mut self, source: &Texture, destination: &Texture, region: &TextureCopyRegion) {
		if !self.tracker.recording("copy_texture_region") { return; }
		if region.extent.is_empty() { log::trace!("Skipping empty texture copy."); return; }

		self.record(Command::CopyTextureRegion { source: source.handle(), destination: destination.handle(), region: *region });
	}

	fn copy_buffer_region(&mut self, source: &Buffer, source_offset: u64, destination: &Buffer, destination_offset: u64, size: u64) {
		if !self.tracker.recording("copy_buffer_region") { return; }
		if size == 0 { log::trace!("Skipping empty buffer copy."); return; }

		self.record(Command::CopyBufferRegion { source: source.handle(), source_offset, destination: destination.handle(), destination_offset, size });
	}

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32) {
		if !self.tracker.recording("begin_query") { return; }

		self.record(Command::BeginQuery { pool, index });
	}

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32) {
		if !self.tracker.recording("end_query") { return; }

		self.record(Command::EndQuery { pool, index });
	}

	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: &Buffer, offset: u64) {
		if !self.tracker.recording("resolve_query_data") { return; }
		if count == 0 { log::trace!("Skipping empty query resolve."); return; }

		self.record(Command::ResolveQueryData { pool, first, count, destination: destination.handle(), offset });
	}

	fn begin_event(&mut self, name: &str) {
		if !self.tracker.recording("begin_event") { return; }

		self.record(Command::BeginEvent(name.to_string()));
		self.event_depth += 1;
	}

	fn end_event(&mut self) {
		if !self.tracker.recording("end_event") { return; }

		if self.event_depth == 0 {
			log::error!("`end_event` without a matching `begin_event`. Ignoring it.");
			return;
		}

		self.record(Command::EndEvent);
		self.event_depth -= 1;
	}
}

impl Submittable for EmulatedCommandList {
	type Submission = Arc<CommandTape>;

	fn recording_state(&self) -> RecordingStates { self.tracker.state }

	fn is_submitted(&self) -> bool { self.submitted }

	fn take_submission(&mut self) -> Arc<CommandTape> {
		self.submitted = true;
		// Ended lists always hold a tape.
		self.tape.clone().unwrap_or_else(|| Arc::new(CommandTape { commands: Vec::new() }))
	}

	fn is_bundle(&self) -> bool { self.bundle }
}

#[cfg(test)]
pub(crate) mod tests {
	use utils::Extent;

	use super::*;
	use crate::graphics_hardware_interface::{tests::{color_texture, graphics_pipeline, record_compute, record_triangle, storage_texture}, Attachment, Uses};
	use crate::immediate::BindFlags;

	#[derive(Clone, Debug, PartialEq)]
	pub(crate) enum Call {
		SetPipeline,
		Bind(Vec<DescriptorRange>),
		Viewports(Vec<Viewport>),
		Scissors,
		BlendConstants,
		StencilReference(u32),
		RenderTargets,
		UnsetRenderTargets,
		Transition(ResourceHandle, BindFlags),
		Draw(u32, u32),
		DrawIndexed,
		DrawIndirect(u64),
		Dispatch(u32, u32, u32),
		DispatchIndirect,
		CopyTexture(TextureCopyRegion),
		CopyBuffer(u64),
		Query,
		BeginEvent(String),
		EndEvent,
		Other,
		Flush,
	}

	#[derive(Default)]
	pub(crate) struct RecordingContext {
		pub(crate) calls: Vec<Call>,
	}

	impl RecordingContext {
		pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
			self.calls.iter().filter(|call| predicate(call)).count()
		}
	}

	impl ImmediateContext for RecordingContext {
		fn set_pipeline(&mut self, _: &Pipeline) { self.calls.push(Call::SetPipeline); }
		fn bind_descriptors(&mut self, _: &Pipeline, ranges: &[DescriptorRange]) { self.calls.push(Call::Bind(ranges.to_vec())); }
		fn set_viewports(&mut self, viewports: &[Viewport]) { self.calls.push(Call::Viewports(viewports.to_vec())); }
		fn set_scissors(&mut self, _: &[Rect]) { self.calls.push(Call::Scissors); }
		fn set_blend_constants(&mut self, _: [f32; 4]) { self.calls.push(Call::BlendConstants); }
		fn set_stencil_reference(&mut self, reference: u32) { self.calls.push(Call::StencilReference(reference)); }
		fn set_vertex_buffers(&mut self, _: u32, _: &[BufferBinding]) { self.calls.push(Call::Other); }
		fn set_index_buffer(&mut self, _: &IndexBufferBinding) { self.calls.push(Call::Other); }
		fn set_constants(&mut self, _: &Pipeline, _: u32, _: &[u8]) { self.calls.push(Call::Other); }
		fn set_render_targets(&mut self, _: &FrameBuffer) { self.calls.push(Call::RenderTargets); }
		fn unset_render_targets(&mut self) { self.calls.push(Call::UnsetRenderTargets); }
		fn transition_resource(&mut self, resource: ResourceHandle, flags: BindFlags) { self.calls.push(Call::Transition(resource, flags)); }
		fn draw(&mut self, vertex_count: u32, instance_count: u32, _: u32, _: u32) { self.calls.push(Call::Draw(vertex_count, instance_count)); }
		fn draw_indexed(&mut self, _: u32, _: u32, _: u32, _: i32, _: u32) { self.calls.push(Call::DrawIndexed); }
		fn draw_indirect(&mut self, _: BufferHandle, offset: u64) { self.calls.push(Call::DrawIndirect(offset)); }
		fn draw_indexed_indirect(&mut self, _: BufferHandle, offset: u64) { self.calls.push(Call::DrawIndirect(offset)); }
		fn dispatch(&mut self, x: u32, y: u32, z: u32) { self.calls.push(Call::Dispatch(x, y, z)); }
		fn dispatch_indirect(&mut self, _: BufferHandle, _: u64) { self.calls.push(Call::DispatchIndirect); }
		fn copy_texture_region(&mut self, _: TextureHandle, _: TextureHandle, region: &TextureCopyRegion) { self.calls.push(Call::CopyTexture(*region)); }
		fn copy_buffer_region(&mut self, _: BufferHandle, _: u64, _: BufferHandle, _: u64, size: u64) { self.calls.push(Call::CopyBuffer(size)); }
		fn begin_query(&mut self, _: QueryPoolHandle, _: u32) { self.calls.push(Call::Query); }
		fn end_query(&mut self, _: QueryPoolHandle, _: u32) { self.calls.push(Call::Query); }
		fn resolve_query_data(&mut self, _: QueryPoolHandle, _: u32, _: u32, _: BufferHandle, _: u64) { self.calls.push(Call::Query); }
		fn begin_event(&mut self, name: &str) { self.calls.push(Call::BeginEvent(name.to_string())); }
		fn end_event(&mut self) { self.calls.push(Call::EndEvent); }
		fn flush(&mut self) { self.calls.push(Call::Flush); }
		fn wait_idle(&mut self) -> bool { true }
	}

	fn is_bind(call: &Call) -> bool { matches!(call, Call::Bind(_)) }

	#[test]
	fn triangle_replays_one_flush_before_draw() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::rectangle(1920, 1080));
		let source = color_texture(2, Extent::square(256));

		record_triangle(&mut command_list, &target, &source);

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		assert_eq!(context.count(is_bind), 1);
		assert_eq!(context.count(|call| matches!(call, Call::Draw(3, 1))), 1);

		let bind = context.calls.iter().position(is_bind).unwrap();
		let draw = context.calls.iter().position(|call| matches!(call, Call::Draw(..))).unwrap();
		assert_eq!(draw, bind + 1);

		assert_eq!(context.calls[bind], Call::Bind(vec![DescriptorRange { descriptor_type: DescriptorType::SampledImage, first_slot: 0, descriptors: vec![Descriptor::Texture { handle: source.handle(), general: false }] }]));

		let transitions = context.calls.iter().filter_map(|call| match call { Call::Transition(resource, flags) => Some((*resource, *flags)), _ => None }).collect::<Vec<_>>();
		assert_eq!(transitions, vec![(ResourceHandle::Texture(target.handle()), BindFlags::RENDER_TARGET), (ResourceHandle::Texture(target.handle()), BindFlags::empty())]);
	}

	#[test]
	fn contiguous_slots_bind_as_ranges() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::square(64));
		let uniforms = Buffer::new(BufferHandle(9), 256, Uses::Uniform);

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.set_pipeline_state(&graphics_pipeline());
		command_list.set_view(0, &View::texture(&color_texture(10, Extent::square(8))));
		command_list.set_view(1, &View::buffer(&uniforms));
		command_list.set_view(2, &View::texture(&color_texture(12, Extent::square(8))));
		command_list.set_view(3, &View::texture(&color_texture(13, Extent::square(8))));
		command_list.set_view(5, &View::texture(&color_texture(15, Extent::square(8))));
		command_list.set_sampler(6, SamplerHandle(1));
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		assert_eq!(context.count(is_bind), 1);

		let Some(Call::Bind(ranges)) = context.calls.iter().find(|call| is_bind(call)) else { panic!("no descriptors bound"); };

		let shape = ranges.iter().map(|range| (range.descriptor_type, range.first_slot, range.descriptors.len())).collect::<Vec<_>>();
		assert_eq!(shape, vec![
			(DescriptorType::UniformBuffer, 1, 1),
			(DescriptorType::SampledImage, 0, 1),
			(DescriptorType::SampledImage, 2, 2),
			(DescriptorType::SampledImage, 5, 1),
			(DescriptorType::Sampler, 6, 1),
		]);
	}

	#[test]
	fn general_transitions_are_free() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = storage_texture(1, Extent::square(64));

		record_compute(&mut command_list, &target);

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		// Created writable from shaders, so leaving `Undefined` for unordered access is free too.
		let transitions = context.calls.iter().filter(|call| matches!(call, Call::Transition(..))).count();
		assert_eq!(transitions, 0);
		assert_eq!(context.count(|call| matches!(call, Call::Dispatch(8, 8, 1))), 1);
		assert_eq!(context.count(is_bind), 1);
	}

	#[test]
	fn undefined_starts_from_the_creation_state() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::square(64));
		let arguments = Buffer::new(BufferHandle(4), 256, Uses::Indirect);

		command_list.begin();
		command_list.texture_barrier(&target, ResourceStates::Undefined, ResourceStates::ColorWrite);
		command_list.buffer_barrier(&arguments, ResourceStates::Undefined, ResourceStates::IndirectArgument);
		command_list.texture_barrier(&target, ResourceStates::Undefined, ResourceStates::ShaderRead);
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		let transitions = context.calls.iter().filter_map(|call| match call { Call::Transition(resource, flags) => Some((*resource, *flags)), _ => None }).collect::<Vec<_>>();
		assert_eq!(transitions, vec![(ResourceHandle::Texture(target.handle()), BindFlags::SHADER_RESOURCE)]);
	}

	#[test]
	fn draws_without_frame_buffer_replay_on_bound_targets() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let source = color_texture(2, Extent::square(8));

		command_list.begin();
		command_list.set_pipeline_state(&graphics_pipeline());
		command_list.set_view(0, &View::texture(&source));
		command_list.draw_instanced(3, 1, 0, 0);
		assert!(command_list.end());

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		let work = context.calls.iter().filter(|call| matches!(call, Call::Bind(_) | Call::Draw(..))).cloned().collect::<Vec<_>>();
		assert_eq!(work, vec![
			Call::Bind(vec![DescriptorRange { descriptor_type: DescriptorType::SampledImage, first_slot: 0, descriptors: vec![Descriptor::Texture { handle: source.handle(), general: false }] }]),
			Call::Draw(3, 1),
		]);
		assert_eq!(context.count(|call| matches!(call, Call::RenderTargets | Call::UnsetRenderTargets)), 0);
	}

	#[test]
	fn work_inside_frame_buffer_keeps_targets_bound() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::square(64));
		let source = color_texture(2, Extent::square(64));

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.texture_barrier(&source, ResourceStates::CopyDestination, ResourceStates::ShaderRead);
		command_list.dispatch(2, 2, 1);
		command_list.draw_instanced(6, 1, 0, 0);
		command_list.end_frame_buffer();
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		let work = context.calls.iter().filter(|call| matches!(call, Call::RenderTargets | Call::UnsetRenderTargets | Call::Transition(..) | Call::Draw(..) | Call::Dispatch(..))).cloned().collect::<Vec<_>>();
		assert_eq!(work, vec![
			Call::RenderTargets,
			Call::Draw(3, 1),
			Call::Transition(ResourceHandle::Texture(source.handle()), BindFlags::SHADER_RESOURCE),
			Call::Dispatch(2, 2, 1),
			Call::Draw(6, 1),
			Call::UnsetRenderTargets,
		]);
	}

	#[test]
	fn indirect_draws_are_unrolled() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::square(64));
		let arguments = Buffer::new(BufferHandle(4), 1024, Uses::Indirect);

		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.draw_instanced_indirect(&arguments, 64, 3, 16);
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		let offsets = context.calls.iter().filter_map(|call| match call { Call::DrawIndirect(offset) => Some(*offset), _ => None }).collect::<Vec<_>>();
		assert_eq!(offsets, vec![64, 80, 96]);

		// Closed by `end`.
		assert_eq!(context.calls.last(), Some(&Call::UnsetRenderTargets));
	}

	#[test]
	fn bundles_replay_inline_with_inherited_state() {
		let target = color_texture(1, Extent::square(64));

		let mut bundle = EmulatedCommandList::bundle(Capabilities::default());
		bundle.begin();
		bundle.set_view(0, &View::texture(&color_texture(2, Extent::square(8))));
		bundle.begin_event("Bundle");
		bundle.end_event();
		bundle.end();

		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.set_pipeline_state(&graphics_pipeline());
		command_list.set_stencil_reference(7);
		command_list.execute_bundle(&bundle);
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		// The bundle's own begin doesn't reset the stencil reference set before it.
		assert_eq!(context.count(|call| matches!(call, Call::StencilReference(_))), 2);
		assert_eq!(context.calls.iter().rev().find_map(|call| match call { Call::StencilReference(reference) => Some(*reference), _ => None }), Some(7));

		assert!(context.calls.contains(&Call::BeginEvent("Bundle".to_string())));
		assert_eq!(context.count(is_bind), 1);
	}

	#[test]
	fn bundles_draw_into_the_outer_frame_buffer() {
		let target = color_texture(1, Extent::square(64));
		let source = color_texture(2, Extent::square(8));

		let mut bundle = EmulatedCommandList::bundle(Capabilities::default());
		bundle.begin();
		bundle.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&color_texture(3, Extent::square(32)))]));
		bundle.set_pipeline_state(&graphics_pipeline());
		bundle.set_view(0, &View::texture(&source));
		bundle.draw_instanced(3, 1, 0, 0);
		assert!(bundle.end());

		// The bundle can't bind targets of its own.
		assert!(!bundle.tape().unwrap().commands().iter().any(|command| matches!(command, Command::BeginFrameBuffer(_) | Command::EndFrameBuffer)));

		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		command_list.begin();
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.execute_bundle(&bundle);
		command_list.end_frame_buffer();
		command_list.end();

		let mut context = RecordingContext::default();
		command_list.tape().unwrap().execute(&mut context);

		let work = context.calls.iter().filter(|call| matches!(call, Call::RenderTargets | Call::UnsetRenderTargets | Call::Bind(_) | Call::Draw(..))).map(|call| match call { Call::Bind(_) => "bind", Call::Draw(..) => "draw", Call::RenderTargets => "targets", _ => "unset" }).collect::<Vec<_>>();
		assert_eq!(work, vec!["targets", "bind", "draw", "unset"]);
	}

	#[test]
	fn only_closed_bundles_are_executed() {
		let mut open = EmulatedCommandList::bundle(Capabilities::default());
		open.begin();

		let mut primary = EmulatedCommandList::new(Capabilities::default());
		primary.begin();
		primary.end();

		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		command_list.begin();
		command_list.execute_bundle(&open);
		command_list.execute_bundle(&primary);
		command_list.end();

		assert!(!command_list.tape().unwrap().commands().iter().any(|command| matches!(command, Command::ExecuteBundle(_))));

		let mut closed = EmulatedCommandList::bundle(Capabilities::default());
		closed.begin();
		closed.end();

		// Bundles don't nest.
		open.execute_bundle(&closed);
		open.end();
		assert!(!open.tape().unwrap().commands().iter().any(|command| matches!(command, Command::ExecuteBundle(_))));
	}

	#[test]
	fn tapes_are_single_use_per_submission() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());

		command_list.begin();
		command_list.dispatch(1, 1, 1);
		command_list.end();

		let tape = command_list.take_submission();
		assert!(command_list.is_submitted());
		assert_eq!(tape.commands().len(), 3);

		assert!(command_list.begin());
		assert!(!command_list.is_submitted());
		assert!(command_list.tape().is_none());
	}

	#[test]
	fn unsupported_work_is_not_recorded() {
		let mut command_list = EmulatedCommandList::new(Capabilities::default());
		let target = color_texture(1, Extent::square(64));

		command_list.begin();
		command_list.texture_barrier(&target, ResourceStates::ShaderRead, ResourceStates::AccelerationStructure);
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(&target)]));
		command_list.dispatch_mesh(1, 1, 1);
		command_list.end();

		assert_eq!(command_list.tape().unwrap().commands().len(), 4);
	}
}
