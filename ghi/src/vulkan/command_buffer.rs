use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::command_list::{CommandEncoder, DescriptorUpdate};
use crate::graphics_hardware_interface::{Attachment, Buffer, BufferBinding, BufferHandle, BufferStridedRange, Capabilities, Descriptor, DescriptorType, DescriptorWrite, FrameBuffer, IndexBufferBinding, Pipeline, QueryPoolHandle, Ranges, Rect, ResourceStates, ShaderBindingTables, Texture, TextureCopyRegion, Viewport};
use crate::transition::Transition;

use super::device::{Device, PipelineEntry};
use super::utils::{self as vulkan_utils, NativeBarrier};

enum DescriptorInfo {
	Image(vk::DescriptorImageInfo),
	Buffer(vk::DescriptorBufferInfo),
}

/// A primary command buffer with its own pool.
/// When descriptors can't be pushed it also owns the pool descriptor tables are allocated from, reset on every `begin`.
pub struct CommandBuffer {
	device: Arc<Device>,
	command_pool: vk::CommandPool,
	command_buffer: vk::CommandBuffer,
	descriptor_pool: Option<vk::DescriptorPool>,
}

impl CommandBuffer {
	pub(super) fn new(device: Arc<Device>, name: Option<&str>) -> Result<Self, &'static str> {
		let pool_create_info = vk::CommandPoolCreateInfo::default()
			.flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
			.queue_family_index(device.queue_family_index);

		let command_pool = unsafe { device.device.create_command_pool(&pool_create_info, None) }.map_err(|error| {
			log::error!("Failed to create a command pool. The Vulkan driver returned: {:?}", error);
			"Failed to create a command pool"
		})?;

		let allocate_info = vk::CommandBufferAllocateInfo::default()
			.command_pool(command_pool)
			.level(vk::CommandBufferLevel::PRIMARY)
			.command_buffer_count(1);

		let command_buffer = match unsafe { device.device.allocate_command_buffers(&allocate_info) } {
			Ok(command_buffers) if !command_buffers.is_empty() => command_buffers[0],
			result => {
				log::error!("Failed to allocate a command buffer. The Vulkan driver returned: {:?}", result.err());
				unsafe { device.device.destroy_command_pool(command_pool, None); }
				return Err("Failed to allocate a command buffer");
			}
		};

		let descriptor_pool = match device.descriptor_heap() {
			Some(heap) => {
				let descriptor_count = heap.capacity();

				let pool_sizes = [
					vk::DescriptorPoolSize::default().ty(vk::DescriptorType::UNIFORM_BUFFER).descriptor_count(descriptor_count),
					vk::DescriptorPoolSize::default().ty(vk::DescriptorType::STORAGE_BUFFER).descriptor_count(descriptor_count),
					vk::DescriptorPoolSize::default().ty(vk::DescriptorType::SAMPLED_IMAGE).descriptor_count(descriptor_count),
					vk::DescriptorPoolSize::default().ty(vk::DescriptorType::STORAGE_IMAGE).descriptor_count(descriptor_count),
					vk::DescriptorPoolSize::default().ty(vk::DescriptorType::SAMPLER).descriptor_count(descriptor_count),
				];

				let descriptor_pool_create_info = vk::DescriptorPoolCreateInfo::default()
					.max_sets(descriptor_count)
					.pool_sizes(&pool_sizes);

				match unsafe { device.device.create_descriptor_pool(&descriptor_pool_create_info, None) } {
					Ok(descriptor_pool) => Some(descriptor_pool),
					Err(error) => {
						log::error!("Failed to create a descriptor pool. The Vulkan driver returned: {:?}", error);
						unsafe { device.device.destroy_command_pool(command_pool, None); }
						return Err("Failed to create a descriptor pool");
					}
				}
			}
			None => None,
		};

		if let Some(name) = name {
			device.set_name(command_buffer, name);
		}

		Ok(Self { device, command_pool, command_buffer, descriptor_pool })
	}

	pub fn command_buffer(&self) -> vk::CommandBuffer { self.command_buffer }

	fn resolve_descriptor(&self, write: &DescriptorWrite) -> Option<DescriptorInfo> {
		match write.descriptor {
			Descriptor::Texture { handle, general } => {
				let texture = self.device.texture(handle)?;

				let layout = if general || write.descriptor_type == DescriptorType::StorageImage {
					vk::ImageLayout::GENERAL
				} else if texture.description.format.is_depth() {
					vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
				} else {
					vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
				};

				Some(DescriptorInfo::Image(vk::DescriptorImageInfo::default().image_view(texture.view).image_layout(layout)))
			}
			Descriptor::Buffer { handle, offset, range } => {
				let buffer = self.device.buffer(handle)?;

				let range = match range {
					Ranges::Size(size) => size,
					Ranges::Whole => vk::WHOLE_SIZE,
				};

				Some(DescriptorInfo::Buffer(vk::DescriptorBufferInfo::default().buffer(buffer.buffer).offset(offset).range(range)))
			}
			Descriptor::Sampler(handle) => {
				let sampler = self.device.sampler(handle)?;
				Some(DescriptorInfo::Image(vk::DescriptorImageInfo::default().sampler(sampler)))
			}
		}
	}

	fn allocate_descriptor_set(&self, pipeline: &PipelineEntry) -> Option<vk::DescriptorSet> {
		let descriptor_pool = self.descriptor_pool?;

		let set_layouts = [pipeline.set_layout];

		let allocate_info = vk::DescriptorSetAllocateInfo::default()
			.descriptor_pool(descriptor_pool)
			.set_layouts(&set_layouts);

		match unsafe { self.device.device.allocate_descriptor_sets(&allocate_info) } {
			Ok(sets) => sets.first().copied(),
			Err(error) => {
				log::error!("Failed to allocate a descriptor set. The Vulkan driver returned: {:?}", error);
				None
			}
		}
	}

	fn rendering_attachment(&self, attachment: &Attachment, state: ResourceStates) -> Option<vk::RenderingAttachmentInfo<'static>> {
		let texture = self.device.texture(attachment.texture.handle)?;
		let native = vulkan_utils::to_native_state(state, Some(texture.description.format), false, false)?;

		Some(vk::RenderingAttachmentInfo::default()
			.image_view(texture.view)
			.image_layout(native.layout)
			.load_op(vulkan_utils::to_load_operation(attachment.load))
			.store_op(vulkan_utils::to_store_operation(attachment.store))
			.clear_value(vulkan_utils::to_clear_value(attachment.clear))
		)
	}

	fn record_barrier(&self, barrier: NativeBarrier) {
		let dependency_info = vk::DependencyInfo::default();

		let memory_barriers;
		let image_barriers;
		let buffer_barriers;

		let dependency_info = match barrier {
			NativeBarrier::Memory(barrier) => {
				memory_barriers = [barrier];
				dependency_info.memory_barriers(&memory_barriers)
			}
			NativeBarrier::Image(barrier) => {
				image_barriers = [barrier];
				dependency_info.image_memory_barriers(&image_barriers)
			}
			NativeBarrier::Buffer(barrier) => {
				buffer_barriers = [barrier];
				dependency_info.buffer_memory_barriers(&buffer_barriers)
			}
		};

		unsafe { self.device.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info); }
	}

	fn strided_region(&self, range: &BufferStridedRange) -> Option<vk::StridedDeviceAddressRegionKHR> {
		let buffer = self.device.buffer(range.buffer)?;

		if buffer.address == 0 {
			log::error!("Shader binding table buffer {:?} was imported without a device address.", range.buffer);
			return None;
		}

		Some(vk::StridedDeviceAddressRegionKHR::default()
			.device_address(buffer.address + range.offset)
			.stride(range.stride)
			.size(range.size)
		)
	}
}

impl CommandEncoder for CommandBuffer {
	type Submission = vk::CommandBuffer;

	fn capabilities(&self) -> Capabilities { self.device.capabilities() }

	fn begin(&mut self) -> bool {
		if let Some(descriptor_pool) = self.descriptor_pool {
			if let Err(error) = unsafe { self.device.device.reset_descriptor_pool(descriptor_pool, vk::DescriptorPoolResetFlags::empty()) } {
				log::error!("Failed to reset the descriptor pool. The Vulkan driver returned: {:?}", error);
				return false;
			}
		}

		let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

		match unsafe { self.device.device.begin_command_buffer(self.command_buffer, &begin_info) } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to begin the command buffer. The Vulkan driver returned: {:?}", error);
				false
			}
		}
	}

	fn end(&mut self) -> bool {
		match unsafe { self.device.device.end_command_buffer(self.command_buffer) } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to end the command buffer. The Vulkan driver returned: {:?}", error);
				false
			}
		}
	}

	fn submission(&self) -> vk::CommandBuffer { self.command_buffer }

	fn bind_pipeline(&mut self, pipeline: &Pipeline) {
		let Some(entry) = self.device.pipeline(pipeline.handle) else { return; };

		unsafe { self.device.device.cmd_bind_pipeline(self.command_buffer, vulkan_utils::to_pipeline_bind_point(pipeline.bind_point), entry.pipeline); }
	}

	fn update_descriptors(&mut self, pipeline: &Pipeline, update: DescriptorUpdate<'_>) {
		let Some(entry) = self.device.pipeline(pipeline.handle) else { return; };

		let (writes, push) = match update {
			DescriptorUpdate::Push(writes) => (writes, true),
			DescriptorUpdate::Table(table) => (table.writes(), false),
		};

		let infos = writes.iter().filter_map(|write| self.resolve_descriptor(write).map(|info| (write, info))).collect::<Vec<_>>();

		let bind_point = vulkan_utils::to_pipeline_bind_point(pipeline.bind_point);

		if push {
			let Some(push_descriptor) = &self.device.push_descriptor else {
				log::error!("Descriptors can't be pushed on this device.");
				return;
			};

			let native_writes = infos.iter().map(|(write, info)| {
				let native_write = vk::WriteDescriptorSet::default()
					.dst_binding(write.binding)
					.dst_array_element(write.array_element)
					.descriptor_type(vulkan_utils::to_descriptor_type(write.descriptor_type));

				match info {
					DescriptorInfo::Image(info) => native_write.image_info(std::slice::from_ref(info)),
					DescriptorInfo::Buffer(info) => native_write.buffer_info(std::slice::from_ref(info)),
				}
			}).collect::<Vec<_>>();

			unsafe { push_descriptor.cmd_push_descriptor_set(self.command_buffer, bind_point, entry.pipeline_layout, 0, &native_writes); }

			return;
		}

		let Some(descriptor_set) = self.allocate_descriptor_set(&entry) else { return; };

		let native_writes = infos.iter().map(|(write, info)| {
			let native_write = vk::WriteDescriptorSet::default()
				.dst_set(descriptor_set)
				.dst_binding(write.binding)
				.dst_array_element(write.array_element)
				.descriptor_type(vulkan_utils::to_descriptor_type(write.descriptor_type));

			match info {
				DescriptorInfo::Image(info) => native_write.image_info(std::slice::from_ref(info)),
				DescriptorInfo::Buffer(info) => native_write.buffer_info(std::slice::from_ref(info)),
			}
		}).collect::<Vec<_>>();

		unsafe {
			self.device.device.update_descriptor_sets(&native_writes, &[]);
			self.device.device.cmd_bind_descriptor_sets(self.command_buffer, bind_point, entry.pipeline_layout, 0, &[descriptor_set], &[]);
		}
	}

	fn set_viewports(&mut self, viewports: &[Viewport]) {
		let viewports = viewports.iter().map(vulkan_utils::to_viewport).collect::<Vec<_>>();
		unsafe { self.device.device.cmd_set_viewport(self.command_buffer, 0, &viewports); }
	}

	fn set_scissors(&mut self, scissors: &[Rect]) {
		let scissors = scissors.iter().map(vulkan_utils::to_rect).collect::<Vec<_>>();
		unsafe { self.device.device.cmd_set_scissor(self.command_buffer, 0, &scissors); }
	}

	fn set_blend_constants(&mut self, constants: [f32; 4]) {
		unsafe { self.device.device.cmd_set_blend_constants(self.command_buffer, &constants); }
	}

	fn set_stencil_reference(&mut self, reference: u32) {
		unsafe { self.device.device.cmd_set_stencil_reference(self.command_buffer, vk::StencilFaceFlags::FRONT_AND_BACK, reference); }
	}

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]) {
		let mut buffers = Vec::with_capacity(bindings.len());
		let mut offsets = Vec::with_capacity(bindings.len());

		for binding in bindings {
			let Some(buffer) = self.device.buffer(binding.buffer) else { return; };
			buffers.push(buffer.buffer);
			offsets.push(binding.offset);
		}

		// Strides are part of the pipeline's vertex input state.
		unsafe { self.device.device.cmd_bind_vertex_buffers(self.command_buffer, first_slot, &buffers, &offsets); }
	}

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding) {
		let Some(buffer) = self.device.buffer(binding.buffer) else { return; };

		unsafe { self.device.device.cmd_bind_index_buffer(self.command_buffer, buffer.buffer, binding.offset, vulkan_utils::to_index_type(binding.index_type)); }
	}

	fn set_constants(&mut self, pipeline: &Pipeline, offset: u32, data: &[u8]) {
		let Some(entry) = self.device.pipeline(pipeline.handle) else { return; };

		unsafe { self.device.device.cmd_push_constants(self.command_buffer, entry.pipeline_layout, vulkan_utils::to_shader_stage_flags(pipeline.push_constant_stages), offset, data); }
	}

	fn begin_rendering(&mut self, frame_buffer: &FrameBuffer) -> bool {
		let mut color_attachments = Vec::with_capacity(frame_buffer.color.len());

		for attachment in &frame_buffer.color {
			let Some(color_attachment) = self.rendering_attachment(attachment, ResourceStates::ColorWrite) else { return false; };
			color_attachments.push(color_attachment);
		}

		let depth_attachment = match &frame_buffer.depth {
			Some(attachment) => match self.rendering_attachment(attachment, ResourceStates::DepthWrite) {
				Some(depth_attachment) => Some(depth_attachment),
				None => return false,
			},
			None => None,
		};

		let render_area = vulkan_utils::to_rect(&Rect::from_extent(frame_buffer.extent));

		let rendering_info = vk::RenderingInfo::default()
			.render_area(render_area)
			.layer_count(1)
			.color_attachments(&color_attachments);

		let rendering_info = match &depth_attachment {
			Some(depth_attachment) => rendering_info.depth_attachment(depth_attachment),
			None => rendering_info,
		};

		unsafe { self.device.device.cmd_begin_rendering(self.command_buffer, &rendering_info); }

		true
	}

	fn end_rendering(&mut self) {
		unsafe { self.device.device.cmd_end_rendering(self.command_buffer); }
	}

	fn texture_barrier(&mut self, texture: &Texture, transition: Transition) {
		let Some(entry) = self.device.texture(texture.handle) else { return; };

		let description = &entry.description;
		let general = description.uses.contains(crate::graphics_hardware_interface::Uses::Storage);

		match vulkan_utils::texture_barrier(entry.image, description.format, description.mip_levels, description.array_layers, &transition, general, self.device.capabilities().ray_tracing) {
			Some(barrier) => self.record_barrier(barrier),
			None => log::error!("Transition {:?} -> {:?} is not supported for textures on this device.", transition.previous, transition.next),
		}
	}

	fn buffer_barrier(&mut self, buffer: &Buffer, transition: Transition) {
		let Some(entry) = self.device.buffer(buffer.handle) else { return; };

		match vulkan_utils::buffer_barrier(entry.buffer, &transition, self.device.capabilities().ray_tracing) {
			Some(barrier) => self.record_barrier(barrier),
			None => log::error!("Transition {:?} -> {:?} is not supported on this device.", transition.previous, transition.next),
		}
	}

	fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
		unsafe { self.device.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance); }
	}

	fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32) {
		unsafe { self.device.device.cmd_draw_indexed(self.command_buffer, index_count, instance_count, first_index, base_vertex, first_instance); }
	}

	fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32) {
		let Some(entry) = self.device.buffer(buffer) else { return; };
		unsafe { self.device.device.cmd_draw_indirect(self.command_buffer, entry.buffer, offset, draw_count, stride); }
	}

	fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32) {
		let Some(entry) = self.device.buffer(buffer) else { return; };
		unsafe { self.device.device.cmd_draw_indexed_indirect(self.command_buffer, entry.buffer, offset, draw_count, stride); }
	}

	fn dispatch(&mut self, x: u32, y: u32, z: u32) {
		unsafe { self.device.device.cmd_dispatch(self.command_buffer, x, y, z); }
	}

	fn dispatch_indirect(&mut self, buffer: BufferHandle, offset: u64) {
		let Some(entry) = self.device.buffer(buffer) else { return; };
		unsafe { self.device.device.cmd_dispatch_indirect(self.command_buffer, entry.buffer, offset); }
	}

	fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32) {
		let Some(mesh_shading) = &self.device.mesh_shading else {
			log::warn!("Mesh shading is not supported by this device.");
			return;
		};

		unsafe { mesh_shading.cmd_draw_mesh_tasks(self.command_buffer, x, y, z); }
	}

	fn dispatch_mesh_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32) {
		let Some(mesh_shading) = &self.device.mesh_shading else {
			log::warn!("Mesh shading is not supported by this device.");
			return;
		};

		let Some(entry) = self.device.buffer(buffer) else { return; };

		unsafe { mesh_shading.cmd_draw_mesh_tasks_indirect(self.command_buffer, entry.buffer, offset, draw_count, stride); }
	}

	fn trace_rays(&mut self, tables: &ShaderBindingTables, width: u32, height: u32, depth: u32) {
		let Some(ray_tracing) = &self.device.ray_tracing else {
			log::warn!("Ray tracing is not supported by this device.");
			return;
		};

		let (Some(raygen), Some(miss), Some(hit)) = (self.strided_region(&tables.raygen), self.strided_region(&tables.miss), self.strided_region(&tables.hit)) else { return; };

		let callable = match &tables.callable {
			Some(callable) => match self.strided_region(callable) {
				Some(callable) => callable,
				None => return,
			},
			None => vk::StridedDeviceAddressRegionKHR::default(),
		};

		unsafe { ray_tracing.cmd_trace_rays(self.command_buffer, &raygen, &miss, &hit, &callable, width, height, depth); }
	}

	fn copy_texture_region(&mut self, source: &Texture, destination: &Texture, region: &TextureCopyRegion) {
		let (Some(source_entry), Some(destination_entry)) = (self.device.texture(source.handle), self.device.texture(destination.handle)) else { return; };

		let offset = |offset: [u32; 3]| vk::Offset3D { x: offset[0] as i32, y: offset[1] as i32, z: offset[2] as i32 };

		let image_copy = vk::ImageCopy::default()
			.src_subresource(vk::ImageSubresourceLayers::default()
				.aspect_mask(vulkan_utils::to_image_aspect(source_entry.description.format))
				.mip_level(region.source_mip_level)
				.base_array_layer(region.source_array_layer)
				.layer_count(1)
			)
			.src_offset(offset(region.source_offset))
			.dst_subresource(vk::ImageSubresourceLayers::default()
				.aspect_mask(vulkan_utils::to_image_aspect(destination_entry.description.format))
				.mip_level(region.destination_mip_level)
				.base_array_layer(region.destination_array_layer)
				.layer_count(1)
			)
			.dst_offset(offset(region.destination_offset))
			.extent(vulkan_utils::to_extent_3d(region.extent));

		unsafe { self.device.device.cmd_copy_image(self.command_buffer, source_entry.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, destination_entry.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[image_copy]); }
	}

	fn copy_buffer_region(&mut self, source: BufferHandle, source_offset: u64, destination: BufferHandle, destination_offset: u64, size: u64) {
		let (Some(source), Some(destination)) = (self.device.buffer(source), self.device.buffer(destination)) else { return; };

		let region = vk::BufferCopy::default().src_offset(source_offset).dst_offset(destination_offset).size(size);

		unsafe { self.device.device.cmd_copy_buffer(self.command_buffer, source.buffer, destination.buffer, &[region]); }
	}

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32) {
		let Some(query_pool) = self.device.query_pool(pool) else { return; };
		unsafe { self.device.device.cmd_begin_query(self.command_buffer, query_pool, index, vk::QueryControlFlags::empty()); }
	}

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32) {
		let Some(query_pool) = self.device.query_pool(pool) else { return; };
		unsafe { self.device.device.cmd_end_query(self.command_buffer, query_pool, index); }
	}

	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: BufferHandle, offset: u64) {
		let (Some(query_pool), Some(destination)) = (self.device.query_pool(pool), self.device.buffer(destination)) else { return; };

		unsafe {
			self.device.device.cmd_copy_query_pool_results(self.command_buffer, query_pool, first, count, destination.buffer, offset, std::mem::size_of::<u64>() as u64, vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT);
		}
	}

	fn begin_event(&mut self, name: &str) {
		let Some(debug_utils) = &self.device.debug_utils else { return; };

		let Ok(name) = CString::new(name) else { return; };

		let label = vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str());

		unsafe { debug_utils.cmd_begin_debug_utils_label(self.command_buffer, &label); }
	}

	fn end_event(&mut self) {
		let Some(debug_utils) = &self.device.debug_utils else { return; };

		unsafe { debug_utils.cmd_end_debug_utils_label(self.command_buffer); }
	}
}

impl Drop for CommandBuffer {
	fn drop(&mut self) {
		unsafe {
			if let Some(descriptor_pool) = self.descriptor_pool {
				self.device.device.destroy_descriptor_pool(descriptor_pool, None);
			}

			self.device.device.destroy_command_pool(self.command_pool, None);
		}
	}
}
