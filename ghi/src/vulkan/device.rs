use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;
use utils::sync::RwLock;

use crate::command_list::ExplicitCommandList;
use crate::descriptor_heap::DescriptorHeap;
use crate::fence::Fence;
use crate::graphics_hardware_interface::{Buffer, BufferHandle, Capabilities, DescriptorSetLayout, Features, Pipeline, PipelineBindPoints, PipelineHandle, QueryPoolHandle, SamplerHandle, Stages, Texture, TextureDescription, TextureHandle, Uses};
use crate::queue::Queue;
use crate::render_debugger::RenderDebugger;

use super::command_buffer::CommandBuffer;
use super::fence::TimelineSemaphore;
use super::queue::VulkanQueue;

#[derive(Clone, Copy)]
pub(super) struct TextureEntry {
	pub(super) image: vk::Image,
	pub(super) view: vk::ImageView,
	pub(super) description: TextureDescription,
}

#[derive(Clone, Copy)]
pub(super) struct BufferEntry {
	pub(super) buffer: vk::Buffer,
	/// Zero unless the buffer was imported with its device address.
	pub(super) address: vk::DeviceAddress,
}

#[derive(Clone, Copy)]
pub(super) struct PipelineEntry {
	pub(super) pipeline: vk::Pipeline,
	pub(super) pipeline_layout: vk::PipelineLayout,
	pub(super) set_layout: vk::DescriptorSetLayout,
}

/// Slots of imported objects. Released slots are reused.
struct Table<T> {
	entries: RwLock<Vec<Option<T>>>,
}

impl<T: Copy> Table<T> {
	fn new() -> Self {
		Self { entries: RwLock::new(Vec::new()) }
	}

	fn insert(&self, entry: T) -> u64 {
		let mut entries = self.entries.write();

		match entries.iter().position(Option::is_none) {
			Some(index) => {
				entries[index] = Some(entry);
				index as u64
			}
			None => {
				entries.push(Some(entry));
				(entries.len() - 1) as u64
			}
		}
	}

	fn get(&self, index: u64) -> Option<T> {
		self.entries.read().get(index as usize).copied().flatten()
	}

	fn remove(&self, index: u64) -> Option<T> {
		self.entries.write().get_mut(index as usize).and_then(Option::take)
	}
}

/// An imported Vulkan device and the native objects it knows about.
/// The device, the instance and every imported object stay owned by the caller, nothing imported is destroyed here.
pub struct Device {
	pub(super) instance: ash::Instance,
	pub(super) physical_device: vk::PhysicalDevice,
	pub(super) device: ash::Device,
	pub(super) queue_family_index: u32,

	pub(super) swapchain: ash::khr::swapchain::Device,
	pub(super) push_descriptor: Option<ash::khr::push_descriptor::Device>,
	pub(super) mesh_shading: Option<ash::ext::mesh_shader::Device>,
	pub(super) ray_tracing: Option<ash::khr::ray_tracing_pipeline::Device>,
	pub(super) debug_utils: Option<ash::ext::debug_utils::Device>,

	features: Features,
	capabilities: Capabilities,
	descriptor_heap: Option<Arc<DescriptorHeap>>,

	textures: Table<TextureEntry>,
	buffers: Table<BufferEntry>,
	samplers: Table<vk::Sampler>,
	pipelines: Table<PipelineEntry>,
	query_pools: Table<vk::QueryPool>,

	debugger: Option<RenderDebugger>,
}

fn has_extension(extensions: &[vk::ExtensionProperties], name: &CStr) -> bool {
	extensions.iter().any(|extension| extension.extension_name_as_c_str().map_or(false, |extension_name| extension_name == name))
}

impl Device {
	/// Imports a device created by the caller and probes the optional functionality it exposes.
	/// Requested features the device lacks are turned off with a warning. Extensions reported as available are
	/// expected to have been enabled when the device was created.
	pub fn import(entry: &ash::Entry, instance: &ash::Instance, physical_device: vk::PhysicalDevice, device: &ash::Device, queue_family_index: u32, features: &Features) -> Result<Arc<Device>, &'static str> {
		let device_extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }.map_err(|error| {
			log::error!("Failed to enumerate device extensions. The Vulkan driver returned: {:?}", error);
			"Failed to enumerate device extensions"
		})?;

		if !has_extension(&device_extensions, ash::khr::swapchain::NAME) {
			return Err("Swapchain extension not available");
		}

		let push_descriptor = if features.push_descriptors {
			if has_extension(&device_extensions, ash::khr::push_descriptor::NAME) {
				Some(ash::khr::push_descriptor::Device::new(instance, device))
			} else {
				log::debug!("Push descriptors are not available. Descriptors will be written into tables.");
				None
			}
		} else {
			None
		};

		let mesh_shading = if features.mesh_shading {
			if has_extension(&device_extensions, ash::ext::mesh_shader::NAME) {
				Some(ash::ext::mesh_shader::Device::new(instance, device))
			} else {
				log::warn!("Mesh shading was requested but the device doesn't support it.");
				None
			}
		} else {
			None
		};

		let ray_tracing = if features.ray_tracing {
			if has_extension(&device_extensions, ash::khr::ray_tracing_pipeline::NAME) && has_extension(&device_extensions, ash::khr::acceleration_structure::NAME) {
				Some(ash::khr::ray_tracing_pipeline::Device::new(instance, device))
			} else {
				log::warn!("Ray tracing was requested but the device doesn't support it.");
				None
			}
		} else {
			None
		};

		let debug_utils = if features.validation {
			let instance_extensions = unsafe { entry.enumerate_instance_extension_properties(None) }.unwrap_or_default();

			if has_extension(&instance_extensions, ash::ext::debug_utils::NAME) {
				Some(ash::ext::debug_utils::Device::new(instance, device))
			} else {
				log::warn!("Validation was requested but debug utils are not available. Objects won't be named.");
				None
			}
		} else {
			None
		};

		let capabilities = Capabilities {
			push_descriptor: push_descriptor.is_some(),
			mesh_shading: mesh_shading.is_some(),
			ray_tracing: ray_tracing.is_some(),
		};

		let descriptor_heap = if capabilities.push_descriptor {
			None
		} else {
			if features.descriptor_heap_size == 0 {
				return Err("Descriptor heap size must not be zero when descriptors can't be pushed");
			}

			Some(Arc::new(DescriptorHeap::new(features.descriptor_heap_size)))
		};

		let debugger = if features.debug_capture {
			let debugger = RenderDebugger::new();
			if debugger.is_attached() { Some(debugger) } else { None }
		} else {
			None
		};

		log::debug!("Imported Vulkan device. {:?}", capabilities);

		Ok(Arc::new(Device {
			instance: instance.clone(),
			physical_device,
			device: device.clone(),
			queue_family_index,
			swapchain: ash::khr::swapchain::Device::new(instance, device),
			push_descriptor,
			mesh_shading,
			ray_tracing,
			debug_utils,
			features: *features,
			capabilities,
			descriptor_heap,
			textures: Table::new(),
			buffers: Table::new(),
			samplers: Table::new(),
			pipelines: Table::new(),
			query_pools: Table::new(),
			debugger,
		}))
	}

	pub fn capabilities(&self) -> Capabilities { self.capabilities }

	pub fn features(&self) -> &Features { &self.features }

	pub fn raw(&self) -> &ash::Device { &self.device }

	pub fn queue_family_index(&self) -> u32 { self.queue_family_index }

	/// The descriptor storage shared by every command list, present only when descriptors can't be pushed.
	pub fn descriptor_heap(&self) -> Option<&Arc<DescriptorHeap>> { self.descriptor_heap.as_ref() }

	pub(super) fn set_name<T: vk::Handle>(&self, handle: T, name: &str) {
		let Some(debug_utils) = &self.debug_utils else { return; };

		let Ok(name) = CString::new(name) else { return; };

		// Naming is best effort.
		unsafe {
			debug_utils.set_debug_utils_object_name(
				&vk::DebugUtilsObjectNameInfoEXT::default()
					.object_handle(handle)
					.object_name(name.as_c_str())
			).ok();
		}
	}

	pub fn import_texture(&self, image: vk::Image, view: vk::ImageView, description: TextureDescription, name: Option<&str>) -> Result<Texture, &'static str> {
		if image == vk::Image::null() || view == vk::ImageView::null() {
			return Err("Texture image and view must not be null");
		}

		if description.extent.is_empty() {
			return Err("Texture extent must not be empty");
		}

		if let Some(name) = name {
			self.set_name(image, name);
			self.set_name(view, name);
		}

		let handle = TextureHandle(self.textures.insert(TextureEntry { image, view, description }));

		Ok(Texture::new(handle, description))
	}

	/// Forgets a texture. The native image and view are left to the caller.
	pub fn release_texture(&self, texture: TextureHandle) -> Option<(vk::Image, vk::ImageView)> {
		self.textures.remove(texture.0).map(|entry| (entry.image, entry.view))
	}

	/// `address` is required for buffers read as shader binding tables.
	pub fn import_buffer(&self, buffer: vk::Buffer, size: u64, uses: Uses, address: Option<vk::DeviceAddress>, name: Option<&str>) -> Result<Buffer, &'static str> {
		if buffer == vk::Buffer::null() {
			return Err("Buffer must not be null");
		}

		if let Some(name) = name {
			self.set_name(buffer, name);
		}

		let handle = BufferHandle(self.buffers.insert(BufferEntry { buffer, address: address.unwrap_or(0) }));

		Ok(Buffer::new(handle, size, uses))
	}

	pub fn release_buffer(&self, buffer: BufferHandle) -> Option<vk::Buffer> {
		self.buffers.remove(buffer.0).map(|entry| entry.buffer)
	}

	pub fn import_sampler(&self, sampler: vk::Sampler, name: Option<&str>) -> Result<SamplerHandle, &'static str> {
		if sampler == vk::Sampler::null() {
			return Err("Sampler must not be null");
		}

		if let Some(name) = name {
			self.set_name(sampler, name);
		}

		Ok(SamplerHandle(self.samplers.insert(sampler)))
	}

	/// Imports a pipeline built against `set_layout`, the native counterpart of `layout`.
	pub fn import_pipeline(&self, pipeline: vk::Pipeline, pipeline_layout: vk::PipelineLayout, set_layout: vk::DescriptorSetLayout, bind_point: PipelineBindPoints, layout: Arc<DescriptorSetLayout>, push_constant_stages: Stages, name: Option<&str>) -> Result<Pipeline, &'static str> {
		if pipeline == vk::Pipeline::null() || pipeline_layout == vk::PipelineLayout::null() {
			return Err("Pipeline and pipeline layout must not be null");
		}

		if bind_point == PipelineBindPoints::RayTracing && !self.capabilities.ray_tracing {
			return Err("Ray tracing pipelines need ray tracing support");
		}

		if let Some(name) = name {
			self.set_name(pipeline, name);
		}

		let handle = PipelineHandle(self.pipelines.insert(PipelineEntry { pipeline, pipeline_layout, set_layout }));

		Ok(Pipeline::new(handle, bind_point, layout).push_constant_stages(push_constant_stages))
	}

	pub fn import_query_pool(&self, query_pool: vk::QueryPool, name: Option<&str>) -> Result<QueryPoolHandle, &'static str> {
		if query_pool == vk::QueryPool::null() {
			return Err("Query pool must not be null");
		}

		if let Some(name) = name {
			self.set_name(query_pool, name);
		}

		Ok(QueryPoolHandle(self.query_pools.insert(query_pool)))
	}

	pub(super) fn texture(&self, handle: TextureHandle) -> Option<TextureEntry> {
		let entry = self.textures.get(handle.0);
		if entry.is_none() { log::error!("Texture {:?} is not known to this device.", handle); }
		entry
	}

	pub(super) fn buffer(&self, handle: BufferHandle) -> Option<BufferEntry> {
		let entry = self.buffers.get(handle.0);
		if entry.is_none() { log::error!("Buffer {:?} is not known to this device.", handle); }
		entry
	}

	pub(super) fn sampler(&self, handle: SamplerHandle) -> Option<vk::Sampler> {
		let entry = self.samplers.get(handle.0);
		if entry.is_none() { log::error!("Sampler {:?} is not known to this device.", handle); }
		entry
	}

	pub(super) fn pipeline(&self, handle: PipelineHandle) -> Option<PipelineEntry> {
		let entry = self.pipelines.get(handle.0);
		if entry.is_none() { log::error!("Pipeline {:?} is not known to this device.", handle); }
		entry
	}

	pub(super) fn query_pool(&self, handle: QueryPoolHandle) -> Option<vk::QueryPool> {
		let entry = self.query_pools.get(handle.0);
		if entry.is_none() { log::error!("Query pool {:?} is not known to this device.", handle); }
		entry
	}

	/// Creates a fence backed by a timeline semaphore.
	pub fn create_fence(self: &Arc<Self>, name: Option<&str>) -> Result<Fence<TimelineSemaphore>, &'static str> {
		Ok(Fence::new(TimelineSemaphore::new(self.clone(), name)?))
	}

	pub fn create_command_list(self: &Arc<Self>, name: Option<&str>) -> Result<ExplicitCommandList<CommandBuffer>, &'static str> {
		let command_buffer = CommandBuffer::new(self.clone(), name)?;
		ExplicitCommandList::new(command_buffer, self.descriptor_heap.clone())
	}

	/// Wraps the first queue of the imported queue family.
	pub fn create_queue(self: &Arc<Self>) -> Result<Queue<VulkanQueue>, &'static str> {
		let queue = VulkanQueue::new(self.clone())?;
		Ok(Queue::new(queue, &self.features))
	}

	pub fn start_frame_capture(&self) {
		if let Some(debugger) = &self.debugger {
			debugger.start_frame_capture();
		}
	}

	pub fn end_frame_capture(&self) {
		if let Some(debugger) = &self.debugger {
			debugger.end_frame_capture();
		}
	}

	pub fn wait_idle(&self) -> bool {
		match unsafe { self.device.device_wait_idle() } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to wait for the device to go idle. The Vulkan driver returned: {:?}", error);
				false
			}
		}
	}
}
