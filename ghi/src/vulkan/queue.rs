use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::graphics_hardware_interface::MAX_BUFFER_COUNT;
use crate::queue::{NativeQueue, SubmitSync};

use super::device::Device;
use super::fence::TimelineSemaphore;
use super::surface::VulkanSurface;

/// Binary semaphores gating presentation and the fence gating reuse of one buffer index.
struct SyncSet {
	acquire: vk::Semaphore,
	present: vk::Semaphore,
	fence: vk::Fence,
}

pub struct VulkanQueue {
	device: Arc<Device>,
	queue: vk::Queue,
	sync_sets: Vec<SyncSet>,
}

impl VulkanQueue {
	pub(super) fn new(device: Arc<Device>) -> Result<Self, &'static str> {
		let queue = unsafe { device.device.get_device_queue(device.queue_family_index, 0) };

		let mut queue = Self { device, queue, sync_sets: Vec::with_capacity(MAX_BUFFER_COUNT) };

		// Dropping a partially built queue destroys the sets created so far.
		for i in 0..queue.device.features().get_buffer_count() {
			let sync_set = queue.create_sync_set(i)?;
			queue.sync_sets.push(sync_set);
		}

		queue.device.set_name(queue.queue, "Queue");

		Ok(queue)
	}

	fn create_sync_set(&self, index: usize) -> Result<SyncSet, &'static str> {
		let device = &self.device.device;

		let acquire = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }.map_err(|_| "Failed to create the acquire semaphore")?;

		let present = match unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) } {
			Ok(present) => present,
			Err(_) => {
				unsafe { device.destroy_semaphore(acquire, None); }
				return Err("Failed to create the present semaphore");
			}
		};

		let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
			Ok(fence) => fence,
			Err(_) => {
				unsafe {
					device.destroy_semaphore(acquire, None);
					device.destroy_semaphore(present, None);
				}
				return Err("Failed to create the acquire fence");
			}
		};

		self.device.set_name(acquire, &format!("Acquire Semaphore {}", index));
		self.device.set_name(present, &format!("Present Semaphore {}", index));
		self.device.set_name(fence, &format!("Acquire Fence {}", index));

		Ok(SyncSet { acquire, present, fence })
	}

	fn sync_set(&self, buffer_index: usize) -> Option<&SyncSet> {
		let sync_set = self.sync_sets.get(buffer_index);
		if sync_set.is_none() { log::error!("There is no sync set {}.", buffer_index); }
		sync_set
	}

	/// Swaps the binary semaphores of a set for unsignaled ones.
	fn replace_semaphores(&mut self, buffer_index: usize) -> bool {
		if self.sync_set(buffer_index).is_none() { return false; }

		// Signal operations still in flight must complete before the old semaphores are destroyed.
		if !self.wait_idle() { return false; }

		let device = &self.device.device;

		let acquire = match unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) } {
			Ok(acquire) => acquire,
			Err(error) => {
				log::error!("Failed to recreate acquire semaphore {}. The Vulkan driver returned: {:?}", buffer_index, error);
				return false;
			}
		};

		let present = match unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) } {
			Ok(present) => present,
			Err(error) => {
				unsafe { device.destroy_semaphore(acquire, None); }
				log::error!("Failed to recreate present semaphore {}. The Vulkan driver returned: {:?}", buffer_index, error);
				return false;
			}
		};

		let sync_set = &mut self.sync_sets[buffer_index];

		unsafe {
			device.destroy_semaphore(sync_set.acquire, None);
			device.destroy_semaphore(sync_set.present, None);
		}

		sync_set.acquire = acquire;
		sync_set.present = present;

		self.device.set_name(acquire, &format!("Acquire Semaphore {}", buffer_index));
		self.device.set_name(present, &format!("Present Semaphore {}", buffer_index));

		log::debug!("Replaced the semaphores of sync set {}.", buffer_index);

		true
	}

	pub fn raw(&self) -> vk::Queue { self.queue }
}

impl NativeQueue for VulkanQueue {
	type Submission = vk::CommandBuffer;
	type Fence = TimelineSemaphore;
	type Surface = VulkanSurface;

	fn execute(&mut self, submissions: Vec<vk::CommandBuffer>, signal: Option<(&TimelineSemaphore, u64)>, sync: SubmitSync) -> bool {
		let Some(sync_set) = self.sync_set(sync.buffer_index) else { return false; };

		let command_buffer_infos = submissions.iter().map(|command_buffer| vk::CommandBufferSubmitInfo::default().command_buffer(*command_buffer)).collect::<Vec<_>>();

		let mut wait_semaphores = Vec::with_capacity(1);
		let mut signal_semaphores = Vec::with_capacity(2);

		// Any stage may touch the backbuffer first.
		if sync.wait_acquire {
			wait_semaphores.push(vk::SemaphoreSubmitInfo::default().semaphore(sync_set.acquire).stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS));
		}

		if sync.wait_present {
			wait_semaphores.push(vk::SemaphoreSubmitInfo::default().semaphore(sync_set.present).stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS));
		}

		if sync.signal_present {
			signal_semaphores.push(vk::SemaphoreSubmitInfo::default().semaphore(sync_set.present).stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS));
		}

		if let Some((fence, value)) = signal {
			signal_semaphores.push(vk::SemaphoreSubmitInfo::default().semaphore(fence.semaphore).value(value).stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS));
		}

		let submit_info = vk::SubmitInfo2::default()
			.command_buffer_infos(&command_buffer_infos)
			.wait_semaphore_infos(&wait_semaphores)
			.signal_semaphore_infos(&signal_semaphores);

		match unsafe { self.device.device.queue_submit2(self.queue, &[submit_info], vk::Fence::null()) } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to submit {} command buffers. The Vulkan driver returned: {:?}", submissions.len(), error);
				false
			}
		}
	}

	fn wait_idle(&mut self) -> bool {
		match unsafe { self.device.device.queue_wait_idle(self.queue) } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to wait for the queue to go idle. The Vulkan driver returned: {:?}", error);
				false
			}
		}
	}

	fn present(&mut self, surface: &mut VulkanSurface, image_index: u32, buffer_index: usize, rendered: bool) -> bool {
		let Some(sync_set) = self.sync_set(buffer_index) else { return false; };

		let Some(swapchain) = surface.swapchain() else {
			log::error!("Can't present to a surface without backbuffers.");
			return false;
		};

		let wait_semaphores = [if rendered { sync_set.present } else { sync_set.acquire }];
		let swapchains = [swapchain];
		let image_indices = [image_index];

		let present_info = vk::PresentInfoKHR::default()
			.wait_semaphores(&wait_semaphores)
			.swapchains(&swapchains)
			.image_indices(&image_indices);

		match unsafe { self.device.swapchain.queue_present(self.queue, &present_info) } {
			Ok(suboptimal) => {
				if suboptimal { log::warn!("Swapchain is suboptimal for the surface. It should be resized."); }
				true
			}
			Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
				log::warn!("Swapchain is out of date. It must be resized before presenting again.");
				false
			}
			Err(error) => {
				log::error!("Failed to present image {}. The Vulkan driver returned: {:?}", image_index, error);
				false
			}
		}
	}

	fn acquire_next_image(&mut self, surface: &mut VulkanSurface, buffer_index: usize) -> Option<u32> {
		let sync_set = self.sync_set(buffer_index)?;
		let swapchain = surface.swapchain()?;

		let timeout = self.device.features().get_present_timeout().as_nanos() as u64;

		match unsafe { self.device.swapchain.acquire_next_image(swapchain, timeout, sync_set.acquire, sync_set.fence) } {
			Ok((image_index, suboptimal)) => {
				if suboptimal { log::warn!("Swapchain is suboptimal for the surface. It should be resized."); }
				Some(image_index)
			}
			Err(error) => {
				log::error!("Failed to acquire the next swapchain image. The Vulkan driver returned: {:?}", error);
				None
			}
		}
	}

	fn wait_for_acquire(&mut self, buffer_index: usize, timeout: Duration) -> bool {
		let Some(sync_set) = self.sync_set(buffer_index) else { return false; };

		match unsafe { self.device.device.wait_for_fences(&[sync_set.fence], true, timeout.as_nanos() as u64) } {
			Ok(_) => true,
			Err(vk::Result::TIMEOUT) => false,
			Err(error) => {
				log::error!("Failed to wait for acquire fence {}. The Vulkan driver returned: {:?}", buffer_index, error);
				false
			}
		}
	}

	fn reset_sync(&mut self, buffer_index: usize, stale: bool) -> bool {
		if stale && !self.replace_semaphores(buffer_index) { return false; }

		let Some(sync_set) = self.sync_set(buffer_index) else { return false; };

		match unsafe { self.device.device.reset_fences(&[sync_set.fence]) } {
			Ok(_) => true,
			Err(error) => {
				log::error!("Failed to reset acquire fence {}. The Vulkan driver returned: {:?}", buffer_index, error);
				false
			}
		}
	}
}

impl Drop for VulkanQueue {
	fn drop(&mut self) {
		unsafe {
			self.device.device.queue_wait_idle(self.queue).ok();

			for sync_set in self.sync_sets.drain(..) {
				self.device.device.destroy_semaphore(sync_set.acquire, None);
				self.device.device.destroy_semaphore(sync_set.present, None);
				self.device.device.destroy_fence(sync_set.fence, None);
			}
		}
	}
}
