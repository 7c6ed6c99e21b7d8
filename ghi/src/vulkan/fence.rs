use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::fence::NativeFence;

use super::device::Device;

/// A timeline semaphore. The queue signals it with the value of each fenced batch.
pub struct TimelineSemaphore {
	device: Arc<Device>,
	pub(super) semaphore: vk::Semaphore,
}

impl TimelineSemaphore {
	pub(super) fn new(device: Arc<Device>, name: Option<&str>) -> Result<Self, &'static str> {
		let mut type_info = vk::SemaphoreTypeCreateInfo::default()
			.semaphore_type(vk::SemaphoreType::TIMELINE)
			.initial_value(0);

		let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

		let semaphore = unsafe { device.device.create_semaphore(&create_info, None) }.map_err(|error| {
			log::error!("Failed to create a timeline semaphore. The Vulkan driver returned: {:?}", error);
			"Failed to create a timeline semaphore"
		})?;

		if let Some(name) = name {
			device.set_name(semaphore, name);
		}

		Ok(Self { device, semaphore })
	}

	pub fn semaphore(&self) -> vk::Semaphore { self.semaphore }
}

impl NativeFence for TimelineSemaphore {
	fn completed_value(&self) -> u64 {
		match unsafe { self.device.device.get_semaphore_counter_value(self.semaphore) } {
			Ok(value) => value,
			Err(error) => {
				log::error!("Failed to read timeline semaphore value. The Vulkan driver returned: {:?}", error);
				0
			}
		}
	}

	fn wait_value(&self, value: u64, timeout: Duration) -> bool {
		let semaphores = [self.semaphore];
		let values = [value];

		let wait_info = vk::SemaphoreWaitInfo::default()
			.semaphores(&semaphores)
			.values(&values);

		match unsafe { self.device.device.wait_semaphores(&wait_info, timeout.as_nanos() as u64) } {
			Ok(_) => true,
			Err(vk::Result::TIMEOUT) => false,
			Err(error) => {
				log::error!("Failed to wait on timeline semaphore. The Vulkan driver returned: {:?}", error);
				false
			}
		}
	}
}

impl Drop for TimelineSemaphore {
	fn drop(&mut self) {
		unsafe { self.device.device.destroy_semaphore(self.semaphore, None); }
	}
}
