use std::sync::Arc;

use ash::vk;
use utils::Extent;

use crate::graphics_hardware_interface::{Encodings, Formats, Texture, TextureDescription, Uses};
use crate::swap_chain::PresentSurface;

use super::device::Device;

/// Presentation modes a surface can request. Unsupported modes fall back to FIFO, which is always available.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresentationModes {
	FIFO,
	Immediate,
	Mailbox,
}

/// A window surface created by the caller and the swapchain built on it.
/// The surface itself is not destroyed, the swapchain and its image views are.
pub struct VulkanSurface {
	device: Arc<Device>,
	surface_loader: ash::khr::surface::Instance,
	surface: vk::SurfaceKHR,
	presentation_mode: PresentationModes,
	swapchain: vk::SwapchainKHR,
	backbuffers: Vec<(Texture, vk::ImageView)>,
}

fn to_format(format: vk::Format) -> Option<Formats> {
	match format {
		vk::Format::B8G8R8A8_SRGB => Some(Formats::BGRAsRGB),
		vk::Format::B8G8R8A8_UNORM => Some(Formats::BGRAu8),
		vk::Format::R8G8B8A8_SRGB => Some(Formats::RGBA8(Encodings::sRGB)),
		vk::Format::R8G8B8A8_UNORM => Some(Formats::RGBA8(Encodings::UnsignedNormalized)),
		_ => None,
	}
}

fn to_present_mode(presentation_mode: PresentationModes) -> vk::PresentModeKHR {
	match presentation_mode {
		PresentationModes::FIFO => vk::PresentModeKHR::FIFO,
		PresentationModes::Immediate => vk::PresentModeKHR::IMMEDIATE,
		PresentationModes::Mailbox => vk::PresentModeKHR::MAILBOX,
	}
}

/// Picks the swapchain format, sRGB backbuffers first.
fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, Formats)> {
	const PREFERRED: [vk::Format; 4] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

	PREFERRED.iter().find_map(|preferred| {
		formats.iter()
			.find(|format| format.format == *preferred && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
			.and_then(|format| to_format(format.format).map(|abstract_format| (*format, abstract_format)))
	})
}

/// The current extent of the surface, or the requested one clamped to the supported range when the surface lets the swapchain decide.
fn select_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Extent) -> vk::Extent2D {
	if capabilities.current_extent.width != u32::MAX && capabilities.current_extent.height != u32::MAX {
		return capabilities.current_extent;
	}

	vk::Extent2D {
		width: requested.width().clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
		height: requested.height().clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
	}
}

fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: usize) -> u32 {
	let count = (requested as u32).max(capabilities.min_image_count);

	if capabilities.max_image_count != 0 { count.min(capabilities.max_image_count) } else { count }
}

impl VulkanSurface {
	pub fn new(device: Arc<Device>, entry: &ash::Entry, surface: vk::SurfaceKHR, presentation_mode: PresentationModes) -> Result<Self, &'static str> {
		let surface_loader = ash::khr::surface::Instance::new(entry, &device.instance);

		let supported = unsafe { surface_loader.get_physical_device_surface_support(device.physical_device, device.queue_family_index, surface) }.unwrap_or(false);

		if !supported {
			return Err("The queue family can't present to this surface");
		}

		Ok(Self {
			device,
			surface_loader,
			surface,
			presentation_mode,
			swapchain: vk::SwapchainKHR::null(),
			backbuffers: Vec::new(),
		})
	}

	pub(super) fn swapchain(&self) -> Option<vk::SwapchainKHR> {
		if self.swapchain == vk::SwapchainKHR::null() { None } else { Some(self.swapchain) }
	}

	fn present_mode(&self) -> vk::PresentModeKHR {
		let requested = to_present_mode(self.presentation_mode);

		let supported = unsafe { self.surface_loader.get_physical_device_surface_present_modes(self.device.physical_device, self.surface) }.unwrap_or_default();

		if supported.contains(&requested) {
			requested
		} else {
			log::warn!("Presentation mode {:?} is not supported by the surface. Falling back to FIFO.", self.presentation_mode);
			vk::PresentModeKHR::FIFO
		}
	}
}

impl PresentSurface for VulkanSurface {
	fn create_backbuffers(&mut self, extent: Extent, count: usize) -> Result<Vec<Texture>, &'static str> {
		self.destroy_backbuffers();

		let capabilities = unsafe { self.surface_loader.get_physical_device_surface_capabilities(self.device.physical_device, self.surface) }.map_err(|error| {
			log::error!("Failed to query surface capabilities. The Vulkan driver returned: {:?}", error);
			"Failed to query surface capabilities"
		})?;

		let formats = unsafe { self.surface_loader.get_physical_device_surface_formats(self.device.physical_device, self.surface) }.map_err(|error| {
			log::error!("Failed to query surface formats. The Vulkan driver returned: {:?}", error);
			"Failed to query surface formats"
		})?;

		let (surface_format, format) = select_surface_format(&formats).ok_or("The surface supports no usable backbuffer format")?;

		let image_extent = select_extent(&capabilities, extent);

		if image_extent.width == 0 || image_extent.height == 0 {
			return Err("The surface has no area");
		}

		let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
			.surface(self.surface)
			.min_image_count(select_image_count(&capabilities, count))
			.image_color_space(surface_format.color_space)
			.image_format(surface_format.format)
			.image_extent(image_extent)
			.image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
			.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
			.pre_transform(capabilities.current_transform)
			.composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
			.present_mode(self.present_mode())
			.image_array_layers(1)
			.clipped(true);

		let swapchain = unsafe { self.device.swapchain.create_swapchain(&swapchain_create_info, None) }.map_err(|error| {
			log::error!("Failed to create the swapchain. The Vulkan driver returned: {:?}", error);
			"Failed to create the swapchain"
		})?;

		self.swapchain = swapchain;

		let images = match unsafe { self.device.swapchain.get_swapchain_images(swapchain) } {
			Ok(images) => images,
			Err(error) => {
				log::error!("Failed to get the swapchain images. The Vulkan driver returned: {:?}", error);
				self.destroy_backbuffers();
				return Err("Failed to get the swapchain images");
			}
		};

		let description = TextureDescription::new(Extent::rectangle(image_extent.width, image_extent.height), format, Uses::RenderTarget | Uses::TransferDestination);

		for (i, image) in images.into_iter().enumerate() {
			let image_view_create_info = vk::ImageViewCreateInfo::default()
				.image(image)
				.view_type(vk::ImageViewType::TYPE_2D)
				.format(surface_format.format)
				.subresource_range(vk::ImageSubresourceRange {
					aspect_mask: vk::ImageAspectFlags::COLOR,
					base_mip_level: 0,
					level_count: 1,
					base_array_layer: 0,
					layer_count: 1,
				});

			let view = match unsafe { self.device.device.create_image_view(&image_view_create_info, None) } {
				Ok(view) => view,
				Err(error) => {
					log::error!("Failed to create a backbuffer view. The Vulkan driver returned: {:?}", error);
					self.destroy_backbuffers();
					return Err("Failed to create a backbuffer view");
				}
			};

			let texture = match self.device.import_texture(image, view, description, Some(&format!("Backbuffer {}", i))) {
				Ok(texture) => texture,
				Err(error) => {
					unsafe { self.device.device.destroy_image_view(view, None); }
					self.destroy_backbuffers();
					return Err(error);
				}
			};

			self.backbuffers.push((texture, view));
		}

		Ok(self.backbuffers.iter().map(|(texture, _)| *texture).collect())
	}

	fn destroy_backbuffers(&mut self) {
		for (texture, view) in self.backbuffers.drain(..) {
			self.device.release_texture(texture.handle());
			unsafe { self.device.device.destroy_image_view(view, None); }
		}

		if self.swapchain != vk::SwapchainKHR::null() {
			unsafe { self.device.swapchain.destroy_swapchain(self.swapchain, None); }
			self.swapchain = vk::SwapchainKHR::null();
		}
	}
}

impl Drop for VulkanSurface {
	fn drop(&mut self) {
		self.destroy_backbuffers();
	}
}
