//! # Swap Chain
//!
//! Cycles through the backbuffers of a present surface, gated by the synchronization sets of a `Queue`.

use std::sync::Arc;

use utils::Extent;

use crate::graphics_hardware_interface::Texture;
use crate::queue::{NativeQueue, Queue};

/// The native presentation target a swap chain draws into.
pub trait PresentSurface {
	/// Creates at least `count` backbuffers of the given extent.
	fn create_backbuffers(&mut self, extent: Extent, count: usize) -> Result<Vec<Texture>, &'static str>;

	/// Releases the backbuffers. The queue must be idle.
	fn destroy_backbuffers(&mut self);
}

pub struct SwapChain<N: NativeQueue> {
	queue: Arc<Queue<N>>,
	surface: N::Surface,
	backbuffers: Vec<Texture>,
	extent: Extent,
	current_buffer_index: usize,
	current_image_index: u32,
}

impl<N: NativeQueue> SwapChain<N> {
	/// Creates the backbuffers and acquires the first one.
	pub fn new(queue: Arc<Queue<N>>, mut surface: N::Surface, extent: Extent) -> Result<Self, &'static str> {
		if extent.is_empty() {
			return Err("Swap chain extent must not be empty");
		}

		let backbuffers = surface.create_backbuffers(extent, queue.buffer_count())?;

		let Some(current_image_index) = queue.acquire_first(&mut surface) else {
			surface.destroy_backbuffers();
			return Err("Failed to acquire the first backbuffer");
		};

		log::debug!("Created swap chain with {} backbuffers of {}x{}.", backbuffers.len(), extent.width(), extent.height());

		Ok(Self {
			current_buffer_index: queue.current_buffer_index(),
			queue,
			surface,
			backbuffers,
			extent,
			current_image_index,
		})
	}

	/// Presents the current backbuffer. On success the next backbuffer is acquired and ready to be rendered to.
	pub fn present(&mut self) -> bool {
		match self.queue.present(&mut self.surface, self.current_image_index) {
			Some((buffer_index, image_index)) => {
				self.current_buffer_index = buffer_index;
				self.current_image_index = image_index;
				true
			}
			None => false,
		}
	}

	/// Rebuilds the backbuffers with a new extent. An empty extent, as reported for minimized windows, is ignored.
	pub fn resize(&mut self, extent: Extent) -> bool {
		if extent.is_empty() {
			log::trace!("Ignoring resize to an empty extent.");
			return true;
		}

		if !self.queue.wait_idle() { return false; }

		self.surface.destroy_backbuffers();
		self.backbuffers.clear();

		self.backbuffers = match self.surface.create_backbuffers(extent, self.queue.buffer_count()) {
			Ok(backbuffers) => backbuffers,
			Err(error) => {
				log::error!("Failed to recreate the backbuffers: {}", error);
				return false;
			}
		};

		self.extent = extent;

		if !self.queue.reset_synchronization() { return false; }

		self.current_buffer_index = 0;

		let Some(image_index) = self.queue.acquire_first(&mut self.surface) else {
			return false;
		};

		self.current_image_index = image_index;

		log::debug!("Resized swap chain to {}x{}.", extent.width(), extent.height());

		true
	}

	/// The backbuffer to render into this frame.
	pub fn current_backbuffer(&self) -> Option<&Texture> {
		self.backbuffers.get(self.current_image_index as usize)
	}

	pub fn backbuffers(&self) -> &[Texture] { &self.backbuffers }

	pub fn extent(&self) -> Extent { self.extent }

	pub fn current_buffer_index(&self) -> usize { self.current_buffer_index }

	pub fn current_image_index(&self) -> u32 { self.current_image_index }

	pub fn queue(&self) -> &Arc<Queue<N>> { &self.queue }

	pub fn surface(&self) -> &N::Surface { &self.surface }
}

impl<N: NativeQueue> Drop for SwapChain<N> {
	fn drop(&mut self) {
		self.queue.wait_idle();

		if !self.backbuffers.is_empty() {
			self.surface.destroy_backbuffers();
		}
	}
}
