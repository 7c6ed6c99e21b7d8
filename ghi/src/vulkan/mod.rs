//! # Vulkan backend
//!
//! Explicit backend over `ash`. Descriptors are pushed when the device exposes push descriptors,
//! otherwise they are written into descriptor sets sized by the device's descriptor heap.

pub mod command_buffer;
pub mod device;
pub mod fence;
pub mod queue;
pub mod surface;
pub(crate) mod utils;

pub use command_buffer::CommandBuffer;
pub use device::Device;
pub use fence::TimelineSemaphore;
pub use queue::VulkanQueue;
pub use surface::{PresentationModes, VulkanSurface};

/// A command list recording into a Vulkan command buffer.
pub type VulkanCommandList = crate::command_list::ExplicitCommandList<CommandBuffer>;
