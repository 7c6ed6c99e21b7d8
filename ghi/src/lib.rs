//! The G.H.I. module (graphics hardware interface) abstracts command recording, resource state transitions and
//! synchronization over the native graphics APIs.
//!
//! Two backends are provided. The Vulkan backend records into native command buffers. The immediate backend
//! records into a tape which is replayed on an immediate context.

pub mod graphics_hardware_interface;
pub mod transition;
pub mod descriptor_heap;
pub mod command_list;
pub mod fence;
pub mod queue;
pub mod swap_chain;
pub mod render_debugger;

pub mod immediate;
pub mod vulkan;

pub use crate::graphics_hardware_interface::*;
pub use crate::transition::{Transition, TransitionKinds};
pub use crate::descriptor_heap::{DescriptorHeap, DescriptorTable};
pub use crate::command_list::{CommandEncoder, DescriptorBindingCache, DescriptorUpdate, ExplicitCommandList};
pub use crate::fence::{Fence, NativeFence};
pub use crate::queue::{NativeQueue, Queue, SubmitSync, Submittable};
pub use crate::swap_chain::{PresentSurface, SwapChain};
