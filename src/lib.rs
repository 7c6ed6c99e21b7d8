//! # Byte HAL
//! Cross backend GPU command recording, resource state transitions and frame synchronization.
//!
//! The work lives in two crates: `ghi`, the graphics hardware interface and its backends, and `utils`, shared helpers
//! such as the block allocator.

#![warn(missing_docs)]

pub use ghi;
pub use utils;

pub use ghi::{CommandList, Fence, Queue, SwapChain};
pub use utils::{Block, BlockAllocator, Extent};

/// Sets up logging through `simple_logger`. The level is read from the `RUST_LOG` environment variable.
/// Calling it more than once is harmless.
pub fn initialize_logging() {
	let _ = simple_logger::SimpleLogger::new().env().init();

	log::trace!("Initialized logging.");
}
