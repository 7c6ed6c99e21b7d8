//! # Descriptor Heap
//!
//! Fixed size descriptor storage shared by every command list of a device that can't push descriptors.
//! Each flush carves a table out of the heap, tables are returned when the command list that owns them starts recording again.

use utils::{Block, BlockAllocator};

use crate::graphics_hardware_interface::DescriptorWrite;

/// A range of the descriptor heap holding the descriptors of one flush.
#[derive(Debug)]
pub struct DescriptorTable {
	block: Block,
	writes: Vec<DescriptorWrite>,
}

impl DescriptorTable {
	/// First descriptor of the table in the heap.
	pub fn offset(&self) -> u32 { self.block.offset() as u32 }

	/// Number of descriptors reserved for the table.
	pub fn capacity(&self) -> u32 { self.block.size() as u32 }

	pub fn writes(&self) -> &[DescriptorWrite] { &self.writes }
}

pub struct DescriptorHeap {
	allocator: BlockAllocator,
}

impl DescriptorHeap {
	pub fn new(capacity: u32) -> Self {
		Self {
			allocator: BlockAllocator::new(capacity as u64, 0),
		}
	}

	/// Reserves `descriptor_count` descriptors for `writes`. Returns `None` when the heap is exhausted.
	pub fn allocate_table(&self, descriptor_count: u32, writes: Vec<DescriptorWrite>) -> Option<DescriptorTable> {
		let block = self.allocator.alloc(descriptor_count.max(1) as u64, 1);

		if block.is_empty() {
			log::error!("Descriptor heap exhausted. {} of {} descriptors are in use.", self.allocator.used_size(), self.allocator.pool_size());
			return None;
		}

		Some(DescriptorTable { block, writes })
	}

	pub fn free_table(&self, table: DescriptorTable) {
		self.allocator.free(table.block);
	}

	pub fn capacity(&self) -> u32 { self.allocator.pool_size() as u32 }

	/// Number of descriptors held by live tables.
	pub fn used(&self) -> u32 { self.allocator.used_size() as u32 }
}
