//! # Block Allocator
//!
//! The block allocator tracks offset/size sub allocations inside a fixed capacity pool.
//! It does not own any memory, it only hands out ranges which the caller maps onto its own storage (descriptor heaps, buffers, etc).

use std::collections::BTreeMap;

use crate::sync::Mutex;

/// A reserved range of a pool.
/// A block with a size of zero is the empty block, which is what a failed allocation returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
	offset: i64,
	size: u64,
	alignment: u64,
}

impl Block {
	pub fn new(offset: i64, size: u64, alignment: u64) -> Self {
		Self {
			offset,
			size,
			alignment,
		}
	}

	#[inline]
	pub fn offset(&self) -> i64 { self.offset }
	#[inline]
	pub fn size(&self) -> u64 { self.size }
	#[inline]
	pub fn alignment(&self) -> u64 { self.alignment }

	/// Returns the first offset past the end of the block.
	#[inline]
	pub fn end(&self) -> i64 { self.offset + self.size as i64 }

	#[inline]
	pub fn is_empty(&self) -> bool { self.size == 0 }
}

impl PartialOrd for Block {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Block {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.offset.cmp(&other.offset).then(self.size.cmp(&other.size)).then(self.alignment.cmp(&other.alignment))
	}
}

#[inline]
fn align_offset(value: i64, alignment: u64) -> Option<i64> {
	let alignment = i64::try_from(alignment).ok()?;
	Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

#[inline]
fn align_size(value: u64, alignment: u64) -> Option<u64> {
	Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

#[derive(Clone, Debug, Default)]
struct Pool {
	size: u64,
	base_offset: i64,
	/// Bump cursor, relative to the base offset. Everything past it has never been handed out.
	cursor: u64,
	used_size: u64,
	free_blocks: Vec<Block>,
	/// Offset to size of every block handed out and not yet freed.
	live_blocks: BTreeMap<i64, u64>,
}

impl Pool {
	fn new(size: u64, base_offset: i64) -> Self {
		Self {
			size,
			base_offset,
			cursor: 0,
			used_size: 0,
			free_blocks: Vec::new(),
			live_blocks: BTreeMap::new(),
		}
	}

	fn cursor_offset(&self) -> i64 { self.base_offset + self.cursor as i64 }

	fn free_size(&self) -> u64 { self.free_blocks.iter().map(|block| block.size).sum() }

	fn unused_size(&self) -> u64 { self.size - self.cursor }

	fn allocate(&mut self, size: u64, alignment: u64) -> Option<Block> {
		let aligned_size = align_size(size, alignment)?;

		if aligned_size > self.size { return None; }

		let block = match self.take_from_free_list(aligned_size, alignment).or_else(|| self.take_from_cursor(aligned_size, alignment)) {
			Some(block) => block,
			None => {
				if self.free_size() + self.unused_size() < aligned_size { return None; }

				self.compact();

				self.take_from_free_list(aligned_size, alignment).or_else(|| self.take_from_cursor(aligned_size, alignment))?
			}
		};

		self.used_size += block.size;
		self.live_blocks.insert(block.offset, block.size);

		Some(block)
	}

	/// First fit. The part of the free block in front of the aligned start and the remainder past the end go back to the free list.
	fn take_from_free_list(&mut self, aligned_size: u64, alignment: u64) -> Option<Block> {
		let index = self.free_blocks.iter().position(|candidate| {
			let Some(start) = align_offset(candidate.offset, alignment) else { return false; };
			((start - candidate.offset) as u64).checked_add(aligned_size).map_or(false, |needed| needed <= candidate.size)
		})?;

		let candidate = self.free_blocks.remove(index);

		let start = align_offset(candidate.offset, alignment)?;
		let padding = (start - candidate.offset) as u64;
		let remainder = candidate.size - padding - aligned_size;

		if padding > 0 {
			self.free_blocks.push(Block::new(candidate.offset, padding, 1));
		}

		if remainder > 0 {
			self.free_blocks.push(Block::new(start + aligned_size as i64, remainder, 1));
		}

		Some(Block::new(start, aligned_size, alignment))
	}

	fn take_from_cursor(&mut self, aligned_size: u64, alignment: u64) -> Option<Block> {
		let current = self.cursor_offset();
		let start = align_offset(current, alignment)?;
		let padding = (start - current) as u64;

		let end = self.cursor.checked_add(padding)?.checked_add(aligned_size)?;
		if end > self.size { return None; }

		if padding > 0 {
			self.free_blocks.push(Block::new(current, padding, 1));
		}

		self.cursor += padding + aligned_size;

		Some(Block::new(start, aligned_size, alignment))
	}

	/// Only a block matching a live allocation exactly is returned to the free list.
	fn release(&mut self, block: Block) -> bool {
		if self.live_blocks.get(&block.offset) != Some(&block.size) { return false; }

		self.live_blocks.remove(&block.offset);
		self.free_blocks.push(block);
		self.used_size -= block.size;

		true
	}

	fn compact(&mut self) {
		self.free_blocks.sort();

		let mut merged: Vec<Block> = Vec::with_capacity(self.free_blocks.len());

		for block in self.free_blocks.drain(..) {
			match merged.last_mut() {
				Some(previous) if previous.end() == block.offset => { previous.size += block.size; }
				_ => { merged.push(block); }
			}
		}

		// A free block touching the cursor is returned to the never used region.
		if let Some(last) = merged.last() {
			if last.end() == self.cursor_offset() {
				self.cursor -= last.size;
				merged.pop();
			}
		}

		self.free_blocks = merged;
	}
}

/// Hands out aligned blocks from a pool of fixed size.
/// It keeps a bump cursor for never used space and a free list for returned blocks.
/// All operations take a single allocator wide lock, so it can be shared between threads.
pub struct BlockAllocator {
	pool: Mutex<Pool>,
}

impl BlockAllocator {
	/// Creates an allocator managing `size` units starting at `base_offset`.
	pub fn new(size: u64, base_offset: i64) -> Self {
		Self {
			pool: Mutex::new(Pool::new(size, base_offset)),
		}
	}

	/// Resets the allocator to manage a new pool. Every outstanding block is forgotten.
	pub fn init(&self, size: u64, base_offset: i64) {
		*self.pool.lock() = Pool::new(size, base_offset);
	}

	/// Allocates `size` units aligned to `alignment`.
	/// The returned block's size is `size` rounded up to the alignment.
	/// Returns the empty block when the pool can't fit the request, even after compacting.
	pub fn alloc(&self, size: u64, alignment: u64) -> Block {
		if alignment == 0 || !alignment.is_power_of_two() {
			log::error!("Block allocation alignment must be a non zero power of two, got {}.", alignment);
			return Block::default();
		}

		if size == 0 {
			log::trace!("Skipping zero sized block allocation.");
			return Block::default();
		}

		let mut pool = self.pool.lock();

		match pool.allocate(size, alignment) {
			Some(block) => block,
			None => {
				log::debug!("Block allocator exhausted. Requested {} bytes, {} in use out of {}.", size, pool.used_size, pool.size);
				Block::default()
			}
		}
	}

	/// Returns a block to the free list. Freeing the empty block does nothing.
	pub fn free(&self, block: Block) {
		if block.is_empty() { return; }

		if !self.pool.lock().release(block) {
			log::error!("Tried to free block at offset {} of size {} which is not a live allocation of this allocator.", block.offset, block.size);
		}
	}

	/// Sorts the free list and merges every pair of adjacent free blocks.
	pub fn compact(&self) {
		self.pool.lock().compact();
	}

	/// Returns whether an `alloc` with the same arguments would succeed right now.
	pub fn can_alloc(&self, size: u64, alignment: u64) -> bool {
		if size == 0 || alignment == 0 || !alignment.is_power_of_two() { return false; }

		let mut pool = self.pool.lock().clone();
		pool.allocate(size, alignment).is_some()
	}

	/// Returns true if there are no live allocations.
	pub fn is_empty(&self) -> bool {
		self.pool.lock().used_size == 0
	}

	pub fn pool_size(&self) -> u64 { self.pool.lock().size }

	pub fn base_offset(&self) -> i64 { self.pool.lock().base_offset }

	/// Sum of the sizes of all live blocks.
	pub fn used_size(&self) -> u64 { self.pool.lock().used_size }

	/// Sum of the sizes of all blocks in the free list.
	pub fn free_size(&self) -> u64 { self.pool.lock().free_size() }

	/// Size of the region past the bump cursor.
	pub fn unused_size(&self) -> u64 { self.pool.lock().unused_size() }

	/// Returns a snapshot of the free list.
	pub fn free_blocks(&self) -> Vec<Block> { self.pool.lock().free_blocks.clone() }
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	fn assert_conserved(allocator: &BlockAllocator) {
		assert_eq!(allocator.used_size() + allocator.free_size() + allocator.unused_size(), allocator.pool_size());
	}

	fn overlaps(a: &Block, b: &Block) -> bool {
		a.offset() < b.end() && b.offset() < a.end()
	}

	#[test]
	fn fragmentation_reuses_freed_range() {
		let allocator = BlockAllocator::new(1024, 0);

		let a = allocator.alloc(100, 16);
		let b = allocator.alloc(100, 16);
		let c = allocator.alloc(100, 16);

		assert_eq!(a.offset(), 0);
		assert_eq!(b.offset(), 112);
		assert_eq!(c.offset(), 224);
		assert_eq!(a.size(), 112);

		let unused_before = allocator.unused_size();

		allocator.free(b);

		let d = allocator.alloc(100, 16);

		assert!(!d.is_empty());
		assert!(d.offset() >= b.offset() && d.end() <= b.end());
		assert_eq!(allocator.unused_size(), unused_before);
		assert_conserved(&allocator);
	}

	#[test]
	fn conservation_and_alignment() {
		let allocator = BlockAllocator::new(4096, 0);
		let mut live = Vec::new();
		let mut seed: u32 = 0x1234_5678;

		for _ in 0..512 {
			seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);

			if seed % 3 == 0 && !live.is_empty() {
				let index = (seed as usize / 3) % live.len();
				let block: Block = live.swap_remove(index);
				allocator.free(block);
			} else {
				let size = 1 + (seed >> 8) as u64 % 200;
				let alignment = 1u64 << ((seed >> 4) % 7);
				let block = allocator.alloc(size, alignment);

				if !block.is_empty() {
					assert_eq!(block.offset() % alignment as i64, 0);
					assert!(block.offset() >= 0);
					assert!(block.end() <= 4096);
					assert!(live.iter().all(|other: &Block| !overlaps(other, &block)));
					live.push(block);
				}
			}

			assert_conserved(&allocator);
			assert_eq!(allocator.used_size(), live.iter().map(|block| block.size()).sum::<u64>());
		}
	}

	#[test]
	fn alignment_is_absolute_with_base_offset() {
		let allocator = BlockAllocator::new(1024, 100);

		let block = allocator.alloc(10, 64);

		assert_eq!(block.offset(), 128);
		assert!(block.offset() >= 100);
		assert_conserved(&allocator);

		let block = allocator.alloc(8, 8);
		assert_eq!(block.offset(), 104); // Reuses the padding in front of the first block.
		assert_conserved(&allocator);
	}

	#[test]
	fn compaction_is_idempotent() {
		let allocator = BlockAllocator::new(1024, 0);

		let blocks = (0..8).map(|_| allocator.alloc(64, 1)).collect::<Vec<_>>();

		allocator.free(blocks[1]);
		allocator.free(blocks[2]);
		allocator.free(blocks[5]);
		allocator.free(blocks[4]);

		allocator.compact();
		let once = allocator.free_blocks();

		allocator.compact();
		let twice = allocator.free_blocks();

		assert_eq!(once, twice);
		assert_eq!(once.iter().map(|b| (b.offset(), b.size())).collect::<Vec<_>>(), vec![(64, 128), (256, 128)]);
		assert_conserved(&allocator);
	}

	#[test]
	fn compaction_returns_trailing_block_to_cursor() {
		let allocator = BlockAllocator::new(256, 0);

		let a = allocator.alloc(64, 1);
		let b = allocator.alloc(64, 1);

		allocator.free(b);
		allocator.compact();

		assert!(allocator.free_blocks().is_empty());
		assert_eq!(allocator.unused_size(), 192);

		allocator.free(a);
		assert!(allocator.is_empty());
	}

	#[test]
	fn compacts_once_when_fragmented() {
		let allocator = BlockAllocator::new(256, 0);

		let blocks = (0..4).map(|_| allocator.alloc(64, 1)).collect::<Vec<_>>();
		assert_eq!(allocator.unused_size(), 0);

		allocator.free(blocks[0]);
		allocator.free(blocks[1]);

		assert!(allocator.can_alloc(128, 1));
		assert_eq!(allocator.free_blocks().len(), 2); // can_alloc doesn't touch the pool.

		let block = allocator.alloc(128, 1);
		assert_eq!(block, Block::new(0, 128, 1));
		assert!(allocator.free_blocks().is_empty());
		assert_conserved(&allocator);
	}

	#[test]
	fn exhaustion_returns_empty_block() {
		let allocator = BlockAllocator::new(128, 0);

		assert!(!allocator.alloc(128, 1).is_empty());
		assert!(!allocator.can_alloc(1, 1));
		assert!(allocator.alloc(1, 1).is_empty());
		assert_conserved(&allocator);
	}

	#[test]
	fn invalid_arguments() {
		let allocator = BlockAllocator::new(128, 0);

		assert!(allocator.alloc(16, 0).is_empty());
		assert!(allocator.alloc(16, 3).is_empty());
		assert!(allocator.alloc(0, 16).is_empty());
		assert!(allocator.is_empty());

		assert!(!allocator.alloc(16, 1).is_empty());

		allocator.free(Block::default());
		allocator.free(Block::new(512, 16, 1)); // Out of range, ignored.
		assert_eq!(allocator.used_size(), 16);
	}

	#[test]
	fn double_free_is_ignored() {
		let allocator = BlockAllocator::new(128, 0);

		let block = allocator.alloc(32, 1);
		let _other = allocator.alloc(32, 1);

		allocator.free(block);
		allocator.free(block);

		assert_eq!(allocator.free_blocks().len(), 1);
		assert_conserved(&allocator);
	}

	#[test]
	fn partial_and_foreign_frees_are_ignored() {
		let allocator = BlockAllocator::new(256, 0);

		let block = allocator.alloc(128, 16);
		let _other = allocator.alloc(64, 16);

		assert!(!allocator.can_alloc(128, 1));

		allocator.free(Block::new(block.offset() + 32, 32, 1)); // Inside a live block.
		allocator.free(Block::new(block.offset(), 64, 16)); // Live offset, wrong size.
		allocator.free(Block::new(192, 16, 1)); // Never handed out.

		assert_eq!(allocator.used_size(), 192);
		assert!(allocator.free_blocks().is_empty());
		assert!(!allocator.can_alloc(128, 1));
		assert_conserved(&allocator);

		allocator.free(block);
		assert_eq!(allocator.used_size(), 64);
		assert!(allocator.can_alloc(128, 1));
	}

	#[test]
	fn huge_requests_return_empty_block() {
		let allocator = BlockAllocator::new(1024, 0);

		assert!(!allocator.alloc(100, 16).is_empty());

		assert!(allocator.alloc(u64::MAX - 15, 16).is_empty());
		assert!(allocator.alloc(u64::MAX, 1).is_empty());
		assert!(allocator.alloc(16, 1 << 63).is_empty());
		assert!(!allocator.can_alloc(u64::MAX - 15, 16));

		assert_eq!(allocator.used_size(), 112);
		assert_conserved(&allocator);
	}

	#[test]
	fn init_resets_pool() {
		let allocator = BlockAllocator::new(128, 0);
		allocator.alloc(64, 1);

		allocator.init(512, -256);

		assert!(allocator.is_empty());
		assert_eq!(allocator.pool_size(), 512);

		let block = allocator.alloc(16, 16);
		assert_eq!(block.offset(), -256);
	}

	#[test]
	fn block_ordering_is_by_offset() {
		let mut blocks = vec![Block::new(64, 8, 1), Block::new(0, 32, 16), Block::new(16, 4, 4)];
		blocks.sort();
		assert_eq!(blocks.iter().map(Block::offset).collect::<Vec<_>>(), vec![0, 16, 64]);
	}

	#[test]
	fn concurrent_allocations() {
		let allocator = Arc::new(BlockAllocator::new(64 * 1024, 0));

		let threads = (0..4).map(|_| {
			let allocator = allocator.clone();
			std::thread::spawn(move || {
				for _ in 0..256 {
					let block = allocator.alloc(48, 16);
					assert!(!block.is_empty());
					assert_eq!(block.offset() % 16, 0);
					allocator.free(block);
				}
			})
		}).collect::<Vec<_>>();

		for thread in threads { thread.join().unwrap(); }

		assert!(allocator.is_empty());
		assert_conserved(&allocator);
	}
}
