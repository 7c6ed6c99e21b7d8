//! Shared helpers used by the graphics hardware interface: the block allocator, extents and small collection utilities.

pub mod block_allocator;
pub mod sync;

pub use block_allocator::{Block, BlockAllocator};

/// Splits a sorted slice into runs whose keys are consecutive.
/// Returns the key of the first element of each run alongside the run.
pub fn partition<T>(slice: &[T], key_fn: impl Fn(&T) -> usize) -> Vec<(usize, &[T])> {
	let mut partitions = Vec::new();
	let mut slice_start = 0;

	for i in 1..slice.len() {
		if key_fn(&slice[i - 1]) + 1usize != key_fn(&slice[i]) {
			partitions.push((key_fn(&slice[slice_start]), &slice[slice_start..i]));
			slice_start = i;
		}
	}

	if !slice.is_empty() {
		partitions.push((key_fn(&slice[slice_start]), &slice[slice_start..]));
	}

	partitions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
	width: u32,
	height: u32,
	depth: u32,
}

impl Extent {
	pub fn new(width: u32, height: u32, depth: u32) -> Self {
		Self {
			width,
			height,
			depth,
		}
	}

	pub fn line(width: u32) -> Self {
		Self {
			width,
			height: 1,
			depth: 1,
		}
	}

	pub fn square(size: u32) -> Self {
		Self {
			width: size,
			height: size,
			depth: 1,
		}
	}

	pub fn rectangle(width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			depth: 1,
		}
	}

	pub fn cube(width: u32, height: u32, depth: u32) -> Self {
		Self {
			width,
			height,
			depth,
		}
	}

	pub fn as_tuple(&self) -> (u32, u32, u32) {
		(self.width, self.height, self.depth)
	}

	pub fn as_array(&self) -> [u32; 3] {
		[self.width, self.height, self.depth]
	}

	#[inline]
	pub fn width(&self) -> u32 { self.width }
	#[inline]
	pub fn height(&self) -> u32 { self.height }
	#[inline]
	pub fn depth(&self) -> u32 { self.depth }

	/// Returns true if any of the dimensions is zero.
	pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 || self.depth == 0 }

	/// Returns the extent of the given mip level, never smaller than one texel per dimension.
	pub fn mip(&self, level: u32) -> Self {
		Self {
			width: (self.width >> level).max(1),
			height: (self.height >> level).max(1),
			depth: (self.depth >> level).max(1),
		}
	}
}

impl From<[u32; 3]> for Extent {
	fn from(array: [u32; 3]) -> Self {
		Self {
			width: array[0],
			height: array[1],
			depth: array[2],
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RGBA {
	pub r: f32,
	pub g: f32,
	pub b: f32,
	pub a: f32,
}

impl RGBA {
	pub fn black() -> Self { Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0, } }	
	pub fn white() -> Self { Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0, } }
}
