//! # Queue
//!
//! Ordered submission of command lists and the per frame synchronization sets that gate reuse of in flight resources.
//!
//! Each buffer index owns a sync set made of an acquire semaphore, a present semaphore and a fence.
//! Presenting signals the presentation engine through the current set and acquires the next image with the next set,
//! waiting on its fence before returning so the caller can start recording the next frame right away.

use std::time::Duration;

use utils::sync::Mutex;

use crate::fence::{Fence, NativeFence};
use crate::graphics_hardware_interface::{Features, RecordingStates, MAX_BUFFER_COUNT};
use crate::swap_chain::PresentSurface;

/// A closed command list that can be handed to a queue.
pub trait Submittable {
	type Submission;

	fn recording_state(&self) -> RecordingStates;

	fn is_submitted(&self) -> bool;

	/// Hands out the native work recorded by the list and marks it submitted.
	fn take_submission(&mut self) -> Self::Submission;

	/// Bundles only run inside another command list.
	fn is_bundle(&self) -> bool { false }
}

/// Sync set usage of a batch.
/// Every batch executed between an acquire and the following present signals the present semaphore of the set,
/// so the presentation engine always waits on the last one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SubmitSync {
	pub buffer_index: usize,
	/// First batch after the acquire. Waits on the acquire semaphore of the set.
	pub wait_acquire: bool,
	/// A previous batch of the frame signaled the present semaphore. Waits on it before signaling it again.
	pub wait_present: bool,
	/// Signals the present semaphore of the set.
	pub signal_present: bool,
}

impl SubmitSync {
	/// A batch that doesn't touch the sync set.
	pub fn none(buffer_index: usize) -> Self {
		Self { buffer_index, wait_acquire: false, wait_present: false, signal_present: false }
	}

	pub fn presentable(&self) -> bool { self.signal_present }
}

/// The native execution context behind a `Queue`. Calls are serialized by the queue.
pub trait NativeQueue {
	type Submission;
	type Fence: NativeFence;
	type Surface: PresentSurface;

	fn execute(&mut self, submissions: Vec<Self::Submission>, signal: Option<(&Self::Fence, u64)>, sync: SubmitSync) -> bool;

	fn wait_idle(&mut self) -> bool;

	/// Queues `image_index` for presentation. Waits on the present semaphore of the set if `rendered`, otherwise on its acquire semaphore.
	fn present(&mut self, surface: &mut Self::Surface, image_index: u32, buffer_index: usize, rendered: bool) -> bool;

	/// Requests the next image, signaling the acquire semaphore and fence of the set.
	fn acquire_next_image(&mut self, surface: &mut Self::Surface, buffer_index: usize) -> Option<u32>;

	/// Blocks on the fence of the set.
	fn wait_for_acquire(&mut self, buffer_index: usize, timeout: Duration) -> bool;

	/// Resets the primitives of the set so it can be reused.
	/// `stale` is set when one of its semaphores was signaled and never waited on. Those are replaced, since they can't be reset.
	fn reset_sync(&mut self, buffer_index: usize, stale: bool) -> bool;
}

struct QueueState<N: NativeQueue> {
	native: N,
	pending: Vec<N::Submission>,
	submission_index: u64,
	current_buffer_index: usize,
	previous_buffer_index: usize,
	/// The acquire semaphore of the set is signaled and no batch waited on it yet.
	acquired: [bool; MAX_BUFFER_COUNT],
	/// A batch signaled the present semaphore of the set.
	rendered: [bool; MAX_BUFFER_COUNT],
	/// The fence of the set was handed to an acquire and not waited on since.
	armed: [bool; MAX_BUFFER_COUNT],
}

impl<N: NativeQueue> QueueState<N> {
	fn is_stale(&self, buffer_index: usize) -> bool {
		self.acquired[buffer_index] || self.rendered[buffer_index]
	}

	/// Acquires the next image with the set at `buffer_index` and waits until it is ready.
	fn acquire(&mut self, surface: &mut N::Surface, buffer_index: usize, timeout: Duration) -> Option<u32> {
		if self.armed[buffer_index] {
			if !self.native.wait_for_acquire(buffer_index, timeout) {
				log::error!("Sync set {} is still in flight. It can't be reused.", buffer_index);
				return None;
			}

			self.armed[buffer_index] = false;
		}

		if !self.native.reset_sync(buffer_index, self.is_stale(buffer_index)) {
			log::error!("Failed to reset sync set {}.", buffer_index);
			return None;
		}

		let Some(image_index) = self.native.acquire_next_image(surface, buffer_index) else {
			log::error!("Failed to acquire the next image with sync set {}.", buffer_index);
			return None;
		};

		self.armed[buffer_index] = true;
		self.acquired[buffer_index] = true;
		self.rendered[buffer_index] = false;

		if !self.native.wait_for_acquire(buffer_index, timeout) {
			log::error!("Timed out after {} ms waiting for image {} acquired with sync set {}.", timeout.as_millis(), image_index, buffer_index);
			return None;
		}

		self.armed[buffer_index] = false;

		Some(image_index)
	}
}

pub struct Queue<N: NativeQueue> {
	inner: Mutex<QueueState<N>>,
	buffer_count: usize,
	present_timeout: Duration,
}

impl<N: NativeQueue> Queue<N> {
	pub fn new(native: N, features: &Features) -> Self {
		Self {
			inner: Mutex::new(QueueState {
				native,
				pending: Vec::new(),
				submission_index: 0,
				current_buffer_index: 0,
				previous_buffer_index: 0,
				acquired: [false; MAX_BUFFER_COUNT],
				rendered: [false; MAX_BUFFER_COUNT],
				armed: [false; MAX_BUFFER_COUNT],
			}),
			buffer_count: features.get_buffer_count(),
			present_timeout: features.get_present_timeout(),
		}
	}

	/// Appends a closed command list to the pending batch.
	pub fn submit<L: Submittable<Submission = N::Submission>>(&self, command_list: &mut L) -> bool {
		if command_list.recording_state() != RecordingStates::Ended {
			log::error!("Only ended command lists can be submitted. The command list is {:?}.", command_list.recording_state());
			return false;
		}

		if command_list.is_submitted() {
			log::error!("Command list was already submitted. Record it again before submitting it.");
			return false;
		}

		if command_list.is_bundle() {
			log::error!("Bundles can't be submitted. Execute them from another command list.");
			return false;
		}

		let submission = command_list.take_submission();

		self.inner.lock().pending.push(submission);

		true
	}

	/// Hands the pending batch to the native queue. If a fence is given its value is advanced together with the submission.
	pub fn execute(&self, fence: Option<&Fence<N::Fence>>) -> bool {
		let mut guard = self.inner.lock();
		let state = &mut *guard;

		if state.pending.is_empty() && fence.is_none() {
			log::trace!("Nothing to execute.");
			return true;
		}

		let submissions = std::mem::take(&mut state.pending);
		let buffer_index = state.current_buffer_index;
		let sync = if state.acquired[buffer_index] {
			SubmitSync { buffer_index, wait_acquire: true, wait_present: false, signal_present: true }
		} else if state.rendered[buffer_index] {
			SubmitSync { buffer_index, wait_acquire: false, wait_present: true, signal_present: true }
		} else {
			SubmitSync::none(buffer_index)
		};
		let count = submissions.len();

		let native = &mut state.native;

		let submitted = match fence {
			Some(fence) => fence.signal_with(|native_fence, value| native.execute(submissions, Some((native_fence, value)), sync)),
			None => native.execute(submissions, None, sync),
		};

		if !submitted {
			log::error!("Failed to execute {} command lists.", count);
			return false;
		}

		if sync.signal_present {
			state.acquired[buffer_index] = false;
			state.rendered[buffer_index] = true;
		}

		state.submission_index += 1;

		log::trace!("Executed {} command lists as submission {}.", count, state.submission_index);

		true
	}

	/// Blocks until the native queue has drained all outstanding work.
	pub fn wait_idle(&self) -> bool {
		let result = self.inner.lock().native.wait_idle();

		if !result { log::error!("Failed to wait for the queue to become idle."); }

		result
	}

	/// Presents `image_index` with the current sync set, then acquires the next image with the next set.
	/// Returns the new buffer index and image index.
	pub fn present(&self, surface: &mut N::Surface, image_index: u32) -> Option<(usize, u32)> {
		let mut guard = self.inner.lock();
		let state = &mut *guard;

		let current = state.current_buffer_index;
		let rendered = state.rendered[current];

		if !rendered && !state.acquired[current] {
			log::error!("Image {} was not acquired with sync set {}. It can't be presented.", image_index, current);
			return None;
		}

		if !state.native.present(surface, image_index, current, rendered) {
			log::error!("Failed to present image {}.", image_index);
			return None;
		}

		state.rendered[current] = false;
		state.acquired[current] = false;

		let next = (current + 1) % self.buffer_count;

		let next_image_index = state.acquire(surface, next, self.present_timeout)?;

		state.previous_buffer_index = current;
		state.current_buffer_index = next;

		Some((next, next_image_index))
	}

	/// Acquires an image with the current sync set. Used after creating or rebuilding a swap chain.
	pub fn acquire_first(&self, surface: &mut N::Surface) -> Option<u32> {
		let mut guard = self.inner.lock();
		let state = &mut *guard;

		let current = state.current_buffer_index;

		state.acquire(surface, current, self.present_timeout)
	}

	/// Resets every sync set and moves the cursor back to the first one. Waits for the queue to become idle first.
	pub fn reset_synchronization(&self) -> bool {
		let mut guard = self.inner.lock();
		let state = &mut *guard;

		if !state.native.wait_idle() {
			log::error!("Failed to wait for the queue to become idle before resetting synchronization.");
			return false;
		}

		for buffer_index in 0..self.buffer_count {
			if state.armed[buffer_index] {
				if !state.native.wait_for_acquire(buffer_index, self.present_timeout) {
					log::error!("Sync set {} is still in flight. It can't be reset.", buffer_index);
					return false;
				}

				state.armed[buffer_index] = false;
			}

			let stale = state.is_stale(buffer_index);

			if !state.native.reset_sync(buffer_index, stale) {
				log::error!("Failed to reset sync set {}.", buffer_index);
				return false;
			}

			state.acquired[buffer_index] = false;
			state.rendered[buffer_index] = false;
		}

		state.current_buffer_index = 0;
		state.previous_buffer_index = 0;

		log::debug!("Reset {} sync sets.", self.buffer_count);

		true
	}

	/// Runs `f` with exclusive access to the native queue.
	pub fn with_native<R>(&self, f: impl FnOnce(&mut N) -> R) -> R {
		f(&mut self.inner.lock().native)
	}

	pub fn buffer_count(&self) -> usize { self.buffer_count }

	pub fn current_buffer_index(&self) -> usize { self.inner.lock().current_buffer_index }

	pub fn previous_buffer_index(&self) -> usize { self.inner.lock().previous_buffer_index }

	/// Number of batches handed to the native queue so far.
	pub fn submission_index(&self) -> u64 { self.inner.lock().submission_index }

	pub fn pending_count(&self) -> usize { self.inner.lock().pending.len() }
}
