//! # Fence
//!
//! A monotonic counter the CPU can observe to know when submitted GPU work has completed.

use std::time::{Duration, Instant};

use utils::sync::Mutex;

/// Native object backing a `Fence`. It reports the last value the GPU reached.
pub trait NativeFence {
	/// Last value signaled by the native execution context.
	fn completed_value(&self) -> u64;

	/// Blocks until `value` is reached or `timeout` elapses. Returns whether the value was reached.
	fn wait_value(&self, value: u64, timeout: Duration) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
struct FenceValues {
	current: u64,
	previous: u64,
}

pub struct Fence<N: NativeFence> {
	native: N,
	values: Mutex<FenceValues>,
}

const WAIT_SLICE: Duration = Duration::from_millis(1);
const STUCK_WARNING_THRESHOLD: Duration = Duration::from_millis(8);

impl<N: NativeFence> Fence<N> {
	pub fn new(native: N) -> Self {
		let completed = native.completed_value();

		Self {
			native,
			values: Mutex::new(FenceValues { current: completed, previous: completed }),
		}
	}

	/// The value the fence reaches once all work submitted with it has completed.
	pub fn current_value(&self) -> u64 { self.values.lock().current }

	/// The value the fence was expected to reach before the last advance.
	pub fn previous_value(&self) -> u64 { self.values.lock().previous }

	/// Bumps the expected value and returns it. The caller is responsible for having the native fence signal it.
	pub fn advance_value(&self) -> u64 {
		let mut values = self.values.lock();
		values.previous = values.current;
		values.current += 1;
		values.current
	}

	/// Advances the expected value only if `signal` manages to enqueue a native signal of the new value.
	/// The lock is held across the call so concurrent submissions can't reorder values.
	pub(crate) fn signal_with(&self, signal: impl FnOnce(&N, u64) -> bool) -> bool {
		let mut values = self.values.lock();
		let value = values.current + 1;

		if !signal(&self.native, value) { return false; }

		values.previous = values.current;
		values.current = value;

		true
	}

	/// Returns whether the current value has been reached, without blocking.
	pub fn is_signaled(&self) -> bool {
		self.native.completed_value() >= self.current_value()
	}

	/// Blocks until the current value is reached or `timeout` elapses.
	pub fn wait(&self, timeout: Duration) -> bool {
		let value = self.current_value();

		if self.native.completed_value() >= value { return true; }

		let start = Instant::now();
		let mut timeout_count: u64 = 0;

		loop {
			let elapsed = start.elapsed();

			if elapsed >= timeout {
				log::error!("Timed out after {} ms waiting for fence value {}. Last completed value is {}.", elapsed.as_millis(), value, self.native.completed_value());
				return false;
			}

			if self.native.wait_value(value, WAIT_SLICE.min(timeout - elapsed)) {
				return true;
			}

			if elapsed >= STUCK_WARNING_THRESHOLD && timeout_count % 500 == 0 {
				log::warn!("Stuck waiting for fence value {} for {} ms. There is a potential issue with synchronization.", value, elapsed.as_millis());
			}

			timeout_count += 1;
		}
	}

	pub fn native(&self) -> &N { &self.native }
}
