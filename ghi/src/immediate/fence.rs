use std::time::{Duration, Instant};

use utils::sync::{Condvar, Mutex};

use crate::fence::NativeFence;

/// Fence signaled by the immediate queue once a batch has been replayed and flushed.
#[derive(Default)]
pub struct CpuFence {
	value: Mutex<u64>,
	signaled: Condvar,
}

impl CpuFence {
	pub fn new() -> Self {
		Self::default()
	}

	/// Raises the completed value and wakes every waiter. Lower values are ignored.
	pub fn signal(&self, value: u64) {
		let mut completed = self.value.lock();

		if value > *completed {
			*completed = value;
			self.signaled.notify_all();
		}
	}
}

impl NativeFence for CpuFence {
	fn completed_value(&self) -> u64 { *self.value.lock() }

	fn wait_value(&self, value: u64, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut completed = self.value.lock();

		while *completed < value {
			if self.signaled.wait_until(&mut completed, deadline).timed_out() {
				return *completed >= value;
			}
		}

		true
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::fence::Fence;

	#[test]
	fn signal_wakes_waiters() {
		let fence = Arc::new(Fence::new(CpuFence::new()));
		let value = fence.advance_value();

		let waiter = {
			let fence = fence.clone();
			std::thread::spawn(move || fence.wait(Duration::from_secs(5)))
		};

		std::thread::sleep(Duration::from_millis(5));
		fence.native().signal(value);

		assert!(waiter.join().unwrap());
		assert!(fence.is_signaled());
	}

	#[test]
	fn values_never_go_back() {
		let fence = CpuFence::new();

		fence.signal(3);
		fence.signal(2);

		assert_eq!(fence.completed_value(), 3);
		assert!(!fence.wait_value(4, Duration::from_millis(2)));
	}
}
