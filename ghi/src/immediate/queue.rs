use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::queue::{NativeQueue, SubmitSync};

use super::fence::CpuFence;
use super::tape::CommandTape;
use super::{ImmediateContext, ImmediateSurface};

/// Executes tapes by replaying them on the immediate context it owns.
/// Presentation is synchronous, so the sync sets of the queue need no native primitives.
pub struct ImmediateQueue<C: ImmediateContext, S: ImmediateSurface> {
	context: C,
	surface: PhantomData<fn(&mut S)>,
}

impl<C: ImmediateContext, S: ImmediateSurface> ImmediateQueue<C, S> {
	pub fn new(context: C) -> Self {
		Self { context, surface: PhantomData }
	}

	pub fn context(&self) -> &C { &self.context }

	pub fn context_mut(&mut self) -> &mut C { &mut self.context }
}

impl<C: ImmediateContext, S: ImmediateSurface> NativeQueue for ImmediateQueue<C, S> {
	type Submission = Arc<CommandTape>;
	type Fence = CpuFence;
	type Surface = S;

	fn execute(&mut self, submissions: Vec<Arc<CommandTape>>, signal: Option<(&CpuFence, u64)>, _: SubmitSync) -> bool {
		for tape in &submissions {
			tape.execute(&mut self.context);
		}

		self.context.flush();

		if let Some((fence, value)) = signal {
			fence.signal(value);
		}

		true
	}

	fn wait_idle(&mut self) -> bool {
		self.context.wait_idle()
	}

	fn present(&mut self, surface: &mut S, _: u32, _: usize, _: bool) -> bool {
		surface.present()
	}

	fn acquire_next_image(&mut self, surface: &mut S, _: usize) -> Option<u32> {
		Some(surface.current_buffer_index())
	}

	fn wait_for_acquire(&mut self, _: usize, _: Duration) -> bool { true }

	fn reset_sync(&mut self, _: usize, _: bool) -> bool { true }
}
