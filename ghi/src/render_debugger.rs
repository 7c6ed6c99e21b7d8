//! # Render Debugger
//!
//! Connects to a render debugger, if one injected itself into the process, to capture the work submitted during a frame.

use renderdoc::{RenderDoc, V141};
use utils::sync::Mutex;

/// Frame capture through RenderDoc. Does nothing when the application wasn't launched from it.
pub struct RenderDebugger {
	renderdoc: Option<Mutex<RenderDoc<V141>>>,
}

impl RenderDebugger {
	/// Connects to an attached render debugger.
	pub fn new() -> RenderDebugger {
		let renderdoc = match RenderDoc::new() {
			Ok(renderdoc) => {
				log::debug!("Connected to RenderDoc.");
				Some(Mutex::new(renderdoc))
			}
			Err(error) => {
				log::trace!("No render debugger attached: {}", error);
				None
			}
		};

		RenderDebugger { renderdoc }
	}

	pub fn is_attached(&self) -> bool { self.renderdoc.is_some() }

	/// Starts capturing every command submitted from now on.
	pub fn start_frame_capture(&self) {
		if let Some(renderdoc) = &self.renderdoc {
			renderdoc.lock().start_frame_capture(std::ptr::null_mut(), std::ptr::null_mut());
		}
	}

	pub fn end_frame_capture(&self) {
		if let Some(renderdoc) = &self.renderdoc {
			renderdoc.lock().end_frame_capture(std::ptr::null_mut(), std::ptr::null_mut());
		}
	}
}

impl Default for RenderDebugger {
	fn default() -> Self { Self::new() }
}
