//! Backend independent classification of resource state transitions.
//! Backends translate the states of a `Transition` into their native representation, the kind tells them how much synchronization it needs.

use crate::graphics_hardware_interface::{ResourceStates, Uses};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TransitionKinds {
	/// Both states are the same. Nothing is recorded.
	NoOp,
	/// Shader read and unordered access on a resource that can be written from shaders.
	/// Both states share the native general representation, so only a memory dependency is needed.
	General,
	/// Into or out of the presentation engine. Scoped to the top and bottom of the pipe.
	Presentation,
	Standard,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Transition {
	pub previous: ResourceStates,
	pub next: ResourceStates,
	pub kind: TransitionKinds,
}

impl Transition {
	/// Classifies the transition of a resource with the given uses.
	pub fn new(previous: ResourceStates, next: ResourceStates, uses: Uses) -> Self {
		let kind = if previous == next {
			TransitionKinds::NoOp
		} else if uses.contains(Uses::Storage) && is_pair(previous, next, ResourceStates::ShaderRead, ResourceStates::UnorderedAccess) {
			TransitionKinds::General
		} else if is_pair(previous, next, ResourceStates::Present, ResourceStates::ColorWrite) {
			TransitionKinds::Presentation
		} else {
			TransitionKinds::Standard
		};

		Self { previous, next, kind }
	}

	pub fn is_no_op(&self) -> bool { self.kind == TransitionKinds::NoOp }
}

fn is_pair(previous: ResourceStates, next: ResourceStates, a: ResourceStates, b: ResourceStates) -> bool {
	(previous == a && next == b) || (previous == b && next == a)
}

#[cfg(test)]
mod tests {
	use super::*;

	const STATES: [ResourceStates; 15] = [
		ResourceStates::Undefined, ResourceStates::Common, ResourceStates::VertexBuffer, ResourceStates::IndexBuffer, ResourceStates::ConstantBuffer,
		ResourceStates::ColorWrite, ResourceStates::DepthWrite, ResourceStates::DepthRead, ResourceStates::ShaderRead, ResourceStates::UnorderedAccess,
		ResourceStates::IndirectArgument, ResourceStates::CopySource, ResourceStates::CopyDestination, ResourceStates::Present, ResourceStates::AccelerationStructure,
	];

	#[test]
	fn equal_states_are_no_ops() {
		for state in STATES {
			assert_eq!(Transition::new(state, state, Uses::all()).kind, TransitionKinds::NoOp);
		}
	}

	#[test]
	fn shader_read_and_unordered_access_share_general_representation() {
		assert_eq!(Transition::new(ResourceStates::UnorderedAccess, ResourceStates::ShaderRead, Uses::Storage | Uses::Image).kind, TransitionKinds::General);
		assert_eq!(Transition::new(ResourceStates::ShaderRead, ResourceStates::UnorderedAccess, Uses::Storage).kind, TransitionKinds::General);

		// Without storage use the read state has its own representation.
		assert_eq!(Transition::new(ResourceStates::UnorderedAccess, ResourceStates::ShaderRead, Uses::Image).kind, TransitionKinds::Standard);
	}

	#[test]
	fn presentation_pairs() {
		assert_eq!(Transition::new(ResourceStates::Present, ResourceStates::ColorWrite, Uses::RenderTarget).kind, TransitionKinds::Presentation);
		assert_eq!(Transition::new(ResourceStates::ColorWrite, ResourceStates::Present, Uses::RenderTarget).kind, TransitionKinds::Presentation);
		assert_eq!(Transition::new(ResourceStates::CopyDestination, ResourceStates::Present, Uses::RenderTarget).kind, TransitionKinds::Standard);
	}
}
