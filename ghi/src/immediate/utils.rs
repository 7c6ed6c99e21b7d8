//! Translation of resource states into the bind points of an immediate context.

use crate::graphics_hardware_interface::{ResourceStates, Uses};

bitflags::bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
	/// Bind points a resource can be attached to. Values match the native bind flags.
	pub struct BindFlags : u32 {
		const VERTEX_BUFFER = 0x1;
		const INDEX_BUFFER = 0x2;
		const CONSTANT_BUFFER = 0x4;
		const SHADER_RESOURCE = 0x8;
		const STREAM_OUTPUT = 0x10;
		const RENDER_TARGET = 0x20;
		const DEPTH_STENCIL = 0x40;
		const UNORDERED_ACCESS = 0x80;
		/// Not a native bind flag. Mirrors the draw indirect arguments resource flag.
		const INDIRECT_ARGUMENT = 0x10000;
	}
}

/// Bind points a resource in `state` is attached to. An empty set detaches the resource from every bind point.
/// Returns `None` for states the immediate model can't express.
pub fn to_bind_flags(state: ResourceStates) -> Option<BindFlags> {
	let flags = match state {
		ResourceStates::Undefined | ResourceStates::Common | ResourceStates::Present | ResourceStates::CopySource | ResourceStates::CopyDestination => BindFlags::empty(),
		ResourceStates::VertexBuffer => BindFlags::VERTEX_BUFFER,
		ResourceStates::IndexBuffer => BindFlags::INDEX_BUFFER,
		ResourceStates::ConstantBuffer => BindFlags::CONSTANT_BUFFER,
		ResourceStates::ColorWrite => BindFlags::RENDER_TARGET,
		ResourceStates::DepthWrite => BindFlags::DEPTH_STENCIL,
		ResourceStates::DepthRead => BindFlags::DEPTH_STENCIL | BindFlags::SHADER_RESOURCE,
		ResourceStates::ShaderRead => BindFlags::SHADER_RESOURCE,
		ResourceStates::UnorderedAccess => BindFlags::UNORDERED_ACCESS,
		ResourceStates::IndirectArgument => BindFlags::INDIRECT_ARGUMENT,
		ResourceStates::AccelerationStructure => return None,
	};

	Some(flags)
}

/// The state a resource created with `flags` starts in. Writable bind points take precedence.
pub fn to_resource_state(flags: BindFlags) -> ResourceStates {
	if flags.contains(BindFlags::DEPTH_STENCIL) {
		ResourceStates::DepthWrite
	} else if flags.contains(BindFlags::RENDER_TARGET) {
		ResourceStates::ColorWrite
	} else if flags.contains(BindFlags::UNORDERED_ACCESS) {
		ResourceStates::UnorderedAccess
	} else if flags.contains(BindFlags::SHADER_RESOURCE) {
		ResourceStates::ShaderRead
	} else if flags.contains(BindFlags::CONSTANT_BUFFER) {
		ResourceStates::ConstantBuffer
	} else if flags.contains(BindFlags::VERTEX_BUFFER) {
		ResourceStates::VertexBuffer
	} else if flags.contains(BindFlags::INDEX_BUFFER) {
		ResourceStates::IndexBuffer
	} else if flags.contains(BindFlags::INDIRECT_ARGUMENT) {
		ResourceStates::IndirectArgument
	} else {
		ResourceStates::Common
	}
}

pub fn uses_to_bind_flags(uses: Uses) -> BindFlags {
	let mut flags = BindFlags::empty();

	if uses.contains(Uses::Vertex) { flags |= BindFlags::VERTEX_BUFFER; }
	if uses.contains(Uses::Index) { flags |= BindFlags::INDEX_BUFFER; }
	if uses.contains(Uses::Uniform) { flags |= BindFlags::CONSTANT_BUFFER; }
	if uses.contains(Uses::Storage) { flags |= BindFlags::UNORDERED_ACCESS; }
	if uses.contains(Uses::Indirect) { flags |= BindFlags::INDIRECT_ARGUMENT; }
	if uses.contains(Uses::Image) { flags |= BindFlags::SHADER_RESOURCE; }
	if uses.contains(Uses::RenderTarget) { flags |= BindFlags::RENDER_TARGET; }
	if uses.contains(Uses::DepthStencil) { flags |= BindFlags::DEPTH_STENCIL; }

	flags
}
