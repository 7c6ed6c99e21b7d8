use std::sync::Arc;
use std::time::Duration;

use utils::{Extent, RGBA};

/// Maximum number of descriptor slots a command list tracks.
pub const MAX_DESCRIPTORS: usize = 64;

/// Maximum number of frames that can be in flight at the same time.
pub const MAX_BUFFER_COUNT: usize = 3;

// HANDLES

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct SamplerHandle(pub(crate) u64);

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct PipelineHandle(pub(crate) u64);

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct QueryPoolHandle(pub(crate) u64);

macro_rules! raw_handle {
	($($handle:ident),*) => {
		$(
			impl $handle {
				/// Wraps a handle issued by the device that created the native object.
				pub const fn from_raw(value: u64) -> Self { Self(value) }
				pub const fn raw(&self) -> u64 { self.0 }
			}
		)*
	};
}

raw_handle!(TextureHandle, BufferHandle, SamplerHandle, PipelineHandle, QueryPoolHandle);

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
/// Any resource a barrier can be issued on.
pub enum ResourceHandle {
	Texture(TextureHandle),
	Buffer(BufferHandle),
}

// RESOURCE STATES

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Enumerates the states a resource can be in.
/// The owner of a resource tracks its state, command lists only transition between a declared pair of states.
pub enum ResourceStates {
	/// The contents of the resource are undefined. Only valid as the previous state of a transition.
	Undefined,
	/// Accessible by any operation.
	Common,
	VertexBuffer,
	IndexBuffer,
	ConstantBuffer,
	/// Written as a color attachment.
	ColorWrite,
	/// Written as a depth attachment.
	DepthWrite,
	/// Read as a depth attachment and from shaders.
	DepthRead,
	/// Read from shaders.
	ShaderRead,
	/// Read and written from shaders.
	UnorderedAccess,
	IndirectArgument,
	CopySource,
	CopyDestination,
	/// Handed to the presentation engine.
	Present,
	AccelerationStructure,
}

// FORMATS

#[allow(non_camel_case_types)]
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub enum Encodings {
	FloatingPoint,
	UnsignedNormalized,
	SignedNormalized,
	sRGB,
}

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
/// Enumerates the formats that textures can have.
pub enum Formats {
	/// 10 bit unsigned for R, G and 11 bit unsigned for B normalized RGB.
	RGBu10u10u11,
	/// 8 bit unsigned per component normalized BGRA.
	BGRAu8,
	/// 8 bit unsigned per component sRGB BGRA. Usual backbuffer format.
	BGRAsRGB,
	/// 32 bit float depth.
	Depth32,
	/// 24 bit depth with 8 bit stencil.
	Depth24Stencil8,
	U32,
	R8(Encodings),
	R16(Encodings),
	R32(Encodings),
	RG8(Encodings),
	RG16(Encodings),
	RGBA8(Encodings),
	RGBA16(Encodings),
}

impl Formats {
	pub fn is_depth(&self) -> bool {
		matches!(self, Formats::Depth32 | Formats::Depth24Stencil8)
	}

	pub fn has_stencil(&self) -> bool {
		matches!(self, Formats::Depth24Stencil8)
	}
}

bitflags::bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
	/// Bit flags for the available resource uses.
	pub struct Uses : u32 {
		/// Resource will be used as a vertex buffer.
		const Vertex = 1 << 0;
		/// Resource will be used as an index buffer.
		const Index = 1 << 1;
		/// Resource will be used as a uniform buffer.
		const Uniform = 1 << 2;
		/// Resource will be read and written from shaders.
		const Storage = 1 << 3;
		/// Resource will be used as an indirect buffer.
		const Indirect = 1 << 4;
		/// Resource will be sampled.
		const Image = 1 << 5;
		/// Resource will be used as a render target.
		const RenderTarget = 1 << 6;
		/// Resource will be used as a depth stencil.
		const DepthStencil = 1 << 7;
		/// Resource will be used as an acceleration structure.
		const AccelerationStructure = 1 << 8;
		/// Resource will be used as a transfer source.
		const TransferSource = 1 << 9;
		/// Resource will be used as a transfer destination.
		const TransferDestination = 1 << 10;
		/// Resource will be presented.
		const Present = 1 << 11;
	}
}

bitflags::bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
	/// Bit flags for the shader stages a binding or push constant range is visible to.
	pub struct Stages : u32 {
		const NONE = 0;
		const VERTEX = 1 << 0;
		const TASK = 1 << 1;
		const MESH = 1 << 2;
		const FRAGMENT = 1 << 3;
		const COMPUTE = 1 << 4;
		const RAYGEN = 1 << 5;
		const CLOSEST_HIT = 1 << 6;
		const ANY_HIT = 1 << 7;
		const INTERSECTION = 1 << 8;
		const MISS = 1 << 9;
		const CALLABLE = 1 << 10;
		const ALL = (1 << 11) - 1;
	}
}

// RESOURCES

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// Describes the shape of a texture.
pub struct TextureDescription {
	pub(crate) extent: Extent,
	pub(crate) format: Formats,
	pub(crate) mip_levels: u32,
	pub(crate) array_layers: u32,
	pub(crate) uses: Uses,
}

impl TextureDescription {
	pub fn new(extent: Extent, format: Formats, uses: Uses) -> Self {
		Self {
			extent,
			format,
			mip_levels: 1,
			array_layers: 1,
			uses,
		}
	}

	pub fn mip_levels(mut self, value: u32) -> Self {
		self.mip_levels = value;
		self
	}

	pub fn array_layers(mut self, value: u32) -> Self {
		self.array_layers = value;
		self
	}

	pub fn extent(&self) -> Extent { self.extent }
	pub fn format(&self) -> Formats { self.format }
	pub fn uses(&self) -> Uses { self.uses }
	pub fn mip_level_count(&self) -> u32 { self.mip_levels }
	pub fn array_layer_count(&self) -> u32 { self.array_layers }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// A non owning reference to a texture created by a device.
pub struct Texture {
	pub(crate) handle: TextureHandle,
	pub(crate) description: TextureDescription,
}

impl Texture {
	pub fn new(handle: TextureHandle, description: TextureDescription) -> Self {
		Self { handle, description }
	}

	pub fn handle(&self) -> TextureHandle { self.handle }
	pub fn description(&self) -> &TextureDescription { &self.description }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// A non owning reference to a buffer created by a device.
pub struct Buffer {
	pub(crate) handle: BufferHandle,
	pub(crate) size: u64,
	pub(crate) uses: Uses,
}

impl Buffer {
	pub fn new(handle: BufferHandle, size: u64, uses: Uses) -> Self {
		Self { handle, size, uses }
	}

	pub fn handle(&self) -> BufferHandle { self.handle }
	pub fn size(&self) -> u64 { self.size }
	pub fn uses(&self) -> Uses { self.uses }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Ranges {
	Size(u64),
	Whole,
}

#[derive(Clone, Copy, PartialEq, Debug)]
/// A view of a resource that can be bound to a descriptor slot.
pub enum View {
	Texture(Texture),
	Buffer {
		buffer: Buffer,
		offset: u64,
		range: Ranges,
	},
}

impl View {
	pub fn texture(texture: &Texture) -> Self { View::Texture(*texture) }

	pub fn buffer(buffer: &Buffer) -> Self { View::Buffer { buffer: *buffer, offset: 0, range: Ranges::Whole } }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// The contents of a descriptor slot.
pub enum Descriptor {
	Texture {
		handle: TextureHandle,
		/// The texture is bound through the general layout, because it can also be written from shaders.
		general: bool,
	},
	Buffer {
		handle: BufferHandle,
		offset: u64,
		range: Ranges,
	},
	Sampler(SamplerHandle),
}

impl Descriptor {
	/// Returns whether this descriptor can be written to a binding of the given type.
	pub fn is_compatible(&self, descriptor_type: DescriptorType) -> bool {
		match self {
			Descriptor::Texture { .. } => matches!(descriptor_type, DescriptorType::SampledImage | DescriptorType::StorageImage),
			Descriptor::Buffer { .. } => matches!(descriptor_type, DescriptorType::UniformBuffer | DescriptorType::StorageBuffer),
			Descriptor::Sampler(_) => descriptor_type == DescriptorType::Sampler,
		}
	}
}

impl From<&View> for Descriptor {
	fn from(view: &View) -> Self {
		match view {
			View::Texture(texture) => Descriptor::Texture { handle: texture.handle, general: texture.description.uses.contains(Uses::Storage) },
			View::Buffer { buffer, offset, range } => Descriptor::Buffer { handle: buffer.handle, offset: *offset, range: *range },
		}
	}
}

// DESCRIPTOR LAYOUTS

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Enumerates the available descriptor types.
pub enum DescriptorType {
	/// A uniform buffer.
	UniformBuffer,
	/// A storage buffer.
	StorageBuffer,
	/// An image.
	SampledImage,
	/// A storage image.
	StorageImage,
	/// A sampler.
	Sampler,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Describes one binding of a descriptor set layout.
pub struct DescriptorSetBindingTemplate {
	/// The first slot of the binding.
	pub(crate) binding: u32,
	/// The descriptor type of the binding.
	pub(crate) descriptor_type: DescriptorType,
	/// The number of consecutive slots the binding covers.
	pub(crate) descriptor_count: u32,
	/// The stages the binding is visible to.
	pub(crate) stages: Stages,
}

impl DescriptorSetBindingTemplate {
	pub const fn new(binding: u32, descriptor_type: DescriptorType, stages: Stages) -> Self {
		Self {
			binding,
			descriptor_type,
			descriptor_count: 1,
			stages,
		}
	}

	pub const fn new_array(binding: u32, descriptor_type: DescriptorType, stages: Stages, descriptor_count: u32) -> Self {
		Self {
			binding,
			descriptor_type,
			descriptor_count,
			stages,
		}
	}

	pub fn binding(&self) -> u32 { self.binding }
	pub fn descriptor_type(&self) -> DescriptorType { self.descriptor_type }
	pub fn descriptor_count(&self) -> u32 { self.descriptor_count }
	pub fn stages(&self) -> Stages { self.stages }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
/// The binding slots a pipeline reads its descriptors from.
pub struct DescriptorSetLayout {
	bindings: Vec<DescriptorSetBindingTemplate>,
}

impl DescriptorSetLayout {
	pub fn new(bindings: &[DescriptorSetBindingTemplate]) -> Self {
		let mut bindings = bindings.to_vec();
		bindings.sort_by_key(|binding| binding.binding);
		Self { bindings }
	}

	pub fn bindings(&self) -> &[DescriptorSetBindingTemplate] { &self.bindings }

	/// Total number of descriptor slots covered by the layout.
	pub fn descriptor_count(&self) -> u32 {
		self.bindings.iter().map(|binding| binding.descriptor_count).sum()
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// One descriptor to be written into the native descriptor representation.
pub struct DescriptorWrite {
	pub(crate) binding: u32,
	pub(crate) array_element: u32,
	pub(crate) descriptor_type: DescriptorType,
	pub(crate) descriptor: Descriptor,
}

impl DescriptorWrite {
	pub fn binding(&self) -> u32 { self.binding }
	pub fn array_element(&self) -> u32 { self.array_element }
	pub fn descriptor_type(&self) -> DescriptorType { self.descriptor_type }
	pub fn descriptor(&self) -> &Descriptor { &self.descriptor }
	/// The flat slot this write targets.
	pub fn slot(&self) -> u32 { self.binding + self.array_element }
}

// PIPELINES

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PipelineBindPoints {
	Graphics,
	Compute,
	RayTracing,
}

#[derive(Clone, Debug)]
/// A non owning reference to a compiled pipeline and the descriptor layout it was built with.
pub struct Pipeline {
	pub(crate) handle: PipelineHandle,
	pub(crate) bind_point: PipelineBindPoints,
	pub(crate) layout: Arc<DescriptorSetLayout>,
	pub(crate) push_constant_stages: Stages,
}

impl Pipeline {
	pub fn new(handle: PipelineHandle, bind_point: PipelineBindPoints, layout: Arc<DescriptorSetLayout>) -> Self {
		Self {
			handle,
			bind_point,
			layout,
			push_constant_stages: Stages::NONE,
		}
	}

	pub fn push_constant_stages(mut self, stages: Stages) -> Self {
		self.push_constant_stages = stages;
		self
	}

	pub fn handle(&self) -> PipelineHandle { self.handle }
	pub fn bind_point(&self) -> PipelineBindPoints { self.bind_point }
	pub fn layout(&self) -> &DescriptorSetLayout { &self.layout }
}

// FIXED FUNCTION STATE

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Viewport {
	pub x: f32,
	pub y: f32,
	pub width: f32,
	pub height: f32,
	pub min_depth: f32,
	pub max_depth: f32,
}

impl Viewport {
	pub fn from_extent(extent: Extent) -> Self {
		Self { x: 0.0, y: 0.0, width: extent.width() as f32, height: extent.height() as f32, min_depth: 0.0, max_depth: 1.0 }
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Rect {
	pub x: i32,
	pub y: i32,
	pub width: u32,
	pub height: u32,
}

impl Rect {
	pub fn from_extent(extent: Extent) -> Self {
		Self { x: 0, y: 0, width: extent.width(), height: extent.height() }
	}
}

/// Blend constants bound by `begin`.
pub const DEFAULT_BLEND_CONSTANTS: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufferBinding {
	pub buffer: BufferHandle,
	pub offset: u64,
	pub stride: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IndexTypes {
	U16,
	U32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IndexBufferBinding {
	pub buffer: BufferHandle,
	pub offset: u64,
	pub index_type: IndexTypes,
}

// FRAME BUFFERS

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ClearValue {
	None,
	Color(RGBA),
	Integer(u32, u32, u32, u32),
	Depth(f32),
}

#[derive(Clone, Copy, PartialEq, Debug)]
/// Stores the information of an attachment.
pub struct Attachment {
	pub(crate) texture: Texture,
	pub(crate) clear: ClearValue,
	/// Whether to load the contents of the attachment when the frame buffer is bound.
	pub(crate) load: bool,
	/// Whether to store the contents of the attachment when the frame buffer is unbound.
	pub(crate) store: bool,
}

impl Attachment {
	pub fn new(texture: &Texture) -> Self {
		Self { texture: *texture, clear: ClearValue::None, load: true, store: true }
	}

	pub fn clear(mut self, value: ClearValue) -> Self {
		self.clear = value;
		self.load = false;
		self
	}

	pub fn store(mut self, value: bool) -> Self {
		self.store = value;
		self
	}

	pub fn texture(&self) -> &Texture { &self.texture }
	pub fn clear_value(&self) -> ClearValue { self.clear }
	pub fn loads(&self) -> bool { self.load }
	pub fn stores(&self) -> bool { self.store }
}

#[derive(Clone, PartialEq, Debug)]
/// A set of render targets.
pub struct FrameBuffer {
	pub(crate) color: Vec<Attachment>,
	pub(crate) depth: Option<Attachment>,
	pub(crate) extent: Extent,
}

impl FrameBuffer {
	/// Builds a frame buffer from the given attachments. Depth formatted attachments become the depth attachment.
	pub fn new(attachments: &[Attachment]) -> Self {
		let extent = attachments.first().map(|attachment| attachment.texture.description.extent).unwrap_or_default();

		Self {
			color: attachments.iter().filter(|attachment| !attachment.texture.description.format.is_depth()).copied().collect(),
			depth: attachments.iter().find(|attachment| attachment.texture.description.format.is_depth()).copied(),
			extent,
		}
	}

	/// The same targets with every attachment loading its contents, to continue rendering after a split.
	pub fn resumed(&self) -> Self {
		let resume = |attachment: &Attachment| Attachment { clear: ClearValue::None, load: true, ..*attachment };

		Self {
			color: self.color.iter().map(resume).collect(),
			depth: self.depth.as_ref().map(resume),
			extent: self.extent,
		}
	}

	/// Whether any attachment drops its contents when rendering ends.
	pub fn discards(&self) -> bool {
		self.color.iter().chain(self.depth.iter()).any(|attachment| !attachment.store)
	}

	pub fn color_attachments(&self) -> &[Attachment] { &self.color }
	pub fn depth_attachment(&self) -> Option<&Attachment> { self.depth.as_ref() }
	pub fn extent(&self) -> Extent { self.extent }
}

// COPIES

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Describes a copy between one subresource of two textures.
pub struct TextureCopyRegion {
	pub source_mip_level: u32,
	pub source_array_layer: u32,
	pub source_offset: [u32; 3],
	pub destination_mip_level: u32,
	pub destination_array_layer: u32,
	pub destination_offset: [u32; 3],
	pub extent: Extent,
}

impl TextureCopyRegion {
	/// A copy of a whole subresource into the same subresource of the destination.
	pub fn subresource(mip_level: u32, array_layer: u32, extent: Extent) -> Self {
		Self {
			source_mip_level: mip_level,
			source_array_layer: array_layer,
			source_offset: [0; 3],
			destination_mip_level: mip_level,
			destination_array_layer: array_layer,
			destination_offset: [0; 3],
			extent,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufferStridedRange {
	pub buffer: BufferHandle,
	pub offset: u64,
	pub stride: u64,
	pub size: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// The shader binding tables used by a ray tracing dispatch.
pub struct ShaderBindingTables {
	pub raygen: BufferStridedRange,
	pub miss: BufferStridedRange,
	pub hit: BufferStridedRange,
	pub callable: Option<BufferStridedRange>,
}

// CONFIGURATION

#[derive(Clone, Copy, Debug)]
/// Device creation options.
pub struct Features {
	pub(crate) validation: bool,
	pub(crate) buffer_count: usize,
	pub(crate) push_descriptors: bool,
	pub(crate) mesh_shading: bool,
	pub(crate) ray_tracing: bool,
	pub(crate) descriptor_heap_size: u32,
	pub(crate) present_timeout: Duration,
	pub(crate) debug_capture: bool,
}

impl Features {
	pub fn new() -> Self {
		Self {
			validation: false,
			buffer_count: 2,
			push_descriptors: true,
			mesh_shading: false,
			ray_tracing: false,
			descriptor_heap_size: 4096,
			present_timeout: Duration::from_secs(1),
			debug_capture: false,
		}
	}

	pub fn validation(mut self, value: bool) -> Self {
		self.validation = value;
		self
	}

	/// Number of frames in flight. Clamped between 1 and `MAX_BUFFER_COUNT`.
	pub fn buffer_count(mut self, value: usize) -> Self {
		self.buffer_count = value.clamp(1, MAX_BUFFER_COUNT);
		self
	}

	/// Prefer pushing descriptors into the command buffer over writing them into descriptor tables, when the device supports it.
	pub fn push_descriptors(mut self, value: bool) -> Self {
		self.push_descriptors = value;
		self
	}

	pub fn mesh_shading(mut self, value: bool) -> Self {
		self.mesh_shading = value;
		self
	}

	pub fn ray_tracing(mut self, value: bool) -> Self {
		self.ray_tracing = value;
		self
	}

	/// Number of descriptors available to descriptor tables.
	pub fn descriptor_heap_size(mut self, value: u32) -> Self {
		self.descriptor_heap_size = value;
		self
	}

	/// How long a present waits for the next backbuffer to be released before failing.
	pub fn present_timeout(mut self, value: Duration) -> Self {
		self.present_timeout = value;
		self
	}

	/// Connect to a render debugger, if one is attached, to capture frames.
	pub fn debug_capture(mut self, value: bool) -> Self {
		self.debug_capture = value;
		self
	}

	pub fn get_buffer_count(&self) -> usize { self.buffer_count }
	pub fn get_descriptor_heap_size(&self) -> u32 { self.descriptor_heap_size }
	pub fn get_present_timeout(&self) -> Duration { self.present_timeout }
}

impl Default for Features {
	fn default() -> Self { Self::new() }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
/// Optional native functionality, probed once when the device is created.
pub struct Capabilities {
	pub push_descriptor: bool,
	pub mesh_shading: bool,
	pub ray_tracing: bool,
}

// COMMAND LISTS

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RecordingStates {
	/// Never recorded.
	Initial,
	Recording,
	/// Recording with a frame buffer bound.
	RenderPass,
	/// Closed, ready to be submitted.
	Ended,
}

/// The recording interface shared by every backend.
/// Arguments with a zero count or size make the call a no-op.
pub trait CommandList {
	fn state(&self) -> RecordingStates;

	/// Starts recording. Resets the fixed function state to its defaults and forgets the bound pipeline and descriptors.
	fn begin(&mut self) -> bool;

	/// Finishes recording. Unbinds the frame buffer if one is still bound.
	fn end(&mut self) -> bool;

	/// Binds a set of render targets. Viewport and scissor are set to cover the frame buffer.
	fn begin_frame_buffer(&mut self, frame_buffer: &FrameBuffer);

	fn end_frame_buffer(&mut self);

	/// Binds a pipeline and its descriptor layout. Every descriptor is written again before the next draw or dispatch.
	fn set_pipeline_state(&mut self, pipeline: &Pipeline);

	/// Binds a view to a descriptor slot. Takes effect at the next draw or dispatch.
	fn set_view(&mut self, slot: u32, view: &View);

	/// Binds a sampler to a descriptor slot. Takes effect at the next draw or dispatch.
	fn set_sampler(&mut self, slot: u32, sampler: SamplerHandle);

	fn set_viewports(&mut self, viewports: &[Viewport]);

	fn set_scissors(&mut self, scissors: &[Rect]);

	fn set_blend_constants(&mut self, constants: [f32; 4]);

	fn set_stencil_reference(&mut self, reference: u32);

	fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]);

	fn set_index_buffer(&mut self, binding: &IndexBufferBinding);

	/// Writes push constants for the bound pipeline.
	fn set_constants(&mut self, offset: u32, data: &[u8]);

	fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

	fn draw_indexed_instanced(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32);

	fn draw_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32);

	fn draw_indexed_instanced_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32);

	fn dispatch(&mut self, x: u32, y: u32, z: u32);

	fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64);

	fn dispatch_mesh(&mut self, x: u32, y: u32, z: u32);

	fn dispatch_mesh_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32);

	fn trace_rays(&mut self, tables: &ShaderBindingTables, width: u32, height: u32, depth: u32);

	/// Declares that `texture` goes from `previous` to `next`. Equal states record nothing.
	fn texture_barrier(&mut self, texture: &Texture, previous: ResourceStates, next: ResourceStates);

	/// Declares that `buffer` goes from `previous` to `next`. Equal states record nothing.
	fn buffer_barrier(&mut self, buffer: &Buffer, previous: ResourceStates, next: ResourceStates);

	fn copy_texture_region(&mut self, source: &Texture, destination: &Texture, region: &TextureCopyRegion);

	fn copy_buffer_region(&mut self, source: &Buffer, source_offset: u64, destination: &Buffer, destination_offset: u64, size: u64);

	/// Copies every subresource the two textures have in common.
	fn copy_texture(&mut self, source: &Texture, destination: &Texture) {
		let source_description = source.description();
		let destination_description = destination.description();

		let mip_levels = source_description.mip_levels.min(destination_description.mip_levels);
		let array_layers = source_description.array_layers.min(destination_description.array_layers);

		for mip_level in 0..mip_levels {
			let source_extent = source_description.extent.mip(mip_level);
			let destination_extent = destination_description.extent.mip(mip_level);
			let extent = Extent::new(source_extent.width().min(destination_extent.width()), source_extent.height().min(destination_extent.height()), source_extent.depth().min(destination_extent.depth()));

			for array_layer in 0..array_layers {
				self.copy_texture_region(source, destination, &TextureCopyRegion::subresource(mip_level, array_layer, extent));
			}
		}
	}

	/// Copies as many bytes as fit in both buffers.
	fn copy_buffer(&mut self, source: &Buffer, destination: &Buffer) {
		self.copy_buffer_region(source, 0, destination, 0, source.size.min(destination.size));
	}

	fn begin_query(&mut self, pool: QueryPoolHandle, index: u32);

	fn end_query(&mut self, pool: QueryPoolHandle, index: u32);

	/// Writes `count` 64 bit query results, starting at `first`, into `destination`.
	fn resolve_query_data(&mut self, pool: QueryPoolHandle, first: u32, count: u32, destination: &Buffer, offset: u64);

	/// Opens a named debug region.
	fn begin_event(&mut self, name: &str);

	fn end_event(&mut self);
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	pub(crate) fn color_texture(handle: u64, extent: Extent) -> Texture {
		Texture::new(TextureHandle(handle), TextureDescription::new(extent, Formats::BGRAsRGB, Uses::RenderTarget | Uses::Image | Uses::Present))
	}

	pub(crate) fn storage_texture(handle: u64, extent: Extent) -> Texture {
		Texture::new(TextureHandle(handle), TextureDescription::new(extent, Formats::RGBA16(Encodings::FloatingPoint), Uses::Storage | Uses::Image))
	}

	pub(crate) fn graphics_pipeline() -> Pipeline {
		let layout = DescriptorSetLayout::new(&[
			DescriptorSetBindingTemplate::new(0, DescriptorType::SampledImage, Stages::FRAGMENT),
			DescriptorSetBindingTemplate::new(1, DescriptorType::UniformBuffer, Stages::VERTEX),
			DescriptorSetBindingTemplate::new_array(2, DescriptorType::SampledImage, Stages::FRAGMENT, 4),
			DescriptorSetBindingTemplate::new(6, DescriptorType::Sampler, Stages::FRAGMENT),
		]);

		Pipeline::new(PipelineHandle(1), PipelineBindPoints::Graphics, Arc::new(layout))
	}

	pub(crate) fn compute_pipeline() -> Pipeline {
		let layout = DescriptorSetLayout::new(&[
			DescriptorSetBindingTemplate::new(0, DescriptorType::StorageImage, Stages::COMPUTE),
		]);

		Pipeline::new(PipelineHandle(2), PipelineBindPoints::Compute, Arc::new(layout))
	}

	/// Records a frame that clears a render target, draws a triangle sampling `source` and transitions the target for presentation.
	pub(crate) fn record_triangle(command_list: &mut impl CommandList, target: &Texture, source: &Texture) {
		let pipeline = graphics_pipeline();

		assert!(command_list.begin());

		command_list.texture_barrier(target, ResourceStates::Present, ResourceStates::ColorWrite);
		command_list.begin_frame_buffer(&FrameBuffer::new(&[Attachment::new(target).clear(ClearValue::Color(RGBA::black()))]));
		command_list.set_pipeline_state(&pipeline);
		command_list.set_view(0, &View::texture(source));
		command_list.draw_instanced(3, 1, 0, 0);
		command_list.end_frame_buffer();
		command_list.texture_barrier(target, ResourceStates::ColorWrite, ResourceStates::Present);

		assert!(command_list.end());
		assert_eq!(command_list.state(), RecordingStates::Ended);
	}

	/// Records a dispatch writing `target` in a compute pass, then makes it readable from shaders.
	pub(crate) fn record_compute(command_list: &mut impl CommandList, target: &Texture) {
		let pipeline = compute_pipeline();

		assert!(command_list.begin());

		command_list.texture_barrier(target, ResourceStates::Undefined, ResourceStates::UnorderedAccess);
		command_list.set_pipeline_state(&pipeline);
		command_list.set_view(0, &View::texture(target));
		command_list.dispatch(8, 8, 1);
		command_list.texture_barrier(target, ResourceStates::UnorderedAccess, ResourceStates::ShaderRead);

		assert!(command_list.end());
	}

	#[test]
	fn descriptor_compatibility() {
		let texture = Descriptor::from(&View::texture(&color_texture(1, Extent::square(4))));
		assert!(texture.is_compatible(DescriptorType::SampledImage));
		assert!(!texture.is_compatible(DescriptorType::UniformBuffer));
		assert_eq!(texture, Descriptor::Texture { handle: TextureHandle(1), general: false });

		let storage = Descriptor::from(&View::texture(&storage_texture(2, Extent::square(4))));
		assert_eq!(storage, Descriptor::Texture { handle: TextureHandle(2), general: true });

		let buffer = Descriptor::from(&View::buffer(&Buffer::new(BufferHandle(3), 256, Uses::Uniform)));
		assert!(buffer.is_compatible(DescriptorType::UniformBuffer));
		assert!(!Descriptor::Sampler(SamplerHandle(4)).is_compatible(DescriptorType::SampledImage));
	}

	#[test]
	fn layout_sorts_bindings_and_counts_slots() {
		let layout = DescriptorSetLayout::new(&[
			DescriptorSetBindingTemplate::new(4, DescriptorType::Sampler, Stages::FRAGMENT),
			DescriptorSetBindingTemplate::new_array(0, DescriptorType::SampledImage, Stages::FRAGMENT, 4),
		]);

		assert_eq!(layout.bindings()[0].binding(), 0);
		assert_eq!(layout.descriptor_count(), 5);
	}

	#[test]
	fn frame_buffer_splits_depth_attachment() {
		let color = color_texture(1, Extent::rectangle(640, 480));
		let depth = Texture::new(TextureHandle(2), TextureDescription::new(Extent::rectangle(640, 480), Formats::Depth32, Uses::DepthStencil));

		let frame_buffer = FrameBuffer::new(&[Attachment::new(&color), Attachment::new(&depth).clear(ClearValue::Depth(0.0))]);

		assert_eq!(frame_buffer.color_attachments().len(), 1);
		assert_eq!(frame_buffer.depth_attachment().map(|attachment| attachment.texture().handle()), Some(TextureHandle(2)));
		assert_eq!(frame_buffer.extent(), Extent::rectangle(640, 480));
	}

	#[test]
	fn features_clamp_buffer_count() {
		assert_eq!(Features::new().get_buffer_count(), 2);
		assert_eq!(Features::new().buffer_count(0).get_buffer_count(), 1);
		assert_eq!(Features::new().buffer_count(8).get_buffer_count(), MAX_BUFFER_COUNT);
	}
}
