//! Terrain renderer: one indexed triangle-strip draw per cut node, with a
//! shared vertex-attribute template (normalized tile texture coordinates)
//! and a shared zigzag index template. Per-node state is a 256-byte slice
//! of one dynamic uniform buffer plus the node's video-cache bind group.

use glam::{DMat4, Vec3};
use log::debug;
use wgpu::util::DeviceExt;

use globe_plugin::{
  FrameOutput, Globe, NUM_GEOMETRY_INDICES, TILE_RESOLUTION, TILE_SAMPLES,
};

use crate::shaders::TERRAIN_SHADER;
use crate::video_cache::VideoCache;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct NodeUniforms {
  mvp: [[f32; 4]; 4],
  sun_dir: [f32; 3],
  vertical_scale: f32,
  centroid: [f32; 3],
  textured: u32,
}

pub struct TerrainRenderer {
  pipeline: wgpu::RenderPipeline,
  vertex_template: wgpu::Buffer,
  index_template: wgpu::Buffer,
  uniforms: wgpu::Buffer,
  uniform_bind_group: wgpu::BindGroup,
  video: VideoCache,
  max_nodes: usize,
  pub sun_dir: Vec3,
}

impl TerrainRenderer {
  pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, video_capacity: usize) -> Self {
    let video = VideoCache::new(device, video_capacity);
    let max_nodes = video_capacity;

    let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("NodeUniforms"),
      size: UNIFORM_STRIDE * max_nodes as u64,
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      label: Some("NodeUniforms"),
      entries: &[wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
          ty: wgpu::BufferBindingType::Uniform,
          has_dynamic_offset: true,
          min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<NodeUniforms>() as u64),
        },
        count: None,
      }],
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
      label: Some("NodeUniforms"),
      layout: &uniform_layout,
      entries: &[wgpu::BindGroupEntry {
        binding: 0,
        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
          buffer: &uniforms,
          offset: 0,
          size: wgpu::BufferSize::new(std::mem::size_of::<NodeUniforms>() as u64),
        }),
      }],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("Terrain"),
      source: wgpu::ShaderSource::Wgsl(TERRAIN_SHADER.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("Terrain"),
      bind_group_layouts: &[&uniform_layout, video.bind_group_layout()],
      push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
      label: Some("Terrain"),
      layout: Some(&pipeline_layout),
      vertex: wgpu::VertexState {
        module: &shader,
        entry_point: "vs_main",
        buffers: &[wgpu::VertexBufferLayout {
          array_stride: 8,
          step_mode: wgpu::VertexStepMode::Vertex,
          attributes: &wgpu::vertex_attr_array![0 => Float32x2],
        }],
      },
      fragment: Some(wgpu::FragmentState {
        module: &shader,
        entry_point: "fs_main",
        targets: &[Some(wgpu::ColorTargetState {
          format: surface_format,
          blend: None,
          write_mask: wgpu::ColorWrites::ALL,
        })],
      }),
      primitive: wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleStrip,
        strip_index_format: Some(wgpu::IndexFormat::Uint16),
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        ..Default::default()
      },
      depth_stencil: Some(wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
      }),
      multisample: wgpu::MultisampleState::default(),
      multiview: None,
    });

    let vertex_template = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("TileUvTemplate"),
      contents: bytemuck::cast_slice(&uv_template()),
      usage: wgpu::BufferUsages::VERTEX,
    });
    let index_template = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("TileStripTemplate"),
      contents: bytemuck::cast_slice(&strip_template()),
      usage: wgpu::BufferUsages::INDEX,
    });

    Self {
      pipeline,
      vertex_template,
      index_template,
      uniforms,
      uniform_bind_group,
      video,
      max_nodes,
      sun_dir: Vec3::new(0.3, 0.5, 0.9).normalize(),
    }
  }

  /// Stream the cut into the video cache and draw it.
  pub fn draw(
    &mut self,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    globe: &Globe,
    output: &FrameOutput,
    view_proj: DMat4,
  ) {
    let textured = globe.settings().use_texture_color;
    let vertical_scale = globe.vertical_scale() as f32;

    if output.cut.len() > self.max_nodes {
      debug!(
        "cut of {} nodes exceeds video capacity {}, truncating",
        output.cut.len(),
        self.max_nodes
      );
    }

    // Upload phase: per-node uniforms and any missing video tiles.
    let mut draws = Vec::with_capacity(output.cut.len().min(self.max_nodes));
    let mut slab = vec![0u8; UNIFORM_STRIDE as usize * self.max_nodes];
    for (_, node) in output.cut.iter().take(self.max_nodes) {
      let Some(tile) = self.video.prepare(device, queue, node, output.frame) else {
        // Saturated this frame; the coarser ancestor was drawn last frame
        // and the hole closes once capacity frees up.
        continue;
      };

      let slot = draws.len();
      let mvp = view_proj * DMat4::from_translation(node.centroid);
      let u = NodeUniforms {
        mvp: mvp.as_mat4().to_cols_array_2d(),
        sun_dir: self.sun_dir.to_array(),
        vertical_scale,
        centroid: node.centroid.as_vec3().to_array(),
        textured: textured as u32,
      };
      let at = slot * UNIFORM_STRIDE as usize;
      slab[at..at + std::mem::size_of::<NodeUniforms>()]
        .copy_from_slice(bytemuck::bytes_of(&u));
      draws.push(tile);
    }
    queue.write_buffer(&self.uniforms, 0, &slab[..UNIFORM_STRIDE as usize * draws.len().max(1)]);

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
      label: Some("Terrain"),
      color_attachments: &[Some(wgpu::RenderPassColorAttachment {
        view: target,
        resolve_target: None,
        ops: wgpu::Operations {
          load: wgpu::LoadOp::Clear(wgpu::Color {
            r: 0.004,
            g: 0.005,
            b: 0.012,
            a: 1.0,
          }),
          store: wgpu::StoreOp::Store,
        },
      })],
      depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
        view: depth,
        depth_ops: Some(wgpu::Operations {
          load: wgpu::LoadOp::Clear(1.0),
          store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
      }),
      timestamp_writes: None,
      occlusion_query_set: None,
    });

    pass.set_pipeline(&self.pipeline);
    pass.set_vertex_buffer(0, self.vertex_template.slice(..));
    pass.set_index_buffer(self.index_template.slice(..), wgpu::IndexFormat::Uint16);

    for (slot, tile) in draws.iter().enumerate() {
      let offset = (slot as u64 * UNIFORM_STRIDE) as u32;
      pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
      pass.set_bind_group(1, &tile.bind_group, &[]);
      pass.draw_indexed(0..NUM_GEOMETRY_INDICES as u32, 0, 0..1);
    }
  }
}

/// Normalized texture coordinates at every grid vertex, texel centers.
fn uv_template() -> Vec<[f32; 2]> {
  let r = TILE_RESOLUTION;
  let step = 1.0 / r as f32;
  let start = step * 0.5;
  let mut uvs = Vec::with_capacity(TILE_SAMPLES);
  for y in 0..r {
    for x in 0..r {
      uvs.push([start + x as f32 * step, start + y as f32 * step]);
    }
  }
  uvs
}

/// One triangle strip zigzagging through the grid a row at a time, rows
/// joined by two degenerate indices.
fn strip_template() -> Vec<u16> {
  let r = TILE_RESOLUTION;
  let mut indices = Vec::with_capacity(NUM_GEOMETRY_INDICES);
  let mut inc: i32 = 1;
  let mut alt = 1usize;
  let mut index = [0i32, r as i32];
  for band in 0..r - 1 {
    for _ in 0..r * 2 {
      indices.push(index[alt] as u16);
      index[alt] += inc;
      alt = 1 - alt;
    }
    index[0] -= inc;
    index[1] -= inc;
    if band != r - 2 {
      indices.push(index[1] as u16);
      indices.push(index[1] as u16);
    }
    inc = -inc;
    alt = 1 - alt;
    index[0] += r as i32;
    index[1] += r as i32;
  }
  debug_assert_eq!(indices.len(), NUM_GEOMETRY_INDICES);
  indices
}
