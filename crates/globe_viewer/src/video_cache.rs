//! Video tile cache - the GPU tier of the two-tier cache.
//!
//! Same bounded cache and eviction policy as the main tier, keyed by the
//! same `TreeIndex`, but the payload is a bundle of three fixed-size
//! textures plus its bind group. Stream-buffer reuse means texture reuse:
//! a reassigned slot keeps its allocations and is refreshed in place with
//! `write_texture` uploads.

use std::sync::Arc;

use log::debug;

use globe_plugin::{Node, TileCache, TILE_RESOLUTION};

/// GPU-side data of one tile.
pub struct VideoTile {
  pub geometry: wgpu::Texture,
  pub height: wgpu::Texture,
  pub color: wgpu::Texture,
  pub bind_group: wgpu::BindGroup,
}

pub struct VideoCache {
  cache: TileCache<VideoTile>,
  layout: wgpu::BindGroupLayout,
  sampler: wgpu::Sampler,
}

const R: u32 = TILE_RESOLUTION as u32;

const TILE_EXTENT: wgpu::Extent3d = wgpu::Extent3d {
  width: R,
  height: R,
  depth_or_array_layers: 1,
};

impl VideoCache {
  pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      label: Some("TileTextures"),
      entries: &[
        texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
        texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
        texture_entry(2, wgpu::TextureSampleType::Float { filterable: true }),
        wgpu::BindGroupLayoutEntry {
          binding: 3,
          visibility: wgpu::ShaderStages::FRAGMENT,
          ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
          count: None,
        },
      ],
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      label: Some("TileColor"),
      mag_filter: wgpu::FilterMode::Linear,
      min_filter: wgpu::FilterMode::Linear,
      address_mode_u: wgpu::AddressMode::ClampToEdge,
      address_mode_v: wgpu::AddressMode::ClampToEdge,
      ..Default::default()
    });

    Self {
      cache: TileCache::new(capacity),
      layout,
      sampler,
    }
  }

  pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
    &self.layout
  }

  /// Ensure a GPU tile for this node exists and is current, uploading from
  /// main memory on miss. `None` when the video cache is saturated this
  /// frame; the caller simply skips the node.
  pub fn prepare(
    &self,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    node: &Node,
    frame: u64,
  ) -> Option<Arc<VideoTile>> {
    let (id, existed) = match self.cache.get_buffer(node.index, frame) {
      Ok(pair) => pair,
      Err(err) => {
        debug!("video cache: {err}");
        return None;
      }
    };

    if existed && self.cache.is_valid(id) {
      self.cache.touch(id, frame);
      return self.cache.data(id);
    }

    // Recycle the evicted slot's textures, or allocate on first use.
    let tile = match self.cache.data_raw(id) {
      Some(tile) => tile,
      None => {
        let tile = self.allocate(device);
        self.cache.complete(id, tile);
        self.cache.data_raw(id).expect("freshly completed slot")
      }
    };
    self.upload(queue, node, &tile);
    self.cache.mark_valid(id);
    self.cache.touch(id, frame);
    Some(tile)
  }

  fn allocate(&self, device: &wgpu::Device) -> VideoTile {
    let make = |label, format| {
      device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: TILE_EXTENT,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
      })
    };

    let geometry = make("TileGeometry", wgpu::TextureFormat::Rgba32Float);
    let height = make("TileHeight", wgpu::TextureFormat::R32Float);
    let color = make("TileColor", wgpu::TextureFormat::Rgba8UnormSrgb);

    let views = [
      geometry.create_view(&wgpu::TextureViewDescriptor::default()),
      height.create_view(&wgpu::TextureViewDescriptor::default()),
      color.create_view(&wgpu::TextureViewDescriptor::default()),
    ];
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
      label: Some("TileTextures"),
      layout: &self.layout,
      entries: &[
        wgpu::BindGroupEntry {
          binding: 0,
          resource: wgpu::BindingResource::TextureView(&views[0]),
        },
        wgpu::BindGroupEntry {
          binding: 1,
          resource: wgpu::BindingResource::TextureView(&views[1]),
        },
        wgpu::BindGroupEntry {
          binding: 2,
          resource: wgpu::BindingResource::TextureView(&views[2]),
        },
        wgpu::BindGroupEntry {
          binding: 3,
          resource: wgpu::BindingResource::Sampler(&self.sampler),
        },
      ],
    });

    VideoTile {
      geometry,
      height,
      color,
      bind_group,
    }
  }

  fn upload(&self, queue: &wgpu::Queue, node: &Node, tile: &VideoTile) {
    // Geometry: centroid-relative offsets, padded to rgba32float.
    let mut geometry = vec![0.0f32; (R * R * 4) as usize];
    for (i, offset) in node.offsets.iter().enumerate() {
      geometry[i * 4] = offset.x;
      geometry[i * 4 + 1] = offset.y;
      geometry[i * 4 + 2] = offset.z;
    }
    write_padded(queue, &tile.geometry, bytemuck::cast_slice(&geometry), R * 16);

    write_padded(queue, &tile.height, bytemuck::cast_slice(&node.heights), R * 4);

    // Color: rgb8 to rgba8.
    let mut color = vec![255u8; (R * R * 4) as usize];
    for (i, rgb) in node.colors.iter().enumerate() {
      color[i * 4..i * 4 + 3].copy_from_slice(rgb);
    }
    write_padded(queue, &tile.color, &color, R * 4);
  }
}

/// Upload a tight-packed image through a staging buffer with the 256-byte
/// row pitch the API requires.
fn write_padded(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &[u8], unpadded_row: u32) {
  let padded_row = (unpadded_row + 255) / 256 * 256;
  let mut staging = vec![0u8; (padded_row * R) as usize];
  for row in 0..R as usize {
    let src = &data[row * unpadded_row as usize..(row + 1) * unpadded_row as usize];
    staging[row * padded_row as usize..row * padded_row as usize + unpadded_row as usize]
      .copy_from_slice(src);
  }
  queue.write_texture(
    wgpu::ImageCopyTexture {
      texture,
      mip_level: 0,
      origin: wgpu::Origin3d::ZERO,
      aspect: wgpu::TextureAspect::All,
    },
    &staging,
    wgpu::ImageDataLayout {
      offset: 0,
      bytes_per_row: Some(padded_row),
      rows_per_image: Some(R),
    },
    TILE_EXTENT,
  );
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
  wgpu::BindGroupLayoutEntry {
    binding,
    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
    ty: wgpu::BindingType::Texture {
      sample_type,
      view_dimension: wgpu::TextureViewDimension::D2,
      multisampled: false,
    },
    count: None,
  }
}
