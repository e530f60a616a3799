//! WGSL sources. One terrain shader: the vertex stage reconstructs each
//! grid point from the node's geometry and height textures in node-local
//! coordinates (the MVP already contains the centroid translation, keeping
//! f32 vertex math well conditioned).

pub const TERRAIN_SHADER: &str = r#"
struct NodeUniforms {
  mvp: mat4x4<f32>,
  sun_dir: vec3<f32>,
  vertical_scale: f32,
  centroid: vec3<f32>,
  textured: u32,
};

@group(0) @binding(0) var<uniform> node: NodeUniforms;
@group(1) @binding(0) var geometry_tex: texture_2d<f32>;
@group(1) @binding(1) var height_tex: texture_2d<f32>;
@group(1) @binding(2) var color_tex: texture_2d<f32>;
@group(1) @binding(3) var color_samp: sampler;

struct VsOut {
  @builtin(position) clip: vec4<f32>,
  @location(0) uv: vec2<f32>,
  @location(1) normal: vec3<f32>,
};

@vertex
fn vs_main(@location(0) uv: vec2<f32>) -> VsOut {
  let texel = vec2<i32>(uv * 33.0);
  let offset = textureLoad(geometry_tex, texel, 0).xyz;
  let h = textureLoad(height_tex, texel, 0).x;
  // Outward normal of the spheroid at this sample.
  let dir = normalize(node.centroid + offset);
  let pos = offset + dir * h * node.vertical_scale;

  var out: VsOut;
  out.clip = node.mvp * vec4<f32>(pos, 1.0);
  out.uv = uv;
  out.normal = dir;
  return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
  let sampled = textureSample(color_tex, color_samp, in.uv).rgb;
  let albedo = select(vec3<f32>(0.55, 0.55, 0.55), sampled, node.textured != 0u);
  let light = max(dot(normalize(in.normal), normalize(node.sun_dir)), 0.0);
  let shade = 0.25 + 0.75 * light;
  return vec4<f32>(albedo * shade, 1.0);
}
"#;
