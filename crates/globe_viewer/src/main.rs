mod camera;
mod renderer;
mod shaders;
mod video_cache;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use winit::{
  dpi::LogicalSize,
  event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
  event_loop::EventLoop,
  keyboard::{KeyCode, PhysicalKey},
  window::{Window, WindowBuilder},
};

use globe_plugin::{Globe, GlobeSettings, ViewSpec, SPHEROID_RADIUS};

use camera::OrbitCamera;
use renderer::{TerrainRenderer, DEPTH_FORMAT};

/// Adaptive multi-resolution globe viewer.
#[derive(Parser)]
#[command(version, about)]
struct Args {
  /// Elevation quadtree file.
  #[arg(long)]
  dem: PathBuf,

  /// Color quadtree file; untextured shading without it.
  #[arg(long)]
  color: Option<PathBuf>,

  /// Main cache capacity in tiles.
  #[arg(long, default_value_t = 4096)]
  cache: usize,

  /// Video (GPU) cache capacity in tiles.
  #[arg(long, default_value_t = 512)]
  video_cache: usize,

  /// Initial vertical exaggeration.
  #[arg(long, default_value_t = 1.0)]
  vertical_scale: f64,

  /// Global elevation range override in meters: MIN MAX.
  #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
  elevation_range: Option<Vec<f64>>,
}

struct Gpu {
  surface: wgpu::Surface<'static>,
  device: wgpu::Device,
  queue: wgpu::Queue,
  config: wgpu::SurfaceConfiguration,
  size: winit::dpi::PhysicalSize<u32>,
}

impl Gpu {
  async fn new(window: Arc<Window>) -> Result<Self> {
    let size = window.inner_size();
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance.create_surface(window.clone())?;

    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
      })
      .await
      .ok_or_else(|| anyhow::anyhow!("no suitable GPU adapter"))?;

    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          label: None,
          required_features: wgpu::Features::empty(),
          required_limits: wgpu::Limits::default(),
        },
        None,
      )
      .await?;

    let caps = surface.get_capabilities(&adapter);
    let surface_format = caps
      .formats
      .iter()
      .copied()
      .find(|f| f.is_srgb())
      .unwrap_or(caps.formats[0]);

    let config = wgpu::SurfaceConfiguration {
      usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
      format: surface_format,
      width: size.width.max(1),
      height: size.height.max(1),
      present_mode: wgpu::PresentMode::Fifo,
      alpha_mode: caps.alpha_modes[0],
      view_formats: vec![],
      desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    Ok(Self {
      surface,
      device,
      queue,
      config,
      size,
    })
  }

  fn resize(&mut self, size: winit::dpi::PhysicalSize<u32>) {
    if size.width == 0 || size.height == 0 {
      return;
    }
    self.size = size;
    self.config.width = size.width;
    self.config.height = size.height;
    self.surface.configure(&self.device, &self.config);
  }
}

struct App {
  gpu: Gpu,
  globe: Globe,
  renderer: TerrainRenderer,
  camera: OrbitCamera,
  depth: wgpu::TextureView,

  mouse_down: bool,
  last_cursor: Option<(f64, f64)>,
  vertical_scale: f64,
  textured: bool,
}

impl App {
  fn make_depth(gpu: &Gpu) -> wgpu::TextureView {
    gpu
      .device
      .create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth"),
        size: wgpu::Extent3d {
          width: gpu.config.width,
          height: gpu.config.height,
          depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
      })
      .create_view(&wgpu::TextureViewDescriptor::default())
  }

  fn render(&mut self) -> std::result::Result<(), wgpu::SurfaceError> {
    let frame = self.gpu.surface.get_current_texture()?;
    let target = frame
      .texture
      .create_view(&wgpu::TextureViewDescriptor::default());

    let view = ViewSpec {
      frustum: self
        .camera
        .frustum(self.gpu.config.width, self.gpu.config.height),
      focus: self.camera.focus(),
    };
    let output = self.globe.frame(&view);

    let aspect = self.gpu.config.width.max(1) as f64 / self.gpu.config.height.max(1) as f64;
    let mut encoder = self
      .gpu
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Frame"),
      });
    self.renderer.draw(
      &self.gpu.device,
      &self.gpu.queue,
      &mut encoder,
      &target,
      &self.depth,
      &self.globe,
      &output,
      self.camera.view_proj(aspect),
    );
    self.gpu.queue.submit(std::iter::once(encoder.finish()));
    frame.present();
    Ok(())
  }

  fn pick(&self, px: f64, py: f64) {
    let ray = self
      .camera
      .ray_through(px, py, self.gpu.config.width, self.gpu.config.height);
    match self.globe.intersect(&ray) {
      Some(t) => {
        let p = ray.at(t);
        let lat = (p.y / p.length()).asin().to_degrees();
        let lon = p.z.atan2(p.x).to_degrees();
        let elevation = p.length() - SPHEROID_RADIUS;
        info!("picked lat {lat:.4} lon {lon:.4}, {elevation:.0} m (t = {t:.0})");
      }
      None => info!("picked empty sky"),
    }
  }
}

fn main() -> Result<()> {
  env_logger::init();
  let args = Args::parse();

  let mut settings = GlobeSettings {
    cache_capacity: args.cache,
    ..Default::default()
  };
  if let Some(range) = &args.elevation_range {
    settings.elevation_range = (range[0], range[1]);
  }

  let mut globe = Globe::open(&args.dem, args.color.as_deref(), settings)?;
  globe.set_vertical_scale(args.vertical_scale);
  let textured = args.color.is_some();
  globe.use_texture_color(textured);

  let event_loop = EventLoop::new()?;
  let window = Arc::new(
    WindowBuilder::new()
      .with_title("globe viewer")
      .with_inner_size(LogicalSize::new(1280, 800))
      .build(&event_loop)?,
  );

  let gpu = pollster::block_on(Gpu::new(window.clone()))?;
  let renderer = TerrainRenderer::new(&gpu.device, gpu.config.format, args.video_cache);
  let depth = App::make_depth(&gpu);

  let mut app = App {
    gpu,
    globe,
    renderer,
    camera: OrbitCamera::new(),
    depth,
    mouse_down: false,
    last_cursor: None,
    vertical_scale: args.vertical_scale,
    textured,
  };

  event_loop.run(move |event, elwt| {
    elwt.set_control_flow(winit::event_loop::ControlFlow::Poll);

    match event {
      Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
        WindowEvent::CloseRequested => elwt.exit(),
        WindowEvent::Resized(size) => {
          app.gpu.resize(size);
          app.depth = App::make_depth(&app.gpu);
        }
        WindowEvent::RedrawRequested => match app.render() {
          Ok(()) => {}
          Err(wgpu::SurfaceError::Lost) => app.gpu.resize(app.gpu.size),
          Err(wgpu::SurfaceError::OutOfMemory) => elwt.exit(),
          Err(other) => warn!("surface error: {other:?}"),
        },
        WindowEvent::KeyboardInput { event, .. } => {
          if event.state != ElementState::Pressed {
            return;
          }
          match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => elwt.exit(),
            PhysicalKey::Code(KeyCode::KeyT) => {
              app.textured = !app.textured;
              app.globe.use_texture_color(app.textured);
            }
            PhysicalKey::Code(KeyCode::BracketRight) => {
              app.vertical_scale *= 2.0;
              app.globe.set_vertical_scale(app.vertical_scale);
              info!("vertical scale {}", app.vertical_scale);
            }
            PhysicalKey::Code(KeyCode::BracketLeft) => {
              app.vertical_scale = (app.vertical_scale * 0.5).max(0.125);
              app.globe.set_vertical_scale(app.vertical_scale);
              info!("vertical scale {}", app.vertical_scale);
            }
            _ => {}
          }
        }
        WindowEvent::MouseInput { button, state, .. } => match button {
          MouseButton::Left => app.mouse_down = state == ElementState::Pressed,
          MouseButton::Right => {
            if state == ElementState::Pressed {
              if let Some((x, y)) = app.last_cursor {
                app.pick(x, y);
              }
            }
          }
          _ => {}
        },
        WindowEvent::CursorMoved { position, .. } => {
          if let Some((lx, ly)) = app.last_cursor {
            if app.mouse_down {
              app.camera.orbit(position.x - lx, position.y - ly);
            }
          }
          app.last_cursor = Some((position.x, position.y));
        }
        WindowEvent::MouseWheel { delta, .. } => {
          let steps = match delta {
            MouseScrollDelta::LineDelta(_, y) => y as f64,
            MouseScrollDelta::PixelDelta(p) => p.y / 60.0,
          };
          app.camera.zoom(steps);
        }
        _ => {}
      },
      Event::AboutToWait => window.request_redraw(),
      _ => {}
    }
  })?;

  Ok(())
}
