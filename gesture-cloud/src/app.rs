//! Application state holding the wgpu graphics context
//!
//! Owns the surface, the particle renderer, the egui overlay, and the
//! camera / gesture / animation pipeline that feeds them each frame.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use rand::rngs::StdRng;
use rand::SeedableRng;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::animation::{self, AnimationContext};
use crate::camera::session::{CameraSession, SessionState};
use crate::camera::NativeBackend;
use crate::color::{Palette, Rgb};
use crate::gesture::{GestureEstimator, GestureState};
use crate::render::{OrbitView, ParticleRenderer, ParticleUniforms};
use crate::settings::Settings;
use crate::template::{Preset, Template};

/// Main application state
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    /// The wgpu surface for presenting rendered frames
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    /// Current window size in physical pixels
    size: PhysicalSize<u32>,

    // Rendering
    particles: ParticleRenderer,
    orbit: OrbitView,

    // Input pipeline
    camera: CameraSession<NativeBackend>,
    /// Last setup failure, shown under the status line
    camera_error: Option<String>,
    gesture: GestureEstimator,

    // Animation
    animation: AnimationContext,
    preset: Preset,
    rng: StdRng,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Frame timing
    frame_count: u64,
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,

    // Mouse orbit
    cursor_position: (f32, f32),
    dragging: bool,
}

impl App {
    /// Create the graphics context and the initial particle cloud
    pub async fn new(window: Arc<Window>, settings: &Settings) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find suitable GPU adapter"))?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Gesture Cloud Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;

        log::info!("Surface format: {:?}", surface_format);

        // Frame pacing is done by the event loop, so avoid vsync when possible
        let present_mode = if surface_caps
            .present_modes
            .contains(&wgpu::PresentMode::Immediate)
        {
            wgpu::PresentMode::Immediate
        } else if surface_caps
            .present_modes
            .contains(&wgpu::PresentMode::Mailbox)
        {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        log::info!("Present mode: {:?}", present_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&device, &config);

        let particles = ParticleRenderer::new(&device, surface_format, settings.particle_count);
        let orbit = OrbitView::new(config.width as f32 / config.height as f32);

        // Initial cloud
        let mut rng = StdRng::from_os_rng();
        let template = Template::build(settings.preset, settings.particle_count, &mut rng)?;
        let mut animation = AnimationContext::new(Arc::new(template), settings.palette(), &mut rng);
        animation.global_scale = settings.global_scale;

        let camera = CameraSession::new(NativeBackend {
            camera_index: settings.camera_index,
            width: settings.camera_width,
            height: settings.camera_height,
            model_dir: settings.model_dir.clone(),
        });

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        log::info!(
            "Particle cloud ready: {} particles, preset {}",
            settings.particle_count,
            settings.preset
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            particles,
            orbit,
            camera,
            camera_error: None,
            gesture: GestureEstimator::new(),
            animation,
            preset: settings.preset,
            rng,
            egui_ctx,
            egui_state,
            egui_renderer,
            frame_count: 0,
            fps: 0.0,
            last_fps_update: Instant::now(),
            frames_since_update: 0,
            cursor_position: (0.0, 0.0),
            dragging: false,
        })
    }

    /// Let egui see the event first. Returns true if egui consumed it.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface and the projection; the cloud itself is untouched.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.orbit
                .set_aspect(new_size.width as f32 / new_size.height as f32);
            log::debug!("Resized to {}x{}", new_size.width, new_size.height);
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// Morph toward a freshly generated template for `preset`
    pub fn set_preset(&mut self, preset: Preset) {
        let count = self.animation.particle_count();
        let result = Template::build(preset, count, &mut self.rng)
            .and_then(|template| self.animation.set_template(Arc::new(template)));
        match result {
            Ok(()) => self.preset = preset,
            Err(e) => log::error!("Failed to switch to {}: {}", preset, e),
        }
    }

    /// Select preset by 0-based index (keys 1-5)
    pub fn select_preset(&mut self, index: usize) {
        if let Some(preset) = Preset::from_index(index) {
            self.set_preset(preset);
        }
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.animation.set_palette(palette);
    }

    /// Start the camera when inactive, stop it otherwise
    pub fn toggle_camera(&mut self) {
        match self.camera.toggle() {
            Ok(()) => self.camera_error = None,
            Err(e) => self.camera_error = Some(e.to_string()),
        }
    }

    pub fn camera_state(&self) -> SessionState {
        self.camera.state()
    }

    pub fn gesture_state(&self) -> GestureState {
        self.gesture.state()
    }

    /// Frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Track cursor movement, orbiting while the left button is held
    pub fn on_mouse_move(&mut self, x: f32, y: f32) {
        let delta = (x - self.cursor_position.0, y - self.cursor_position.1);
        self.cursor_position = (x, y);
        if self.dragging {
            self.orbit.on_mouse_drag(delta, self.size.height as f32);
        }
    }

    pub fn on_mouse_button(&mut self, pressed: bool) {
        self.dragging = pressed;
    }

    /// Advance one fixed tick of `dt` seconds
    pub fn update(&mut self, dt: f32) {
        if let Err(e) = self.camera.poll() {
            self.camera_error = Some(e.to_string());
        }

        self.camera.feed_gesture(&mut self.gesture);

        self.orbit.update();
        let gesture = self.gesture.state();
        animation::step(&mut self.animation, dt, &gesture, &mut self.rng);
    }

    /// Render the particle cloud and the UI overlay
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = ParticleUniforms::new(&self.orbit, self.animation.rotation().to_mat4());
        self.particles.upload(
            &self.queue,
            self.animation.positions(),
            self.animation.colors(),
            &uniforms,
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.particles.render(&mut encoder, &view);
        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // Snapshot state so the egui closure does not borrow self
        let fps = self.fps;
        let gesture = self.gesture.state();
        let camera_state = self.camera.state();
        let status = self.camera.status().to_string();
        let camera_error = self.camera_error.clone();
        let particle_count = self.animation.particle_count();
        let palette = self.animation.palette();

        let mut preset = self.preset;
        let mut primary = palette.primary.to_array();
        let mut secondary = palette.secondary.to_array();
        let mut toggle_camera = false;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::SidePanel::left("controls").show(ctx, |ui| {
                ui.heading("Gesture Cloud");
                ui.label(format!("FPS: {:.1}", fps));
                ui.label(format!("Particles: {}", particle_count));
                ui.separator();

                ui.heading("Shape");
                egui::ComboBox::from_id_salt("preset")
                    .selected_text(preset.display_name())
                    .show_ui(ui, |ui| {
                        for (i, p) in Preset::ALL.iter().enumerate() {
                            ui.selectable_value(
                                &mut preset,
                                *p,
                                format!("{}. {}", i + 1, p.display_name()),
                            );
                        }
                    });

                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    ui.label("Primary:");
                    ui.color_edit_button_srgb(&mut primary);
                });
                ui.horizontal(|ui| {
                    ui.label("Secondary:");
                    ui.color_edit_button_srgb(&mut secondary);
                });

                ui.separator();
                ui.heading("Camera");
                let button = match camera_state {
                    SessionState::Idle => "Start camera (C)",
                    SessionState::Starting | SessionState::Active => "Stop camera (C)",
                };
                if ui.button(button).clicked() {
                    toggle_camera = true;
                }
                ui.label(&status);
                if let Some(error) = &camera_error {
                    ui.colored_label(egui::Color32::from_rgb(255, 120, 120), error);
                }

                ui.separator();
                ui.heading("Gesture");
                ui.label(format!("Hands: {}", gesture.detected_hands));
                ui.add(egui::ProgressBar::new(gesture.hand_openness).text("Openness"));
                ui.add(egui::ProgressBar::new(gesture.pinch_strength).text("Pinch"));
                ui.label(format!("Move: ({:.2}, {:.2})", gesture.move_x, gesture.move_y));
                ui.label(format!("Two-hand scale: {:.2}", gesture.two_hand_scale));
            });
        });

        // Apply UI actions
        if preset != self.preset {
            self.set_preset(preset);
        }
        let palette = Palette {
            primary: Rgb::from_array(primary),
            secondary: Rgb::from_array(secondary),
        };
        if palette != self.animation.palette() {
            self.set_palette(palette);
        }
        if toggle_camera {
            self.toggle_camera();
        }

        self.egui_state.handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self.egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}
