//! Gesture Cloud - Main Entry Point
//!
//! A particle cloud that morphs between procedural shapes and follows hand
//! gestures seen by the camera.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use gesture_cloud::animation::FrameClock;
use gesture_cloud::settings::Settings;
use gesture_cloud::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Gesture Cloud";

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized,
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
}

/// Main application handler implementing winit's ApplicationHandler trait
struct GestureCloudApp {
    settings: Settings,
    state: AppState,
    clock: FrameClock,
}

impl GestureCloudApp {
    fn new(settings: Settings) -> Self {
        let clock = FrameClock::new(settings.target_fps, Instant::now());
        Self {
            settings,
            state: AppState::Uninitialized,
            clock,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        log::info!("Creating window...");

        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(
                self.settings.window_width,
                self.settings.window_height,
            ));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        log::info!("Initializing wgpu and egui...");
        let app = pollster::block_on(App::new(window.clone(), &self.settings))?;

        log::info!("Gesture Cloud ready!");
        log::info!("Keys: 1-5 presets, C camera, F11 fullscreen, ESC exit");

        self.clock = FrameClock::new(self.settings.target_fps, Instant::now());
        self.state = AppState::Running { window, app };
        Ok(())
    }
}

impl ApplicationHandler for GestureCloudApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialize if we haven't already
        if let AppState::Uninitialized = &self.state {
            if let Err(e) = self.init(event_loop) {
                log::error!("Startup failed: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Only handle events if we're running
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }

            // Handle keyboard input (only if egui doesn't want it)
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::Escape => {
                    log::info!("Escape pressed, exiting...");
                    event_loop.exit();
                }
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                        log::info!("Exiting fullscreen");
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                        log::info!("Entering fullscreen");
                    }
                }
                KeyCode::Digit1 => app.select_preset(0),
                KeyCode::Digit2 => app.select_preset(1),
                KeyCode::Digit3 => app.select_preset(2),
                KeyCode::Digit4 => app.select_preset(3),
                KeyCode::Digit5 => app.select_preset(4),
                KeyCode::KeyC => app.toggle_camera(),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::CursorMoved { position, .. } => {
                app.on_mouse_move(position.x as f32, position.y as f32);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                // Releases always end a drag, presses only start one outside egui
                let pressed = state == ElementState::Pressed;
                if !pressed || !egui_consumed {
                    app.on_mouse_button(pressed);
                }
            }

            WindowEvent::RedrawRequested => {
                // Only clock ticks advance the animation; OS redraws just repaint
                if let Some(dt) = self.clock.take_tick() {
                    app.update(dt);
                }

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        log::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory!");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::warn!("Surface error: {:?}", e);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, .. } = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        // Drive redraws at target FPS
        let wake_at = self.clock.wake_at();
        if Instant::now() >= wake_at {
            // Spin-wait for precise timing
            let tick_at = self.clock.next_tick();
            while Instant::now() < tick_at {
                std::hint::spin_loop();
            }

            if self.clock.poll(Instant::now()) {
                window.request_redraw();
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.clock.wake_at()));
    }
}

fn main() -> anyhow::Result<()> {
    let (settings, settings_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();

    log::info!("Gesture Cloud v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = settings_error {
        log::warn!("Could not load settings, using defaults: {}", e);
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = GestureCloudApp::new(settings);
    event_loop.run_app(&mut app).context("Event loop error")?;
    Ok(())
}
