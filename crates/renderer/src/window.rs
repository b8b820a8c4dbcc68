use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rendergraph::{Extent, FrameDriver, GpuBackend, Playback, RenderGraph, RenderGraphState};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::gpu::WgpuBackend;
use crate::sink::PngSequenceSink;

/// Everything the interactive player needs besides the graph itself.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Logical window size in points.
    pub window_size: (u32, u32),
    pub title: String,
    pub playback: Playback,
    /// Stop after this many recorded frames.
    pub record_frames: Option<u32>,
    /// Where screenshots and recorded frames are written.
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window_size: (640, 360),
            title: "toyshader".to_string(),
            playback: Playback::default(),
            record_frames: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// What a key press means to the player before it reaches the keyboard map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Close,
    Reset,
    ToggleAnimation,
    Screenshot,
    Key(u32),
    Ignore,
}

fn classify_key(key: &Key, alt: bool) -> KeyAction {
    match key {
        Key::Named(NamedKey::Escape) => KeyAction::Close,
        Key::Named(NamedKey::Backspace | NamedKey::Delete) => KeyAction::Reset,
        Key::Character(text) if text.as_str() == "`" => KeyAction::ToggleAnimation,
        Key::Character(text) if alt && text.eq_ignore_ascii_case("s") => KeyAction::Screenshot,
        other => key_code(other).map_or(KeyAction::Ignore, KeyAction::Key),
    }
}

/// Key code fed to the keyboard texture: ASCII for characters, the browser
/// codes for arrows.
fn key_code(key: &Key) -> Option<u32> {
    match key {
        Key::Character(value) => {
            let mut chars = value.chars();
            let ch = chars.next()?;
            if chars.next().is_some() || !ch.is_ascii() {
                return None;
            }
            Some(ch as u32)
        }
        Key::Named(NamedKey::Space) => Some(32),
        Key::Named(NamedKey::Enter) => Some(13),
        Key::Named(NamedKey::Tab) => Some(9),
        Key::Named(NamedKey::Shift) => Some(16),
        Key::Named(NamedKey::Control) => Some(17),
        Key::Named(NamedKey::Alt) => Some(18),
        Key::Named(NamedKey::ArrowLeft) => Some(37),
        Key::Named(NamedKey::ArrowUp) => Some(38),
        Key::Named(NamedKey::ArrowRight) => Some(39),
        Key::Named(NamedKey::ArrowDown) => Some(40),
        _ => None,
    }
}

fn logical_extent(window: &Window) -> Extent {
    let size: LogicalSize<u32> = window.inner_size().to_logical(window.scale_factor());
    Extent::new(size.width, size.height)
}

fn physical_extent(size: PhysicalSize<u32>) -> Extent {
    Extent::new(size.width, size.height)
}

/// Open a window and play `graph` until it closes or recording completes.
pub fn run(config: RunConfig, graph: RenderGraph) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = config.window_size;
    let window = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut player = Player::new(Arc::clone(&window), &config, graph)?;
    tracing::info!(
        window = ?player.state.window_size(),
        framebuffer = ?player.state.framebuffer_size(),
        "player ready"
    );

    let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
    let failure_slot = Rc::clone(&failure);
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == player.window.id() => {
            match player.handle_window_event(event) {
                Ok(true) => {}
                Ok(false) => elwt.exit(),
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "stopping player");
                    *failure_slot.borrow_mut() = Some(err);
                    elwt.exit();
                }
            }
        }
        Event::LoopExiting => player.shutdown(),
        Event::AboutToWait => {
            if player.state.should_render() {
                player.window.request_redraw();
            }
            if player.state.animating || player.state.recording {
                elwt.set_control_flow(ControlFlow::Poll);
            } else {
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;

    let outcome = failure.borrow_mut().take();
    match outcome {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Player {
    // dropped before the window it presents into
    backend: WgpuBackend,
    driver: FrameDriver,
    state: RenderGraphState,
    sink: PngSequenceSink,
    record_frames: Option<u32>,
    modifiers: ModifiersState,
    window: Arc<Window>,
}

impl Player {
    fn new(window: Arc<Window>, config: &RunConfig, graph: RenderGraph) -> Result<Self> {
        let physical = window.inner_size();
        let mut backend =
            WgpuBackend::new(window.as_ref(), physical).context("failed to initialise GPU backend")?;
        let mut driver = FrameDriver::with_surface_table(graph, &backend);
        let framebuffer = physical_extent(physical);
        driver
            .setup(&mut backend, framebuffer)
            .context("failed to prepare render passes")?;

        let mut state = RenderGraphState::new(config.playback);
        state.set_sizes(logical_extent(&window), framebuffer);

        Ok(Self {
            backend,
            driver,
            state,
            sink: PngSequenceSink::new(config.output_dir.clone()),
            record_frames: config.record_frames,
            modifiers: ModifiersState::empty(),
            window,
        })
    }

    /// Returns `Ok(false)` once the player should stop.
    fn handle_window_event(&mut self, event: WindowEvent) -> Result<bool> {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => return Ok(false),
            WindowEvent::Resized(size) => {
                let window = logical_extent(&self.window);
                self.driver
                    .notify_resize(&mut self.state, window, physical_extent(size));
                self.state.needs_render = true;
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => return Ok(self.handle_key(&event)),
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(self.window.scale_factor());
                self.state.cursor_moved(logical.x, logical.y);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                self.state
                    .mouse_button(button_state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => return self.redraw(),
            _ => {}
        }
        Ok(true)
    }

    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        let pressed = event.state == ElementState::Pressed;
        let action = classify_key(&event.logical_key, self.modifiers.alt_key());
        match action {
            KeyAction::Close if pressed => return false,
            KeyAction::Reset if pressed && !event.repeat => {
                tracing::info!("resetting playback");
                self.state.reset();
            }
            KeyAction::ToggleAnimation if pressed && !event.repeat => {
                self.state.toggle_animation();
                tracing::info!(animating = self.state.animating, "toggled animation");
            }
            KeyAction::Screenshot if pressed && !event.repeat => {
                self.state.request_screenshot();
            }
            KeyAction::Key(code) => {
                self.state.key_event(code, pressed, event.repeat);
                self.state.needs_render = true;
            }
            _ => {}
        }
        true
    }

    fn shutdown(&mut self) {
        self.driver.shutdown(&mut self.backend);
        if let Some(message) = self.backend.take_error() {
            tracing::warn!(%message, "GPU error during teardown");
        }
    }

    fn redraw(&mut self) -> Result<bool> {
        if !self.state.should_render() {
            return Ok(true);
        }
        let report = self
            .driver
            .render_frame(&mut self.backend, &mut self.state, Some(&mut self.sink))
            .context("failed to render frame")?;
        tracing::trace!(frame = report.frame, captured = ?report.captured, "frame done");

        if let Some(limit) = self.record_frames {
            if self.state.recording && self.driver.captured_frames() >= limit {
                tracing::info!(frames = limit, "recording complete");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
