use std::time::Instant;

use chrono::{Datelike, Local, Timelike};

use crate::backend::Extent;
use crate::channel::CHANNEL_COUNT;
use crate::keyboard::KeyboardMap;
use crate::uniforms::FrameUniforms;

const MOUSE_UNSET: [f32; 4] = [-1.0; 4];

/// Playback options fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    pub speedup: f64,
    pub start_time: f64,
    /// Seconds per frame when recording; `1 / fps`.
    pub frame_period: f64,
    pub animating: bool,
    pub recording: bool,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            speedup: 1.0,
            start_time: 0.0,
            frame_period: 1.0 / 60.0,
            animating: true,
            recording: false,
        }
    }
}

/// Monotonic seconds since the last restart.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    origin: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    pub fn restart(&mut self) {
        self.origin = Instant::now();
    }
}

/// Session-wide values shared by every pass: playback time, input, and the
/// window geometry the uniforms are derived from.
#[derive(Debug, Clone)]
pub struct RenderGraphState {
    playback: Playback,
    clock: FrameClock,
    last_frame_start: f64,

    time: f64,
    time_delta: f64,
    frame: i32,
    date: [f32; 4],

    mouse: [f32; 4],
    cursor: [f32; 2],
    mouse_down: bool,

    window_size: Extent,
    framebuffer_size: Extent,

    keyboard: KeyboardMap,

    pub animating: bool,
    pub recording: bool,
    pub single_shot: bool,
    pub needs_render: bool,
}

impl RenderGraphState {
    pub fn new(playback: Playback) -> Self {
        let mut state = Self {
            playback,
            clock: FrameClock::new(),
            last_frame_start: 0.0,
            time: playback.start_time,
            time_delta: 0.0,
            frame: 0,
            date: [0.0; 4],
            mouse: MOUSE_UNSET,
            cursor: [0.0; 2],
            mouse_down: false,
            window_size: Extent::default(),
            framebuffer_size: Extent::default(),
            keyboard: KeyboardMap::new(),
            animating: playback.animating,
            recording: playback.recording,
            single_shot: false,
            needs_render: true,
        };
        state.reset();
        state
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Return to the start of the session. Running it twice is the same as once.
    pub fn reset(&mut self) {
        self.clock.restart();
        self.last_frame_start = 0.0;
        self.time = self.playback.start_time;
        self.time_delta = 0.0;
        self.frame = 0;
        self.mouse = MOUSE_UNSET;
        self.keyboard.reset();
        self.needs_render = true;
    }

    /// Pause or resume. Resuming restarts the clock so the paused interval
    /// does not count as elapsed time.
    pub fn toggle_animation(&mut self) {
        self.animating = !self.animating;
        if self.animating {
            self.clock.restart();
            self.last_frame_start = 0.0;
        }
        self.needs_render = true;
    }

    pub fn request_screenshot(&mut self) {
        self.single_shot = true;
        self.needs_render = true;
    }

    /// Whether the window loop should draw on this iteration.
    pub fn should_render(&self) -> bool {
        self.animating || self.recording || self.single_shot || self.needs_render
    }

    pub fn clock_seconds(&self) -> f64 {
        self.clock.seconds()
    }

    /// Advance playback once a frame has been presented.
    pub fn finish_frame(&mut self, frame_start: f64, frame_end: f64) {
        self.time_delta = frame_end - frame_start;
        self.frame += 1;
        if self.recording {
            self.time += self.playback.frame_period * self.playback.speedup;
        } else if self.animating {
            self.time += (frame_start - self.last_frame_start) * self.playback.speedup;
        }
        self.last_frame_start = frame_start;
        self.needs_render = false;
        self.single_shot = false;
    }

    pub fn refresh_date(&mut self) {
        let now = Local::now();
        let seconds = now.num_seconds_from_midnight() as f32
            + now.nanosecond().min(999_999_999) as f32 * 1e-9;
        self.date = [now.year() as f32, now.month0() as f32, now.day() as f32, seconds];
    }

    /// Record new window (logical) and framebuffer (physical) sizes.
    pub fn set_sizes(&mut self, window: Extent, framebuffer: Extent) {
        self.window_size = window;
        self.framebuffer_size = framebuffer;
        self.needs_render = true;
    }

    pub fn window_size(&self) -> Extent {
        self.window_size
    }

    pub fn framebuffer_size(&self) -> Extent {
        self.framebuffer_size
    }

    pub fn pixel_scale(&self) -> [f32; 2] {
        let axis = |fb: u32, window: u32| {
            let denom = if window == 0 { 1.0 } else { window as f32 };
            fb as f32 / denom
        };
        [
            axis(self.framebuffer_size.width, self.window_size.width),
            axis(self.framebuffer_size.height, self.window_size.height),
        ]
    }

    pub fn resolution(&self) -> [f32; 3] {
        let [sx, sy] = self.pixel_scale();
        let scale = |fb: u32, s: f32| if s == 0.0 { 0.0 } else { fb as f32 / s };
        [
            scale(self.framebuffer_size.width, sx),
            scale(self.framebuffer_size.height, sy),
            1.0,
        ]
    }

    /// Cursor position in window coordinates with the origin at the top left.
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        self.cursor = [x, self.window_size.height as f32 - y];
        if self.mouse_down {
            self.mouse[0] = self.cursor[0];
            self.mouse[1] = self.cursor[1];
            self.needs_render = true;
        }
    }

    pub fn mouse_button(&mut self, pressed: bool) {
        if pressed {
            self.mouse = [self.cursor[0], self.cursor[1], self.cursor[0], self.cursor[1]];
        } else {
            self.mouse[2] = -self.mouse[2];
            self.mouse[3] = -self.mouse[3];
        }
        self.mouse_down = pressed;
        self.needs_render = true;
    }

    pub fn key_event(&mut self, code: u32, pressed: bool, repeat: bool) {
        self.keyboard.key_event(code, pressed, repeat);
        if !repeat {
            self.needs_render = true;
        }
    }

    pub fn keyboard(&self) -> &KeyboardMap {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardMap {
        &mut self.keyboard
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_delta(&self) -> f64 {
        self.time_delta
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn mouse(&self) -> [f32; 4] {
        self.mouse
    }

    pub fn date(&self) -> [f32; 4] {
        self.date
    }

    pub fn uniforms(&self, channel_resolution: [[f32; 3]; CHANNEL_COUNT]) -> FrameUniforms {
        FrameUniforms {
            time: self.time as f32,
            time_delta: self.time_delta as f32,
            frame: self.frame,
            resolution: self.resolution(),
            mouse: self.mouse,
            date: self.date,
            pixel_scale: self.pixel_scale(),
            channel_resolution,
        }
    }
}
