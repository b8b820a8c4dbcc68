use crate::backend::PixelView;

/// Key codes map to columns; codes at or above this are ignored.
pub const KEYMAP_COLUMNS: usize = 256;
pub const KEYMAP_ROWS: usize = 3;
/// The map is uploaded as an RGB texture; every byte of a texel holds the same value.
pub const KEYMAP_BYTES_PER_KEY: usize = 3;

/// Row holding 255 while a key is held.
pub const KEY_ROW_DOWN: usize = 0;
/// Row holding 255 during the frame a key went down.
pub const KEY_ROW_PRESSED: usize = 1;
/// Row flipping between 0 and 255 on every press.
pub const KEY_ROW_TOGGLED: usize = 2;

const ROW_BYTES: usize = KEYMAP_COLUMNS * KEYMAP_BYTES_PER_KEY;

/// Keyboard state in the 256x3 layout Shadertoy shaders sample.
#[derive(Debug, Clone)]
pub struct KeyboardMap {
    bytes: Vec<u8>,
}

impl Default for KeyboardMap {
    fn default() -> Self {
        Self {
            bytes: vec![0; ROW_BYTES * KEYMAP_ROWS],
        }
    }
}

impl KeyboardMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a key event. `code` is an ASCII-style key code; letters are
    /// upper-cased so 'a' and 'A' share a column. Auto-repeat is ignored.
    pub fn key_event(&mut self, code: u32, pressed: bool, repeat: bool) {
        if repeat {
            return;
        }
        let code = if (b'a' as u32..=b'z' as u32).contains(&code) {
            code - 32
        } else {
            code
        };
        let Ok(column) = usize::try_from(code) else {
            return;
        };
        if column >= KEYMAP_COLUMNS {
            return;
        }

        if pressed {
            self.set(KEY_ROW_DOWN, column, 255);
            self.set(KEY_ROW_PRESSED, column, 255);
            let toggled = self.get(KEY_ROW_TOGGLED, column);
            self.set(KEY_ROW_TOGGLED, column, 255 - toggled);
        } else {
            self.set(KEY_ROW_DOWN, column, 0);
        }
    }

    /// Clear the per-frame "pressed" row. Run after every rendered frame.
    pub fn end_frame(&mut self) {
        let start = KEY_ROW_PRESSED * ROW_BYTES;
        self.bytes[start..start + ROW_BYTES].fill(0);
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    pub fn get(&self, row: usize, column: usize) -> u8 {
        self.bytes[row * ROW_BYTES + column * KEYMAP_BYTES_PER_KEY]
    }

    fn set(&mut self, row: usize, column: usize, value: u8) {
        let start = row * ROW_BYTES + column * KEYMAP_BYTES_PER_KEY;
        self.bytes[start..start + KEYMAP_BYTES_PER_KEY].fill(value);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            width: KEYMAP_COLUMNS as u32,
            height: KEYMAP_ROWS as u32,
            channels: KEYMAP_BYTES_PER_KEY as u8,
            bytes: &self.bytes,
        }
    }
}
