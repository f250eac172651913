//! HD44780-style display controller (C3): command/data register pair,
//! 128-byte DDRAM, CGRAM user glyphs, and pure pixel-rendering functions
//! over a geometry-specific screen-to-memory mapping table.

const DDRAM_SIZE: usize = 128;
const CGRAM_GLYPHS: usize = 8;
const GLYPH_ROWS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Lines2x16,
    Lines4x20,
}

impl Geometry {
    pub fn rows(self) -> usize {
        match self {
            Geometry::Lines2x16 => 2,
            Geometry::Lines4x20 => 4,
        }
    }

    pub fn cols(self) -> usize {
        match self {
            Geometry::Lines2x16 => 16,
            Geometry::Lines4x20 => 20,
        }
    }

    /// DDRAM address for a given (row, col), following the standard
    /// HD44780 interleaved line layout (line 2 starts at $40, lines 3/4
    /// continue after the visible width of lines 1/2).
    pub fn ddram_address(self, row: usize, col: usize) -> u8 {
        let base = match (self, row) {
            (_, 0) => 0x00,
            (_, 1) => 0x40,
            (Geometry::Lines4x20, 2) => 0x14,
            (Geometry::Lines4x20, 3) => 0x54,
            _ => 0x00,
        };
        (base + col) as u8 & 0x7F
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressTarget {
    Ddram,
    Cgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryMode {
    increment: bool,
    shift_display: bool,
}

pub struct Display {
    pub geometry: Geometry,
    pub on: bool,
    pub cursor_visible: bool,
    pub cursor_blink: bool,
    ddram: [u8; DDRAM_SIZE],
    cgram: [[u8; GLYPH_ROWS]; CGRAM_GLYPHS],
    cursor_pos: u8,
    entry_mode: EntryMode,
    shift_offset: i16,
    address_target: AddressTarget,
    four_line_mode: bool,
}

impl Display {
    pub fn new(geometry: Geometry) -> Self {
        Display {
            geometry,
            on: false,
            cursor_visible: false,
            cursor_blink: false,
            ddram: [0x20; DDRAM_SIZE],
            cgram: [[0; GLYPH_ROWS]; CGRAM_GLYPHS],
            cursor_pos: 0,
            entry_mode: EntryMode { increment: true, shift_display: false },
            shift_offset: 0,
            address_target: AddressTarget::Ddram,
            four_line_mode: geometry == Geometry::Lines4x20,
        }
    }

    pub fn switch_off(&mut self) {
        self.on = false;
    }

    pub fn switch_on(&mut self) {
        self.on = true;
    }

    /// Decodes and applies an HD44780 command byte.
    pub fn command(&mut self, cmd: u8) {
        if cmd & 0x80 != 0 {
            self.address_target = AddressTarget::Ddram;
            self.cursor_pos = cmd & 0x7F;
        } else if cmd & 0x40 != 0 {
            self.address_target = AddressTarget::Cgram;
            self.cursor_pos = cmd & 0x3F;
        } else if cmd & 0x20 != 0 {
            self.four_line_mode = cmd & 0x08 != 0;
        } else if cmd & 0x10 != 0 {
            let shift_display = cmd & 0x08 != 0;
            let right = cmd & 0x04 != 0;
            let delta: i16 = if right { 1 } else { -1 };
            if shift_display {
                self.shift_offset += delta;
            } else {
                self.cursor_pos = ((self.cursor_pos as i16 + delta).rem_euclid(DDRAM_SIZE as i16)) as u8;
            }
        } else if cmd & 0x08 != 0 {
            self.on = cmd & 0x04 != 0;
            self.cursor_visible = cmd & 0x02 != 0;
            self.cursor_blink = cmd & 0x01 != 0;
        } else if cmd & 0x04 != 0 {
            self.entry_mode = EntryMode { increment: cmd & 0x02 != 0, shift_display: cmd & 0x01 != 0 };
        } else if cmd & 0x02 != 0 {
            self.cursor_pos = 0;
            self.shift_offset = 0;
        } else if cmd & 0x01 != 0 {
            self.ddram = [0x20; DDRAM_SIZE];
            self.cursor_pos = 0;
            self.shift_offset = 0;
        }
    }

    /// Writes a byte to DDRAM (text) or CGRAM (glyph row), auto-advancing
    /// the cursor per the current entry mode.
    pub fn write_data(&mut self, value: u8) {
        match self.address_target {
            AddressTarget::Ddram => {
                self.ddram[(self.cursor_pos as usize) % DDRAM_SIZE] = value;
            }
            AddressTarget::Cgram => {
                let glyph = (self.cursor_pos as usize / GLYPH_ROWS) % CGRAM_GLYPHS;
                let row = self.cursor_pos as usize % GLYPH_ROWS;
                self.cgram[glyph][row] = value & 0x1F;
            }
        }
        self.advance_cursor();
        if self.entry_mode.shift_display {
            self.shift_offset += if self.entry_mode.increment { 1 } else { -1 };
        }
    }

    pub fn read_data(&mut self) -> u8 {
        let value = match self.address_target {
            AddressTarget::Ddram => self.ddram[(self.cursor_pos as usize) % DDRAM_SIZE],
            AddressTarget::Cgram => {
                let glyph = (self.cursor_pos as usize / GLYPH_ROWS) % CGRAM_GLYPHS;
                let row = self.cursor_pos as usize % GLYPH_ROWS;
                self.cgram[glyph][row]
            }
        };
        self.advance_cursor();
        value
    }

    fn advance_cursor(&mut self) {
        let modulus = match self.address_target {
            AddressTarget::Ddram => DDRAM_SIZE as i16,
            AddressTarget::Cgram => (CGRAM_GLYPHS * GLYPH_ROWS) as i16,
        };
        let delta: i16 = if self.entry_mode.increment { 1 } else { -1 };
        self.cursor_pos = ((self.cursor_pos as i16 + delta).rem_euclid(modulus)) as u8;
    }

    pub fn cursor_pos(&self) -> u8 {
        self.cursor_pos
    }

    /// Reads the text on `row`, as character codes, honoring display shift.
    pub fn row_text(&self, row: usize) -> Vec<u8> {
        let cols = self.geometry.cols();
        (0..cols)
            .map(|col| {
                let addr = self.geometry.ddram_address(row, col) as i16 + self.shift_offset;
                self.ddram[addr.rem_euclid(DDRAM_SIZE as i16) as usize]
            })
            .collect()
    }

    pub fn set_user_glyph(&mut self, index: usize, rows: [u8; GLYPH_ROWS]) {
        self.cgram[index % CGRAM_GLYPHS] = rows;
    }

    /// Renders the whole screen into a `rows * cols * 8 * 5` monochrome
    /// pixel buffer (row-major, one byte per pixel: 0 or 1). Codes 0-7 use
    /// the CGRAM user glyphs, 8-31 render blank, 32-255 use the built-in
    /// font.
    pub fn render_pixels(&self) -> Vec<Vec<bool>> {
        let rows = self.geometry.rows();
        let cols = self.geometry.cols();
        let mut out = vec![vec![false; cols * 5]; rows * 8];
        for row in 0..rows {
            for col in 0..cols {
                let addr = self.geometry.ddram_address(row, col) as i16 + self.shift_offset;
                let code = self.ddram[addr.rem_euclid(DDRAM_SIZE as i16) as usize];
                let glyph = self.glyph_for(code);
                for gr in 0..8 {
                    for gc in 0..5 {
                        let bit = (glyph[gr] >> (4 - gc)) & 1 != 0;
                        out[row * 8 + gr][col * 5 + gc] = bit;
                    }
                }
            }
        }
        out
    }

    fn glyph_for(&self, code: u8) -> [u8; GLYPH_ROWS] {
        if code < 8 {
            self.cgram[code as usize]
        } else if code < 32 {
            [0; GLYPH_ROWS]
        } else {
            font_glyph(code)
        }
    }

    /// A second render mode: the same bitmap, but each pixel becomes an
    /// `on_gap x on_gap` block, cells are separated by `char_gap`, and the
    /// whole thing is padded by `bezel_gap` — the "LCD matrix" look.
    pub fn render_lcd_matrix(&self, pixel_gap: usize, char_gap: usize, bezel_gap: usize) -> Vec<Vec<bool>> {
        let pixels = self.render_pixels();
        let rows = self.geometry.rows();
        let cols = self.geometry.cols();
        let cell_w = 5 * (pixel_gap + 1) + char_gap;
        let cell_h = 8 * (pixel_gap + 1) + char_gap;
        let width = bezel_gap * 2 + cols * cell_w;
        let height = bezel_gap * 2 + rows * cell_h;
        let mut out = vec![vec![false; width]; height];
        for (py, prow) in pixels.iter().enumerate() {
            let row = py / 8;
            let gr = py % 8;
            for (px, &on) in prow.iter().enumerate() {
                if !on {
                    continue;
                }
                let col = px / 5;
                let gc = px % 5;
                let base_y = bezel_gap + row * cell_h + gr * (pixel_gap + 1);
                let base_x = bezel_gap + col * cell_w + gc * (pixel_gap + 1);
                for dy in 0..=pixel_gap {
                    for dx in 0..=pixel_gap {
                        out[base_y + dy][base_x + dx] = true;
                    }
                }
            }
        }
        out
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DDRAM_SIZE + CGRAM_GLYPHS * GLYPH_ROWS + 8);
        out.push(self.on as u8);
        out.push(self.cursor_visible as u8);
        out.push(self.cursor_blink as u8);
        out.push(self.cursor_pos);
        out.push((self.entry_mode.increment as u8) | ((self.entry_mode.shift_display as u8) << 1));
        out.push((self.shift_offset as i8) as u8);
        out.push((self.address_target == AddressTarget::Cgram) as u8);
        out.extend_from_slice(&self.ddram);
        for glyph in &self.cgram {
            out.extend_from_slice(glyph);
        }
        out
    }

    pub fn apply_snapshot(&mut self, bytes: &[u8]) {
        self.on = bytes[0] != 0;
        self.cursor_visible = bytes[1] != 0;
        self.cursor_blink = bytes[2] != 0;
        self.cursor_pos = bytes[3];
        self.entry_mode = EntryMode { increment: bytes[4] & 0x01 != 0, shift_display: bytes[4] & 0x02 != 0 };
        self.shift_offset = (bytes[5] as i8) as i16;
        self.address_target = if bytes[6] != 0 { AddressTarget::Cgram } else { AddressTarget::Ddram };
        let rest = &bytes[7..];
        self.ddram.copy_from_slice(&rest[..DDRAM_SIZE]);
        let cgram_bytes = &rest[DDRAM_SIZE..];
        for (glyph, chunk) in self.cgram.iter_mut().zip(cgram_bytes.chunks(GLYPH_ROWS)) {
            glyph.copy_from_slice(chunk);
        }
    }
}

/// A minimal built-in 5x8 font. Only a practical ASCII subset is defined
/// explicitly; anything else renders as a solid block, matching a real
/// HD44780 ROM's behavior for undefined codes.
fn font_glyph(code: u8) -> [u8; GLYPH_ROWS] {
    match code {
        b' ' => [0b00000; 8],
        b'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001, 0b00000],
        b'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111, 0b00000],
        b'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111, 0b00000],
        b'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110, 0b00000],
        _ => [0b11111, 0b11111, 0b11111, 0b11111, 0b11111, 0b11111, 0b11111, 0b00000],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S7: display text writes advance the cursor and render HELLO.
    #[test]
    fn s7_display_text_write_and_cursor_advance() {
        let mut d = Display::new(Geometry::Lines2x16);
        d.command(0x01); // clear display
        for &b in b"HELLO" {
            d.write_data(b);
        }
        assert_eq!(d.cursor_pos(), 5);
        let row0 = d.row_text(0);
        assert_eq!(&row0[..5], b"HELLO");
    }

    #[test]
    fn entry_mode_decrement_moves_cursor_backward() {
        let mut d = Display::new(Geometry::Lines2x16);
        d.command(0x01);
        d.command(0x04); // entry mode, decrement, no shift
        d.write_data(b'A');
        assert_eq!(d.cursor_pos(), 127);
    }

    #[test]
    fn cgram_glyph_roundtrips() {
        let mut d = Display::new(Geometry::Lines2x16);
        d.command(0x40); // set CGRAM address 0
        for row in 0..8u8 {
            d.write_data(row);
        }
        d.set_user_glyph(0, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(d.cgram[0], [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn four_line_geometry_maps_rows_correctly() {
        assert_eq!(Geometry::Lines4x20.ddram_address(2, 0), 0x14);
        assert_eq!(Geometry::Lines4x20.ddram_address(3, 0), 0x54);
    }

    #[test]
    fn render_pixels_has_expected_dimensions() {
        let d = Display::new(Geometry::Lines2x16);
        let pixels = d.render_pixels();
        assert_eq!(pixels.len(), 16);
        assert_eq!(pixels[0].len(), 80);
    }
}
