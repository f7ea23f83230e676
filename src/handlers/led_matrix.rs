use std::fmt::{self, Display, Formatter};

/// Number of packed matrix bytes carried by one LED frame.
pub const MATRIX_BYTES: usize = 11;
/// Edge length of the visible dot matrix.
pub const MATRIX_SIDE: usize = 9;

const FRAME_LEN: usize = MATRIX_BYTES + 2;

/// Packed LED dot matrix, eight dots per byte, least significant bit first.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct DisplayMatrix([u8; MATRIX_BYTES]);

impl DisplayMatrix {
    /// Packs row-major dots (non-zero means lit) into matrix bytes.
    ///
    /// Dots beyond the packed capacity are ignored.
    ///
    /// ```
    /// use nuimo_bridge::DisplayMatrix;
    ///
    /// let matrix = DisplayMatrix::from_dots(&[1, 0, 1, 0, 0, 0, 0, 0, 1]);
    /// assert_eq!(0b0000_0101, matrix.bytes()[0]);
    /// assert_eq!(0b0000_0001, matrix.bytes()[1]);
    /// ```
    #[must_use]
    pub fn from_dots(dots: &[u8]) -> Self {
        let mut bytes = [0u8; MATRIX_BYTES];
        for (dot, _) in dots
            .iter()
            .enumerate()
            .take(MATRIX_BYTES * 8)
            .filter(|(_, lit)| **lit > 0)
        {
            bytes[dot / 8] |= 1 << (dot % 8);
        }
        Self(bytes)
    }

    /// Copies already packed rows; input beyond eleven bytes is truncated and
    /// missing trailing bytes stay zero.
    #[must_use]
    pub fn from_packed(packed: &[u8]) -> Self {
        let mut bytes = [0u8; MATRIX_BYTES];
        for (slot, value) in bytes.iter_mut().zip(packed) {
            *slot = *value;
        }
        Self(bytes)
    }

    /// Returns the packed matrix bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8; MATRIX_BYTES] {
        &self.0
    }

    fn is_lit(&self, dot: usize) -> bool {
        self.0[dot / 8] & (1 << (dot % 8)) != 0
    }
}

/// Renders the visible 9x9 area, `#` for lit dots.
impl Display for DisplayMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for row in 0..MATRIX_SIDE {
            if row > 0 {
                writeln!(f)?;
            }
            for column in 0..MATRIX_SIDE {
                let glyph = if self.is_lit(row * MATRIX_SIDE + column) {
                    '#'
                } else {
                    '.'
                };
                write!(f, "{glyph}")?;
            }
        }
        Ok(())
    }
}

/// Encodes the LED characteristic frame: matrix bytes, brightness, timeout.
///
/// The timeout is expressed in tenths of a second.
pub(crate) fn encode_frame(matrix: &DisplayMatrix, brightness: u8, timeout: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..MATRIX_BYTES].copy_from_slice(matrix.bytes());
    frame[MATRIX_BYTES] = brightness;
    frame[MATRIX_BYTES + 1] = timeout;
    frame
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn from_dots_packs_lsb_first_across_bytes() {
        let mut dots = [0u8; 81];
        dots[0] = 1;
        dots[7] = 1;
        dots[8] = 1;
        dots[80] = 1;

        let matrix = DisplayMatrix::from_dots(&dots);
        let mut expected = [0u8; MATRIX_BYTES];
        expected[0] = 0b1000_0001;
        expected[1] = 0b0000_0001;
        expected[10] = 0b0000_0001;
        assert_eq!(&expected, matrix.bytes());
    }

    #[test]
    fn from_packed_truncates_and_zero_pads() {
        let long = DisplayMatrix::from_packed(&[0xFF; 14]);
        assert_eq!(&[0xFF; MATRIX_BYTES], long.bytes());

        let short = DisplayMatrix::from_packed(&[0x01, 0x02]);
        let mut expected = [0u8; MATRIX_BYTES];
        expected[0] = 0x01;
        expected[1] = 0x02;
        assert_eq!(&expected, short.bytes());
    }

    #[test]
    fn encode_frame_appends_brightness_and_timeout() {
        let matrix = DisplayMatrix::from_packed(&[0x11; MATRIX_BYTES]);
        let frame = encode_frame(&matrix, 255, 10);

        assert_eq!(13, frame.len());
        assert_eq!(&[0x11; MATRIX_BYTES], &frame[..MATRIX_BYTES]);
        assert_eq!([255, 10], [frame[11], frame[12]]);
    }

    #[test]
    fn display_renders_visible_grid() {
        let mut dots = [0u8; 81];
        for index in 0..MATRIX_SIDE {
            dots[index * MATRIX_SIDE + index] = 1;
        }
        let matrix = DisplayMatrix::from_dots(&dots);

        assert_snapshot!(matrix.to_string(), @r"
        #........
        .#.......
        ..#......
        ...#.....
        ....#....
        .....#...
        ......#..
        .......#.
        ........#
        ");
    }
}
