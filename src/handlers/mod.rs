mod icon;
mod led_matrix;

pub use self::icon::{DEFAULT_ICON_BRIGHTNESS, DEFAULT_ICON_TIMEOUT, Icon, IconRenderer};
pub use self::led_matrix::{DisplayMatrix, MATRIX_BYTES, MATRIX_SIDE};
pub(crate) use self::led_matrix::encode_frame;
