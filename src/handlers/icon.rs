use std::sync::Arc;

use strum_macros::{AsRefStr, EnumString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::hw::LedDisplay;

use super::led_matrix::DisplayMatrix;

/// Default LED brightness for icon frames.
pub const DEFAULT_ICON_BRIGHTNESS: u8 = 255;
/// Default icon display time in tenths of a second.
pub const DEFAULT_ICON_TIMEOUT: u8 = 10;

/// Named pictographs that scene commands can show on the LED matrix.
#[derive(Debug, Clone, Copy, Eq, PartialEq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Icon {
    #[strum(serialize = "bulb", serialize = "bulp")]
    Bulb,
    Plug,
    Media,
    Sound,
    Beamer,
    /// Question mark shown for names without a pictograph.
    Unknown,
}

impl Icon {
    /// Resolves an icon name, falling back to [`Icon::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        name.trim().parse().unwrap_or(Self::Unknown)
    }

    /// Returns the packed 9x9 pattern.
    #[must_use]
    pub fn matrix(self) -> DisplayMatrix {
        let dots: &[u8; 81] = match self {
            Self::Bulb => &[
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 1, 0, 0, 0, 1, 0, 0, //
                0, 1, 0, 0, 0, 0, 0, 1, 0, //
                0, 1, 0, 0, 0, 0, 0, 1, 0, //
                0, 1, 0, 0, 1, 0, 0, 1, 0, //
                0, 0, 1, 0, 0, 0, 1, 0, 0, //
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 0, 0, 1, 0, 0, 0, 0, //
            ],
            Self::Plug => &[
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 1, 0, 0, 0, 1, 0, 0, //
                0, 1, 0, 0, 0, 0, 0, 1, 0, //
                0, 1, 0, 1, 0, 1, 0, 1, 0, //
                0, 1, 0, 0, 0, 0, 0, 1, 0, //
                0, 0, 1, 0, 0, 0, 1, 0, 0, //
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
            ],
            Self::Media => &[
                0, 0, 1, 1, 1, 1, 1, 1, 0, //
                0, 1, 1, 0, 0, 0, 0, 1, 1, //
                0, 1, 0, 0, 1, 0, 0, 0, 1, //
                0, 1, 0, 0, 1, 1, 0, 0, 1, //
                0, 1, 0, 0, 1, 1, 1, 0, 1, //
                0, 1, 0, 0, 1, 1, 0, 0, 1, //
                0, 1, 0, 0, 1, 0, 0, 0, 1, //
                0, 1, 0, 0, 0, 0, 0, 1, 1, //
                0, 0, 1, 1, 1, 1, 1, 1, 0, //
            ],
            Self::Sound => &[
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 1, 0, 0, 0, 0, //
                0, 0, 0, 0, 1, 1, 0, 0, 0, //
                0, 0, 0, 0, 1, 0, 1, 0, 0, //
                0, 0, 0, 0, 1, 0, 1, 0, 0, //
                0, 0, 1, 1, 1, 0, 0, 0, 0, //
                0, 1, 0, 0, 1, 0, 0, 0, 0, //
                0, 1, 0, 0, 1, 0, 0, 0, 0, //
                0, 0, 1, 1, 0, 0, 0, 0, 0, //
            ],
            Self::Beamer => &[
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                1, 1, 1, 1, 1, 1, 1, 1, 1, //
                1, 1, 1, 1, 1, 1, 0, 0, 1, //
                1, 1, 1, 1, 1, 1, 0, 0, 1, //
                1, 1, 1, 1, 1, 1, 1, 1, 1, //
                0, 1, 1, 0, 0, 0, 1, 1, 0, //
            ],
            Self::Unknown => &[
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 1, 1, 1, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 1, 0, 0, //
                0, 0, 0, 0, 0, 0, 1, 0, 0, //
                0, 0, 0, 0, 1, 1, 0, 0, 0, //
                0, 0, 0, 0, 1, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 1, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, //
            ],
        };
        DisplayMatrix::from_dots(dots)
    }
}

/// Draws icons named by routed commands on the device LED matrix.
pub struct IconRenderer {
    display: Arc<dyn LedDisplay>,
    brightness: u8,
    timeout: u8,
}

impl IconRenderer {
    /// Creates a renderer with default brightness and timeout.
    #[must_use]
    pub fn new(display: Arc<dyn LedDisplay>) -> Self {
        Self {
            display,
            brightness: DEFAULT_ICON_BRIGHTNESS,
            timeout: DEFAULT_ICON_TIMEOUT,
        }
    }

    /// Overrides brightness (0..=255) and display timeout (tenths of a second).
    #[must_use]
    pub fn with_frame_settings(mut self, brightness: u8, timeout: u8) -> Self {
        self.brightness = brightness;
        self.timeout = timeout;
        self
    }

    /// Shows one named icon.
    #[instrument(skip(self), level = "debug")]
    pub async fn show(&self, name: &str) {
        let icon = Icon::from_name(name);
        if icon == Icon::Unknown {
            debug!(name, "no pictograph for icon name, showing fallback");
        }
        if let Err(error) = self
            .display
            .display(&icon.matrix(), self.brightness, self.timeout)
            .await
        {
            warn!(%error, icon = icon.as_ref(), "failed to draw icon");
        }
    }

    /// Draws every icon name received until the queue closes or shutdown.
    pub async fn run(self, mut icons: mpsc::Receiver<String>, cancel: CancellationToken) {
        info!("icon renderer ready");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                maybe_icon = icons.recv() => {
                    let Some(name) = maybe_icon else {
                        break;
                    };
                    self.show(&name).await;
                }
            }
        }
        debug!("icon renderer stopped");
    }
}
