// ── Display mode ──

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A resolution and refresh rate reported by the host's display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
    #[serde(default)]
    pub is_active: bool,
}

impl DisplayMode {
    pub fn new(width: u32, height: u32, refresh_rate: u32) -> Self {
        Self {
            width,
            height,
            refresh_rate,
            is_active: false,
        }
    }

    /// `WIDTHxHEIGHTxREFRESH`, e.g. `2560x1440x120`.
    pub fn format(&self) -> String {
        format!("{}x{}x{}", self.width, self.height, self.refresh_rate)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for DisplayMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidDisplayMode {
            input: s.to_owned(),
        };

        let parts: Vec<u32> = s
            .trim()
            .split('x')
            .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;

        match parts.as_slice() {
            &[width, height, refresh_rate] if width > 0 && height > 0 && refresh_rate > 0 => {
                Ok(Self::new(width, height, refresh_rate))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_agree() {
        let mode: DisplayMode = "1920x1080x60".parse().unwrap();
        assert_eq!(mode, DisplayMode::new(1920, 1080, 60));
        assert_eq!(mode.format(), "1920x1080x60");
    }

    #[test]
    fn rejects_incomplete_or_zero_modes() {
        for input in ["1920x1080", "0x1080x60", "axbxc", "1920x1080x60x1", ""] {
            assert!(input.parse::<DisplayMode>().is_err(), "{input} parsed");
        }
    }
}
