//! Selectable visual styles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::palette::PaletteSelection;

/// A widget style together with the palette it implies.
///
/// Styles are persisted by [`index`](Style::index) under `Style/Theme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    /// The native Windows Vista look.
    Vista,
    /// The classic Windows look.
    Classic,
    /// Fusion with the light palette.
    #[default]
    LightFusion,
    /// Fusion with the dark palette.
    DarkFusion,
}

impl Style {
    /// Every style, in index order.
    pub const ALL: [Style; 4] = [
        Style::Vista,
        Style::Classic,
        Style::LightFusion,
        Style::DarkFusion,
    ];

    /// The toolkit style name passed to [`PaletteTarget::apply_style`].
    ///
    /// [`PaletteTarget::apply_style`]: crate::palette::PaletteTarget::apply_style
    pub fn style_name(self) -> &'static str {
        match self {
            Style::Vista => "windowsvista",
            Style::Classic => "windows",
            Style::LightFusion | Style::DarkFusion => "Fusion",
        }
    }

    /// The palette applied along with this style.
    pub fn palette(self) -> PaletteSelection {
        match self {
            Style::DarkFusion => PaletteSelection::Dark,
            _ => PaletteSelection::Light,
        }
    }

    /// The stored index of this style.
    pub fn index(self) -> i64 {
        self as i64
    }

    /// The style stored at `index`, if any.
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            Style::Vista => "Vista",
            Style::Classic => "Classic",
            Style::LightFusion => "Light Fusion",
            Style::DarkFusion => "Dark Fusion",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Style {
    type Err = String;

    /// Accepts the label, the kebab-case name or the index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "vista" => Ok(Style::Vista),
            "classic" => Ok(Style::Classic),
            "lightfusion" => Ok(Style::LightFusion),
            "darkfusion" => Ok(Style::DarkFusion),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(Style::from_index)
                .ok_or_else(|| format!("unknown style: {s}")),
        }
    }
}
