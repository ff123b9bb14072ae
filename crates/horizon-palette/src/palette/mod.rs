//! Color palettes.
//!
//! A [`Palette`] assigns a [`Color`] to every [`ColorRole`] in every
//! [`ColorGroup`]. The two built-in tables, [`Palette::light`] and
//! [`Palette::dark`], are selected with a [`PaletteSelection`] and applied by
//! a [`PaletteController`].

mod controller;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::platform::ThemePreference;

pub use controller::{PaletteController, PaletteTarget};

// ============================================================================
// Color
// ============================================================================

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red component (0-255).
    pub r: u8,
    /// Green component (0-255).
    pub g: u8,
    /// Blue component (0-255).
    pub b: u8,
    /// Alpha component (0-255).
    pub a: u8,
}

impl Color {
    /// Create an opaque color.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Create a color with alpha.
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque gray.
    pub const fn gray(level: u8) -> Self {
        Self::from_rgb(level, level, level)
    }

    pub const BLACK: Self = Self::from_rgb(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb(255, 255, 255);
    pub const RED: Self = Self::from_rgb(255, 0, 0);
    pub const BLUE: Self = Self::from_rgb(0, 0, 255);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

// ============================================================================
// Roles and Groups
// ============================================================================

/// The widget state a color applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorGroup {
    /// The focused window.
    Active,
    /// Unfocused windows.
    Inactive,
    /// Disabled widgets.
    Disabled,
}

impl ColorGroup {
    /// Every group, in storage order.
    pub const ALL: [ColorGroup; 3] = [Self::Active, Self::Inactive, Self::Disabled];

    fn index(self) -> usize {
        self as usize
    }
}

/// What a color is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    /// General background.
    Window,
    /// Foreground on `Window`.
    WindowText,
    /// Background of text entry widgets and item views.
    Base,
    /// Alternating row background in item views.
    AlternateBase,
    /// Tooltip background.
    ToolTipBase,
    /// Tooltip foreground.
    ToolTipText,
    /// Foreground on `Base`.
    Text,
    /// Button background.
    Button,
    /// Foreground on `Button`.
    ButtonText,
    /// High-contrast text, used where `WindowText` would be unreadable.
    BrightText,
    /// Unvisited hyperlinks.
    Link,
    /// Selected item background.
    Highlight,
    /// Foreground on `Highlight`.
    HighlightedText,
}

impl ColorRole {
    /// Every role, in storage order.
    pub const ALL: [ColorRole; 13] = [
        Self::Window,
        Self::WindowText,
        Self::Base,
        Self::AlternateBase,
        Self::ToolTipBase,
        Self::ToolTipText,
        Self::Text,
        Self::Button,
        Self::ButtonText,
        Self::BrightText,
        Self::Link,
        Self::Highlight,
        Self::HighlightedText,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ============================================================================
// Palette
// ============================================================================

const ROLE_COUNT: usize = ColorRole::ALL.len();
const GROUP_COUNT: usize = ColorGroup::ALL.len();

/// A complete color table for every role and group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Palette {
    colors: [[Color; ROLE_COUNT]; GROUP_COUNT],
}

impl Palette {
    /// A palette with every entry set to `color`.
    pub fn uniform(color: Color) -> Self {
        Self {
            colors: [[color; ROLE_COUNT]; GROUP_COUNT],
        }
    }

    /// The color for `role` in `group`.
    pub fn color(&self, group: ColorGroup, role: ColorRole) -> Color {
        self.colors[group.index()][role.index()]
    }

    /// The color for `role` in the active group.
    pub fn active(&self, role: ColorRole) -> Color {
        self.color(ColorGroup::Active, role)
    }

    /// Set `role` in every group.
    pub fn set_color(&mut self, role: ColorRole, color: Color) {
        for group in ColorGroup::ALL {
            self.set_group_color(group, role, color);
        }
    }

    /// Set `role` in a single group.
    pub fn set_group_color(&mut self, group: ColorGroup, role: ColorRole, color: Color) {
        self.colors[group.index()][role.index()] = color;
    }

    /// Builder-style [`set_color`](Self::set_color).
    pub fn with(mut self, role: ColorRole, color: Color) -> Self {
        self.set_color(role, color);
        self
    }

    /// Builder-style [`set_group_color`](Self::set_group_color).
    pub fn with_group(mut self, group: ColorGroup, role: ColorRole, color: Color) -> Self {
        self.set_group_color(group, role, color);
        self
    }

    /// The standard light table.
    pub fn light() -> Self {
        use ColorGroup::Disabled;
        use ColorRole::*;

        let disabled_text = Color::gray(190);
        Self::uniform(Color::BLACK)
            .with(Window, Color::gray(239))
            .with(WindowText, Color::BLACK)
            .with(Base, Color::WHITE)
            .with(AlternateBase, Color::gray(247))
            .with(ToolTipBase, Color::from_rgb(255, 255, 220))
            .with(ToolTipText, Color::BLACK)
            .with(Text, Color::BLACK)
            .with(Button, Color::gray(239))
            .with(ButtonText, Color::BLACK)
            .with(BrightText, Color::WHITE)
            .with(Link, Color::BLUE)
            .with(Highlight, Color::from_rgb(48, 140, 198))
            .with(HighlightedText, Color::WHITE)
            .with_group(Disabled, Text, disabled_text)
            .with_group(Disabled, WindowText, disabled_text)
            .with_group(Disabled, ButtonText, disabled_text)
            .with_group(Disabled, Base, Color::gray(239))
            .with_group(Disabled, Highlight, Color::gray(145))
    }

    /// The dark table.
    pub fn dark() -> Self {
        use ColorGroup::Disabled;
        use ColorRole::*;

        let surface = Color::gray(53);
        let accent = Color::from_rgb(42, 130, 218);
        let disabled_text = Color::from_rgb(164, 166, 168);
        let disabled_surface = Color::gray(68);

        Self::uniform(Color::WHITE)
            .with(Window, surface)
            .with(WindowText, Color::WHITE)
            .with(Base, Color::gray(25))
            .with(AlternateBase, surface)
            .with(ToolTipBase, surface)
            .with(ToolTipText, Color::WHITE)
            .with(Text, Color::WHITE)
            .with(Button, surface)
            .with(ButtonText, Color::WHITE)
            .with(BrightText, Color::RED)
            .with(Link, accent)
            .with(Highlight, accent)
            .with(HighlightedText, Color::BLACK)
            .with_group(Disabled, Text, disabled_text)
            .with_group(Disabled, WindowText, disabled_text)
            .with_group(Disabled, ButtonText, disabled_text)
            .with_group(Disabled, HighlightedText, disabled_text)
            .with_group(Disabled, Base, disabled_surface)
            .with_group(Disabled, Window, disabled_surface)
            .with_group(Disabled, Highlight, disabled_surface)
    }

    /// The built-in table for `selection`.
    pub fn for_selection(selection: PaletteSelection) -> Self {
        match selection {
            PaletteSelection::Light => Self::light(),
            PaletteSelection::Dark => Self::dark(),
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Which built-in palette is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteSelection {
    /// [`Palette::light`].
    #[default]
    Light,
    /// [`Palette::dark`].
    Dark,
}

impl PaletteSelection {
    /// The built-in palette for this selection.
    pub fn palette(self) -> Palette {
        Palette::for_selection(self)
    }
}

impl From<ThemePreference> for PaletteSelection {
    fn from(preference: ThemePreference) -> Self {
        match preference {
            ThemePreference::Light => Self::Light,
            ThemePreference::Dark => Self::Dark,
        }
    }
}

impl fmt::Display for PaletteSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_palette_colors() {
        let dark = Palette::dark();

        assert_eq!(dark.active(ColorRole::Window), Color::from_rgb(53, 53, 53));
        assert_eq!(dark.active(ColorRole::Base), Color::from_rgb(25, 25, 25));
        assert_eq!(dark.active(ColorRole::Highlight), Color::from_rgb(42, 130, 218));
        assert_eq!(dark.active(ColorRole::Link), Color::from_rgb(42, 130, 218));
        assert_eq!(dark.active(ColorRole::BrightText), Color::RED);
        assert_eq!(dark.active(ColorRole::HighlightedText), Color::BLACK);
        assert_eq!(
            dark.color(ColorGroup::Inactive, ColorRole::Text),
            Color::WHITE
        );
        assert_eq!(
            dark.color(ColorGroup::Disabled, ColorRole::Text),
            Color::from_rgb(164, 166, 168)
        );
        assert_eq!(
            dark.color(ColorGroup::Disabled, ColorRole::Window),
            Color::gray(68)
        );
    }

    #[test]
    fn test_light_palette_is_light() {
        let light = Palette::light();
        assert_eq!(light.active(ColorRole::Base), Color::WHITE);
        assert_eq!(light.active(ColorRole::Text), Color::BLACK);
        assert_ne!(light, Palette::dark());
    }

    #[test]
    fn test_set_group_color_leaves_other_groups() {
        let mut palette = Palette::uniform(Color::BLACK);
        palette.set_group_color(ColorGroup::Disabled, ColorRole::Text, Color::WHITE);

        assert_eq!(palette.color(ColorGroup::Disabled, ColorRole::Text), Color::WHITE);
        assert_eq!(palette.color(ColorGroup::Active, ColorRole::Text), Color::BLACK);
    }

    #[test]
    fn test_selection_from_preference() {
        assert_eq!(
            PaletteSelection::from(ThemePreference::Dark),
            PaletteSelection::Dark
        );
        assert_eq!(PaletteSelection::Light.palette(), Palette::light());
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Color::from_rgb(42, 130, 218).to_string(), "#2a82da");
        assert_eq!(Color::from_rgba(0, 0, 0, 128).to_string(), "#00000080");
    }
}
