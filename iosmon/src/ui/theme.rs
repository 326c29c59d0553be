//! Light/dark palettes.

use ratatui::style::Color;

use iosmon::persist::ThemeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub fg: Color,
    pub dim: Color,
    pub accent: Color,
    pub header: Color,
    pub zebra: Color,
    pub ok: Color,
    pub warn: Color,
    pub bad: Color,
    pub cpu: Color,
    pub mem: Color,
    pub gpu: Color,
    pub fps: Color,
    pub rx: Color,
    pub tx: Color,
}

pub const DARK: Palette = Palette {
    fg: Color::Gray,
    dim: Color::DarkGray,
    accent: Color::Cyan,
    header: Color::Cyan,
    zebra: Color::Rgb(28, 28, 34),
    ok: Color::Green,
    warn: Color::Yellow,
    bad: Color::Red,
    cpu: Color::Cyan,
    mem: Color::Magenta,
    gpu: Color::LightGreen,
    fps: Color::Yellow,
    rx: Color::Green,
    tx: Color::Blue,
};

pub const LIGHT: Palette = Palette {
    fg: Color::Black,
    dim: Color::Rgb(110, 110, 120),
    accent: Color::Blue,
    header: Color::Blue,
    zebra: Color::Rgb(235, 235, 240),
    ok: Color::Rgb(0, 128, 0),
    warn: Color::Rgb(170, 110, 0),
    bad: Color::Rgb(190, 0, 0),
    cpu: Color::Blue,
    mem: Color::Magenta,
    gpu: Color::Rgb(0, 128, 64),
    fps: Color::Rgb(170, 110, 0),
    rx: Color::Rgb(0, 128, 0),
    tx: Color::Blue,
};

impl Palette {
    pub fn for_mode(mode: ThemeMode) -> Self {
        if mode.is_dark() {
            DARK
        } else {
            LIGHT
        }
    }
}
