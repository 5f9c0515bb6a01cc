use colored::Color;

pub const PRIMARY: Color = Color::BrightBlue;
pub const ACCENT: Color = Color::BrightCyan;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;
pub const WARN: Color = Color::Yellow;
pub const NUMBER: Color = Color::BrightMagenta;
pub const BOOLEAN: Color = Color::Green;
