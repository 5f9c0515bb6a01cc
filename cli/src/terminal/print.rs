//! Decorated terminal lines. Everything goes through [`print`], which emits a
//! tracing event on [`PRINT_TARGET`] so output interleaves with log lines and
//! stays above the spinner.

use colored::*;
use tracing::info;
use unicode_width::UnicodeWidthStr;

use crate::terminal::colors;

pub const TOTAL_WIDTH: usize = 64;
pub const PRINT_TARGET: &str = "netprobe::print";

const TREE_KEY_WIDTH: usize = 7;

#[macro_export]
macro_rules! mprint {
    () => {
        $crate::terminal::print::print("");
    };
    ($msg:expr) => {
        $crate::terminal::print::print($msg);
    };
}

pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, raw_msg = msg);
}

const BANNER: &str = r#"
     _   _  _____  _____  ____   ____    ___   ____   _____
    | \ | || ____||_   _||  _ \ |  _ \  / _ \ | __ ) | ____|
    |  \| ||  _|    | |  | |_) || |_) || | | ||  _ \ |  _|
    | |\  || |___   | |  |  __/ |  _ < | |_| || |_) || |___
    |_| \_||_____|  |_|  |_|    |_| \_\ \___/ |____/ |_____|
"#;

pub fn banner(no_banner: bool, q_level: u8) {
    if no_banner || q_level > 0 {
        return;
    }

    let title: String = format!("⟦ NETPROBE v{} ⟧ ", env!("CARGO_PKG_VERSION"));
    let pad: usize = TOTAL_WIDTH.saturating_sub(UnicodeWidthStr::width(title.as_str())) / 2;
    let rule: ColoredString = "═".repeat(pad).bright_black();

    print(&format!("{rule}{}{rule}", title.bright_green().bold()));
    print(&BANNER.bright_green().to_string());
}

/// A centred section title; hidden under any quiet level.
pub fn header(msg: &str, q_level: u8) {
    if q_level > 0 {
        return;
    }

    let title: String = format!("⟦ {} ⟧", msg.to_uppercase());
    let dashes: usize = TOTAL_WIDTH.saturating_sub(title.chars().count());
    let (left, right) = (dashes / 2, dashes - dashes / 2);

    print(&format!(
        "{}{}{}",
        "─".repeat(left).bright_black(),
        title.bright_green(),
        "─".repeat(right).bright_black()
    ));
}

pub fn fat_separator() {
    print(&"═".repeat(TOTAL_WIDTH).color(colors::SEPARATOR).to_string());
}

/// `> key.....: value`, with dots filling the key out to `width`.
pub fn aligned_line(key: &str, width: usize, value: impl Into<ColoredString>) {
    let dots: String = ".".repeat((width + 1).saturating_sub(key.len()));
    print(&format!(
        "{} {}{}{} {}",
        ">".color(colors::SEPARATOR),
        key.color(colors::PRIMARY),
        dots.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR),
        value.into()
    ));
}

pub fn print_status(msg: &str) {
    print(&format!("{} {}", ">".color(colors::SEPARATOR), msg));
}

pub fn tree_head(idx: usize, name: &str) {
    print(&format!(
        "{}{}{} {}",
        "[".color(colors::SEPARATOR),
        idx.to_string().color(colors::ACCENT),
        "]".color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    ));
}

pub fn as_tree_one_level(details: Vec<(String, ColoredString)>) {
    let count: usize = details.len();
    for (i, (key, value)) in details.into_iter().enumerate() {
        let branch: &str = if i + 1 == count { "└─" } else { "├─" };
        let dots: String = ".".repeat(TREE_KEY_WIDTH.saturating_sub(key.len()));
        print(&format!(
            " {} {}{}{} {}",
            branch.bright_black(),
            key.color(colors::TEXT_DEFAULT),
            dots.color(colors::SEPARATOR),
            ":".color(colors::SEPARATOR),
            value
        ));
    }
}

pub fn centerln(msg: &str) {
    let space: String = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    print(&format!("{space}{msg}"));
}
