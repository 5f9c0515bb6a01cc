use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use colored::*;
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};

const TIP_DURATION: Duration = Duration::from_secs(4);
const TIPS: &[&str] = &[
    "Set RUST_LOG=debug to see every tool invocation",
    "Results from missing tools are marked as simulated",
    "Use --tree for a readable summary of the result",
];
const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

static SPINNER: OnceLock<ProgressBar> = OnceLock::new();

/// Starts the probe spinner; a tip rotates in the second line of the message.
///
/// Only one probe runs per process, so the bar is created once.
pub fn start(status: String) -> &'static ProgressBar {
    let bar: &'static ProgressBar = SPINNER.get_or_init(|| {
        let style = ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    });
    bar.set_message(status.clone());

    let rotating: ProgressBar = bar.clone();
    thread::spawn(move || {
        for tip in TIPS.iter().cycle() {
            thread::sleep(TIP_DURATION);
            if rotating.is_finished() {
                break;
            }
            rotating.set_message(format!("{status}\n  {}", tip.italic().bright_black()));
        }
    });
    bar
}

/// Log sink that keeps lines above a running spinner and falls back to
/// stderr when none is drawn.
pub struct SpinnerWriter;

impl std::io::Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let line: &str = text.trim_end();
        match SPINNER.get() {
            Some(bar) if !bar.is_finished() && !bar.is_hidden() => bar.println(line),
            _ => Term::stderr().write_line(line)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
