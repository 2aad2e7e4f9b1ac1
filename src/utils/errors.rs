use crate::cli::ColorMode;
use nu_ansi_term::Color;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_EXIT_CODE: i32 = 1;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

pub(crate) fn configure_color(cmode: ColorMode) {
    USE_COLOR.store(matches!(cmode, ColorMode::On), Ordering::Relaxed);
}

pub(crate) fn use_color() -> ColorMode {
    match USE_COLOR.load(Ordering::Relaxed) {
        true => ColorMode::On,
        false => ColorMode::Off,
    }
}

fn report(label: &str, color: Color, text: &str) {
    match use_color() {
        ColorMode::On => {
            let style = color.bold();
            let text_style = Color::Default.bold();

            eprintln!("{} {}", style.paint(format!("{}:", label)), text_style.paint(text));
        }
        ColorMode::Off => {
            eprintln!("{}: {}", label, text);
        }
    }
}

pub(crate) fn error_internal(text: &str) {
    report("error", Color::Red, text);
}

pub(crate) fn warn_internal(text: &str) {
    report("warning", Color::Yellow, text);
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::warn_internal(&formatted);
    })
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
    })
}

#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}
