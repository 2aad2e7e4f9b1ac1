use std::io::{self, IsTerminal};

use crate::RequestedColorMode;

pub(crate) mod discover;
pub(crate) mod list;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// Returns whether ANSI color should be used on stderr.
    /// An explicit `--color` wins. Otherwise color is off when `NO_COLOR` is
    /// set or stderr is not a terminal.
    pub(crate) fn resolve_auto(cm: RequestedColorMode) -> ColorMode {
        match cm {
            RequestedColorMode::Auto => {
                let disable_color =
                    std::env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();

                if disable_color {
                    ColorMode::Off
                } else {
                    ColorMode::On
                }
            }
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
        }
    }
}
