//! Formatting of the output written to the `lassi-output` log target.

use std::fmt;

use log;

const LASSI_BANNER_LENGTH: usize = 89;

/// Logs a warning to the `lassi-output` logger.
macro_rules! lassi_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "lassi-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `lassi-output` logger.
macro_rules! lassi_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "lassi-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {lassi_output, lassi_warn};

/// Writes a boxed section title.
pub(crate) fn write_title(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let length = title.chars().count().max(LASSI_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    writeln!(f, "┌──{bar}──┐")?;
    writeln!(f, "│§ {title:^length$} §│")?;
    writeln!(f, "└──{bar}──┘")?;
    Ok(())
}

/// Writes an underlined subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    let bar = "═".repeat(subtitle.chars().count());
    writeln!(f, "{subtitle}")?;
    writeln!(f, "{bar}")?;
    Ok(())
}

/// Logs the beginning of a macro-section.
pub(crate) fn log_macsec_begin(sectitle: &str) {
    let width = LASSI_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    lassi_output!("❬❬❬❬❬ [Begin] {sectitle_space:❬<width$}");
}

/// Logs the end of a macro-section.
pub(crate) fn log_macsec_end(sectitle: &str) {
    let width = LASSI_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    lassi_output!("❭❭❭❭❭ [ End ] {sectitle_space:❭<width$}");
}

/// Turns a boolean into `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging displayable structures line by line to the `lassi-output` logger.
pub(crate) trait LassiOutput: fmt::Display {
    fn log_output_display(&self) {
        self.to_string().lines().for_each(|line| {
            lassi_output!("{line}");
        })
    }
}

impl<T> LassiOutput for T where T: fmt::Display {}
