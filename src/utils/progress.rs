//! Build progress reporting, a no-op when the `progress` feature is disabled

use std::time::Duration;

#[cfg(feature = "progress")]
pub use indicatif::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
pub use self::noop::*;

/// Spinner for phases of unknown length; `None` when silent
pub fn spinner(message: &'static str, silent: bool) -> Option<ProgressBar> {
    if silent {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

/// Counter for the walk, whose total is not known up front
pub fn document_counter(silent: bool) -> Option<ProgressBar> {
    if silent {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} documents {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

#[cfg(not(feature = "progress"))]
mod noop {
    use std::time::Duration;

    #[derive(Clone)]
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn new_spinner() -> Self {
            ProgressBar
        }

        pub fn set_style(&self, _style: ProgressStyle) {}
        pub fn set_message(&self, _msg: impl Into<std::borrow::Cow<'static, str>>) {}
        pub fn enable_steady_tick(&self, _interval: Duration) {}
        pub fn inc(&self, _delta: u64) {}
        pub fn finish_with_message(&self, _msg: impl Into<std::borrow::Cow<'static, str>>) {}
    }

    pub struct ProgressStyle;

    impl ProgressStyle {
        pub fn default_spinner() -> Self {
            ProgressStyle
        }

        pub fn template(self, _template: &str) -> Result<Self, std::convert::Infallible> {
            Ok(self)
        }
    }
}
