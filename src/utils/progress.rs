//! Progress reporting.
//!
//! Engine operations never draw anything themselves. They push
//! [`ProgressEvent`]s into a [`ProgressSink`], a thin wrapper around an
//! unbounded channel: sending never blocks and a dropped receiver is ignored.
//! The CLI owns the receiving end and renders the events with `indicatif`
//! through [`spawn_renderer`].

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::constants::NO_PROGRESS_ENV_VAR;

/// Something worth telling the user about while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A download began; `total` is the expected size when the server sent one.
    DownloadStarted { name: String, total: Option<u64> },
    /// Cumulative bytes received so far.
    Downloaded { bytes: u64 },
    /// A named step such as "Verifying package".
    Phase(String),
}

/// Sending half of a progress channel. The default sink discards everything.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // receiver may be gone; progress is best effort
            let _ = tx.send(event);
        }
    }

    pub fn phase(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Phase(message.into()));
    }
}

/// Whether progress output was switched off through the environment.
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV_VAR).is_some()
}

/// Drains `rx` into a terminal progress bar until every sender is dropped.
pub fn spawn_renderer(mut rx: UnboundedReceiver<ProgressEvent>, hidden: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<IndicatifBar> = None;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::DownloadStarted { name, total } => {
                    if let Some(old) = bar.take() {
                        old.finish_and_clear();
                    }
                    let new_bar = if hidden {
                        IndicatifBar::hidden()
                    } else {
                        match total {
                            Some(len) => {
                                let b = IndicatifBar::new(len);
                                b.set_style(download_style());
                                b
                            }
                            None => spinner(),
                        }
                    };
                    new_bar.set_prefix(name.clone());
                    new_bar.set_message(name);
                    bar = Some(new_bar);
                }
                ProgressEvent::Downloaded { bytes } => {
                    if let Some(b) = &bar {
                        b.set_position(bytes);
                    }
                }
                ProgressEvent::Phase(message) => {
                    if let Some(old) = bar.take() {
                        old.finish_and_clear();
                    }
                    let b = if hidden { IndicatifBar::hidden() } else { spinner() };
                    b.set_message(message);
                    bar = Some(b);
                }
            }
        }
        if let Some(b) = bar {
            b.finish_and_clear();
        }
    })
}

fn spinner() -> IndicatifBar {
    let bar = IndicatifBar::new_spinner();
    bar.set_style(spinner_style());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("━╸━"))
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .map(|style| style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
}
