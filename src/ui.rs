use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::StatusTally;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal feedback for the command-line tools.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    fn spinner(&self, message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner
    }

    /// Announce a setup stage; completion and elapsed time print on drop.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = self.spinner(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live counts while a video is processed.
    pub fn occupancy(&self, lot: &str) -> OccupancyProgress {
        let spinner = self
            .pretty()
            .then(|| self.spinner(format!("{lot}: waiting for first frame")));
        OccupancyProgress {
            lot: lot.to_string(),
            spinner,
            frames: 0,
            last: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct OccupancyProgress {
    lot: String,
    spinner: Option<ProgressBar>,
    frames: u64,
    last: Option<StatusTally>,
}

impl OccupancyProgress {
    /// Record one processed frame. Plain mode prints only when counts change.
    pub fn update(&mut self, tally: StatusTally) {
        self.frames += 1;
        let changed = self.last != Some(tally);
        self.last = Some(tally);
        match &self.spinner {
            Some(spinner) => spinner.set_message(format!(
                "{}: frame {} | {}",
                self.lot,
                self.frames,
                format_tally(&tally)
            )),
            None if changed => eprintln!("{}: {}", self.lot, format_tally(&tally)),
            None => {}
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(self) {
        let summary = match &self.last {
            Some(tally) => format!(
                "✔ {}: {} frames, {}",
                self.lot,
                self.frames,
                format_tally(tally)
            ),
            None => format!("✔ {}: no frames processed", self.lot),
        };
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(summary),
            None => eprintln!("{summary}"),
        }
    }
}

pub fn format_tally(tally: &StatusTally) -> String {
    format!(
        "{} free, {} occupied, {} unknown of {}",
        tally.free, tally.occupied, tally.unknown, tally.total
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_never_uses_spinners() {
        let ui = Ui::from_args(Some("plain"), true);
        assert!(!ui.pretty());
        let ui = Ui::from_args(None, false);
        assert!(!ui.pretty());
        let ui = Ui::from_args(Some("pretty"), true);
        assert!(ui.pretty());
    }

    #[test]
    fn progress_counts_frames() {
        let ui = Ui::new(UiMode::Plain, false);
        let mut progress = ui.occupancy("lot");
        let tally = StatusTally {
            total: 2,
            free: 1,
            occupied: 1,
            unknown: 0,
        };
        progress.update(tally);
        progress.update(tally);
        assert_eq!(progress.frames(), 2);
        progress.finish();
    }

    #[test]
    fn formats_tally_and_durations() {
        let tally = StatusTally {
            total: 3,
            free: 1,
            occupied: 1,
            unknown: 1,
        };
        assert_eq!(format_tally(&tally), "1 free, 1 occupied, 1 unknown of 3");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
