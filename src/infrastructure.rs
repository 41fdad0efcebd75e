use std::cell::RefCell;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use walkdir::WalkDir;

use crate::application::{FilePorts, ProgressReporter, ScanError};
use crate::domain::ScanStats;

/// Path that selects stdout instead of a file.
pub const STDOUT_PATH: &str = "-";

pub struct FsPorts;

impl FsPorts {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FsPorts {
    fn default() -> Self {
        Self::new()
    }
}

impl FilePorts for FsPorts {
    fn for_each_file(
        &self,
        target: &Path,
        on_file: &mut dyn FnMut(PathBuf) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        if !target.is_dir() {
            return on_file(target.to_path_buf());
        }

        // directory symlinks are not followed, file symlinks are
        for entry in WalkDir::new(target).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| ScanError::Message(err.to_string()))?;

            if entry.path().is_file() {
                on_file(entry.into_path())?;
            }
        }

        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String, ScanError> {
        Ok(fs::read_to_string(path)?)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read>, ScanError> {
        Ok(Box::new(BufReader::new(fs::File::open(path)?)))
    }
}

/// Opens an output sink; `-` writes to stdout.
pub fn open_output(path: &Path) -> Result<Box<dyn Write>, ScanError> {
    if path == Path::new(STDOUT_PATH) {
        return Ok(Box::new(io::stdout().lock()));
    }
    Ok(Box::new(BufWriter::new(fs::File::create(path)?)))
}

pub struct NoProgressReporter;

impl NoProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for NoProgressReporter {
    fn on_start(&self, _total: u64) {}

    fn on_update(&self, _stats: &ScanStats) {}

    fn on_finish(&self, _stats: &ScanStats) {}
}

pub struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(draw_target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, draw_target);
        let style = ProgressStyle::with_template("{spinner:.yellow} {msg:.blue}")
            .expect("invalid progress style template")
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }
}

impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn on_start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_message(format_stats(&ScanStats {
            models_found: total,
            ..ScanStats::default()
        }));
    }

    fn on_update(&self, stats: &ScanStats) {
        self.bar.set_position(stats.models_scanned);
        self.bar.set_message(format_stats(stats));
    }

    fn on_finish(&self, stats: &ScanStats) {
        self.bar.disable_steady_tick();
        self.bar.finish_with_message(format_stats(stats));
    }
}

struct LineProgressState<W: Write> {
    writer: W,
    last_stats: ScanStats,
    started: bool,
}

/// Plain line output for runs where stderr is not a terminal.
pub struct LineProgressReporter<W: Write> {
    state: RefCell<LineProgressState<W>>,
}

impl LineProgressReporter<std::io::Stderr> {
    pub fn new() -> Self {
        Self::with_writer(std::io::stderr())
    }
}

impl Default for LineProgressReporter<std::io::Stderr> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> LineProgressReporter<W> {
    pub fn with_writer(writer: W) -> Self {
        Self {
            state: RefCell::new(LineProgressState {
                writer,
                last_stats: ScanStats::default(),
                started: false,
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().writer
    }
}

impl<W: Write> ProgressReporter for LineProgressReporter<W> {
    fn on_start(&self, total: u64) {
        let mut state = self.state.borrow_mut();

        if state.started {
            return;
        }

        let _ = writeln!(state.writer, "scanning {total} models");
        let _ = state.writer.flush();
        state.started = true;
    }

    fn on_update(&self, stats: &ScanStats) {
        let mut state = self.state.borrow_mut();

        if *stats == state.last_stats {
            return;
        }

        let _ = write!(
            state.writer,
            "\rmodels: {}/{} metadata: {} unknown: {}",
            stats.models_scanned,
            stats.models_found,
            stats.metadata_records,
            stats.unknown_base_models
        );
        let _ = state.writer.flush();
        state.last_stats = *stats;
    }

    fn on_finish(&self, stats: &ScanStats) {
        self.on_update(stats);
        let mut state = self.state.borrow_mut();
        let _ = writeln!(state.writer);
        let _ = state.writer.flush();
    }
}

fn format_stats(stats: &ScanStats) -> String {
    format!(
        "models: {}/{} unknown: {}",
        stats.models_scanned, stats.models_found, stats.unknown_base_models
    )
}

#[cfg(test)]
mod tests {
    use super::format_stats;
    use crate::domain::ScanStats;

    #[test]
    fn format_stats_shows_progress_and_unknowns_only() {
        let stats = ScanStats {
            models_found: 4,
            models_scanned: 2,
            metadata_records: 99,
            unknown_base_models: 1,
        };

        assert_eq!(format_stats(&stats), "models: 2/4 unknown: 1");
    }
}
