//! Page progress bar and a log writer that keeps it pinned
//!
//! Log lines are routed through the shared [`MultiProgress`] so they print
//! above the bar instead of tearing through it.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const PAGE_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Progress bar over the pages of one material, `None` when there are none
pub fn page_progress(pages: usize, title: &str) -> Option<ProgressBar> {
    if pages == 0 {
        return None;
    }

    let style = ProgressStyle::with_template(PAGE_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let pb = multi_progress().add(ProgressBar::new(pages as u64));
    pb.set_style(style);
    pb.set_message(title.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Move the bar one page forward and show the page being handled
pub fn advance(pb: Option<&ProgressBar>, label: &str) {
    if let Some(pb) = pb {
        pb.set_message(label.to_string());
        pb.inc(1);
    }
}

pub fn finish(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// [`MakeWriter`] for the fmt layer
#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Buffers partial writes and prints whole lines above the progress bars
#[derive(Default)]
pub struct LogWriter {
    pending: String,
}

/// Hidden targets (stderr not a terminal) swallow `println`, so write there directly
fn print_line(line: &str) {
    let line = line.trim_end_matches('\r');
    let mp = multi_progress();
    if mp.is_hidden() {
        let _ = writeln!(io::stderr().lock(), "{}", line);
    } else {
        let _ = mp.println(line);
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));

        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            print_line(line.trim_end_matches('\n'));
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            print_line(rest.trim_end_matches('\n'));
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::default()
    }
}
