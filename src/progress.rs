//! Progress bars for running jobs, and a tracing writer that prints above them.

use crate::jobs::AnalysisJob;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// A 0..=100 bar for one job, labelled with its URL
fn job_progress_bar(label: &str) -> ProgressBar {
    let pb = multi_progress().add(ProgressBar::new(100));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {prefix} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Mirror a job's updates onto its bar until the job reaches a terminal stage
pub fn track_job(mut updates: watch::Receiver<AnalysisJob>) -> JoinHandle<()> {
    let label = updates.borrow().target_url.clone();
    let pb = job_progress_bar(&label);

    tokio::spawn(async move {
        loop {
            let (stage, progress) = {
                let job = updates.borrow_and_update();
                (job.stage, job.progress_percent)
            };
            pb.set_position(u64::from(progress));
            if stage.is_terminal() {
                pb.finish_with_message(stage.to_string());
                return;
            }
            pb.set_message(stage.to_string());
            if updates.changed().await.is_err() {
                pb.abandon();
                return;
            }
        }
    })
}

fn print_line(line: &str) {
    let _ = multi_progress().println(line.trim_end_matches('\r'));
}

/// Routes tracing output through the shared [`MultiProgress`]
#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    pending: String,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.pending.find('\n') {
            print_line(&self.pending[..end]);
            self.pending.drain(..=end);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            print_line(self.pending.trim_end_matches('\n'));
            self.pending.clear();
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
        LogWriter {
            pending: String::new(),
        }
    }
}
