//! Console output for a run: status lines and the page progress bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use book_downloader_core::{DownloadStats, StatusKind, StatusLine, WorkflowObserver};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Spawns the page progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_bar` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    stats: Arc<DownloadStats>,
    total: usize,
) -> (Option<JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_bar {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar_inner(stats, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bar_inner(
    stats: Arc<DownloadStats>,
    total: usize,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} pages {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        loop {
            let stopping = stop.load(Ordering::SeqCst);
            bar.set_position(stats.total().min(total) as u64);
            let failed = stats.failed();
            if failed > 0 {
                bar.set_message(format!("({failed} failed)"));
            }
            if stopping {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        bar.finish_and_clear();
    })
}

/// Prints status lines to stdout and drives the progress bar.
///
/// In quiet mode only failures and warnings are printed, to stderr, and the
/// bar is hidden.
pub(crate) struct ConsoleObserver {
    quiet: bool,
    progress: Mutex<Option<(JoinHandle<()>, Arc<AtomicBool>)>>,
}

impl ConsoleObserver {
    pub(crate) fn new(quiet: bool) -> Self {
        Self {
            quiet,
            progress: Mutex::new(None),
        }
    }

    /// Stops the progress bar and waits for it to clear.
    pub(crate) async fn finish(&self) {
        let running = self
            .progress
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);
        if let Some((handle, stop)) = running {
            stop.store(true, Ordering::SeqCst);
            let _ = handle.await;
        }
    }
}

impl WorkflowObserver for ConsoleObserver {
    fn status(&self, line: StatusLine) {
        match line.kind {
            StatusKind::Failure | StatusKind::Warning => eprintln!("{line}"),
            StatusKind::Info | StatusKind::Success if !self.quiet => println!("{line}"),
            StatusKind::Info | StatusKind::Success => {}
        }
    }

    fn download_started(&self, pages: usize, stats: Arc<DownloadStats>) {
        let (handle, stop) = spawn_progress_ui(!self.quiet, stats, pages);
        if let Some(handle) = handle
            && let Ok(mut guard) = self.progress.lock()
        {
            *guard = Some((handle, stop));
        }
    }

    fn download_finished(&self) {
        if let Ok(guard) = self.progress.lock()
            && let Some((_, stop)) = guard.as_ref()
        {
            stop.store(true, Ordering::SeqCst);
        }
    }
}
