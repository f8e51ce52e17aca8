//! Event stream rendering
//!
//! Drains the engine's event channel and turns it into terminal
//! progress lines (or JSON lines with --json). Runs concurrently with
//! the command future.

use urpm_events::{Event, EventReceiver};

/// Consumes events until the channel closes
pub struct EventPrinter {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl EventPrinter {
    pub async fn run(self, mut rx: EventReceiver) {
        while let Some(event) = rx.recv().await {
            self.print(&event);
        }
    }

    fn print(&self, event: &Event) {
        if self.json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        if self.quiet {
            return;
        }

        match event {
            Event::DownloadStarted {
                url, resumed_from, ..
            } => {
                if *resumed_from > 0 {
                    eprintln!("resuming {url} from byte {resumed_from}");
                } else {
                    eprintln!("downloading {url}");
                }
            }
            Event::DownloadProgress {
                url,
                bytes_downloaded,
                total_bytes,
            } => {
                if self.verbose && *total_bytes > 0 {
                    let pct = bytes_downloaded * 100 / total_bytes;
                    eprint!("\r{url}: {pct}%");
                }
            }
            Event::DownloadCompleted { url, .. } => {
                if self.verbose {
                    eprintln!("\rfetched {url}");
                }
            }
            Event::DownloadFailed { url, error } => {
                eprintln!("download failed: {url}: {error}");
            }
            Event::PeerHit { nevra, host, .. } => {
                eprintln!("{nevra}: from peer {host}");
            }
            Event::SyncStarted { media } => eprintln!("refreshing {media}"),
            Event::SyncDiffComputed {
                media,
                added,
                removed,
                unchanged,
            } => {
                eprintln!("{media}: +{added} -{removed} ={unchanged}");
            }
            Event::SyncFailed { media, error } => {
                eprintln!("{media}: refresh failed: {error}");
            }
            Event::PackageSkipped { name, reason } => {
                eprintln!("skipping {name}: {reason}");
            }
            Event::RpmProgress {
                nevra,
                phase,
                percent,
            } => {
                if self.verbose {
                    eprintln!("{nevra}: {phase:?} {percent}%");
                }
            }
            Event::TransactionFailed { error, .. } => {
                eprintln!("transaction failed: {error}");
            }
            Event::Warning { message, .. } => eprintln!("warning: {message}"),
            Event::Error { message, .. } => eprintln!("error: {message}"),
            _ => {}
        }
    }
}
