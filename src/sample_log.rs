//! Time-series sample logging for `--log-cwnd`/`--log-rtt`
//!
//! The adaptive pipelines optionally append one `elapsed_ms,value` line per
//! congestion-window change or RTT sample, per `spec.md` §6's `--log-cwnd
//! PATH`/`--log-rtt PATH`. A missing log is simply `None` — nothing is
//! written and no sample is dropped because of it.

use std::fs::File;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

/// An open, append-only sample log shared by every pipeline task writing to
/// it (cheap to clone; the underlying file handle is reference-counted).
#[derive(Clone)]
pub struct SampleLog(Arc<Mutex<File>>);

impl SampleLog {
    /// Wrap an already-open file as a sample log.
    pub fn new(file: File) -> Self {
        SampleLog(Arc::new(Mutex::new(file)))
    }

    /// Append one `elapsed_ms,value` line. A write failure is logged and
    /// otherwise ignored — a broken sample log must never fail the fetch
    /// itself.
    pub fn record(&self, elapsed: Duration, value: f64) {
        let line = format!("{},{value:.6}\n", elapsed.as_millis());
        if let Err(e) = self.0.lock().unwrap().write_all(line.as_bytes()) {
            warn!(error = %e, "failed to write sample log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn records_append_as_csv_lines() {
        let file = tempfile_like();
        let log = SampleLog::new(file.try_clone().unwrap());
        log.record(Duration::from_millis(10), 2.0);
        log.record(Duration::from_millis(25), 2.5);

        let mut file = file;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "10,2.000000\n25,2.500000\n");
    }

    fn tempfile_like() -> File {
        let path = std::env::temp_dir().join(format!(
            "segfetch-sample-log-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .unwrap()
    }
}
