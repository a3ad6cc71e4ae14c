use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    prelude::*,
};

/// Routes formatted console log lines through the UI channel so they are printed above the
/// progress bars instead of tearing them.
#[derive(Clone)]
pub struct UiLogWriter {
    sender: mpsc::Sender<UiEvent>,
}

impl UiLogWriter {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }
}

impl io::Write for UiLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        if !line.is_empty() && self.sender.try_send(UiEvent::Log(line.clone())).is_err() {
            eprintln!("{line}");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for UiLogWriter {
    type Writer = UiLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: &Option<PathBuf>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(UiLogWriter::new(ui_sender))
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(level_filter(verbosity, quiet));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            let (sender, _receiver) = mpsc::channel(16);
            setup_logging(3, false, &None, sender).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn file_logging_can_be_added_to_global_logger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("test.log");

        let file = File::create(log_path.clone()).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            debug!("Message for file-only test.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Message for file-only test."));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    fn ui_writer_forwards_trimmed_lines() {
        let (sender, mut receiver) = mpsc::channel(4);
        let mut writer = UiLogWriter::new(sender);
        writer.write_all(b"relaxation finished\n").unwrap();
        writer.write_all(b"\n").unwrap();

        match receiver.try_recv().unwrap() {
            UiEvent::Log(line) => assert_eq!(line, "relaxation finished"),
            other => panic!("Unexpected event: {other:?}"),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn quiet_keeps_errors_only() {
        assert_eq!(level_filter(2, true), LevelFilter::ERROR);
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(5, false), LevelFilter::TRACE);
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let (sender, _receiver) = mpsc::channel(1);
            let result = setup_logging(0, false, &Some(invalid_path), sender);
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
