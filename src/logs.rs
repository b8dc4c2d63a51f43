use std::{
    fs::{self, File},
    io,
    path::Path,
    sync::{mpsc, LazyLock, Mutex},
};

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use log::Log;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

// Optional subscriber that gets a copy of every log line, e.g. a debug panel.
static LOG_SINK: LazyLock<Mutex<Option<mpsc::Sender<String>>>> =
    LazyLock::new(|| Mutex::new(None));

pub struct MainLogger {
    write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>,
}

impl MainLogger {
    fn new(cache_dir: &str) -> Self {
        let path = Path::new(cache_dir).join("logs/main.log");
        let log = FileRotate::new(
            path,
            AppendTimestamp::default(FileLimit::MaxFiles(3)),
            ContentLimit::Lines(1000),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        let config = ConfigBuilder::new().set_time_format_rfc3339().build();
        Self {
            write_logger: WriteLogger::new(LevelFilter::Info, config, log),
        }
    }
}

impl Log for MainLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.write_logger.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_logger.log(record);

        let Ok(mut guard) = LOG_SINK.lock() else {
            return;
        };
        if let Some(tx) = guard.as_ref() {
            let message = format!(
                "{}:{} -- {}",
                record.level(),
                record.target(),
                record.args()
            );
            // the subscriber went away, stop sending
            if tx.send(message).is_err() {
                *guard = None;
            }
        }
    }

    fn flush(&self) {
        self.write_logger.flush();
    }
}

/// Installs the global logger, writing to `<cache_dir>/logs/main.log` with
/// rotation. Fails if a logger was already installed.
pub fn init(cache_dir: &str) -> Result<()> {
    log::set_boxed_logger(Box::new(MainLogger::new(cache_dir)))?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

pub fn set_log_sink(sink: mpsc::Sender<String>) {
    if let Ok(mut guard) = LOG_SINK.lock() {
        *guard = Some(sink);
    }
}

pub fn export(cache_dir: &str, target_file_path: &str) -> Result<()> {
    log::logger().flush();
    let mut zip = zip::ZipWriter::new(File::create(target_file_path)?);
    let default_options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let log_folder = Path::new(cache_dir).join("logs/");
    for entry in (fs::read_dir(&log_folder)?).flatten() {
        let path = entry.path();
        if path.is_file() {
            if let Some(name) = path.strip_prefix(cache_dir)?.to_str() {
                zip.start_file(name, default_options)?;
                let mut log_file = File::open(path)?;
                io::copy(&mut log_file, &mut zip)?;
            }
        }
    }

    zip.finish()?;
    Ok(())
}
