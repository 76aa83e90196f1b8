//! Kernel Log Sink
//!
//! A [`log::Log`] backend for the embedding: records are formatted as
//! `[LEVEL] target: message` lines and written to any [`core::fmt::Write`]
//! sink, typically the board's UART. Line feeds become CRLF for serial
//! terminals.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Adapts a sink so every `\n` is preceded by `\r`.
struct Crlf<'a, W: Write>(&'a mut W);

impl<W: Write> Write for Crlf<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (i, line) in s.split('\n').enumerate() {
            if i > 0 {
                self.0.write_str("\r\n")?;
            }
            self.0.write_str(line)?;
        }
        Ok(())
    }
}

/// Serialising logger over a text sink.
pub struct KernelLogger<W> {
    sink: Mutex<W>,
    level: LevelFilter,
}

impl<W: Write + Send> KernelLogger<W> {
    pub const fn new(sink: W, level: LevelFilter) -> Self {
        Self {
            sink: Mutex::new(sink),
            level,
        }
    }

    /// Make this the global logger. Fails if one is already installed.
    pub fn install(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }

    /// Run `f` on the sink, e.g. to flush or inspect it.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.sink.lock())
    }
}

impl<W: Write + Send> Log for KernelLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut sink = self.sink.lock();
        // Nowhere to report a failing sink.
        let _ = writeln!(
            Crlf(&mut *sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn emit(logger: &KernelLogger<String>, level: Level, args: fmt::Arguments) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("s3k_kernel::cap")
                .args(args)
                .build(),
        );
    }

    #[test]
    fn test_formats_line() {
        let logger = KernelLogger::new(String::new(), LevelFilter::Debug);
        emit(&logger, Level::Info, format_args!("derived {}", 3));
        assert_eq!(
            logger.with_sink(|s| s.clone()),
            "[INFO] s3k_kernel::cap: derived 3\r\n"
        );
    }

    #[test]
    fn test_filters_level() {
        let logger = KernelLogger::new(String::new(), LevelFilter::Info);
        emit(&logger, Level::Trace, format_args!("noise"));
        assert!(logger.with_sink(|s| s.is_empty()));
    }

    #[test]
    fn test_multiline_message() {
        let logger = KernelLogger::new(String::new(), LevelFilter::Trace);
        emit(&logger, Level::Warn, format_args!("a\nb"));
        assert_eq!(
            logger.with_sink(|s| s.clone()),
            "[WARN] s3k_kernel::cap: a\r\nb\r\n"
        );
    }
}
