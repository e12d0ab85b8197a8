use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Wraps each field of a log line in brackets.
///
/// Format: `[TIMESTAMP] [LEVEL] [SCOPE] [TARGET: FILE:LINE]: MESSAGE`. The file and line
/// part is only written when `with_location` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketedFormatter {
    pub with_location: bool,
}

impl<S, N> FormatEvent<S, N> for BracketedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let now = chrono::Local::now();
        write!(writer, "[{}] ", now.format("%Y-%m-%dT%H:%M:%S%.3f"))?;
        write!(writer, "[{:5}] ", metadata.level())?;

        // Innermost span, else the last module of the target
        let scope = match ctx.event_scope() {
            Some(scope) => scope.from_root().last().map(|span| span.name()),
            None => metadata.target().rsplit("::").next(),
        };
        write!(writer, "[{}] ", scope.unwrap_or("unknown"))?;

        match (self.with_location, metadata.file(), metadata.line()) {
            (true, Some(file), Some(line)) => {
                write!(writer, "[{}: {}:{}]: ", metadata.target(), file, line)?
            }
            _ => write!(writer, "[{}]: ", metadata.target())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_is_bracketed() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .event_format(BracketedFormatter { with_location: true })
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Loaded {} records", 3);
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("[INFO"), "{}", output);
        assert!(output.contains("formatter.rs:"), "{}", output);
        assert!(output.trim_end().ends_with("Loaded 3 records"), "{}", output);
    }
}
