//! Log output that can be held back while a reply is being redrawn.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

struct State {
    out: Box<dyn Write + Send>,
    held: Option<Vec<u8>>,
}

/// A log destination that buffers records while held.
///
/// The live view redraws the streaming message by moving back over the rows
/// it printed, so nothing else may write to the terminal in between. Hold the
/// sink while a turn is running and release it once the reply is final.
#[derive(Clone)]
pub struct LogSink {
    state: Arc<Mutex<State>>,
}

impl LogSink {
    /// Creates a sink writing to `out`.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                out: Box::new(out),
                held: None,
            })),
        }
    }

    /// Creates a sink writing to stderr.
    #[inline]
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Buffers everything written from now on until [`LogSink::release`].
    pub fn hold(&self) {
        self.lock().held.get_or_insert_with(Vec::new);
    }

    /// Writes out what was buffered and stops buffering.
    pub fn release(&self) -> io::Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(held) = state.held.take() {
            state.out.write_all(&held)?;
            state.out.flush()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match &mut state.held {
            Some(held) => {
                held.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => state.out.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.held {
            Some(_) => Ok(()),
            None => state.out.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_hold_and_release() {
        let out = Shared::default();
        let mut sink = LogSink::new(out.clone());

        sink.write_all(b"first\n").unwrap();
        assert_eq!(out.text(), "first\n");

        sink.hold();
        sink.write_all(b"second\n").unwrap();
        sink.flush().unwrap();
        assert_eq!(out.text(), "first\n");

        sink.release().unwrap();
        assert_eq!(out.text(), "first\nsecond\n");

        // Releasing twice writes nothing more.
        sink.release().unwrap();
        sink.write_all(b"third\n").unwrap();
        assert_eq!(out.text(), "first\nsecond\nthird\n");
    }

    #[test]
    fn test_held_log_records() {
        let out = Shared::default();
        let sink = LogSink::new(out.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_ansi(false)
            .finish();

        sink.hold();
        tracing::subscriber::with_default(subscriber, || {
            info!("while streaming");
        });
        assert!(out.text().is_empty());

        sink.release().unwrap();
        assert!(out.text().contains("while streaming"));
    }
}
