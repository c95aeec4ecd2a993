// Background reader
//
// A producer thread pulls chunks from any `Read` source, scans them, and
// publishes rows to a RowChannel. The consumer side waits on the channel and
// pops rows in order. When the source is exhausted (or fails) the producer
// signals stop so waiting consumers wake up.

use crate::core::{Classifier, Dialect, Row, RowChannel, Scanner};
use crate::error::{Error, Result};
use log::debug;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default read size for the producer thread (10 MB).
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

struct Shared {
    rows: Arc<RowChannel>,
    bytes_read: AtomicU64,
    cancelled: AtomicBool,
}

/// Raises the stop signal however the producer exits, panics included.
struct StopOnDrop(Arc<RowChannel>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.signal_stop();
    }
}

/// Row iterator backed by a producer thread.
///
/// Dropping a `Reader` cancels the producer without waiting for it. A
/// producer blocked inside `read` exits once that read returns; use
/// [`join`](Reader::join) to wait for it explicitly.
pub struct Reader {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<io::Result<()>>>,
    rows_read: usize,
}

impl Reader {
    pub fn from_reader<R>(source: R, dialect: &Dialect) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::with_chunk_size(source, dialect, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size<R>(source: R, dialect: &Dialect, chunk_size: usize) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        dialect.validate()?;
        let classifier = Arc::new(Classifier::new(dialect));
        let rows = Arc::new(RowChannel::new());

        let shared = Arc::new(Shared {
            rows,
            bytes_read: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("csvscan-reader".into())
                .spawn(move || produce(source, classifier, &shared, chunk_size.max(1)))?
        };

        Ok(Reader {
            shared,
            worker: Some(worker),
            rows_read: 0,
        })
    }

    /// Next row, blocking until the producer has one. `None` once the input
    /// is exhausted; a read error is reported after the rows before it.
    pub fn read_row(&mut self) -> Option<Result<Row>> {
        let rows = &self.shared.rows;
        loop {
            if let Some(row) = rows.try_pop_front() {
                self.rows_read += 1;
                return Some(Ok(row));
            }
            if rows.is_stopped() {
                // Rows pushed between the pop and the stop check
                if let Some(row) = rows.try_pop_front() {
                    self.rows_read += 1;
                    return Some(Ok(row));
                }
                return self.join_worker().err().map(Err);
            }
            rows.wait_until_nonempty_or_stopped();
        }
    }

    /// Rows handed out so far.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Bytes pulled from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.shared.bytes_read.load(Ordering::Relaxed)
    }

    /// The underlying channel, for consumers that drain it directly.
    pub fn rows(&self) -> Arc<RowChannel> {
        Arc::clone(&self.shared.rows)
    }

    /// Wait for the producer to finish and report how it ended.
    pub fn join(mut self) -> Result<()> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result.map_err(Error::from),
                Err(_) => Err(Error::Io(io::Error::other("reader thread panicked"))),
            },
            None => Ok(()),
        }
    }
}

impl Iterator for Reader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row()
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
        // Detach: the producer may be blocked in a read that never returns
        self.worker.take();
    }
}

fn produce<R: Read>(
    mut source: R,
    classifier: Arc<Classifier>,
    shared: &Shared,
    chunk_size: usize,
) -> io::Result<()> {
    let _stop = StopOnDrop(Arc::clone(&shared.rows));
    let mut scanner = Scanner::new(classifier, Arc::clone(&shared.rows));
    let mut buf = vec![0u8; chunk_size];
    debug!("reader thread started, chunk size {}", chunk_size);

    let result = loop {
        if shared.cancelled.load(Ordering::Relaxed) {
            debug!("reader cancelled after {} rows", scanner.rows_emitted());
            break Ok(());
        }
        match source.read(&mut buf) {
            Ok(0) => {
                scanner.finish();
                break Ok(());
            }
            Ok(n) => {
                scanner.scan(&buf[..n], false);
                shared.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        }
    };

    debug!(
        "reader thread finished: {} rows, {} bytes",
        scanner.rows_emitted(),
        shared.bytes_read.load(Ordering::Relaxed)
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Source that blocks until its sender sends data or goes away.
    struct Pipe {
        rx: mpsc::Receiver<Vec<u8>>,
        pending: Cursor<Vec<u8>>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                let n = self.pending.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                match self.rx.recv() {
                    Ok(data) => self.pending = Cursor::new(data),
                    Err(_) => return Ok(0),
                }
            }
        }
    }

    struct FailAfter {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away")),
                n => Ok(n),
            }
        }
    }

    fn collect(reader: Reader) -> Vec<Vec<String>> {
        reader.map(|r| r.unwrap().to_strings()).collect()
    }

    #[test]
    fn test_reader_small_chunks() {
        let input = b"a,b,\"c,d\"\ne,f,g".to_vec();
        let reader = Reader::with_chunk_size(Cursor::new(input), &Dialect::default(), 3).unwrap();
        assert_eq!(
            collect(reader),
            vec![vec!["a", "b", "c,d"], vec!["e", "f", "g"]]
        );
    }

    #[test]
    fn test_reader_counts() {
        let input = b"1\n2\n3\n".to_vec();
        let mut reader = Reader::from_reader(Cursor::new(input), &Dialect::default()).unwrap();
        while let Some(row) = reader.read_row() {
            row.unwrap();
        }
        assert_eq!(reader.rows_read(), 3);
        assert_eq!(reader.bytes_read(), 6);
        assert!(reader.join().is_ok());
    }

    #[test]
    fn test_reader_reports_error_after_rows() {
        let source = FailAfter {
            data: Cursor::new(b"x,y\npartial".to_vec()),
        };
        let mut reader = Reader::with_chunk_size(source, &Dialect::default(), 4).unwrap();
        let first = reader.read_row().unwrap().unwrap();
        assert_eq!(first.to_strings(), vec!["x", "y"]);
        assert!(matches!(reader.read_row(), Some(Err(Error::Io(_)))));
        assert!(reader.read_row().is_none());
    }

    #[test]
    fn test_reader_rejects_bad_dialect() {
        let dialect = Dialect::default().with_newlines(b",");
        assert!(matches!(
            Reader::from_reader(Cursor::new(Vec::new()), &dialect),
            Err(Error::Dialect(_))
        ));
    }

    #[test]
    fn test_drop_does_not_wait_for_blocked_read() {
        let (tx, rx) = mpsc::channel();
        let source = Pipe {
            rx,
            pending: Cursor::new(Vec::new()),
        };
        let mut reader = Reader::with_chunk_size(source, &Dialect::default(), 16).unwrap();
        tx.send(b"a,b\n".to_vec()).unwrap();
        assert_eq!(reader.read_row().unwrap().unwrap().to_strings(), vec!["a", "b"]);

        // The producer is now parked in `recv`
        let started = Instant::now();
        drop(reader);
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(tx);
    }

    #[test]
    fn test_join_after_pipe_closes() {
        let (tx, rx) = mpsc::channel();
        let source = Pipe {
            rx,
            pending: Cursor::new(Vec::new()),
        };
        let mut reader = Reader::with_chunk_size(source, &Dialect::default(), 16).unwrap();
        tx.send(b"x\ny".to_vec()).unwrap();
        drop(tx);
        let rows: Vec<_> = reader.by_ref().map(|r| r.unwrap().to_strings()).collect();
        assert_eq!(rows, vec![vec!["x"], vec!["y"]]);
        assert!(reader.join().is_ok());
    }

    #[test]
    fn test_drop_before_end() {
        let input = b"a\n".repeat(10_000);
        let mut reader = Reader::with_chunk_size(Cursor::new(input), &Dialect::default(), 16).unwrap();
        assert!(reader.read_row().is_some());
        drop(reader);
    }
}
