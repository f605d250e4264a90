//! Streaming tar archive of project files
//!
//! The archive is produced on a blocking thread and handed to the consumer
//! through a bounded channel of byte chunks. When the consumer (the HTTP body)
//! stops pulling, the channel fills up and the producer blocks, so the
//! project tree is never held in memory.

use crate::enumerate::{CandidateFile, EnumerateError};
use bytes::{Bytes, BytesMut};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::Stream;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Size at which a buffered chunk is sent to the consumer
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks in flight before the producer blocks
pub const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error("failed to archive {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to finish archive: {0}")]
    Finish(#[source] io::Error),

    /// The consumer stopped reading; `selected` counts every file of the
    /// selection, archived or not
    #[error("archive consumer closed the stream")]
    ConsumerClosed { selected: usize },

    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Files to put in the archive
pub enum ArchiveSource {
    /// An explicit selection (incremental uploads)
    Files(Vec<CandidateFile>),
    /// Everything the walk yields, archived as it is enumerated (full uploads)
    Walk(Box<dyn Iterator<Item = Result<CandidateFile, EnumerateError>> + Send>),
}

/// Archive encoding options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// gzip level 1-9; 0 sends a plain tar
    pub compression_level: u32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: 9,
        }
    }
}

impl ArchiveOptions {
    pub fn is_compressed(&self) -> bool {
        self.compression_level > 0
    }

    /// MIME type of the produced stream
    pub fn content_type(&self) -> &'static str {
        if self.is_compressed() {
            "application/gzip"
        } else {
            "application/x-tar"
        }
    }
}

/// What was written once the archive completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Files appended to the archive
    pub files: usize,
    /// Bytes handed to the consumer
    pub bytes: u64,
}

/// Consumer side of the archive: a stream of byte chunks
///
/// Ends with an `Err` item when the producer fails, so an HTTP body built from
/// it is aborted instead of completing with a truncated archive.
pub struct ArchiveStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    content_type: &'static str,
}

impl ArchiveStream {
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Producer side of the archive
pub struct ArchiveTask {
    handle: JoinHandle<Result<ArchiveSummary, ArchiveError>>,
}

impl ArchiveTask {
    /// Wait for the producer to finish
    pub async fn finish(self) -> Result<ArchiveSummary, ArchiveError> {
        self.handle.await?
    }
}

/// Start producing an archive of `source`, rooted at `root`
///
/// Must be called from within a tokio runtime.
pub fn spawn_archive(
    root: PathBuf,
    source: ArchiveSource,
    options: ArchiveOptions,
) -> (ArchiveStream, ArchiveTask) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let stream = ArchiveStream {
        rx,
        content_type: options.content_type(),
    };

    let handle = tokio::task::spawn_blocking(move || {
        let summary = write_archive(&root, source, options, &tx)?;
        debug!(
            "Archive complete: {} files, {} bytes",
            summary.files, summary.bytes
        );
        Ok(summary)
    });

    (stream, ArchiveTask { handle })
}

fn write_archive(
    root: &Path,
    source: ArchiveSource,
    options: ArchiveOptions,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> Result<ArchiveSummary, ArchiveError> {
    let writer = ChannelWriter::new(tx.clone());

    let (files, mut writer) = if options.is_compressed() {
        let level = Compression::new(options.compression_level.min(9));
        let mut builder = tar::Builder::new(GzEncoder::new(writer, level));
        let files = append_entries(&mut builder, root, source, tx)?;
        let writer = builder
            .into_inner()
            .and_then(GzEncoder::finish)
            .map_err(|err| abort(tx, ArchiveError::Finish(err), || files))?;
        (files, writer)
    } else {
        let mut builder = tar::Builder::new(writer);
        let files = append_entries(&mut builder, root, source, tx)?;
        let writer = builder
            .into_inner()
            .map_err(|err| abort(tx, ArchiveError::Finish(err), || files))?;
        (files, writer)
    };

    writer
        .flush()
        .map_err(|err| abort(tx, ArchiveError::Finish(err), || files))?;

    Ok(ArchiveSummary {
        files,
        bytes: writer.sent,
    })
}

/// Append every file, or poison the stream before the builder is dropped
///
/// `tar::Builder` writes the end-of-archive marker when dropped; the error
/// item has to reach the consumer first. When the consumer went away, the
/// rest of the selection is still counted so the attempt can be reported.
fn append_entries<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    source: ArchiveSource,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> Result<usize, ArchiveError> {
    builder.follow_symlinks(true);

    let mut files: Box<dyn Iterator<Item = Result<CandidateFile, EnumerateError>> + Send> =
        match source {
            ArchiveSource::Files(files) => Box::new(files.into_iter().map(Ok)),
            ArchiveSource::Walk(walk) => walk,
        };

    let mut count = 0;
    while let Some(file) = files.next() {
        let appended = file
            .map_err(ArchiveError::from)
            .and_then(|file| append_file(builder, root, &file));
        if let Err(err) = appended {
            return Err(abort(tx, err, || count + 1 + files.filter(Result::is_ok).count()));
        }
        count += 1;
    }
    Ok(count)
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    file: &CandidateFile,
) -> Result<(), ArchiveError> {
    trace!("Archiving {}", file.path.display());
    builder
        .append_path_with_name(root.join(&file.path), &file.path)
        .map_err(|source| ArchiveError::File {
            path: file.path.clone(),
            source,
        })
}

/// Send the error to the consumer, then hand it back
///
/// A channel that is already closed means the consumer gave up first, which
/// is what made the write fail; `selected` then sizes the abandoned attempt.
fn abort(
    tx: &mpsc::Sender<io::Result<Bytes>>,
    err: ArchiveError,
    selected: impl FnOnce() -> usize,
) -> ArchiveError {
    if tx.is_closed() {
        return ArchiveError::ConsumerClosed {
            selected: selected(),
        };
    }
    let _ = tx.blocking_send(Err(io::Error::other(err.to_string())));
    err
}

/// `io::Write` adapter feeding the bounded channel
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
    sent: u64,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
            sent: 0,
        }
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let chunk = self.buf.split().freeze();
        let len = chunk.len() as u64;
        // Blocks while the channel is full
        self.tx.blocking_send(Ok(chunk)).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer went away")
        })?;
        self.sent += len;
        Ok(())
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_chunk()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_chunk()
    }
}
