use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_WAL_FRAME_LEN;
use crate::model::Event;

const FRAME_OVERHEAD: u64 = 8;

/// Write one `[len][bincode][crc32]` frame.
fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_WAL_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "event too large"));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn EOF.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of scanning a log file from the start.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte offset just past the last intact frame.
    pub valid_len: u64,
    /// Bytes after `valid_len` that were torn or failed their checksum.
    pub discarded: u64,
}

/// Append-only write-ahead log of store events.
///
/// Entry format: `[u32 LE: len][bincode: Event][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail ends replay; [`Wal::open`] truncates it away so
/// later appends stay reachable. A failed [`Wal::commit`] cuts the file back
/// to `committed_len` for the same reason.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Length of the log through the last durable batch.
    committed_len: u64,
    /// A rollback failed; the tail past `committed_len` must go before the next write.
    dirty_tail: bool,
    appends_since_compact: u64,
    /// Next write stops after this many bytes and fails.
    #[cfg(test)]
    fail_write_after: Option<usize>,
}

impl Wal {
    /// Replay the log at `path`, cut off any damaged tail and open it for appending.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        if replay.discarded > 0 {
            tracing::warn!(
                path = %path.display(),
                discarded = replay.discarded,
                "truncating damaged WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let wal = Self {
            file,
            path: path.to_path_buf(),
            committed_len: replay.valid_len,
            dirty_tail: false,
            // Replayed entries count toward the next compaction.
            appends_since_compact: replay.events.len() as u64,
            #[cfg(test)]
            fail_write_after: None,
        };
        Ok((wal, replay.events))
    }

    /// Scan the file without modifying it. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_WAL_FRAME_LEN {
                break;
            }
            let mut payload = vec![0u8; len];
            if !read_or_eof(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            let Ok(event) = bincode::deserialize::<Event>(&payload) else {
                break;
            };
            replay.events.push(event);
            replay.valid_len += len as u64 + FRAME_OVERHEAD;
        }

        replay.discarded = total - replay.valid_len;
        Ok(replay)
    }

    /// Append `events` as one batch sharing a single fsync.
    ///
    /// All or nothing: on any write or sync error the file is cut back to
    /// its length before the batch.
    pub fn commit<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        let mut bytes = Vec::new();
        let mut count = 0u64;
        for event in events {
            write_frame(&mut bytes, event)?;
            count += 1;
        }
        if self.dirty_tail {
            self.truncate_to_committed()?;
        }
        if count == 0 {
            return Ok(());
        }
        if let Err(e) = self.write_durable(&bytes) {
            if let Err(cut) = self.truncate_to_committed() {
                tracing::error!(
                    path = %self.path.display(),
                    error = %cut,
                    "WAL rollback failed; retrying before next write"
                );
            }
            return Err(e);
        }
        self.committed_len += bytes.len() as u64;
        self.appends_since_compact += count;
        Ok(())
    }

    fn write_durable(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(cut) = self.fail_write_after.take() {
            self.file.write_all(&bytes[..cut.min(bytes.len())])?;
            return Err(io::Error::other("write failed mid-frame"));
        }
        self.file.write_all(bytes)?;
        self.file.sync_all()
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        self.dirty_tail = true;
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()?;
        self.dirty_tail = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.commit([event])
    }

    #[cfg(test)]
    pub(crate) fn fail_next_write_after(&mut self, bytes: usize) {
        self.fail_write_after = Some(bytes);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the whole log with `events`: write a temp file, fsync, rename over.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                write_frame(&mut tmp, event)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.dirty_tail = false;
        self.appends_since_compact = 0;
        Ok(())
    }
}
