//! The cache database persists successful results between sessions, so a
//! fresh process can still get cache hits.
//!
//! Layout: a magic header, then one record per entry:
//!   name length (u32 LE), name bytes, fingerprint (two u64 LE),
//!   artifact flag (u8), and if set, artifact length (u32 LE) and bytes.
//! All lengths are little-endian.  Failed results are never written.

use crate::cache::{Cache, Outcome};
use crate::error::{Error, Result};
use crate::hash::Fingerprint;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

const MAGIC: &[u8; 8] = b"incbld01";

struct Writer<W: Write> {
    w: W,
}

impl<W: Write> Writer<W> {
    fn write_u32(&mut self, n: u32) -> std::io::Result<()> {
        self.w.write_all(&n.to_le_bytes())
    }

    fn write_u64(&mut self, n: u64) -> std::io::Result<()> {
        self.w.write_all(&n.to_le_bytes())
    }

    fn write_str(&mut self, s: &str) -> std::io::Result<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "string too long"))?;
        self.write_u32(len)?;
        self.w.write_all(s.as_bytes())
    }

    fn write_entry(
        &mut self,
        name: &str,
        fingerprint: Fingerprint,
        outcome: &Outcome,
    ) -> std::io::Result<()> {
        self.write_str(name)?;
        self.write_u64(fingerprint.0)?;
        self.write_u64(fingerprint.1)?;
        match &outcome.artifact {
            Some(artifact) => {
                self.w.write_all(&[1])?;
                self.write_str(artifact)
            }
            None => self.w.write_all(&[0]),
        }
    }

    fn write_cache(&mut self, entries: &[(String, Fingerprint, Arc<Outcome>)]) -> std::io::Result<()> {
        self.w.write_all(MAGIC)?;
        for (name, fingerprint, outcome) in entries {
            self.write_entry(name, *fingerprint, outcome)?;
        }
        self.w.flush()
    }
}

/// Reading fails with a human-readable reason; the caller attaches the path.
type ReadResult<T> = std::result::Result<T, String>;

struct Reader<R: Read> {
    r: R,
}

impl<R: Read> Reader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> ReadResult<()> {
        self.r.read_exact(buf).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => "truncated record".to_string(),
            _ => err.to_string(),
        })
    }

    fn read_u32(&mut self) -> ReadResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> ReadResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_str(&mut self, len: u32) -> ReadResult<String> {
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| "non-UTF-8 string".to_string())
    }

    /// Reads the leading length of a record, or None at a clean end of file.
    fn read_record_start(&mut self) -> ReadResult<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut have = 0;
        while have < buf.len() {
            match self.r.read(&mut buf[have..]) {
                Ok(0) if have == 0 => return Ok(None),
                Ok(0) => return Err("truncated record".to_string()),
                Ok(n) => have += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.to_string()),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_entries(&mut self, cache: &Cache) -> ReadResult<()> {
        let mut magic = [0u8; 8];
        self.read_exact(&mut magic)
            .map_err(|_| "missing header".to_string())?;
        if &magic != MAGIC {
            return Err("bad header".to_string());
        }

        while let Some(name_len) = self.read_record_start()? {
            let name = self.read_str(name_len)?;
            let fingerprint = Fingerprint(self.read_u64()?, self.read_u64()?);
            let mut flag = [0u8; 1];
            self.read_exact(&mut flag)?;
            let outcome = match flag[0] {
                0 => Outcome::succeeded(),
                1 => {
                    let len = self.read_u32()?;
                    Outcome::with_artifact(self.read_str(len)?)
                }
                other => return Err(format!("bad artifact flag {}", other)),
            };
            cache.record(&name, fingerprint, Arc::new(outcome));
        }
        Ok(())
    }
}

/// Writes every successful cache entry to `path`, replacing the file
/// atomically.
pub fn save(cache: &Cache, path: &Path) -> Result<()> {
    let io_err = |source: std::io::Error| Error::Io {
        path: path.to_owned(),
        source,
    };
    let tmp = path.with_extension("tmp");
    let entries = cache.successes();
    let file = File::create(&tmp).map_err(io_err)?;
    let mut w = Writer {
        w: BufWriter::new(file),
    };
    w.write_cache(&entries).map_err(io_err)?;
    // Close the file before renaming it into place.
    drop(w);
    std::fs::rename(&tmp, path).map_err(io_err)?;
    tracing::debug!(path = %path.display(), entries = entries.len(), "saved cache");
    Ok(())
}

/// Reads a cache written by `save`.  A missing file is an empty cache.
pub fn load(path: &Path) -> Result<Cache> {
    let cache = Cache::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(cache),
        Err(source) => {
            return Err(Error::Io {
                path: path.to_owned(),
                source,
            })
        }
    };
    let mut r = Reader {
        r: BufReader::new(file),
    };
    r.read_entries(&cache).map_err(|reason| Error::CorruptCache {
        path: path.to_owned(),
        reason,
    })?;
    tracing::debug!(path = %path.display(), entries = cache.len(), "loaded cache");
    Ok(cache)
}
