//! A single 128-bit fingerprint over a node's inputs and its dependencies'
//! fingerprints is recorded and used to determine when the node must run.
//!
//! Dependency fingerprints are folded in before the node's own inputs, so a
//! change anywhere upstream changes every fingerprint downstream of it.

use crate::graph::{Graph, Input, NodeId};
use crate::spooky::{SpookyHasher, SPOOKY_CONST};
use crate::state::Store;
use std::borrow::Cow;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// A 128-bit content digest, as two 64-bit halves.  Used as the cache key
/// for a node's result.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64, pub u64);

impl Fingerprint {
    /// The seed used when the caller doesn't pick one.
    pub const DEFAULT_SEED: Fingerprint = Fingerprint(SPOOKY_CONST, SPOOKY_CONST);

    /// Renders 32 hex digits: the first half then the second, each half
    /// least-significant nibble first.
    pub fn to_hex(&self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(32);
        for half in [self.0, self.1] {
            let mut v = half;
            for _ in 0..16 {
                out.push(HEX[(v & 0xF) as usize] as char);
                v >>= 4;
            }
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming fingerprint computation.
#[derive(Clone)]
pub struct FingerprintHasher(SpookyHasher);

impl Default for FingerprintHasher {
    fn default() -> Self {
        FingerprintHasher::new(Fingerprint::DEFAULT_SEED)
    }
}

impl FingerprintHasher {
    pub fn new(seed: Fingerprint) -> Self {
        FingerprintHasher(SpookyHasher::new(seed.0, seed.1))
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Folds the string's UTF-8 bytes.  Digests of strings therefore differ
    /// from hashers that fold UTF-16 code units.
    pub fn update_str(&mut self, s: &str) {
        self.0.update(s.as_bytes());
    }

    pub fn update_u64(&mut self, value: u64) {
        self.0.update_u64(value);
    }

    /// Folds a marker for an absent input, so that an absent input hashes
    /// differently from an omitted one.
    pub fn update_absent(&mut self) {
        self.0.update_u64(SPOOKY_CONST);
    }

    pub fn update_fingerprint(&mut self, fingerprint: Fingerprint) {
        self.0.update_u64(fingerprint.0);
        self.0.update_u64(fingerprint.1);
    }

    pub fn finish(&self) -> Fingerprint {
        let (a, b) = self.0.finish();
        Fingerprint(a, b)
    }
}

/// Fingerprints a sequence of inputs, where `None` is an absent input.
/// Equivalent to feeding each input in turn to a `FingerprintHasher`.
pub fn fingerprint<'a, I>(inputs: I, seed: Fingerprint) -> Fingerprint
where
    I: IntoIterator<Item = Option<&'a [u8]>>,
{
    let mut hasher = FingerprintHasher::new(seed);
    for input in inputs {
        match input {
            Some(bytes) => hasher.update(bytes),
            None => hasher.update_absent(),
        }
    }
    hasher.finish()
}

const UNIT_SEPARATOR: u8 = 0x1F;

// Tags distinguishing input kinds, so e.g. a text input never collides with
// a file input naming the same string.
const TAG_BYTES: u8 = b'b';
const TAG_TEXT: u8 = b't';
const TAG_FILE: u8 = b'f';
const TAG_MISSING_FILE: u8 = b'm';
const TAG_ABSENT: u8 = b'a';

const READ_CHUNK: usize = 64 * 1024;

/// The raw bytes of a path, so distinct non-UTF-8 paths never fold alike.
#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// The hasher used for node fingerprints: length-prefixes each field so that
/// adjacent fields can't run into each other.
struct NodeHasher(FingerprintHasher);

impl NodeHasher {
    fn write_tag(&mut self, tag: u8) {
        self.0.update(&[tag]);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.update_u64(bytes.len() as u64);
        self.0.update(bytes);
    }

    fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    fn write_path(&mut self, path: &Path) {
        self.write_bytes(&path_bytes(path));
    }

    fn write_separator(&mut self) {
        self.0.update(&[UNIT_SEPARATOR]);
    }

    fn write_file(&mut self, path: &Path) -> std::io::Result<()> {
        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.write_tag(TAG_MISSING_FILE);
                self.write_path(path);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.write_tag(TAG_FILE);
        self.write_path(path);

        // Content is streamed rather than length-prefixed; the trailing
        // length keeps it unambiguous.
        let mut buf = vec![0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.0.update(&buf[..n]);
            total += n as u64;
        }
        self.0.update_u64(total);
        Ok(())
    }

    fn write_input(&mut self, input: &Input) -> std::io::Result<()> {
        match input {
            Input::Bytes(bytes) => {
                self.write_tag(TAG_BYTES);
                self.write_bytes(bytes);
            }
            Input::Text(text) => {
                self.write_tag(TAG_TEXT);
                self.write_string(text);
            }
            Input::File(path) => self.write_file(path)?,
            Input::Absent => {
                self.write_tag(TAG_ABSENT);
                self.0.update_absent();
            }
        }
        Ok(())
    }
}

/// Computes the fingerprint of a node for the given build target.
///
/// Prerequisite: every dependency of the node already has a fingerprint in
/// the store for this pass.  Hashing in topological order guarantees it.
/// Fails only if reading a file input fails for a reason other than the file
/// being missing.
pub fn hash_node(
    graph: &Graph,
    store: &Store,
    id: NodeId,
    target: &str,
    seed: Fingerprint,
) -> std::io::Result<Fingerprint> {
    let node = graph.node(id);
    let mut hasher = NodeHasher(FingerprintHasher::new(seed));

    hasher.write_string(target);
    hasher.write_separator();

    for &dep in &node.deps {
        let dep_node = graph.node(dep);
        let fingerprint = store
            .fingerprint(dep)
            .unwrap_or_else(|| panic!("no fingerprint for {:?}", dep_node.name));
        hasher.write_string(&dep_node.name);
        hasher.0.update_fingerprint(fingerprint);
    }
    hasher.write_separator();

    for input in &node.inputs {
        hasher.write_input(input)?;
    }
    hasher.write_separator();

    Ok(hasher.0.finish())
}
