//! SpookyHash V2, a 128-bit noncryptographic hash.
//!
//! This is Bob Jenkins' algorithm with the same constants, seed convention
//! and finalization rounds, so outputs are bit-for-bit compatible with other
//! implementations.  Input words are always read little-endian, regardless of
//! the host byte order.

/// The constant used to fill unseeded state and the default seed halves.
pub const SPOOKY_CONST: u64 = 0xdead_beef_dead_beef;

const NUM_VARS: usize = 12;
const BLOCK_SIZE: usize = NUM_VARS * 8;
const BUF_SIZE: usize = 2 * BLOCK_SIZE;

const MIX_ROT: [u32; NUM_VARS] = [11, 32, 43, 31, 17, 28, 39, 57, 55, 54, 22, 46];
const END_ROT: [u32; NUM_VARS] = [44, 15, 34, 21, 38, 33, 10, 13, 38, 53, 42, 54];
const SHORT_MIX_ROT: [u32; 12] = [50, 52, 30, 41, 54, 48, 38, 37, 62, 34, 5, 36];
const SHORT_END_ROT: [u32; 11] = [15, 52, 26, 51, 28, 9, 47, 54, 32, 25, 63];

fn word(bytes: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(w)
}

/// Reads up to 8 bytes as a little-endian integer, zero-padded.
fn partial_word(bytes: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(w)
}

fn block_words(block: &[u8]) -> [u64; NUM_VARS] {
    let mut words = [0u64; NUM_VARS];
    for (w, chunk) in words.iter_mut().zip(block[..BLOCK_SIZE].chunks_exact(8)) {
        *w = word(chunk);
    }
    words
}

fn mix(data: &[u64; NUM_VARS], h: &mut [u64; NUM_VARS]) {
    for i in 0..NUM_VARS {
        let next = (i + 1) % NUM_VARS;
        let prev = (i + 11) % NUM_VARS;
        h[i] = h[i].wrapping_add(data[i]);
        h[(i + 2) % NUM_VARS] ^= h[(i + 10) % NUM_VARS];
        h[prev] ^= h[i];
        h[i] = h[i].rotate_left(MIX_ROT[i]);
        h[prev] = h[prev].wrapping_add(h[next]);
    }
}

fn end_partial(h: &mut [u64; NUM_VARS]) {
    for (i, &rot) in END_ROT.iter().enumerate() {
        let next = (i + 1) % NUM_VARS;
        let prev = (i + 11) % NUM_VARS;
        h[prev] = h[prev].wrapping_add(h[next]);
        h[(i + 2) % NUM_VARS] ^= h[prev];
        h[next] = h[next].rotate_left(rot);
    }
}

fn end(data: &[u64; NUM_VARS], h: &mut [u64; NUM_VARS]) {
    for (h, d) in h.iter_mut().zip(data) {
        *h = h.wrapping_add(*d);
    }
    end_partial(h);
    end_partial(h);
    end_partial(h);
}

fn short_mix(h: &mut [u64; 4]) {
    for (j, &rot) in SHORT_MIX_ROT.iter().enumerate() {
        let i = (j + 2) % 4;
        h[i] = h[i].rotate_left(rot).wrapping_add(h[(i + 1) % 4]);
        h[(i + 2) % 4] ^= h[i];
    }
}

fn short_end(h: &mut [u64; 4]) {
    for (j, &rot) in SHORT_END_ROT.iter().enumerate() {
        let s = (j + 2) % 4;
        let t = (j + 3) % 4;
        h[t] ^= h[s];
        h[s] = h[s].rotate_left(rot);
        h[t] = h[t].wrapping_add(h[s]);
    }
}

/// The short-message path, used for messages under 192 bytes.
fn short(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    let length = message.len();
    let mut h = [seed1, seed2, SPOOKY_CONST, SPOOKY_CONST];
    let mut rest = message;

    if length > 15 {
        let mut chunks = rest.chunks_exact(32);
        for chunk in &mut chunks {
            h[2] = h[2].wrapping_add(word(&chunk[0..]));
            h[3] = h[3].wrapping_add(word(&chunk[8..]));
            short_mix(&mut h);
            h[0] = h[0].wrapping_add(word(&chunk[16..]));
            h[1] = h[1].wrapping_add(word(&chunk[24..]));
        }
        rest = chunks.remainder();

        if rest.len() >= 16 {
            h[2] = h[2].wrapping_add(word(&rest[0..]));
            h[3] = h[3].wrapping_add(word(&rest[8..]));
            short_mix(&mut h);
            rest = &rest[16..];
        }
    }

    h[3] = h[3].wrapping_add((length as u64) << 56);
    match rest.len() {
        0 => {
            h[2] = h[2].wrapping_add(SPOOKY_CONST);
            h[3] = h[3].wrapping_add(SPOOKY_CONST);
        }
        n if n >= 8 => {
            h[2] = h[2].wrapping_add(word(rest));
            h[3] = h[3].wrapping_add(partial_word(&rest[8..]));
        }
        _ => {
            h[2] = h[2].wrapping_add(partial_word(rest));
        }
    }

    short_end(&mut h);
    (h[0], h[1])
}

fn initial_state(seed1: u64, seed2: u64) -> [u64; NUM_VARS] {
    let mut h = [0u64; NUM_VARS];
    for (i, h) in h.iter_mut().enumerate() {
        *h = match i % 3 {
            0 => seed1,
            1 => seed2,
            _ => SPOOKY_CONST,
        };
    }
    h
}

/// Pads the final partial block and runs the end rounds.
fn finish_block(tail: &[u8], h: &mut [u64; NUM_VARS]) {
    let mut block = [0u8; BLOCK_SIZE];
    block[..tail.len()].copy_from_slice(tail);
    block[BLOCK_SIZE - 1] = tail.len() as u8;
    end(&block_words(&block), h);
}

/// Hashes a whole message in one call.
pub fn hash128(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    if message.len() < BUF_SIZE {
        return short(message, seed1, seed2);
    }

    let mut h = initial_state(seed1, seed2);
    let mut blocks = message.chunks_exact(BLOCK_SIZE);
    for block in &mut blocks {
        mix(&block_words(block), &mut h);
    }
    finish_block(blocks.remainder(), &mut h);
    (h[0], h[1])
}

/// Incremental SpookyHash state.  Feeding a message in any number of
/// `update` calls produces the same result as `hash128` over the
/// concatenation.
#[derive(Clone)]
pub struct SpookyHasher {
    data: [u8; BUF_SIZE],
    state: [u64; NUM_VARS],
    length: usize,
    remainder: usize,
}

impl Default for SpookyHasher {
    fn default() -> Self {
        SpookyHasher::new(SPOOKY_CONST, SPOOKY_CONST)
    }
}

impl SpookyHasher {
    pub fn new(seed1: u64, seed2: u64) -> Self {
        let mut state = [0u64; NUM_VARS];
        state[0] = seed1;
        state[1] = seed2;
        SpookyHasher {
            data: [0; BUF_SIZE],
            state,
            length: 0,
            remainder: 0,
        }
    }

    pub fn update(&mut self, message: &[u8]) {
        if message.is_empty() {
            return;
        }

        let new_remainder = self.remainder + message.len();
        if new_remainder < BUF_SIZE {
            self.data[self.remainder..new_remainder].copy_from_slice(message);
            self.length += message.len();
            self.remainder = new_remainder;
            return;
        }

        let mut h = if self.length < BUF_SIZE {
            initial_state(self.state[0], self.state[1])
        } else {
            self.state
        };
        self.length += message.len();

        let mut rest = message;
        if self.remainder != 0 {
            let prefix = BUF_SIZE - self.remainder;
            self.data[self.remainder..].copy_from_slice(&rest[..prefix]);
            mix(&block_words(&self.data[..BLOCK_SIZE]), &mut h);
            mix(&block_words(&self.data[BLOCK_SIZE..]), &mut h);
            rest = &rest[prefix..];
        }

        let mut blocks = rest.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            mix(&block_words(block), &mut h);
        }
        let tail = blocks.remainder();
        self.data[..tail.len()].copy_from_slice(tail);
        self.remainder = tail.len();
        self.state = h;
    }

    /// Feeds a single word, little-endian.
    pub fn update_u64(&mut self, value: u64) {
        self.update(&value.to_le_bytes());
    }

    /// Produces the hash of everything fed so far.  Does not consume the
    /// state; more updates may follow.
    pub fn finish(&self) -> (u64, u64) {
        if self.length < BUF_SIZE {
            return short(&self.data[..self.length], self.state[0], self.state[1]);
        }

        let mut h = self.state;
        let mut tail = &self.data[..self.remainder];
        if tail.len() >= BLOCK_SIZE {
            mix(&block_words(tail), &mut h);
            tail = &tail[BLOCK_SIZE..];
        }
        finish_block(tail, &mut h);
        (h[0], h[1])
    }
}
