//! Compression sinks and sources for index archives and package files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};

use anyhow::{bail, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Container compression of an index archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    /// Legacy compress(1) LZW
    Compress,
}

impl Compression {
    /// Map an index extension (everything from the first dot of the
    /// leaf) to its compression and the effective archive extension.
    pub fn from_db_extension(ext: &str) -> Option<(Compression, &'static str)> {
        match ext {
            ".db" => Some((Compression::Gzip, ".tar.gz")),
            ".db.tar" => Some((Compression::None, ".tar")),
            ".db.tar.gz" => Some((Compression::Gzip, ".tar.gz")),
            ".db.tar.bz2" => Some((Compression::Bzip2, ".tar.bz2")),
            ".db.tar.xz" => Some((Compression::Xz, ".tar.xz")),
            ".db.tar.Z" => Some((Compression::Compress, ".tar.Z")),
            _ => None,
        }
    }
}

/// Streaming sink writing one of the supported containers onto a file.
/// `finish` flushes the filter chain and hands back the descriptor so
/// the caller can fsync before publishing.
pub enum Compressor {
    Plain(File),
    Gzip(GzEncoder<File>),
    Bzip2(BzEncoder<File>),
    Xz(XzEncoder<File>),
    Compress(LzwEncoder<File>),
}

impl Compressor {
    pub fn new(file: File, algo: Compression) -> Self {
        match algo {
            Compression::None => Self::Plain(file),
            Compression::Gzip => Self::Gzip(GzEncoder::new(file, flate2::Compression::default())),
            Compression::Bzip2 => Self::Bzip2(BzEncoder::new(file, bzip2::Compression::default())),
            Compression::Xz => Self::Xz(XzEncoder::new(file, 6)),
            Compression::Compress => Self::Compress(LzwEncoder::new(file)),
        }
    }

    pub fn finish(self) -> io::Result<File> {
        match self {
            Self::Plain(f) => Ok(f),
            Self::Gzip(enc) => enc.finish(),
            Self::Bzip2(enc) => enc.finish(),
            Self::Xz(enc) => enc.finish(),
            Self::Compress(enc) => enc.finish(),
        }
    }
}

impl Write for Compressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.write(buf),
            Self::Gzip(inner) => inner.write(buf),
            Self::Bzip2(inner) => inner.write(buf),
            Self::Xz(inner) => inner.write(buf),
            Self::Compress(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(inner) => inner.flush(),
            Self::Gzip(inner) => inner.flush(),
            Self::Bzip2(inner) => inner.flush(),
            Self::Xz(inner) => inner.flush(),
            Self::Compress(inner) => inner.flush(),
        }
    }
}

/// Streaming source over a compressed stream, picked from the file name.
/// Covers the index containers plus zstd, which package files use.
pub enum Decompressor<'a, R: Read + 'a> {
    Plain(R),
    Gzip(GzDecoder<R>),
    Bzip2(BzDecoder<R>),
    Xz(XzDecoder<R>),
    Zstd(zstd::stream::Decoder<'a, BufReader<R>>),
    Compress(LzwDecoder<R>),
}

impl<'a, R: Read + 'a> Decompressor<'a, R> {
    pub fn from_file_name(name: &str, stream: R) -> Result<Self> {
        if name.ends_with(".tar") {
            Ok(Self::Plain(stream))
        } else if name.ends_with(".gz") {
            Ok(Self::Gzip(GzDecoder::new(stream)))
        } else if name.ends_with(".bz2") {
            Ok(Self::Bzip2(BzDecoder::new(stream)))
        } else if name.ends_with(".xz") {
            Ok(Self::Xz(XzDecoder::new(stream)))
        } else if name.ends_with(".zst") || name.ends_with(".zstd") {
            Ok(Self::Zstd(zstd::stream::Decoder::new(stream)?))
        } else if name.ends_with(".Z") {
            Ok(Self::Compress(LzwDecoder::new(stream)))
        } else {
            bail!("unknown compression format: {}", name)
        }
    }
}

impl<'a, R: Read + 'a> Read for Decompressor<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.read(buf),
            Self::Gzip(inner) => inner.read(buf),
            Self::Bzip2(inner) => inner.read(buf),
            Self::Xz(inner) => inner.read(buf),
            Self::Zstd(inner) => inner.read(buf),
            Self::Compress(inner) => inner.read(buf),
        }
    }
}

// compress(1) LZW container. Codes are packed LSB-first and flushed in
// groups of `n_bits` bytes (8 codes); a code-width change pads out the
// current group, which the reader mirrors by refilling per group.

const LZW_MAGIC: [u8; 2] = [0x1f, 0x9d];
const LZW_BITS: u32 = 16;
const LZW_INIT_BITS: u32 = 9;
const LZW_BLOCK_MODE: u8 = 0x80;
const LZW_CLEAR: u32 = 256;
const LZW_FIRST: u32 = 257;

fn lzw_maxcode(n_bits: u32) -> u32 {
    (1 << n_bits) - 1
}

pub struct LzwEncoder<W: Write> {
    inner: W,
    table: HashMap<(u16, u8), u16>,
    ent: Option<u16>,
    n_bits: u32,
    maxcode: u32,
    free_ent: u32,
    buf: [u8; LZW_BITS as usize],
    offset: usize,
    header_written: bool,
}

impl<W: Write> LzwEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            table: HashMap::new(),
            ent: None,
            n_bits: LZW_INIT_BITS,
            maxcode: lzw_maxcode(LZW_INIT_BITS),
            free_ent: LZW_FIRST,
            buf: [0; LZW_BITS as usize],
            offset: 0,
            header_written: false,
        }
    }

    fn output(&mut self, code: u32) -> io::Result<()> {
        let bit = self.offset & 7;
        let mut idx = self.offset >> 3;
        let mut v = code << bit;
        let mut bits = self.n_bits as usize + bit;
        while bits > 0 {
            self.buf[idx] |= (v & 0xff) as u8;
            v >>= 8;
            idx += 1;
            bits = bits.saturating_sub(8);
        }

        self.offset += self.n_bits as usize;
        if self.offset == (self.n_bits as usize) << 3 {
            let n = self.n_bits as usize;
            self.inner.write_all(&self.buf[..n])?;
            self.buf = [0; LZW_BITS as usize];
            self.offset = 0;
        }

        // the reader only discovers a width increase at the next group
        // boundary, so pad out the current group before growing
        if self.free_ent > self.maxcode {
            if self.offset > 0 {
                let n = self.n_bits as usize;
                self.inner.write_all(&self.buf[..n])?;
                self.buf = [0; LZW_BITS as usize];
                self.offset = 0;
            }
            self.n_bits += 1;
            self.maxcode = if self.n_bits == LZW_BITS {
                1 << LZW_BITS
            } else {
                lzw_maxcode(self.n_bits)
            };
        }

        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        if !self.header_written {
            self.write_header()?;
        }
        if let Some(ent) = self.ent.take() {
            self.output(ent as u32)?;
        }
        if self.offset > 0 {
            let n = (self.offset + 7) / 8;
            self.inner.write_all(&self.buf[..n])?;
            self.offset = 0;
        }
        self.inner.flush()?;

        Ok(self.inner)
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.inner.write_all(&LZW_MAGIC)?;
        self.inner.write_all(&[LZW_BITS as u8 | LZW_BLOCK_MODE])?;
        self.header_written = true;

        Ok(())
    }
}

impl<W: Write> Write for LzwEncoder<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.header_written {
            self.write_header()?;
        }

        for &c in data {
            let ent = match self.ent {
                Some(ent) => ent,
                None => {
                    self.ent = Some(c as u16);
                    continue;
                }
            };

            if let Some(&code) = self.table.get(&(ent, c)) {
                self.ent = Some(code);
                continue;
            }

            self.output(ent as u32)?;
            if self.free_ent < 1 << LZW_BITS {
                self.table.insert((ent, c), self.free_ent as u16);
                self.free_ent += 1;
            }
            self.ent = Some(c as u16);
        }

        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct LzwDecoder<R: Read> {
    inner: R,
    block_mode: bool,
    maxbits: u32,
    n_bits: u32,
    maxcode: u32,
    free_ent: u32,
    clear_flg: bool,
    oldcode: u32,
    finchar: u8,
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    gbuf: [u8; LZW_BITS as usize],
    gbits: usize,
    roffset: usize,
    stack: Vec<u8>,
    started: bool,
    done: bool,
}

impl<R: Read> LzwDecoder<R> {
    pub fn new(inner: R) -> Self {
        let mut suffix = vec![0u8; 1 << LZW_BITS];
        for (i, s) in suffix.iter_mut().enumerate().take(256) {
            *s = i as u8;
        }
        Self {
            inner,
            block_mode: true,
            maxbits: LZW_BITS,
            n_bits: LZW_INIT_BITS,
            maxcode: lzw_maxcode(LZW_INIT_BITS),
            free_ent: LZW_FIRST,
            clear_flg: false,
            oldcode: 0,
            finchar: 0,
            prefix: vec![0u16; 1 << LZW_BITS],
            suffix,
            gbuf: [0; LZW_BITS as usize],
            gbits: 0,
            roffset: 0,
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    fn read_header(&mut self) -> io::Result<()> {
        let mut header = [0u8; 3];
        self.inner.read_exact(&mut header)?;
        if header[..2] != LZW_MAGIC {
            return Err(corrupt("bad magic"));
        }
        self.maxbits = (header[2] & 0x1f) as u32;
        self.block_mode = header[2] & LZW_BLOCK_MODE != 0;
        if self.maxbits > LZW_BITS {
            return Err(corrupt("unsupported code width"));
        }
        self.free_ent = if self.block_mode { LZW_FIRST } else { LZW_CLEAR };

        Ok(())
    }

    /// Read the next code, refilling the group buffer as needed.
    /// Returns None on a clean end of stream.
    fn getcode(&mut self) -> io::Result<Option<u32>> {
        if self.clear_flg || self.roffset >= self.gbits || self.free_ent > self.maxcode {
            if self.free_ent > self.maxcode {
                self.n_bits += 1;
                self.maxcode = if self.n_bits == self.maxbits {
                    1 << self.maxbits
                } else {
                    lzw_maxcode(self.n_bits)
                };
            }
            if self.clear_flg {
                self.n_bits = LZW_INIT_BITS;
                self.maxcode = lzw_maxcode(LZW_INIT_BITS);
                self.clear_flg = false;
            }

            let want = self.n_bits as usize;
            let mut have = 0;
            while have < want {
                match self.inner.read(&mut self.gbuf[have..want])? {
                    0 => break,
                    n => have += n,
                }
            }
            if have == 0 {
                return Ok(None);
            }
            self.roffset = 0;
            // round down to whole codes
            self.gbits = (have << 3) - (self.n_bits as usize - 1);
        }

        let bit = self.roffset & 7;
        let idx = self.roffset >> 3;
        let mut v = 0u32;
        let mut got = 0;
        while got < bit + self.n_bits as usize {
            v |= (self.gbuf[idx + got / 8] as u32) << got;
            got += 8;
        }
        let code = (v >> bit) & ((1 << self.n_bits) - 1);
        self.roffset += self.n_bits as usize;

        Ok(Some(code))
    }

    /// Decode one code into the pending output stack.
    /// Returns false at end of stream.
    fn decode_next(&mut self) -> io::Result<bool> {
        if !self.started {
            self.read_header()?;
            self.started = true;
            match self.getcode()? {
                Some(code) if code < 256 => {
                    self.oldcode = code;
                    self.finchar = code as u8;
                    self.stack.push(self.finchar);
                    return Ok(true);
                }
                Some(_) => return Err(corrupt("bad initial code")),
                None => return Ok(false),
            }
        }

        let mut code = match self.getcode()? {
            Some(code) => code,
            None => return Ok(false),
        };

        if code == LZW_CLEAR && self.block_mode {
            self.table_clear();
            code = match self.getcode()? {
                Some(code) => code,
                None => return Ok(false),
            };
        }

        let incode = code;
        let base = self.stack.len();

        // a code one past the table is the KwKwK case
        if code >= self.free_ent {
            if code > self.free_ent {
                return Err(corrupt("code out of range"));
            }
            self.stack.push(self.finchar);
            code = self.oldcode;
        }
        while code >= 256 {
            self.stack.push(self.suffix[code as usize]);
            code = self.prefix[code as usize] as u32;
        }
        self.finchar = self.suffix[code as usize];
        self.stack.push(self.finchar);
        self.stack[base..].reverse();

        if self.free_ent < 1 << self.maxbits {
            self.prefix[self.free_ent as usize] = self.oldcode as u16;
            self.suffix[self.free_ent as usize] = self.finchar;
            self.free_ent += 1;
        }
        self.oldcode = incode;

        Ok(true)
    }

    fn table_clear(&mut self) {
        self.free_ent = LZW_FIRST - 1;
        self.clear_flg = true;
    }
}

impl<R: Read> Read for LzwDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.stack.is_empty() {
            if self.done {
                return Ok(0);
            }
            if !self.decode_next()? {
                self.done = true;
                return Ok(0);
            }
        }

        let n = self.stack.len().min(buf.len());
        buf[..n].copy_from_slice(&self.stack[..n]);
        self.stack.drain(..n);

        Ok(n)
    }
}

fn corrupt(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("corrupt compress stream: {}", what),
    )
}

#[cfg(test)]
fn lzw_roundtrip(data: &[u8]) {
    let mut enc = LzwEncoder::new(Vec::new());
    enc.write_all(data).unwrap();
    let compressed = enc.finish().unwrap();

    let mut out = Vec::new();
    LzwDecoder::new(&compressed[..])
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, data, "roundtrip failed for {} bytes", data.len());
}

#[test]
fn test_lzw_roundtrip_small() {
    lzw_roundtrip(b"");
    lzw_roundtrip(b"a");
    lzw_roundtrip(b"TOBEORNOTTOBEORTOBEORNOT");
    lzw_roundtrip(&b"ab".repeat(1000));
}

#[test]
fn test_lzw_roundtrip_width_growth() {
    // enough distinct digrams to push the code width past 9 and 10 bits
    let mut data = Vec::new();
    let mut x: u32 = 1;
    for _ in 0..65536 {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((x >> 16) as u8);
    }
    lzw_roundtrip(&data);
}

#[test]
fn test_lzw_header() {
    let mut enc = LzwEncoder::new(Vec::new());
    enc.write_all(b"x").unwrap();
    let compressed = enc.finish().unwrap();
    assert_eq!(&compressed[..2], &LZW_MAGIC);
    assert_eq!(compressed[2], 16 | LZW_BLOCK_MODE);
}

#[test]
fn test_compression_table() {
    assert_eq!(
        Compression::from_db_extension(".db"),
        Some((Compression::Gzip, ".tar.gz"))
    );
    assert_eq!(
        Compression::from_db_extension(".db.tar"),
        Some((Compression::None, ".tar"))
    );
    assert_eq!(
        Compression::from_db_extension(".db.tar.Z"),
        Some((Compression::Compress, ".tar.Z"))
    );
    assert_eq!(Compression::from_db_extension(".files"), None);
    assert_eq!(Compression::from_db_extension(".db.tar.zst"), None);
}

#[test]
fn test_compressor_roundtrip_gzip() {
    use std::io::Seek;

    let mut f = tempfile::tempfile().unwrap();
    let mut enc = Compressor::new(f.try_clone().unwrap(), Compression::Gzip);
    enc.write_all(b"index body").unwrap();
    enc.finish().unwrap().sync_all().unwrap();

    f.rewind().unwrap();
    let mut dec = Decompressor::from_file_name("repo.db.tar.gz", f).unwrap();
    let mut out = Vec::new();
    dec.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"index body");
}
