// src/main.rs
// pngstash — arbitrary bytes stored as PNG pixels, and recovered again.
// The pixels ARE the payload: each RGBA pixel carries four raw bytes, row-major.
//
// Two codec paths behind one switch:
//   - builtin: the container is assembled chunk by chunk (IHDR / iTXt / IDAT /
//     IEND, CRC-32 framing, zlib image data). Reading delegates to the png
//     crate, so anything a standards-compliant decoder accepts comes back.
//   - image:   plain delegation to the image crate. No length record, so a
//     decode returns the full pixel capacity unless told otherwise.
//
// The original payload length rides inside the container as an iTXt record,
// which is why a bare `pngstash decode art.png` returns exactly the bytes
// that went in, padding excluded.
//
// Build: cargo build --release
// Run:   cargo run --release -- encode secret.bin -o art.png
//        cargo run --release -- decode art.png -o secret.bin

use std::{
    cmp::Ordering,
    fs,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, bail, Context, Result};
use blake3::Hasher;
use clap::{Args, Parser, Subcommand, ValueEnum};
use flate2::{write::ZlibEncoder, Compression};
use png::{ColorType, Decoder, Transformations};
use rand::{
    rngs::{OsRng, StdRng},
    RngCore, SeedableRng,
};

// ========================= Configuration =========================

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const CHUNK_IHDR: &[u8; 4] = b"IHDR";
const CHUNK_ITXT: &[u8; 4] = b"iTXt";
const CHUNK_IDAT: &[u8; 4] = b"IDAT";
const CHUNK_IEND: &[u8; 4] = b"IEND";

const BIT_DEPTH: u8 = 8;
const COLOR_TYPE_RGBA: u8 = 6;
const BYTES_PER_PIXEL: usize = 4; // RGBA, one payload byte per channel

// iTXt keyword the length record is filed under.
const LENGTH_KEYWORD: &str = "pngstash.length";

#[cfg(unix)]
const RANDOM_DEVICE: &str = "/dev/random";

// Logging
macro_rules! step { ($($arg:tt)*) => { eprintln!("▶ {}", format!($($arg)*)); }; }
macro_rules! ok   { ($($arg:tt)*) => { eprintln!("✔ {}", format!($($arg)*)); }; }
macro_rules! warn { ($($arg:tt)*) => { eprintln!("⚠ {}", format!($($arg)*)); }; }
macro_rules! fail { ($($arg:tt)*) => { eprintln!("✘ {}", format!($($arg)*)); }; }

// ========================= Types & integrity =========================

#[derive(Debug, Clone)]
struct UnverifiedBytes(Vec<u8>);

#[derive(Debug, Clone)]
struct VerifiedBytes(Vec<u8>);

impl VerifiedBytes {
    fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

fn blake3_hash_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    *hasher.finalize().as_bytes()
}

// Only the stored prefix is checked: padding beyond the grid capacity is
// synthesized on decode and never survives a round trip.
fn verify_prefix(
    expected_len: usize,
    expected_hash: [u8; 32],
    data: UnverifiedBytes,
) -> Result<VerifiedBytes> {
    if data.0.len() < expected_len {
        bail!(
            "verification read back {} byte(s), expected at least {}",
            data.0.len(),
            expected_len
        );
    }
    let actual = blake3_hash_bytes(&data.0[..expected_len]);
    if actual != expected_hash {
        bail!(
            "BLAKE3 mismatch on read-back: expected {}, got {}",
            hex::encode(expected_hash),
            hex::encode(actual)
        );
    }
    Ok(VerifiedBytes(data.0))
}

// ========================= Byte sources =========================

// Where padding (and regenerated padding on decode) comes from. Resolved
// once up front; fill() never re-inspects the filesystem to decide what
// kind of source it is holding.
#[derive(Debug, Clone)]
enum ByteSource {
    System,
    File(PathBuf),
    Literal(Vec<u8>),
}

impl ByteSource {
    fn resolve(selector: Option<&str>) -> Self {
        match selector {
            None | Some("") => ByteSource::System,
            Some(s) => {
                let path = Path::new(s);
                if path.is_file() {
                    ByteSource::File(path.to_path_buf())
                } else {
                    ByteSource::Literal(s.as_bytes().to_vec())
                }
            }
        }
    }

    fn fill(&self, n: usize) -> Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        match self {
            ByteSource::System => Ok(system_random(n)),
            ByteSource::File(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("read byte source {}", path.display()))?;
                if bytes.is_empty() {
                    bail!("byte source {} is empty", path.display());
                }
                Ok(tile_bytes(&bytes, n))
            }
            ByteSource::Literal(bytes) => Ok(tile_bytes(bytes, n)),
        }
    }
}

// Repeats `tile` until n bytes are produced ("abc", 7 -> "abcabca").
fn tile_bytes(tile: &[u8], n: usize) -> Vec<u8> {
    tile.iter().copied().cycle().take(n).collect()
}

fn system_random(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    #[cfg(unix)]
    {
        if let Ok(mut device) = fs::File::open(RANDOM_DEVICE) {
            if device.read_exact(&mut buf).is_ok() {
                return buf;
            }
        }
    }
    if OsRng.try_fill_bytes(&mut buf).is_ok() {
        return buf;
    }
    // Last resort, good enough for padding.
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    StdRng::seed_from_u64(seed).fill_bytes(&mut buf);
    buf
}

// ========================= Grid sizing =========================

// Pick a W x H pixel grid for a payload of `payload_len` bytes. Free
// dimensions are solved so that W * H * 4 >= payload_len; fully explicit
// dimensions are taken as-is (clamped to 1), even when they undershoot.
fn solve_grid(payload_len: usize, width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    let per_pixel = BYTES_PER_PIXEL as u64;
    let pixels = ((payload_len as u64 + per_pixel - 1) / per_pixel).max(1);
    match (width, height) {
        (Some(w), Some(h)) => (w.max(1), h.max(1)),
        (Some(w), None) => {
            let w = w.max(1);
            (w, ceil_div(pixels, w))
        }
        (None, Some(h)) => {
            let h = h.max(1);
            (ceil_div(pixels, h), h)
        }
        (None, None) => {
            let w = ((pixels as f64).sqrt() as u32).max(1);
            (w, ceil_div(pixels, w))
        }
    }
}

fn ceil_div(n: u64, d: u32) -> u32 {
    let q = (n + d as u64 - 1) / d as u64;
    q.clamp(1, u32::MAX as u64) as u32
}

// ========================= Payload framing =========================

#[derive(Debug)]
struct FramedPayload {
    data: Vec<u8>,
    width: u32,
    height: u32,
    header_len: u64,
}

// Two independent fitting passes. Pass 1 normalizes the payload to the
// caller's declared length, and that length (or the raw payload length) is
// what the container records. Pass 2 fits the result to the exact grid
// capacity and never touches the record.
fn frame_payload(
    payload: Vec<u8>,
    declared_len: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    source: &ByteSource,
) -> Result<FramedPayload> {
    let (candidate, header_len) = match declared_len {
        Some(len) => {
            let target = usize::try_from(len)
                .context("declared payload length exceeds addressable memory")?;
            (fit_to_length(payload, target, source)?, len)
        }
        None => {
            let len = payload.len() as u64;
            (payload, len)
        }
    };

    let (width, height) = solve_grid(candidate.len(), width, height);
    let capacity = usize::try_from(width as u64 * height as u64 * BYTES_PER_PIXEL as u64)
        .context("pixel grid exceeds addressable memory")?;
    let data = fit_to_length(candidate, capacity, source)?;

    Ok(FramedPayload {
        data,
        width,
        height,
        header_len,
    })
}

fn fit_to_length(mut data: Vec<u8>, target: usize, source: &ByteSource) -> Result<Vec<u8>> {
    match data.len().cmp(&target) {
        Ordering::Greater => data.truncate(target),
        Ordering::Less => {
            let pad = source.fill(target - data.len())?;
            data.extend_from_slice(&pad);
        }
        Ordering::Equal => {}
    }
    Ok(data)
}

// ========================= Length record =========================

// The length record is the text of an iTXt chunk filed under LENGTH_KEYWORD:
//
//   "<hexN> <hexL>"
//
// hexL is the hex of the minimal big-endian encoding of the payload length;
// hexN is the hex of the minimal big-endian encoding of hexL's character
// count. Minimal big-endian means at least one byte and no leading zero
// byte unless the value itself is zero.
//
//   length 10  -> "02 0a"
//   length 0   -> "02 00"
//   length 300 -> "04 012c"
//
// Reading is lenient: leading zero bytes are accepted, a first-field
// mismatch only warns, and anything unparseable leaves the length unknown.

fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    bytes[first..].to_vec()
}

fn be_bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    let significant = match bytes.iter().position(|&b| b != 0) {
        Some(i) => &bytes[i..],
        None => return Some(0),
    };
    if significant.len() > 8 {
        return None;
    }
    Some(significant.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn encode_length_record(len: u64) -> String {
    let hex_len = hex::encode(minimal_be_bytes(len));
    let hex_count = hex::encode(minimal_be_bytes(hex_len.len() as u64));
    format!("{hex_count} {hex_len}")
}

fn decode_length_record(text: &str) -> Option<u64> {
    let (count_field, len_field) = text.split_once(' ')?;
    let declared = be_bytes_to_u64(&hex::decode(count_field).ok()?)?;
    if declared != len_field.len() as u64 {
        warn!(
            "length record self-check: {} hex char(s) declared, {} present",
            declared,
            len_field.len()
        );
    }
    be_bytes_to_u64(&hex::decode(len_field).ok()?)
}

// ========================= Nearest-neighbor resampling =========================

// dest(x, y) <- src(floor(x * sw / dw), floor(y * sh / dh)). Integer-multiple
// upscales invert byte-exactly; everything else is lossy on purpose.
fn resample_nearest(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let (sw, sh) = (src_w as usize, src_h as usize);
    let (dw, dh) = (dst_w.max(1) as usize, dst_h.max(1) as usize);
    debug_assert_eq!(src.len(), sw * sh * BYTES_PER_PIXEL);

    let mut out = vec![0u8; dw * dh * BYTES_PER_PIXEL];
    for y in 0..dh {
        let sy = (y as u64 * sh as u64 / dh as u64) as usize;
        for x in 0..dw {
            let sx = (x as u64 * sw as u64 / dw as u64) as usize;
            let s = (sy * sw + sx) * BYTES_PER_PIXEL;
            let d = (y * dw + x) * BYTES_PER_PIXEL;
            out[d..d + BYTES_PER_PIXEL].copy_from_slice(&src[s..s + BYTES_PER_PIXEL]);
        }
    }
    out
}

// ========================= Chunk writer =========================

// Length (u32 BE), type, data, CRC-32 over type + data.
fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

// keyword NUL flag method language NUL translated-keyword NUL text,
// uncompressed, with empty language and translated keyword.
fn itxt_chunk_data(keyword: &str, text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(keyword.len() + text.len() + 5);
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    data.push(0);
    data.push(0);
    data.push(0);
    data.push(0);
    data.extend_from_slice(text.as_bytes());
    data
}

fn build_container(pixels: &[u8], width: u32, height: u32, payload_len: u64) -> Result<Vec<u8>> {
    debug_assert_eq!(pixels.len(), width as usize * height as usize * BYTES_PER_PIXEL);

    let mut out = Vec::with_capacity(pixels.len() / 2 + 256);
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(BIT_DEPTH);
    ihdr.push(COLOR_TYPE_RGBA);
    ihdr.push(0); // compression: deflate
    ihdr.push(0); // filter method: adaptive
    ihdr.push(0); // interlace: none
    write_chunk(&mut out, CHUNK_IHDR, &ihdr);

    let record = encode_length_record(payload_len);
    write_chunk(&mut out, CHUNK_ITXT, &itxt_chunk_data(LENGTH_KEYWORD, &record));

    // Every scanline gets filter byte 0 before the lot is deflated.
    let stride = width as usize * BYTES_PER_PIXEL;
    let mut raw = Vec::with_capacity((stride + 1) * height as usize);
    for row in pixels.chunks_exact(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).context("compress image data")?;
    let compressed = encoder.finish().context("finish image data stream")?;
    write_chunk(&mut out, CHUNK_IDAT, &compressed);

    write_chunk(&mut out, CHUNK_IEND, &[]);
    Ok(out)
}

// ========================= Container reading =========================

#[derive(Debug)]
struct ContainerImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    recorded_len: Option<u64>,
}

fn parse_container(bytes: &[u8]) -> Result<ContainerImage> {
    let mut decoder = Decoder::new(bytes);
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .context("container is not a readable PNG stream")?;

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .context("container image data is unreadable")?;
    let pixels = expand_to_rgba(&buf[..frame.buffer_size()], frame.color_type)?;
    let (width, height) = (frame.width, frame.height);

    // Text chunks may legally sit after the image data; sweep to IEND first.
    let _ = reader.finish();
    let recorded_len = reader
        .info()
        .utf8_text
        .iter()
        .find(|chunk| chunk.keyword == LENGTH_KEYWORD)
        .and_then(|chunk| match chunk.get_text() {
            Ok(text) => decode_length_record(&text),
            Err(_) => {
                warn!("length record is not readable text; ignoring it");
                None
            }
        });

    Ok(ContainerImage {
        width,
        height,
        pixels,
        recorded_len,
    })
}

fn expand_to_rgba(data: &[u8], color: ColorType) -> Result<Vec<u8>> {
    Ok(match color {
        ColorType::Rgba => data.to_vec(),
        ColorType::Rgb => data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 0xFF])
            .collect(),
        ColorType::Grayscale => data.iter().flat_map(|&g| [g, g, g, 0xFF]).collect(),
        ColorType::GrayscaleAlpha => data
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        other => bail!("unsupported color type {:?} after expansion", other),
    })
}

// ========================= Backends =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    // Hand-rolled chunk writer, standards reader, length record included.
    Builtin,
    // Plain image-crate delegation. No length record, so decodes are
    // capacity-bound unless an explicit length is supplied.
    Image,
}

impl Backend {
    fn write_container(
        self,
        pixels: &[u8],
        width: u32,
        height: u32,
        payload_len: u64,
    ) -> Result<Vec<u8>> {
        match self {
            Backend::Builtin => build_container(pixels, width, height, payload_len),
            Backend::Image => {
                let img = image::RgbaImage::from_raw(width, height, pixels.to_vec())
                    .ok_or_else(|| {
                        anyhow!("pixel buffer does not match a {width}x{height} RGBA image")
                    })?;
                let mut out = Cursor::new(Vec::new());
                image::DynamicImage::ImageRgba8(img)
                    .write_to(&mut out, image::ImageFormat::Png)
                    .context("image backend failed to write the container")?;
                Ok(out.into_inner())
            }
        }
    }

    fn read_container(self, bytes: &[u8]) -> Result<ContainerImage> {
        match self {
            Backend::Builtin => parse_container(bytes),
            Backend::Image => {
                let img = image::load_from_memory(bytes)
                    .context("image backend failed to read the container")?;
                let rgba = img.to_rgba8();
                let (width, height) = (rgba.width(), rgba.height());
                Ok(ContainerImage {
                    width,
                    height,
                    pixels: rgba.into_raw(),
                    recorded_len: None,
                })
            }
        }
    }
}

// ========================= Encode =========================

#[derive(Debug, Clone)]
struct EncodeOptions {
    length: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    display_width: Option<u32>,
    display_height: Option<u32>,
    source: ByteSource,
    backend: Backend,
}

fn encode(payload: Vec<u8>, opts: &EncodeOptions) -> Result<Vec<u8>> {
    let (container, _, _) = encode_with_proof(payload, opts)?;
    Ok(container)
}

// Also hands back the stored prefix a decode must reproduce, namely the
// first min(recorded length, grid capacity) bytes, plus whether the image
// was resampled away from its storage grid.
fn encode_with_proof(payload: Vec<u8>, opts: &EncodeOptions) -> Result<(Vec<u8>, Vec<u8>, bool)> {
    let framed = frame_payload(payload, opts.length, opts.width, opts.height, &opts.source)?;
    let proof_len = framed.header_len.min(framed.data.len() as u64) as usize;
    let proof = framed.data[..proof_len].to_vec();

    let (pixels, out_w, out_h) = match (opts.display_width, opts.display_height) {
        (None, None) => (framed.data, framed.width, framed.height),
        (dw, dh) => {
            let width = dw.unwrap_or(framed.width).max(1);
            let height = dh.unwrap_or(framed.height).max(1);
            if (width, height) == (framed.width, framed.height) {
                (framed.data, framed.width, framed.height)
            } else {
                step!(
                    "Resampling the {}x{} grid to {}x{} for display…",
                    framed.width,
                    framed.height,
                    width,
                    height
                );
                (
                    resample_nearest(&framed.data, framed.width, framed.height, width, height),
                    width,
                    height,
                )
            }
        }
    };
    let resampled = (out_w, out_h) != (framed.width, framed.height);

    let container = opts
        .backend
        .write_container(&pixels, out_w, out_h, framed.header_len)?;
    Ok((container, proof, resampled))
}

fn encode_to_file(payload: Vec<u8>, opts: &EncodeOptions, path: &Path) -> Result<()> {
    step!("Encoding {} payload byte(s)…", payload.len());
    let (container, proof, resampled) = encode_with_proof(payload, opts)?;
    fs::write(path, &container).with_context(|| format!("write container {}", path.display()))?;
    ok!("Image saved as {} ({} bytes).", path.display(), container.len());

    if resampled {
        warn!("display resampling is lossy; skipping the read-back check");
        return Ok(());
    }

    step!("Re-opening the container to check the stored bytes…");
    let written =
        fs::read(path).with_context(|| format!("re-read container {}", path.display()))?;
    let check = DecodeOptions {
        length: None,
        width: None,
        height: None,
        scale: ScaleMode::Native,
        source: opts.source.clone(),
        backend: opts.backend,
    };
    let decoded = decode(&written, &check)?;
    let digest = blake3_hash_bytes(&proof);
    let verified = verify_prefix(proof.len(), digest, UnverifiedBytes(decoded))?;
    if verified.as_slice()[..proof.len()] != proof[..] {
        bail!("read-back bytes diverge from the stored payload");
    }
    ok!(
        "Verified {} stored byte(s) against BLAKE3 {}.",
        proof.len(),
        hex::encode(digest)
    );
    Ok(())
}

// ========================= Decode =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScaleMode {
    Native,
    // The container was resampled to this size on encode; decoding scales it
    // back to the storage grid before any bytes are read.
    Display { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
struct DecodeOptions {
    length: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    scale: ScaleMode,
    source: ByteSource,
    backend: Backend,
}

fn decode(container: &[u8], opts: &DecodeOptions) -> Result<Vec<u8>> {
    let img = opts.backend.read_container(container)?;

    let grid = match opts.scale {
        ScaleMode::Display { width: dw, height: dh } => {
            if (img.width, img.height) != (dw, dh) {
                bail!(
                    "container is {}x{} but was declared as display-scaled to {}x{}",
                    img.width,
                    img.height,
                    dw,
                    dh
                );
            }
            let (Some(w), Some(h)) = (opts.width, opts.height) else {
                bail!(
                    "inverting a display resample needs the storage grid dimensions \
                     (--width/--height)"
                );
            };
            let (w, h) = (w.max(1), h.max(1));
            if (w, h) == (dw, dh) {
                img.pixels
            } else {
                resample_nearest(&img.pixels, dw, dh, w, h)
            }
        }
        ScaleMode::Native => img.pixels,
    };

    let capacity = grid.len() as u64;
    if opts.length.is_none() && img.recorded_len.is_none() {
        warn!("no length record and no explicit length; emitting all {capacity} stored byte(s)");
    }
    let target = opts.length.or(img.recorded_len).unwrap_or(capacity);

    if target <= capacity {
        Ok(grid[..target as usize].to_vec())
    } else {
        let missing = usize::try_from(target - capacity)
            .context("requested payload length exceeds addressable memory")?;
        warn!("target length {target} exceeds the {capacity}-byte grid; synthesizing the tail");
        let mut out = grid;
        out.extend_from_slice(&opts.source.fill(missing)?);
        Ok(out)
    }
}

// Several containers: each one trims itself by its own record, then the
// explicit length applies to the concatenation.
fn decode_all(containers: &[Vec<u8>], opts: &DecodeOptions) -> Result<Vec<u8>> {
    if containers.len() == 1 {
        return decode(&containers[0], opts);
    }
    let each = DecodeOptions {
        length: None,
        ..opts.clone()
    };
    let mut out = Vec::new();
    for container in containers {
        out.extend_from_slice(&decode(container, &each)?);
    }
    if let Some(target) = opts.length {
        if target <= out.len() as u64 {
            out.truncate(target as usize);
        } else {
            let missing = usize::try_from(target - out.len() as u64)
                .context("requested payload length exceeds addressable memory")?;
            out.extend_from_slice(&opts.source.fill(missing)?);
        }
    }
    Ok(out)
}

// ========================= CLI =========================

#[derive(Parser, Debug)]
#[command(
    name = "pngstash",
    version,
    about = "Stash arbitrary bytes inside a PNG and pull them back out"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Pack payload bytes into a PNG container")]
    Encode(EncodeArgs),
    #[command(about = "Recover the payload from PNG container(s)")]
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[arg(help = "Input file(s), concatenated in order; stdin when none are given")]
    inputs: Vec<PathBuf>,
    #[arg(short = 'W', long, help = "Storage grid width in pixels")]
    width: Option<u32>,
    #[arg(short = 'H', long, help = "Storage grid height in pixels")]
    height: Option<u32>,
    #[arg(long, help = "Resample the stored grid to this display width (lossy)")]
    display_width: Option<u32>,
    #[arg(long, help = "Resample the stored grid to this display height (lossy)")]
    display_height: Option<u32>,
    #[arg(short, long, help = "Pad or truncate the payload to this length and record it")]
    length: Option<u64>,
    #[arg(
        short,
        long,
        help = "Padding bytes: a file path or a literal string; OS randomness when absent"
    )]
    random_source: Option<String>,
    #[arg(long, value_enum, default_value = "builtin", help = "Container codec")]
    backend: Backend,
    #[arg(short, long, help = "Output path; stdout when absent")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[arg(help = "Container file(s); stdin when none are given, '-' for stdin")]
    inputs: Vec<PathBuf>,
    #[arg(short = 'W', long, help = "Storage grid width the container was encoded with")]
    width: Option<u32>,
    #[arg(short = 'H', long, help = "Storage grid height the container was encoded with")]
    height: Option<u32>,
    #[arg(long, help = "Declared display width of a resampled container")]
    display_width: Option<u32>,
    #[arg(long, help = "Declared display height of a resampled container")]
    display_height: Option<u32>,
    #[arg(short, long, help = "Exact number of payload bytes to emit")]
    length: Option<u64>,
    #[arg(short, long, help = "Byte source for regenerating truncated padding")]
    random_source: Option<String>,
    #[arg(long, value_enum, default_value = "builtin", help = "Container codec")]
    backend: Backend,
    #[arg(short, long, help = "Output path; stdout when absent")]
    output: Option<PathBuf>,
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut data = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut data)
        .context("read stdin")?;
    Ok(data)
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<u8>> {
    if paths.is_empty() {
        return read_stdin();
    }
    let mut data = Vec::new();
    for path in paths {
        if path.as_os_str() == "-" {
            data.extend_from_slice(&read_stdin()?);
        } else {
            let bytes = fs::read(path).with_context(|| format!("read input {}", path.display()))?;
            data.extend_from_slice(&bytes);
        }
    }
    Ok(data)
}

fn read_containers(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    if paths.is_empty() {
        return Ok(vec![read_stdin()?]);
    }
    paths
        .iter()
        .map(|path| {
            if path.as_os_str() == "-" {
                read_stdin()
            } else {
                fs::read(path).with_context(|| format!("read container {}", path.display()))
            }
        })
        .collect()
}

fn write_output(payload: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, payload)
                .with_context(|| format!("write payload {}", path.display()))?;
            ok!("Payload saved as {} ({} bytes).", path.display(), payload.len());
        }
        None => {
            io::stdout()
                .lock()
                .write_all(payload)
                .context("write payload to stdout")?;
        }
    }
    Ok(())
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let source = ByteSource::resolve(args.random_source.as_deref());
    let opts = EncodeOptions {
        length: args.length,
        width: args.width,
        height: args.height,
        display_width: args.display_width,
        display_height: args.display_height,
        source,
        backend: args.backend,
    };
    let payload = read_inputs(&args.inputs)?;
    match args.output {
        Some(ref path) => encode_to_file(payload, &opts, path),
        None => {
            let container = encode(payload, &opts)?;
            io::stdout()
                .lock()
                .write_all(&container)
                .context("write container to stdout")?;
            Ok(())
        }
    }
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    let source = ByteSource::resolve(args.random_source.as_deref());
    let scale = match (args.display_width, args.display_height) {
        (None, None) => ScaleMode::Native,
        (dw, dh) => {
            let (Some(w), Some(h)) = (args.width, args.height) else {
                bail!(
                    "--display-width/--display-height also need --width and --height, \
                     the storage grid to scale back to"
                );
            };
            ScaleMode::Display {
                width: dw.unwrap_or(w).max(1),
                height: dh.unwrap_or(h).max(1),
            }
        }
    };
    let opts = DecodeOptions {
        length: args.length,
        width: args.width,
        height: args.height,
        scale,
        source,
        backend: args.backend,
    };
    let containers = read_containers(&args.inputs)?;
    step!("Decoding {} container(s)…", containers.len());
    let payload = decode_all(&containers, &opts)?;
    ok!("Recovered {} payload byte(s).", payload.len());
    write_output(&payload, args.output.as_deref())
}

// ========================= Entry =========================

fn main() {
    if let Err(err) = real_main() {
        fail!("{err:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    match Cli::parse().command {
        Command::Encode(args) => run_encode(args),
        Command::Decode(args) => run_decode(args),
    }
}

// ========================= Tests =========================
