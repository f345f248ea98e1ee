//! Output-image serialization for assembled programs.
//!
//! An [`Image`](struct.Image.html) is an ordered list of parts, each a byte
//! block at an absolute load address. Three byte-exact encodings are
//! provided: raw binary (gaps padded with a fill byte), Intel HEX and
//! Motorola S-Records (S19). Target-specific container formats (tape and
//! snapshot layouts) are the concern of external writers consuming the
//! same `Image`.

use byteorder::{BigEndian, WriteBytesExt};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufWriter;
use std::path::Path;

/// Payload bytes per Intel HEX data record.
const HEX_CHUNK: usize = 32;

/// Payload bytes per S1 data record.
const S19_CHUNK: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub address: u32,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    parts: Vec<Part>,
}

impl Image {
    pub fn new() -> Image {
        Image { parts: Vec::new() }
    }

    pub fn from(parts: Vec<Part>) -> Image {
        Image { parts }
    }

    pub fn push(&mut self, address: u32, bytes: Vec<u8>) {
        self.parts.push(Part { address, bytes });
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.bytes.is_empty())
    }

    /// Lowest populated address, if any part holds bytes.
    pub fn base(&self) -> Option<u32> {
        self.parts
            .iter()
            .filter(|p| !p.bytes.is_empty())
            .map(|p| p.address)
            .min()
    }

    /// One past the highest populated address.
    pub fn end(&self) -> Option<u32> {
        self.parts
            .iter()
            .filter(|p| !p.bytes.is_empty())
            .map(|p| p.address + p.bytes.len() as u32)
            .max()
    }
}

/// Raw dump from the lowest to the highest populated address; gaps between
/// parts are padded with `fill`.
pub fn write_bin<W: Write>(writer: &mut W, image: &Image, fill: u8) -> std::io::Result<()> {
    let base = match image.base() {
        Some(base) => base,
        None => return Ok(()),
    };
    let end = image.end().unwrap();
    let mut buffer = vec![fill; (end - base) as usize];
    for part in image.parts() {
        let offset = (part.address - base) as usize;
        buffer[offset..offset + part.bytes.len()].copy_from_slice(&part.bytes);
    }
    writer.write_all(&buffer)
}

fn hex_record<W: Write>(
    writer: &mut W,
    record_type: u8,
    address: u16,
    payload: &[u8],
) -> std::io::Result<()> {
    let mut sum = payload.len() as u8;
    sum = sum
        .wrapping_add((address >> 8) as u8)
        .wrapping_add(address as u8)
        .wrapping_add(record_type);
    write!(writer, ":{:02X}{:04X}{:02X}", payload.len(), address, record_type)?;
    for &b in payload {
        write!(writer, "{:02X}", b)?;
        sum = sum.wrapping_add(b);
    }
    writeln!(writer, "{:02X}", sum.wrapping_neg())
}

/// Intel HEX with type-00 data records and a type-01 end record.
pub fn write_hex<W: Write>(writer: &mut W, image: &Image) -> std::io::Result<()> {
    for part in image.parts() {
        for (i, chunk) in part.bytes.chunks(HEX_CHUNK).enumerate() {
            let address = part.address as u16 + (i * HEX_CHUNK) as u16;
            hex_record(writer, 0, address, chunk)?;
        }
    }
    hex_record(writer, 1, 0, &[])
}

fn s19_record<W: Write>(writer: &mut W, kind: char, address: u16, payload: &[u8]) -> std::io::Result<()> {
    // Length counts address and checksum bytes.
    let length = payload.len() as u8 + 3;
    let mut sum = length
        .wrapping_add((address >> 8) as u8)
        .wrapping_add(address as u8);
    let mut body = Vec::with_capacity(payload.len() + 3);
    body.write_u8(length)?;
    body.write_u16::<BigEndian>(address)?;
    write!(writer, "S{}", kind)?;
    for &b in &body {
        write!(writer, "{:02X}", b)?;
    }
    for &b in payload {
        write!(writer, "{:02X}", b)?;
        sum = sum.wrapping_add(b);
    }
    writeln!(writer, "{:02X}", !sum)
}

/// Motorola S-Records: S1 data records with 16-bit addresses, closed by an
/// S9 termination record carrying the entry address.
pub fn write_s19<W: Write>(writer: &mut W, image: &Image, entry: u16) -> std::io::Result<()> {
    for part in image.parts() {
        for (i, chunk) in part.bytes.chunks(S19_CHUNK).enumerate() {
            let address = part.address as u16 + (i * S19_CHUNK) as u16;
            s19_record(writer, '1', address, chunk)?;
        }
    }
    s19_record(writer, '9', entry, &[])
}

pub trait WriteImageExt: Write + Sized {
    fn write_bin_image(&mut self, image: &Image, fill: u8) -> std::io::Result<()> {
        write_bin(self, image, fill)
    }

    fn write_hex_image(&mut self, image: &Image) -> std::io::Result<()> {
        write_hex(self, image)
    }

    fn write_s19_image(&mut self, image: &Image, entry: u16) -> std::io::Result<()> {
        write_s19(self, image, entry)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

pub fn write_bin_file<P: AsRef<Path>>(path: P, image: &Image, fill: u8) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_bin_image(image, fill)
}

pub fn write_hex_file<P: AsRef<Path>>(path: P, image: &Image) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_hex_image(image)
}

pub fn write_s19_file<P: AsRef<Path>>(path: P, image: &Image, entry: u16) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_s19_image(image, entry)
}

#[cfg(test)]
mod test {
    use super::*;

    fn image() -> Image {
        Image::from(vec![Part {
            address: 0x0100,
            bytes: vec![0x21, 0x46, 0x01, 0x76],
        }])
    }

    fn render<F: FnOnce(&mut Vec<u8>)>(f: F) -> String {
        let mut out = Vec::new();
        f(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn bin_pads_gaps() {
        let mut image = image();
        image.push(0x0108, vec![0xAA]);
        let mut out = Vec::new();
        write_bin(&mut out, &image, 0xFF).unwrap();
        assert_eq!(
            out,
            vec![0x21, 0x46, 0x01, 0x76, 0xFF, 0xFF, 0xFF, 0xFF, 0xAA]
        );
    }

    #[test]
    fn bin_of_empty_image_is_empty() {
        let mut out = Vec::new();
        write_bin(&mut out, &Image::new(), 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn hex_records_are_byte_exact() {
        let text = render(|out| write_hex(out, &image()).unwrap());
        assert_eq!(text, ":04010000214601761D\n:00000001FF\n");
    }

    #[test]
    fn hex_splits_long_parts() {
        let part = Part {
            address: 0,
            bytes: vec![0u8; 40],
        };
        let text = render(|out| write_hex(out, &Image::from(vec![part])).unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(":20000000"));
        assert!(lines[1].starts_with(":08002000"));
        assert_eq!(lines[2], ":00000001FF");
    }

    #[test]
    fn s19_records_are_byte_exact() {
        let text = render(|out| write_s19(out, &image(), 0x0100).unwrap());
        assert_eq!(text, "S10701002146017619\nS9030100FB\n");
    }
}
