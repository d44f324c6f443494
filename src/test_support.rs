/// Fixtures shared by the unit tests: PNG streams with arbitrary chunks and a
/// scratch catalog database.

use image::{DynamicImage, ImageFormat, RgbImage};
use rusqlite::Connection;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Offset right after the IHDR chunk (signature + 25-byte IHDR)
const AFTER_IHDR: usize = 33;

pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// A framed chunk with a valid CRC
pub fn chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(data);

    let mut checked = tag.to_vec();
    checked.extend_from_slice(data);
    out.extend_from_slice(&crc32(&checked).to_be_bytes());
    out
}

pub fn text_chunk(key: &str, value: &str) -> Vec<u8> {
    let mut data = key.as_bytes().to_vec();
    data.push(0);
    data.extend_from_slice(value.as_bytes());
    chunk(b"tEXt", &data)
}

/// Uncompressed iTXt with an empty translated keyword
pub fn itxt_chunk(key: &str, language: &str, value: &str) -> Vec<u8> {
    let mut data = key.as_bytes().to_vec();
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(language.as_bytes());
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(value.as_bytes());
    chunk(b"iTXt", &data)
}

/// zTXt whose payload is taken as-is (it is never inflated)
pub fn ztxt_chunk(key: &str, payload: &[u8]) -> Vec<u8> {
    let mut data = key.as_bytes().to_vec();
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(payload);
    chunk(b"zTXt", &data)
}

/// A decodable RGB PNG with `extra` chunks placed right after IHDR
pub fn png_bytes(width: u32, height: u32, extra: &[Vec<u8>]) -> Vec<u8> {
    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .expect("encode test PNG");

    let mut out = encoded[..AFTER_IHDR].to_vec();
    for chunk in extra {
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&encoded[AFTER_IHDR..]);
    out
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, extra: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(width, height, extra)).expect("write test PNG");
    path
}

/// PNG that classifies as Final through a graph node
pub fn write_final_png(dir: &Path, name: &str) -> PathBuf {
    write_png(
        dir,
        name,
        8,
        6,
        &[text_chunk(
            "invokeai_graph",
            r#"{"nodes":{"l2i":{"type":"l2i","is_intermediate":false}}}"#,
        )],
    )
}

/// A catalog shaped like InvokeAI's `images` table, with `rows` pre-inserted
pub fn create_catalog(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("catalog.db");
    let conn = Connection::open(&path).expect("open test catalog");
    conn.execute(
        "CREATE TABLE images (
            image_name      TEXT NOT NULL,
            image_origin    TEXT,
            image_category  TEXT,
            width           INTEGER,
            height          INTEGER,
            has_workflow    INTEGER DEFAULT 0,
            metadata        TEXT
        )",
        [],
    )
    .expect("create images table");

    for name in rows {
        conn.execute("INSERT INTO images (image_name) VALUES (?1)", [name])
            .expect("seed row");
    }
    path
}
