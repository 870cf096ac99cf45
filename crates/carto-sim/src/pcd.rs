//! Minimal PCD (point cloud data) reader and writer
//!
//! Supports `x y z` float clouds in `ascii` and `binary` encodings, which is
//! what lidar readings and exported maps use.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// A point in millimeters
pub type Point = [f32; 3];

/// PCD parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PcdError {
    #[error("missing header field: {0}")]
    MissingField(&'static str),

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("unsupported data encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("truncated data: expected {expected} points, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("invalid point on line {line}")]
    InvalidPoint { line: usize },

    #[error("declared {declared} points, limit is {max}")]
    TooManyPoints { declared: usize, max: usize },
}

/// Largest cloud a document may declare
pub const PCD_POINTS_COUNT_MAX: usize = 4 * 1024 * 1024;

const POINT_SIZE_BYTES: usize = 12;

// Shortest ascii point line: "0 0 0\n".
const ASCII_POINT_SIZE_BYTES_MIN: usize = 6;

/// Encode points as a binary PCD document
pub fn encode(points: &[Point]) -> Bytes {
    let header = format!(
        "# .PCD v0.7 - Point Cloud Data file format\n\
         VERSION .7\n\
         FIELDS x y z\n\
         SIZE 4 4 4\n\
         TYPE F F F\n\
         COUNT 1 1 1\n\
         WIDTH {n}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {n}\n\
         DATA binary\n",
        n = points.len()
    );

    let mut buf = BytesMut::with_capacity(header.len() + points.len() * POINT_SIZE_BYTES);
    buf.put_slice(header.as_bytes());
    for [x, y, z] in points {
        buf.put_f32_le(*x);
        buf.put_f32_le(*y);
        buf.put_f32_le(*z);
    }
    buf.freeze()
}

/// Encode points as an ascii PCD document
pub fn encode_ascii(points: &[Point]) -> Bytes {
    let mut text = format!(
        "VERSION .7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\n\
         WIDTH {n}\nHEIGHT 1\nPOINTS {n}\nDATA ascii\n",
        n = points.len()
    );
    for [x, y, z] in points {
        text.push_str(&format!("{} {} {}\n", x, y, z));
    }
    Bytes::from(text)
}

/// Decode a PCD document into points
pub fn decode(data: &[u8]) -> Result<Vec<Point>, PcdError> {
    let mut points_declared = None;
    let mut offset = 0;

    loop {
        let rest = &data[offset..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PcdError::MissingField("DATA"))?;
        let line = std::str::from_utf8(&rest[..end])
            .map_err(|_| PcdError::InvalidHeader("non-utf8 header".into()))?
            .trim();
        offset += end + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default();
        match key {
            "POINTS" => {
                let count = parts
                    .next()
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or_else(|| PcdError::InvalidHeader(line.to_string()))?;
                if count > PCD_POINTS_COUNT_MAX {
                    return Err(PcdError::TooManyPoints {
                        declared: count,
                        max: PCD_POINTS_COUNT_MAX,
                    });
                }
                points_declared = Some(count);
            }
            "FIELDS" => {
                let fields: Vec<_> = parts.collect();
                if fields != ["x", "y", "z"] {
                    return Err(PcdError::InvalidHeader(line.to_string()));
                }
            }
            "DATA" => {
                let expected = points_declared.ok_or(PcdError::MissingField("POINTS"))?;
                return match parts.next() {
                    Some("ascii") => decode_ascii(&data[offset..], expected),
                    Some("binary") => decode_binary(&data[offset..], expected),
                    other => Err(PcdError::UnsupportedEncoding(
                        other.unwrap_or_default().to_string(),
                    )),
                };
            }
            "VERSION" | "SIZE" | "TYPE" | "COUNT" | "WIDTH" | "HEIGHT" | "VIEWPOINT" => {}
            _ => return Err(PcdError::InvalidHeader(line.to_string())),
        }
    }
}

/// Number of points in a PCD document
pub fn point_count(data: &[u8]) -> Result<usize, PcdError> {
    decode(data).map(|points| points.len())
}

fn decode_ascii(body: &[u8], expected: usize) -> Result<Vec<Point>, PcdError> {
    let text = std::str::from_utf8(body).map_err(|_| PcdError::InvalidPoint { line: 0 })?;
    // The header is untrusted; never reserve more than the body can hold.
    let mut points = Vec::with_capacity(expected.min(body.len() / ASCII_POINT_SIZE_BYTES_MIN));

    for (line_no, line) in text.lines().enumerate() {
        if points.len() == expected {
            break;
        }
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|v| v.parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| PcdError::InvalidPoint { line: line_no })?;
        match values.as_slice() {
            [x, y, z] => points.push([*x, *y, *z]),
            _ => return Err(PcdError::InvalidPoint { line: line_no }),
        }
    }

    if points.len() < expected {
        return Err(PcdError::Truncated {
            expected,
            found: points.len(),
        });
    }
    Ok(points)
}

fn decode_binary(body: &[u8], expected: usize) -> Result<Vec<Point>, PcdError> {
    let found = body.len() / POINT_SIZE_BYTES;
    if found < expected {
        return Err(PcdError::Truncated { expected, found });
    }

    let points = body
        .chunks_exact(POINT_SIZE_BYTES)
        .take(expected)
        .map(|chunk| {
            let read = |i: usize| {
                f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
            };
            [read(0), read(4), read(8)]
        })
        .collect();
    Ok(points)
}
