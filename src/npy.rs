//! Minimal reader/writer for NumPy's `.npy` format (version 1.0)
//!
//! Only the two array kinds the recorder produces are supported: a 1-D array
//! of unsigned bytes (raw IQ captures) and a 0-d little-endian unicode scalar
//! (the cached groundstation id).

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use crate::error::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
// Magic + version + u16 header length
const PREAMBLE_LEN: usize = 10;
const ALIGN: usize = 64;

/// Build a padded header for the given dict fields
fn header(descr: &str, shape: &str) -> Vec<u8> {
    let mut dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    // Pad with spaces so the data starts on an aligned offset, newline terminated
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    let pad = (ALIGN - unpadded % ALIGN) % ALIGN;
    dict.extend(std::iter::repeat(' ').take(pad));
    dict.push('\n');

    let mut out = Vec::with_capacity(PREAMBLE_LEN + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

/// Pull a single value out of the header dict literal
fn field<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let rest = dict[dict.find(&needle)? + needle.len()..].trim_start();
    let end = match rest.chars().next()? {
        '(' => rest.find(')')? + 1,
        q @ ('\'' | '"') => rest[1..].find(q)? + 2,
        _ => rest.find([',', '}'])?,
    };
    Some(rest[..end].trim())
}

struct Header {
    descr: String,
    shape: Vec<usize>,
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<Header> {
    let bad = |msg: &str| Error::Npy {
        path: path.to_owned(),
        msg: msg.to_owned(),
    };
    let mut preamble = [0u8; 8];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC {
        return Err(bad("bad magic"));
    }
    let len = match preamble[6] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        _ => return Err(bad("unsupported version")),
    };
    let mut dict = vec![0u8; len];
    reader.read_exact(&mut dict)?;
    let dict = String::from_utf8(dict).map_err(|_| bad("header is not utf-8"))?;

    let descr = field(&dict, "descr")
        .ok_or_else(|| bad("missing descr"))?
        .trim_matches(|c| c == '\'' || c == '"')
        .to_owned();
    if field(&dict, "fortran_order") != Some("False") {
        return Err(bad("fortran order arrays are not supported"));
    }
    let shape = field(&dict, "shape")
        .ok_or_else(|| bad("missing shape"))?
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad("bad shape")))
        .collect::<Result<Vec<_>>>()?;
    Ok(Header { descr, shape })
}

/// Write a 1-D `|u1` array
pub fn write_bytes<W: Write>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(&header("|u1", &format!("({},)", data.len())))?;
    writer.write_all(data)
}

/// Write a 0-d unicode scalar, as numpy does for a saved `str`
pub fn write_str<W: Write>(writer: &mut W, s: &str) -> std::io::Result<()> {
    let chars: Vec<char> = s.chars().collect();
    writer.write_all(&header(&format!("<U{}", chars.len().max(1)), "()"))?;
    if chars.is_empty() {
        return writer.write_all(&[0u8; 4]);
    }
    for c in chars {
        writer.write_all(&(c as u32).to_le_bytes())?;
    }
    Ok(())
}

pub fn save_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_bytes(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}

pub fn save_str(path: &Path, s: &str) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_str(&mut writer, s)?;
    writer.flush()?;
    Ok(())
}

pub fn load_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader, path)?;
    if header.descr != "|u1" && header.descr != "<u1" || header.shape.len() != 1 {
        return Err(Error::Npy {
            path: path.to_owned(),
            msg: format!("expected 1-D u1 array, got {} {:?}", header.descr, header.shape),
        });
    }
    let mut data = vec![0u8; header.shape[0]];
    reader.read_exact(&mut data)?;
    Ok(data)
}

pub fn load_str(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader, path)?;
    let bad = |msg: String| Error::Npy {
        path: path.to_owned(),
        msg,
    };
    let width = header
        .descr
        .strip_prefix("<U")
        .and_then(|w| w.parse::<usize>().ok())
        .ok_or_else(|| bad(format!("expected unicode scalar, got {}", header.descr)))?;
    if !header.shape.is_empty() {
        return Err(bad(format!("expected 0-d array, got {:?}", header.shape)));
    }
    let mut raw = vec![0u8; width * 4];
    reader.read_exact(&mut raw)?;
    raw.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .take_while(|&c| c != 0)
        .map(|c| char::from_u32(c).ok_or_else(|| bad("invalid code point".to_owned())))
        .collect()
}
