//! PNG decoder (component H, spec §4.5): chunk parser, scanline filter
//! inverses, colour-type conversion to RGB565, row-callback emission.

use alloc::vec;
use alloc::vec::Vec;

use crate::color::rgb565;
use crate::error::{Error, Result};
use crate::image::deflate::{Inflater, Status, WINDOW_SIZE};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Gray,
    Rgb,
    Indexed,
    GrayAlpha,
    Rgba,
}

impl ColorType {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Gray),
            2 => Ok(Self::Rgb),
            3 => Ok(Self::Indexed),
            4 => Ok(Self::GrayAlpha),
            6 => Ok(Self::Rgba),
            _ => Err(Error::InvalidFormat),
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Gray => 1,
            ColorType::Rgb => 3,
            ColorType::Indexed => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
}

fn read_chunks(data: &[u8]) -> Result<(ImageInfo, Vec<u8>, Vec<[u8; 3]>)> {
    if data.len() < 8 || data[0..8] != SIGNATURE {
        return Err(Error::InvalidFormat);
    }
    let mut pos = 8;
    let mut info: Option<ImageInfo> = None;
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut idat = Vec::new();

    loop {
        if pos + 8 > data.len() {
            return Err(Error::InvalidFormat);
        }
        let length = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        let chunk_type = &data[pos + 4..pos + 8];
        let body_start = pos + 8;
        if body_start + length + 4 > data.len() {
            return Err(Error::InvalidFormat);
        }
        let body = &data[body_start..body_start + length];

        match chunk_type {
            b"IHDR" => {
                if body.len() < 13 {
                    return Err(Error::InvalidFormat);
                }
                let width = u32::from_be_bytes(body[0..4].try_into().unwrap());
                let height = u32::from_be_bytes(body[4..8].try_into().unwrap());
                let bit_depth = body[8];
                if bit_depth != 8 {
                    return Err(Error::InvalidFormat);
                }
                let color_type = ColorType::from_byte(body[9])?;
                info = Some(ImageInfo { width, height, color_type });
            }
            b"PLTE" => {
                palette = body.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            }
            b"IDAT" => {
                idat.extend_from_slice(body);
            }
            b"IEND" => break,
            _ => {}
        }
        pos = body_start + length + 4; // skip CRC
    }

    let info = info.ok_or(Error::InvalidFormat)?;
    if info.color_type == ColorType::Indexed && palette.is_empty() {
        return Err(Error::InvalidFormat);
    }
    Ok((info, idat, palette))
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn unfilter_line(filter: u8, cur: &mut [u8], prev: &[u8], bpp: usize) -> Result<()> {
    match filter {
        0 => {}
        1 => {
            for i in bpp..cur.len() {
                cur[i] = cur[i].wrapping_add(cur[i - bpp]);
            }
        }
        2 => {
            for i in 0..cur.len() {
                cur[i] = cur[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..cur.len() {
                let a = if i >= bpp { cur[i - bpp] as u16 } else { 0 };
                let b = prev[i] as u16;
                cur[i] = cur[i].wrapping_add(((a + b) / 2) as u8);
            }
        }
        4 => {
            for i in 0..cur.len() {
                let a = if i >= bpp { cur[i - bpp] } else { 0 };
                let b = prev[i];
                let c = if i >= bpp { prev[i - bpp] } else { 0 };
                cur[i] = cur[i].wrapping_add(paeth(a, b, c));
            }
        }
        _ => return Err(Error::InvalidFormat),
    }
    Ok(())
}

fn pixel_to_rgb565(color_type: ColorType, px: &[u8], palette: &[[u8; 3]]) -> u16 {
    match color_type {
        ColorType::Gray => rgb565(px[0], px[0], px[0]),
        ColorType::Rgb => rgb565(px[0], px[1], px[2]),
        ColorType::Indexed => {
            let entry = palette.get(px[0] as usize).copied().unwrap_or([0, 0, 0]);
            rgb565(entry[0], entry[1], entry[2])
        }
        ColorType::GrayAlpha => rgb565(px[0], px[0], px[0]),
        ColorType::Rgba => rgb565(px[0], px[1], px[2]),
    }
}

/// Decodes a full PNG image, invoking `on_row(y, &row_rgb565)` once per
/// scanline as it becomes available (spec §4.5's "emit the row via
/// callback" step). `row_rgb565` holds `width` little-endian RGB565 cells.
pub fn decode(data: &[u8], mut on_row: impl FnMut(u32, &[u16])) -> Result<ImageInfo> {
    let (info, idat, palette) = read_chunks(data)?;
    let bpp = info.color_type.bytes_per_pixel();
    let stride = info.width as usize * bpp;

    let mut inflater = Inflater::new();
    let mut window = vec![0u8; WINDOW_SIZE];
    let mut cur = vec![0u8; stride];
    let mut prev = vec![0u8; stride];
    let mut row565 = vec![0u16; info.width as usize];

    let mut y = 0u32;
    let mut line_pos = 0usize; // 0 = expecting filter byte, else 1 + bytes-filled-in-cur
    let mut filter_byte = 0u8;
    let mut in_pos = 0usize;

    while y < info.height {
        // The whole remaining IDAT payload is handed over each iteration
        // (all IDAT chunks were already concatenated in `read_chunks`), so
        // there is never additional input beyond what `chunk` already
        // holds.
        let chunk = &idat[in_pos..];
        let result = inflater.step(chunk, false, &mut window);
        in_pos += result.consumed;

        let mut produced_pos = 0usize;
        while produced_pos < result.produced {
            if line_pos == 0 {
                filter_byte = window[produced_pos];
                produced_pos += 1;
                line_pos = 1;
            } else {
                let need = stride - (line_pos - 1);
                let available = result.produced - produced_pos;
                let take = need.min(available);
                cur[line_pos - 1..line_pos - 1 + take].copy_from_slice(&window[produced_pos..produced_pos + take]);
                produced_pos += take;
                line_pos += take;

                if line_pos - 1 == stride {
                    unfilter_line(filter_byte, &mut cur, &prev, bpp)?;
                    for (x, px) in cur.chunks_exact(bpp).enumerate() {
                        row565[x] = pixel_to_rgb565(info.color_type, px, &palette);
                    }
                    on_row(y, &row565);
                    core::mem::swap(&mut cur, &mut prev);
                    y += 1;
                    line_pos = 0;
                    if y >= info.height {
                        break;
                    }
                }
            }
        }

        match result.status {
            Status::Done => break,
            Status::Error => return Err(Error::InvalidFormat),
            Status::NeedsInput if in_pos >= idat.len() => {
                if y < info.height {
                    return Err(Error::InvalidFormat);
                }
                break;
            }
            _ => {}
        }
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn adler32(data: &[u8]) -> u32 {
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + byte as u32) % 65521;
            b = (b + a) % 65521;
        }
        (b << 16) | a
    }

    fn zlib_stored(raw: &[u8]) -> Vec<u8> {
        let mut out = vec![0x78, 0x01];
        let mut pos = 0;
        while pos < raw.len() || (pos == 0 && raw.is_empty()) {
            let remaining = raw.len() - pos;
            let chunk_len = remaining.min(65535);
            let is_last = pos + chunk_len >= raw.len();
            out.push(if is_last { 1 } else { 0 });
            let len = chunk_len as u16;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&(!len).to_le_bytes());
            out.extend_from_slice(&raw[pos..pos + chunk_len]);
            pos += chunk_len;
            if chunk_len == 0 {
                break;
            }
        }
        out.extend_from_slice(&adler32(raw).to_be_bytes());
        out
    }

    fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0, 0, 0]); // CRC skipped by the decoder
        out
    }

    fn build_png(width: u32, height: u32, color_type: u8, raw_scanlines: &[u8]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.push(8); // bit depth
        ihdr.push(color_type);
        ihdr.extend_from_slice(&[0, 0, 0]); // compression, filter, interlace
        out.extend(chunk(b"IHDR", &ihdr));
        out.extend(chunk(b"IDAT", &zlib_stored(raw_scanlines)));
        out.extend(chunk(b"IEND", &[]));
        out
    }

    #[test]
    fn decodes_a_tiny_rgb_image_with_no_filtering() {
        // 2x1 RGB image, filter type 0 (None) on its single scanline.
        let scanline = [0u8, 255, 0, 0, 0, 0, 255]; // filter=0, px0=(255,0,0), px1=(0,0,255)
        let png = build_png(2, 1, 2, &scanline);
        let mut rows: Vec<Vec<u16>> = Vec::new();
        let info = decode(&png, |_y, row| rows.push(row.to_vec())).unwrap();
        assert_eq!(info.width, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], rgb565(255, 0, 0));
        assert_eq!(rows[0][1], rgb565(0, 0, 255));
    }

    #[test]
    fn sub_filter_accumulates_across_the_row() {
        // 3x1 grayscale image: filter=1 (Sub), raw bytes 10, 5, 5 -> decoded
        // as 10, 15, 20.
        let scanline = [1u8, 10, 5, 5];
        let png = build_png(3, 1, 0, &scanline);
        let mut rows: Vec<Vec<u16>> = Vec::new();
        decode(&png, |_y, row| rows.push(row.to_vec())).unwrap();
        assert_eq!(rows[0][0], rgb565(10, 10, 10));
        assert_eq!(rows[0][1], rgb565(15, 15, 15));
        assert_eq!(rows[0][2], rgb565(20, 20, 20));
    }

    #[test]
    fn rejects_bad_signature() {
        let bad = [0u8; 16];
        assert!(decode(&bad, |_, _| {}).is_err());
    }
}
