use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Sparse byte-addressed memory image: linker output, emulator input.
///
/// Text form is `<hexaddr>: b0 b1 .. b7` rows, eight bytes per row, with a
/// fresh row started at every address gap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    pub bytes: BTreeMap<u32, u8>,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("malformed address `{0}`")]
    BadAddress(String),

    #[error("malformed byte `{0}`")]
    BadByte(String),

    #[error("byte value before any address marker")]
    NoAddress,
}

impl MemoryImage {
    pub fn insert(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u32), *b);
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut row = 0;
        let mut prev: Option<u32> = None;
        for (&addr, &byte) in &self.bytes {
            let contiguous = prev.is_some_and(|p| p.wrapping_add(1) == addr);
            if !contiguous || row == 8 {
                if prev.is_some() {
                    out.push('\n');
                }
                let _ = write!(out, "{:08x}:", addr);
                row = 0;
            }
            let _ = write!(out, " {:02x}", byte);
            row += 1;
            prev = Some(addr);
        }
        if prev.is_some() {
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, ImageError> {
        let mut image = MemoryImage::default();
        let mut addr: Option<u32> = None;
        for tok in text.split_whitespace() {
            if let Some(hex) = tok.strip_suffix(':') {
                addr = Some(
                    u32::from_str_radix(hex, 16)
                        .map_err(|_| ImageError::BadAddress(tok.to_string()))?,
                );
                continue;
            }
            let a = addr.as_mut().ok_or(ImageError::NoAddress)?;
            let byte =
                u8::from_str_radix(tok, 16).map_err(|_| ImageError::BadByte(tok.to_string()))?;
            image.bytes.insert(*a, byte);
            *a = a.wrapping_add(1);
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_gap() {
        let mut img = MemoryImage::default();
        img.insert(0x4000_0000, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        img.insert(0x5000_0000, &[0xAA, 0xBB]);
        let text = img.render();
        assert_eq!(MemoryImage::parse(&text).unwrap(), img);
        // 10 contiguous bytes wrap to a second row; the gap starts a third
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("40000000: 01 02 03 04 05 06 07 08\n40000008: 09 0a"));
    }

    #[test]
    fn rejects_byte_before_address() {
        assert!(matches!(MemoryImage::parse("0a 0b"), Err(ImageError::NoAddress)));
    }
}
