//! Composite tabular leaf codec: a small format-string language describing
//! repeated rows of primitive columns, plus the char8* string-array packing
//! shared by every structure kind.
//!
//! Format strings are a comma-separated sequence of items. An item is either
//! a type character optionally preceded by a repeat count, or a parenthesized
//! group optionally preceded by a repeat count. A repeat count is either a
//! literal decimal number or one of `N`/`n`/`m`, meaning "read a 32/16/8-bit
//! count from the data stream at this point and use that instead". Example:
//! `"2(N,i)"` runs its group twice; each iteration reads a `u32` count and
//! then that many `i32` values.

use crate::endian::Endian;
use crate::error::{EvioError, Result};
use crate::swap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Str,
}

impl CompositeType {
    fn width(self) -> usize {
        match self {
            CompositeType::Int8 | CompositeType::Uint8 => 1,
            CompositeType::Int16 | CompositeType::Uint16 => 2,
            CompositeType::Int32 | CompositeType::Uint32 | CompositeType::Float32 => 4,
            CompositeType::Int64 | CompositeType::Uint64 | CompositeType::Float64 => 8,
            CompositeType::Str => 0,
        }
    }

    fn from_char(c: char) -> Result<CompositeType> {
        Ok(match c {
            'c' => CompositeType::Int8,
            'C' => CompositeType::Uint8,
            's' => CompositeType::Int16,
            'S' => CompositeType::Uint16,
            'i' => CompositeType::Int32,
            'I' => CompositeType::Uint32,
            'l' => CompositeType::Int64,
            'L' => CompositeType::Uint64,
            'f' => CompositeType::Float32,
            'd' => CompositeType::Float64,
            'a' => CompositeType::Str,
            other => return Err(EvioError::BadFormat(format!("unknown composite type char '{other}'"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCount {
    Literal(u32),
    FromData32,
    FromData16,
    FromData8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormatToken {
    Item { repeat: RepeatCount, ty: CompositeType },
    Group { repeat: RepeatCount, tokens: Vec<FormatToken> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompositeValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Parser { chars: s.chars().peekable() }
    }

    fn parse_format(s: &str) -> Result<Vec<FormatToken>> {
        let mut p = Parser::new(s);
        let tokens = p.parse_sequence()?;
        if p.chars.peek().is_some() {
            return Err(EvioError::BadFormat(format!("trailing characters in format string '{s}'")));
        }
        Ok(tokens)
    }

    fn parse_sequence(&mut self) -> Result<Vec<FormatToken>> {
        let mut out = Vec::new();
        loop {
            self.skip_commas();
            match self.chars.peek() {
                None | Some(')') => break,
                _ => out.push(self.parse_item()?),
            }
        }
        Ok(out)
    }

    fn skip_commas(&mut self) {
        while matches!(self.chars.peek(), Some(',')) {
            self.chars.next();
        }
    }

    fn parse_item(&mut self) -> Result<FormatToken> {
        let repeat = self.parse_repeat()?;
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                let inner = self.parse_sequence()?;
                match self.chars.next() {
                    Some(')') => Ok(FormatToken::Group { repeat, tokens: inner }),
                    _ => Err(EvioError::BadFormat("unterminated group in composite format".into())),
                }
            }
            Some(&c) if c.is_alphabetic() => {
                self.chars.next();
                Ok(FormatToken::Item { repeat, ty: CompositeType::from_char(c)? })
            }
            _ => Err(EvioError::BadFormat("expected type character or group after repeat count".into())),
        }
    }

    fn parse_repeat(&mut self) -> Result<RepeatCount> {
        match self.chars.peek() {
            Some('N') => {
                self.chars.next();
                Ok(RepeatCount::FromData32)
            }
            Some('n') => {
                self.chars.next();
                Ok(RepeatCount::FromData16)
            }
            Some('m') => {
                self.chars.next();
                Ok(RepeatCount::FromData8)
            }
            Some(c) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = self.chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Ok(RepeatCount::Literal(digits.parse().unwrap_or(1)))
            }
            _ => Ok(RepeatCount::Literal(1)),
        }
    }
}

pub fn parse_format(s: &str) -> Result<Vec<FormatToken>> {
    Parser::parse_format(s)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    order: Endian,
}

impl<'a> Decoder<'a> {
    fn resolve_repeat(&mut self, repeat: RepeatCount) -> Result<u32> {
        match repeat {
            RepeatCount::Literal(n) => Ok(n),
            RepeatCount::FromData32 => {
                let v = self.order.read_u32(self.take(4)?);
                Ok(v)
            }
            RepeatCount::FromData16 => {
                let v = self.order.read_u16(self.take(2)?);
                Ok(v as u32)
            }
            RepeatCount::FromData8 => Ok(self.take(1)?[0] as u32),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(EvioError::Underflow { position: self.pos, requested: n, limit: self.data.len() });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn decode_value(&mut self, ty: CompositeType) -> Result<CompositeValue> {
        Ok(match ty {
            CompositeType::Int8 => CompositeValue::I8(self.take(1)?[0] as i8),
            CompositeType::Uint8 => CompositeValue::U8(self.take(1)?[0]),
            CompositeType::Int16 => CompositeValue::I16(self.order.read_u16(self.take(2)?) as i16),
            CompositeType::Uint16 => CompositeValue::U16(self.order.read_u16(self.take(2)?)),
            CompositeType::Int32 => CompositeValue::I32(self.order.read_u32(self.take(4)?) as i32),
            CompositeType::Uint32 => CompositeValue::U32(self.order.read_u32(self.take(4)?)),
            CompositeType::Int64 => CompositeValue::I64(self.order.read_u64(self.take(8)?) as i64),
            CompositeType::Uint64 => CompositeValue::U64(self.order.read_u64(self.take(8)?)),
            CompositeType::Float32 => CompositeValue::F32(self.order.read_f32(self.take(4)?)),
            CompositeType::Float64 => CompositeValue::F64(self.order.read_f64(self.take(8)?)),
            CompositeType::Str => {
                let start = self.pos;
                while self.pos < self.data.len() && self.data[self.pos] != 0 {
                    self.pos += 1;
                }
                let s = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
                if self.pos < self.data.len() {
                    self.pos += 1;
                }
                CompositeValue::Str(s)
            }
        })
    }

    fn decode_tokens(&mut self, tokens: &[FormatToken], out: &mut Vec<CompositeValue>) -> Result<()> {
        for token in tokens {
            match token {
                FormatToken::Item { repeat, ty } => {
                    let n = self.resolve_repeat(*repeat)?;
                    for _ in 0..n {
                        out.push(self.decode_value(*ty)?);
                    }
                }
                FormatToken::Group { repeat, tokens } => {
                    let n = self.resolve_repeat(*repeat)?;
                    for _ in 0..n {
                        self.decode_tokens(tokens, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Decode raw composite bytes against a parsed format, producing a flat
/// stream of typed values in encounter order.
pub fn decode(data: &[u8], order: Endian, tokens: &[FormatToken]) -> Result<Vec<CompositeValue>> {
    let mut decoder = Decoder { data, pos: 0, order };
    let mut out = Vec::new();
    decoder.decode_tokens(tokens, &mut out)?;
    Ok(out)
}

struct Encoder {
    order: Endian,
    out: Vec<u8>,
}

impl Encoder {
    fn push_value(&mut self, v: &CompositeValue) {
        match v {
            CompositeValue::I8(x) => self.out.push(*x as u8),
            CompositeValue::U8(x) => self.out.push(*x),
            CompositeValue::I16(x) => {
                let mut b = [0u8; 2];
                self.order.write_u16(&mut b, *x as u16);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::U16(x) => {
                let mut b = [0u8; 2];
                self.order.write_u16(&mut b, *x);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::I32(x) => {
                let mut b = [0u8; 4];
                self.order.write_u32(&mut b, *x as u32);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::U32(x) => {
                let mut b = [0u8; 4];
                self.order.write_u32(&mut b, *x);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::I64(x) => {
                let mut b = [0u8; 8];
                self.order.write_u64(&mut b, *x as u64);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::U64(x) => {
                let mut b = [0u8; 8];
                self.order.write_u64(&mut b, *x);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::F32(x) => {
                let mut b = [0u8; 4];
                self.order.write_f32(&mut b, *x);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::F64(x) => {
                let mut b = [0u8; 8];
                self.order.write_f64(&mut b, *x);
                self.out.extend_from_slice(&b);
            }
            CompositeValue::Str(s) => {
                self.out.extend_from_slice(s.as_bytes());
                self.out.push(0);
            }
        }
    }
}

/// Encode a flat value stream back into raw bytes. Literal repeat counts in
/// `tokens` are trusted to match `values`'s shape; `N`/`n`/`m` counts are
/// re-derived from how many values are consumed and written back into the
/// stream ahead of their group.
pub fn encode(values: &[CompositeValue], order: Endian, tokens: &[FormatToken]) -> Result<Vec<u8>> {
    let mut encoder = Encoder { order, out: Vec::new() };
    let mut cursor = 0usize;
    encode_tokens(&mut encoder, tokens, values, &mut cursor)?;
    Ok(encoder.out)
}

fn encode_tokens(
    encoder: &mut Encoder,
    tokens: &[FormatToken],
    values: &[CompositeValue],
    cursor: &mut usize,
) -> Result<()> {
    for token in tokens {
        match token {
            FormatToken::Item { repeat, ty: _ } => {
                let n = match repeat {
                    RepeatCount::Literal(n) => *n,
                    RepeatCount::FromData32 | RepeatCount::FromData16 | RepeatCount::FromData8 => {
                        return Err(EvioError::BadFormat(
                            "dynamic repeat counts are only supported on groups, not bare items".into(),
                        ))
                    }
                };
                for _ in 0..n {
                    let v = values.get(*cursor).ok_or(EvioError::Underflow { position: *cursor, requested: 1, limit: values.len() })?;
                    encoder.push_value(v);
                    *cursor += 1;
                }
            }
            FormatToken::Group { repeat, tokens: inner } => {
                let n = match repeat {
                    RepeatCount::Literal(n) => *n,
                    RepeatCount::FromData32 | RepeatCount::FromData16 | RepeatCount::FromData8 => {
                        return Err(EvioError::BadFormat(
                            "dynamic repeat counts on groups must be supplied by the caller, not inferred".into(),
                        ))
                    }
                };
                for _ in 0..n {
                    encode_tokens(encoder, inner, values, cursor)?;
                }
            }
        }
    }
    Ok(())
}

/// Swap composite payload bytes in place without fully decoding to values:
/// walk the format, swapping each fixed-width element and re-reading any
/// `N`/`n`/`m` repeat count (itself swapped) to know how far to advance.
pub fn swap_all(src: &[u8], dst: &mut [u8], tokens: &[FormatToken], from_order: Endian) -> Result<()> {
    if src.len() != dst.len() {
        return Err(EvioError::BadFormat("swap_all: src/dst length mismatch".into()));
    }
    let mut pos = 0usize;
    swap_tokens(src, dst, tokens, &mut pos, from_order)
}

fn swap_tokens(src: &[u8], dst: &mut [u8], tokens: &[FormatToken], pos: &mut usize, order: Endian) -> Result<()> {
    for token in tokens {
        match token {
            FormatToken::Item { repeat, ty } => {
                let n = swap_repeat(src, dst, repeat, pos, order)?;
                for _ in 0..n {
                    swap_one(src, dst, *ty, pos)?;
                }
            }
            FormatToken::Group { repeat, tokens: inner } => {
                let n = swap_repeat(src, dst, repeat, pos, order)?;
                for _ in 0..n {
                    swap_tokens(src, dst, inner, pos, order)?;
                }
            }
        }
    }
    Ok(())
}

fn swap_repeat(src: &[u8], dst: &mut [u8], repeat: &RepeatCount, pos: &mut usize, order: Endian) -> Result<u32> {
    Ok(match repeat {
        RepeatCount::Literal(n) => *n,
        RepeatCount::FromData32 => {
            check_bounds(src.len(), *pos, 4)?;
            swap::swap32(&src[*pos..*pos + 4], &mut dst[*pos..*pos + 4])?;
            let n = order.opposite().read_u32(&dst[*pos..*pos + 4]);
            *pos += 4;
            n
        }
        RepeatCount::FromData16 => {
            check_bounds(src.len(), *pos, 2)?;
            swap::swap16(&src[*pos..*pos + 2], &mut dst[*pos..*pos + 2])?;
            let n = order.opposite().read_u16(&dst[*pos..*pos + 2]) as u32;
            *pos += 2;
            n
        }
        RepeatCount::FromData8 => {
            check_bounds(src.len(), *pos, 1)?;
            dst[*pos] = src[*pos];
            let n = src[*pos] as u32;
            *pos += 1;
            n
        }
    })
}

fn check_bounds(len: usize, pos: usize, n: usize) -> Result<()> {
    if pos + n > len {
        return Err(EvioError::Underflow { position: pos, requested: n, limit: len });
    }
    Ok(())
}

fn swap_one(src: &[u8], dst: &mut [u8], ty: CompositeType, pos: &mut usize) -> Result<()> {
    let width = ty.width();
    if ty == CompositeType::Str {
        let start = *pos;
        while *pos < src.len() && src[*pos] != 0 {
            *pos += 1;
        }
        dst[start..*pos].copy_from_slice(&src[start..*pos]);
        if *pos < src.len() {
            dst[*pos] = 0;
            *pos += 1;
        }
        return Ok(());
    }
    check_bounds(src.len(), *pos, width)?;
    match width {
        1 => dst[*pos] = src[*pos],
        2 => swap::swap16(&src[*pos..*pos + width], &mut dst[*pos..*pos + width])?,
        4 => swap::swap32(&src[*pos..*pos + width], &mut dst[*pos..*pos + width])?,
        8 => swap::swap64(&src[*pos..*pos + width], &mut dst[*pos..*pos + width])?,
        _ => unreachable!(),
    }
    *pos += width;
    Ok(())
}

/// Pack a list of strings into evio's char8* leaf convention: each string is
/// null-terminated, the whole blob is padded with trailing nulls to a 4-byte
/// boundary (and, per the legacy convention, at least one full pad word if
/// the unpadded length already lands on a boundary).
pub fn strings_to_format(strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    let pad = crate::header::padding_for_len(out.len(), 1);
    let pad = if pad == 0 { 4 } else { pad };
    for _ in 0..pad {
        out.push(0);
    }
    out
}

/// Split a char8* leaf's raw bytes back into its component strings, dropping
/// the trailing padding nulls.
pub fn string_to_raw_bytes(data: &[u8]) -> Vec<String> {
    let trimmed = {
        let mut end = data.len();
        while end > 0 && data[end - 1] == 0 {
            end -= 1;
        }
        &data[..end]
    };
    trimmed
        .split(|&b| b == 0)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}
