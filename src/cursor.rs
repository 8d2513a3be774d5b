//! Positioned, length-bounded view over bytes with endian-aware typed accessors.

use crate::endian::Endian;
use crate::error::{EvioError, Result};

/// A cursor over an owned or borrowed byte region.
///
/// Invariant: `position <= limit <= capacity` at all times. Relative
/// accessors advance `position`; absolute accessors leave it untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
    order: Endian,
}

impl ByteCursor {
    /// Wrap an existing byte vector, limit set to its current length.
    pub fn wrap(data: Vec<u8>) -> Self {
        let limit = data.len();
        ByteCursor {
            data,
            position: 0,
            limit,
            mark: None,
            order: Endian::NATIVE,
        }
    }

    /// Allocate a zeroed cursor of the given capacity, limit set to capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ByteCursor::wrap(vec![0u8; capacity])
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn set_order(&mut self, order: Endian) {
        self.order = order;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.limit {
            return Err(EvioError::IndexOutOfRange { index: pos, limit: self.limit });
        }
        self.position = pos;
        Ok(())
    }

    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.data.len() {
            return Err(EvioError::IndexOutOfRange { index: limit, limit: self.data.len() });
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        Ok(())
    }

    /// Java-NIO-style flip: limit = position, position = 0.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Reset limit to capacity, position to 0, clear mark.
    pub fn clear(&mut self) {
        self.limit = self.data.len();
        self.position = 0;
        self.mark = None;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    pub fn reset_to_mark(&mut self) -> Result<()> {
        match self.mark {
            Some(m) => {
                self.position = m;
                Ok(())
            }
            None => Err(EvioError::BadFormat("reset() called with no mark set".into())),
        }
    }

    /// Compact: move [position, limit) to the front, set position to the
    /// moved length, limit to capacity.
    pub fn compact(&mut self) {
        let moved = self.limit - self.position;
        self.data.copy_within(self.position..self.limit, 0);
        self.position = moved;
        self.limit = self.data.len();
        self.mark = None;
    }

    /// Grow the backing storage to `new_capacity`, preserving existing bytes.
    pub fn expand(&mut self, new_capacity: usize) {
        if new_capacity > self.data.len() {
            self.data.resize(new_capacity, 0);
            self.limit = self.data.len();
        }
    }

    /// Produce an independent cursor sharing the same bytes (copy-on-write in
    /// effect, since `ByteCursor` owns its storage).
    pub fn duplicate(&self) -> ByteCursor {
        ByteCursor {
            data: self.data.clone(),
            position: self.position,
            limit: self.limit,
            mark: self.mark,
            order: self.order,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    fn check_read(&self, pos: usize, n: usize) -> Result<()> {
        if pos + n > self.limit {
            return Err(EvioError::Underflow { position: pos, requested: n, limit: self.limit });
        }
        Ok(())
    }

    fn check_write(&self, pos: usize, n: usize) -> Result<()> {
        if pos + n > self.limit {
            return Err(EvioError::Overflow { position: pos, requested: n, limit: self.limit });
        }
        Ok(())
    }

    // ---- absolute accessors ----

    pub fn get_u8_at(&self, pos: usize) -> Result<u8> {
        self.check_read(pos, 1)?;
        Ok(self.data[pos])
    }

    pub fn get_u16_at(&self, pos: usize) -> Result<u16> {
        self.check_read(pos, 2)?;
        Ok(self.order.read_u16(&self.data[pos..pos + 2]))
    }

    pub fn get_u32_at(&self, pos: usize) -> Result<u32> {
        self.check_read(pos, 4)?;
        Ok(self.order.read_u32(&self.data[pos..pos + 4]))
    }

    pub fn get_u64_at(&self, pos: usize) -> Result<u64> {
        self.check_read(pos, 8)?;
        Ok(self.order.read_u64(&self.data[pos..pos + 8]))
    }

    pub fn get_i32_at(&self, pos: usize) -> Result<i32> {
        self.get_u32_at(pos).map(|v| v as i32)
    }

    pub fn get_i64_at(&self, pos: usize) -> Result<i64> {
        self.get_u64_at(pos).map(|v| v as i64)
    }

    pub fn get_f32_at(&self, pos: usize) -> Result<f32> {
        self.check_read(pos, 4)?;
        Ok(self.order.read_f32(&self.data[pos..pos + 4]))
    }

    pub fn get_f64_at(&self, pos: usize) -> Result<f64> {
        self.check_read(pos, 8)?;
        Ok(self.order.read_f64(&self.data[pos..pos + 8]))
    }

    pub fn get_bytes_at(&self, pos: usize, len: usize) -> Result<&[u8]> {
        self.check_read(pos, len)?;
        Ok(&self.data[pos..pos + len])
    }

    pub fn put_u8_at(&mut self, pos: usize, value: u8) -> Result<()> {
        self.check_write(pos, 1)?;
        self.data[pos] = value;
        Ok(())
    }

    pub fn put_u16_at(&mut self, pos: usize, value: u16) -> Result<()> {
        self.check_write(pos, 2)?;
        self.order.write_u16(&mut self.data[pos..pos + 2], value);
        Ok(())
    }

    pub fn put_u32_at(&mut self, pos: usize, value: u32) -> Result<()> {
        self.check_write(pos, 4)?;
        self.order.write_u32(&mut self.data[pos..pos + 4], value);
        Ok(())
    }

    pub fn put_u64_at(&mut self, pos: usize, value: u64) -> Result<()> {
        self.check_write(pos, 8)?;
        self.order.write_u64(&mut self.data[pos..pos + 8], value);
        Ok(())
    }

    pub fn put_f32_at(&mut self, pos: usize, value: f32) -> Result<()> {
        self.check_write(pos, 4)?;
        self.order.write_f32(&mut self.data[pos..pos + 4], value);
        Ok(())
    }

    pub fn put_f64_at(&mut self, pos: usize, value: f64) -> Result<()> {
        self.check_write(pos, 8)?;
        self.order.write_f64(&mut self.data[pos..pos + 8], value);
        Ok(())
    }

    pub fn put_bytes_at(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        self.check_write(pos, bytes.len())?;
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    // ---- relative accessors ----

    pub fn get_u8(&mut self) -> Result<u8> {
        let v = self.get_u8_at(self.position)?;
        self.position += 1;
        Ok(v)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let v = self.get_u16_at(self.position)?;
        self.position += 2;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let v = self.get_u32_at(self.position)?;
        self.position += 4;
        Ok(v)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let v = self.get_u64_at(self.position)?;
        self.position += 8;
        Ok(v)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.get_u32().map(|v| v as i32)
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.get_u64().map(|v| v as i64)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        let v = self.get_f32_at(self.position)?;
        self.position += 4;
        Ok(v)
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        let v = self.get_f64_at(self.position)?;
        self.position += 8;
        Ok(v)
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&[u8]> {
        self.check_read(self.position, len)?;
        let start = self.position;
        self.position += len;
        Ok(&self.data[start..start + len])
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_u8_at(self.position, value)?;
        self.position += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_u16_at(self.position, value)?;
        self.position += 2;
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_u32_at(self.position, value)?;
        self.position += 4;
        Ok(())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put_u64_at(self.position, value)?;
        self.position += 8;
        Ok(())
    }

    pub fn put_f32(&mut self, value: f32) -> Result<()> {
        self.put_f32_at(self.position, value)?;
        self.position += 4;
        Ok(())
    }

    pub fn put_f64(&mut self, value: f64) -> Result<()> {
        self.put_f64_at(self.position, value)?;
        self.position += 8;
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_bytes_at(self.position, bytes)?;
        self.position += bytes.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_accessors_advance_position() {
        let mut c = ByteCursor::with_capacity(16);
        c.set_order(Endian::Big);
        c.put_u32(0xC0DA_0100).unwrap();
        c.put_u16(0xABCD).unwrap();
        assert_eq!(c.position(), 6);
        c.set_position(0).unwrap();
        assert_eq!(c.get_u32().unwrap(), 0xC0DA_0100);
        assert_eq!(c.get_u16().unwrap(), 0xABCD);
    }

    #[test]
    fn underflow_on_read_past_limit() {
        let mut c = ByteCursor::wrap(vec![1, 2, 3]);
        c.set_order(Endian::Big);
        let err = c.get_u32();
        assert!(matches!(err, Err(EvioError::Underflow { .. })));
    }

    #[test]
    fn overflow_on_write_past_limit() {
        let mut c = ByteCursor::with_capacity(2);
        let err = c.put_u32(1);
        assert!(matches!(err, Err(EvioError::Overflow { .. })));
    }

    #[test]
    fn expand_preserves_content() {
        let mut c = ByteCursor::wrap(vec![1, 2, 3, 4]);
        c.expand(8);
        assert_eq!(c.capacity(), 8);
        assert_eq!(&c.as_slice()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn flip_and_clear() {
        let mut c = ByteCursor::with_capacity(8);
        c.put_u32(1).unwrap();
        c.flip();
        assert_eq!(c.position(), 0);
        assert_eq!(c.limit(), 4);
        c.clear();
        assert_eq!(c.limit(), 8);
    }

    #[test]
    fn duplicate_is_independent() {
        let mut c = ByteCursor::wrap(vec![1, 2, 3, 4]);
        let mut d = c.duplicate();
        c.set_position(2).unwrap();
        assert_eq!(d.position(), 0);
        d.put_u8(9).unwrap();
        assert_eq!(c.get_bytes_at(0, 1).unwrap()[0], 1);
    }
}
