//! Big-endian primitives shared by the value codec and the message codec.

use tokio_util::bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Length marker for a null string or a null int array.
pub const NULL_LENGTH: i32 = -1;

/// Types with a fixed wire layout that needs no codec settings.
pub trait WireFormat: Sized {
    fn write_to(&self, w: &mut WireWriter);
    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProtocolError>;
}

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn write_len(&mut self, len: usize) {
        self.buf.put_i32(len as i32);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.write_len(v.len());
        self.buf.put_slice(v);
    }

    pub fn write_raw(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    pub fn write_str(&mut self, v: &str) {
        self.write_bytes(v.as_bytes());
    }

    pub fn write_opt_str(&mut self, v: Option<&str>) {
        match v {
            Some(s) => self.write_str(s),
            None => self.buf.put_i32(NULL_LENGTH),
        }
    }

    pub fn write_strings(&mut self, v: &[Option<String>]) {
        self.write_len(v.len());
        for s in v {
            self.write_opt_str(s.as_deref());
        }
    }

    pub fn write_opt_strings(&mut self, v: Option<&[Option<String>]>) {
        match v {
            Some(v) => self.write_strings(v),
            None => self.buf.put_i32(NULL_LENGTH),
        }
    }

    pub fn write_ints(&mut self, v: &[i32]) {
        self.write_len(v.len());
        for &i in v {
            self.buf.put_i32(i);
        }
    }

    pub fn write_opt_ints(&mut self, v: Option<&[i32]>) {
        match v {
            Some(v) => self.write_ints(v),
            None => self.buf.put_i32(NULL_LENGTH),
        }
    }
}

#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fails when bytes are left over.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(ProtocolError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Reads a count of `elem_size`-byte elements, rejecting counts the input cannot hold.
    pub fn read_len(&mut self, what: &'static str, elem_size: usize) -> Result<usize, ProtocolError> {
        let length = self.read_i32()?;
        self.check_len(what, length, elem_size)
    }

    fn check_len(&self, what: &'static str, length: i32, elem_size: usize) -> Result<usize, ProtocolError> {
        if length < 0 {
            return Err(ProtocolError::InvalidLength {
                what,
                length: length.into(),
            });
        }
        let length = length as usize;
        self.need(length.saturating_mul(elem_size))?;
        Ok(length)
    }

    fn read_opt_len(&mut self, what: &'static str, elem_size: usize) -> Result<Option<usize>, ProtocolError> {
        match self.read_i32()? {
            NULL_LENGTH => Ok(None),
            length => self.check_len(what, length, elem_size).map(Some),
        }
    }

    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        self.need(len)?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_len("bytes", 1)?;
        self.read_raw(len)
    }

    pub fn read_str(&mut self) -> Result<String, ProtocolError> {
        self.read_opt_str()?.ok_or(ProtocolError::InvalidLength {
            what: "string",
            length: NULL_LENGTH.into(),
        })
    }

    pub fn read_opt_str(&mut self) -> Result<Option<String>, ProtocolError> {
        let Some(len) = self.read_opt_len("string", 1)? else {
            return Ok(None);
        };
        let bytes = self.read_raw(len)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn read_strings(&mut self) -> Result<Vec<Option<String>>, ProtocolError> {
        let len = self.read_len("string array", 4)?;
        (0..len).map(|_| self.read_opt_str()).collect()
    }

    pub fn read_opt_strings(&mut self) -> Result<Option<Vec<Option<String>>>, ProtocolError> {
        let Some(len) = self.read_opt_len("string array", 4)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_opt_str()).collect::<Result<_, _>>().map(Some)
    }

    pub fn read_ints(&mut self) -> Result<Vec<i32>, ProtocolError> {
        let len = self.read_len("int array", 4)?;
        Ok((0..len).map(|_| self.buf.get_i32()).collect())
    }

    pub fn read_opt_ints(&mut self) -> Result<Option<Vec<i32>>, ProtocolError> {
        let Some(len) = self.read_opt_len("int array", 4)? else {
            return Ok(None);
        };
        Ok(Some((0..len).map(|_| self.buf.get_i32()).collect()))
    }
}
