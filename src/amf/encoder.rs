use crate::amf::amf0::{markers, AmfValue};
use crate::{ByteBuffer, Error, Result};

/// AMF0 value serializer.
///
/// The sniffer never writes to the wire; this exists for tests that
/// synthesize command payloads and for the decode/encode round-trip checks.
pub struct Amf0Encoder {
    buffer: ByteBuffer,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Amf0Encoder {
            buffer: ByteBuffer::with_capacity(256),
        }
    }

    pub fn encode(&mut self, value: &AmfValue) -> Result<()> {
        match value {
            AmfValue::Number(n) => self.encode_number(*n),
            AmfValue::Boolean(b) => self.encode_boolean(*b),
            AmfValue::String(s) => self.encode_string(s)?,
            AmfValue::Object(props) => self.encode_object(props)?,
            AmfValue::Array(items) => self.encode_array(items)?,
        }
        Ok(())
    }

    /// Emit a null marker (the value model has no null variant).
    pub fn encode_null(&mut self) {
        self.buffer.write_u8(markers::NULL);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    fn encode_number(&mut self, value: f64) {
        self.buffer.write_u8(markers::NUMBER);
        self.buffer.write_f64_be(value);
    }

    fn encode_boolean(&mut self, value: bool) {
        self.buffer.write_u8(markers::BOOLEAN);
        self.buffer.write_u8(value as u8);
    }

    fn encode_string(&mut self, value: &str) -> Result<()> {
        self.buffer.write_u8(markers::STRING);
        self.write_utf8(value)
    }

    fn encode_object(&mut self, props: &[(String, AmfValue)]) -> Result<()> {
        self.buffer.write_u8(markers::OBJECT);
        for (key, value) in props {
            self.write_utf8(key)?;
            self.encode(value)?;
        }
        // Empty key then end marker terminates the object.
        self.buffer.write_u16_be(0);
        self.buffer.write_u8(markers::OBJECT_END);
        Ok(())
    }

    fn encode_array(&mut self, items: &[AmfValue]) -> Result<()> {
        self.buffer.write_u8(markers::STRICT_ARRAY);
        self.buffer.write_u32_be(items.len() as u32);
        for item in items {
            self.encode(item)?;
        }
        Ok(())
    }

    fn write_utf8(&mut self, value: &str) -> Result<()> {
        if value.len() > u16::MAX as usize {
            return Err(Error::amf_encode(format!(
                "string too long for u16 length prefix: {} bytes",
                value.len()
            )));
        }
        self.buffer.write_u16_be(value.len() as u16);
        self.buffer.write_bytes(value.as_bytes());
        Ok(())
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}
