use std::fmt;

/// AMF0 value as it appears in RTMP command payloads.
///
/// Objects keep their properties in first-seen order; a duplicate key
/// overwrites the earlier value in place. Null and the object-end marker are
/// never materialized, the decoder reports them as `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Number(f64),                      // 0x00
    Boolean(bool),                    // 0x01
    String(String),                   // 0x02
    Object(Vec<(String, AmfValue)>),  // 0x03
    Array(Vec<AmfValue>),             // 0x08 (strict array)
}

// AMF0 type markers
pub mod markers {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const STRICT_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
}

impl AmfValue {
    /// Extract number value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Extract boolean value
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract object properties
    pub fn as_object(&self) -> Option<&[(String, AmfValue)]> {
        match self {
            AmfValue::Object(props) => Some(props),
            _ => None,
        }
    }

    /// Get property from object
    pub fn get_property(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()
            .and_then(|props| props.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v)
    }
}

/// Insert into an ordered property list, overwriting in place on a
/// duplicate key so first-seen order is preserved.
pub fn insert_property(props: &mut Vec<(String, AmfValue)>, key: String, value: AmfValue) {
    if let Some(slot) = props.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = value;
    } else {
        props.push((key, value));
    }
}

impl fmt::Display for AmfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfValue::Number(n) => write!(f, "{}", n),
            AmfValue::Boolean(b) => write!(f, "{}", b),
            AmfValue::String(s) => write!(f, "{}", s),
            AmfValue::Object(props) => {
                write!(f, "{{")?;
                for (i, (k, v)) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            AmfValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}
