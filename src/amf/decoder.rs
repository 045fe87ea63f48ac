use crate::amf::amf0::{insert_property, markers, AmfValue};
use crate::{Error, Result};
use log::trace;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Decode the next AMF0 value from a message payload reader.
///
/// Returns `Ok(Some(value))` for a materialized value, `Ok(None)` for the
/// null (0x05) and object-end (0x09) markers, which callers use as in-band
/// terminators. Unknown markers, truncated fields and non-EOF IO failures
/// are errors; end-of-stream on the marker byte is also an error here, the
/// top-level loop in [`read_values`] is the only place a stream may end.
pub async fn next_value<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<Option<AmfValue>> {
    let marker = reader.read_u8().await?;
    decode_tagged(reader, marker).await
}

/// Parse every value in a command payload until clean end-of-stream.
///
/// End-of-stream at a value boundary ends the list; end-of-stream inside a
/// value is reported as an error. Null and object-end markers at the top
/// level are skipped, everything else is collected in wire order.
pub async fn read_values<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<Vec<AmfValue>> {
    let mut values = Vec::new();
    loop {
        let marker = match reader.read_u8().await {
            Ok(marker) => marker,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if let Some(value) = decode_tagged(reader, marker).await? {
            trace!("payload value {}", value);
            values.push(value);
        }
    }
    Ok(values)
}

async fn decode_tagged<R: AsyncRead + Unpin + Send>(
    reader: &mut R,
    marker: u8,
) -> Result<Option<AmfValue>> {
    match marker {
        markers::NUMBER => {
            let bits = reader.read_u64().await?;
            Ok(Some(AmfValue::Number(f64::from_bits(bits))))
        }
        markers::BOOLEAN => {
            let byte = reader.read_u8().await?;
            Ok(Some(AmfValue::Boolean(byte != 0)))
        }
        markers::STRING => Ok(Some(AmfValue::String(decode_string(reader).await?))),
        markers::OBJECT => Ok(Some(decode_object(reader).await?)),
        markers::NULL | markers::OBJECT_END => Ok(None),
        markers::STRICT_ARRAY => Ok(Some(decode_strict_array(reader).await?)),
        _ => Err(Error::amf_decode(format!(
            "unknown AMF0 marker 0x{:02x}",
            marker
        ))),
    }
}

// Object and array elements recurse through next_value; boxing the inner
// future keeps the outer future finitely sized.
fn next_value_boxed<'a, R: AsyncRead + Unpin + Send>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = Result<Option<AmfValue>>> + Send + 'a>> {
    Box::pin(next_value(reader))
}

/// u16 big-endian length prefix followed by that many UTF-8 bytes.
async fn decode_string<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16().await? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|e| Error::amf_decode(format!("invalid UTF-8 in string: {}", e)))
}

/// Repeated key/value pairs; a null or object-end value terminates the map
/// and its preceding key is discarded. Duplicate keys: last write wins.
async fn decode_object<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<AmfValue> {
    let mut props = Vec::new();
    loop {
        let key = decode_string(reader).await?;
        match next_value_boxed(reader).await? {
            Some(value) => {
                trace!("object key={} value={}", key, value);
                insert_property(&mut props, key, value);
            }
            None => break,
        }
    }
    Ok(AmfValue::Object(props))
}

/// u32 big-endian count, then exactly that many encoded values in order.
/// Null elements are consumed but not materialized.
async fn decode_strict_array<R: AsyncRead + Unpin + Send>(reader: &mut R) -> Result<AmfValue> {
    let count = reader.read_u32().await?;
    let mut items = Vec::new();
    for _ in 0..count {
        if let Some(value) = next_value_boxed(reader).await? {
            items.push(value);
        }
    }
    Ok(AmfValue::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_scalars() {
        let mut data: &[u8] = &[0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0];
        assert_eq!(next_value(&mut data).await.unwrap(), Some(AmfValue::Number(1.0)));

        let mut data: &[u8] = &[0x01, 0x01];
        assert_eq!(next_value(&mut data).await.unwrap(), Some(AmfValue::Boolean(true)));

        // Any non-zero byte is true.
        let mut data: &[u8] = &[0x01, 0x7F];
        assert_eq!(next_value(&mut data).await.unwrap(), Some(AmfValue::Boolean(true)));

        let mut data: &[u8] = &[0x02, 0x00, 0x04, b'p', b'l', b'a', b'y'];
        assert_eq!(
            next_value(&mut data).await.unwrap(),
            Some(AmfValue::String("play".to_string()))
        );
    }

    #[tokio::test]
    async fn test_null_and_end_marker_are_none() {
        let mut data: &[u8] = &[0x05];
        assert_eq!(next_value(&mut data).await.unwrap(), None);

        let mut data: &[u8] = &[0x09];
        assert_eq!(next_value(&mut data).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_object() {
        // { app: "live" } terminated by empty key + end marker
        let mut data: &[u8] = &[
            0x03, 0x00, 0x03, b'a', b'p', b'p', 0x02, 0x00, 0x04, b'l', b'i', b'v', b'e',
            0x00, 0x00, 0x09,
        ];
        let value = next_value(&mut data).await.unwrap().unwrap();
        assert_eq!(value.get_property("app").and_then(|v| v.as_str()), Some("live"));
    }

    #[tokio::test]
    async fn test_object_duplicate_key_last_wins() {
        let mut data: &[u8] = &[
            0x03,
            0x00, 0x01, b'k', 0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0, // k = 1.0
            0x00, 0x01, b'k', 0x00, 0x40, 0x00, 0, 0, 0, 0, 0, 0, // k = 2.0
            0x00, 0x00, 0x09,
        ];
        let value = next_value(&mut data).await.unwrap().unwrap();
        let props = value.as_object().unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].1, AmfValue::Number(2.0));
    }

    #[tokio::test]
    async fn test_strict_array_exact_count() {
        // Two numbers declared, two numbers present, nothing extra read.
        let mut data: &[u8] = &[
            0x08, 0x00, 0x00, 0x00, 0x02,
            0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0,
            0x00, 0x40, 0x00, 0, 0, 0, 0, 0, 0,
            0xEE, // trailing byte the array must not consume
        ];
        let value = next_value(&mut data).await.unwrap().unwrap();
        assert_eq!(
            value,
            AmfValue::Array(vec![AmfValue::Number(1.0), AmfValue::Number(2.0)])
        );
        assert_eq!(data, &[0xEE]);
    }

    #[tokio::test]
    async fn test_unknown_marker_is_error() {
        let mut data: &[u8] = &[0x0B, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = next_value(&mut data).await.unwrap_err();
        assert!(matches!(err, Error::AmfDecode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_truncated_string_is_error() {
        let mut data: &[u8] = &[0x02, 0x00, 0x08, b'x'];
        assert!(next_value(&mut data).await.is_err());
    }

    #[tokio::test]
    async fn test_read_values_stops_at_boundary_eof() {
        // "connect", 1.0, null
        let mut data: &[u8] = &[
            0x02, 0x00, 0x07, b'c', b'o', b'n', b'n', b'e', b'c', b't',
            0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0,
            0x05,
        ];
        let values = read_values(&mut data).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_str(), Some("connect"));
        assert_eq!(values[1].as_number(), Some(1.0));
    }

    #[tokio::test]
    async fn test_read_values_mid_value_eof_is_error() {
        let mut data: &[u8] = &[0x00, 0x3F, 0xF0]; // number cut short
        assert!(read_values(&mut data).await.is_err());
    }

    #[tokio::test]
    async fn test_read_values_empty_stream() {
        let mut data: &[u8] = &[];
        assert!(read_values(&mut data).await.unwrap().is_empty());
    }
}
