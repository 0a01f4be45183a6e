use super::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// # Struct decoding helper
///
/// Decodes a struct from RLP format. The struct is expected as a list whose
/// elements are the fields in the order they are passed to
/// [`Decoder::decode_field`].
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = <T as RLPDecode>::decode_unfinished(self.payload)
            .map_err(|err| field_decode_error::<T>(name, err))?;
        Ok((
            field,
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Returns the next element without decoding it, i.e. its payload bytes
    /// including the prefix.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (item, rest) = get_item_with_prefix(self.payload)?;
        Ok((
            item.to_vec(),
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Finishes decoding and returns the bytes after the list.
    /// Fails if the list payload was not fully consumed.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    /// Returns true once the list payload has been fully consumed.
    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

fn field_decode_error<T>(field_name: &str, err: RLPDecodeError) -> RLPDecodeError {
    let typ = std::any::type_name::<T>();
    RLPDecodeError::Custom(format!(
        "Error decoding field '{field_name}' of type {typ}: {err}"
    ))
}

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list, its elements being the fields in the
/// order they are passed to [`Encoder::encode_field`].
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl core::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("buf", &"...")
            .field("temp_buf", &self.temp_buf)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Default::default(),
        }
    }

    /// Stores a field to be encoded.
    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        <T as RLPEncode>::encode(value, &mut self.temp_buf);
        self
    }

    /// Stores a field to be encoded as a byte string.
    /// Bypasses the conflicting impls between `Vec<T>` and `Vec<u8>`.
    pub fn encode_bytes(mut self, value: &[u8]) -> Self {
        <[u8] as RLPEncode>::encode(value, &mut self.temp_buf);
        self
    }

    /// Splices an already-encoded value into the list without re-encoding it.
    pub fn encode_raw(mut self, value: &[u8]) -> Self {
        self.temp_buf.put_slice(value);
        self
    }

    /// Writes the list header followed by the accumulated fields.
    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_simple_struct() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&61u8)
            .encode_field(&75u16)
            .finish();
        assert_eq!(buf, vec![0xc2, 61, 75]);

        let decoder = Decoder::new(&buf).unwrap();
        let (a, decoder): (u8, _) = decoder.decode_field("a").unwrap();
        let (b, decoder): (u16, _) = decoder.decode_field("b").unwrap();
        let rest = decoder.finish().unwrap();
        assert!(rest.is_empty());
        assert_eq!((a, b), (61, 75));
    }

    #[test]
    fn encode_bytes_as_string() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).encode_bytes(b"cat").finish();
        assert_eq!(buf, vec![0xc4, 0x83, b'c', b'a', b't']);
    }

    #[test]
    fn get_encoded_item_keeps_prefix() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_bytes(b"dog")
            .encode_field(&1u8)
            .finish();
        let decoder = Decoder::new(&buf).unwrap();
        let (item, decoder) = decoder.get_encoded_item().unwrap();
        assert_eq!(item, vec![0x83, b'd', b'o', b'g']);
        assert!(!decoder.is_done());
    }

    #[test]
    fn finish_rejects_leftover_payload() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&1u8)
            .encode_field(&2u8)
            .finish();
        let decoder = Decoder::new(&buf).unwrap();
        let (_, decoder): (u8, _) = decoder.decode_field("a").unwrap();
        assert!(decoder.finish().is_err());
    }
}
