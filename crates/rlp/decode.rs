use super::{constants::RLP_NULL, error::RLPDecodeError};
use ethereum_types::H256;

/// Trait for decoding RLP encoded slices of data.
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which returns the decoded value along with the remaining bytes; consumers
/// usually call [`decode`](RLPDecode::decode), which additionally rejects
/// trailing input.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Splits off the next RLP item from `data`.
/// Returns `(is_list, payload, rest)` where `payload` excludes the prefix.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let (first, rest) = data.split_first().ok_or(RLPDecodeError::InvalidLength)?;
    match *first {
        // single byte, its own encoding
        0x00..=0x7f => Ok((false, &data[..1], rest)),
        // short string
        0x80..=0xb7 => {
            let len = (*first - 0x80) as usize;
            split_payload(rest, len).map(|(payload, rest)| (false, payload, rest))
        }
        // long string
        0xb8..=0xbf => {
            let len_len = (*first - 0xb7) as usize;
            let (len, rest) = decode_payload_length(rest, len_len)?;
            split_payload(rest, len).map(|(payload, rest)| (false, payload, rest))
        }
        // short list
        0xc0..=0xf7 => {
            let len = (*first - 0xc0) as usize;
            split_payload(rest, len).map(|(payload, rest)| (true, payload, rest))
        }
        // long list
        0xf8..=0xff => {
            let len_len = (*first - 0xf7) as usize;
            let (len, rest) = decode_payload_length(rest, len_len)?;
            split_payload(rest, len).map(|(payload, rest)| (true, payload, rest))
        }
    }
}

fn split_payload(data: &[u8], len: usize) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    if data.len() < len {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok(data.split_at(len))
}

fn decode_payload_length(data: &[u8], len_len: usize) -> Result<(usize, &[u8]), RLPDecodeError> {
    if data.len() < len_len || len_len > size_of::<usize>() {
        return Err(RLPDecodeError::InvalidLength);
    }
    let (len_be, rest) = data.split_at(len_len);
    // the length of a long item must not have leading zeros and must not fit
    // in the short form
    if len_be.first() == Some(&0) {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut len: usize = 0;
    for byte in len_be {
        len = len << 8 | *byte as usize;
    }
    if len < 56 {
        return Err(RLPDecodeError::MalformedData);
    }
    Ok((len, rest))
}

/// Decodes the next item as a byte string, rejecting lists.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    match decode_rlp_item(data)? {
        (false, payload, rest) => Ok((payload, rest)),
        (true, _, _) => Err(RLPDecodeError::UnexpectedList),
    }
}

/// Returns the next item *including* its prefix, plus the remaining bytes.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, payload, rest) = decode_rlp_item(data)?;
    let item_len = data.len() - rest.len();
    debug_assert!(payload.len() <= item_len);
    Ok((&data[..item_len], rest))
}

/// Left-pads big-endian integer bytes to a fixed width, rejecting leading
/// zeros and overlong input.
fn static_left_pad<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    if bytes.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    if bytes.first() == Some(&0) {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut padded = [0; N];
    padded[N - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

impl RLPDecode for u8 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first = rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        match *first {
            0x00..=0x7f => Ok((*first, &rlp[1..])),
            RLP_NULL => Ok((0, &rlp[1..])),
            b if b == RLP_NULL + 1 => {
                let value = *rlp.get(1).ok_or(RLPDecodeError::InvalidLength)?;
                if value < RLP_NULL {
                    return Err(RLPDecodeError::MalformedData);
                }
                Ok((value, &rlp[2..]))
            }
            _ => Err(RLPDecodeError::MalformedData),
        }
    }
}

impl RLPDecode for u16 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u16::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u32 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u32::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u64 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u64::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for usize {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((usize::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = bytes
            .try_into()
            .map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for H256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (value, rest) = <[u8; 32]>::decode_unfinished(rlp)?;
        Ok((H256(value), rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remaining) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = remaining;
        }
        Ok((items, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_bytes() {
        assert_eq!(u8::decode(&[0x00]).unwrap(), 0x00);
        assert_eq!(u8::decode(&[0x7f]).unwrap(), 0x7f);
        assert_eq!(u8::decode(&[RLP_NULL]).unwrap(), 0);
        assert_eq!(u8::decode(&[0x81, 0x80]).unwrap(), 0x80);
    }

    #[test]
    fn decode_strings() {
        let (payload, rest) = decode_bytes(&[0x83, b'd', b'o', b'g']).unwrap();
        assert_eq!(payload, b"dog");
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_input() {
        assert!(decode_bytes(&[0x83, b'd', b'o']).is_err());
        assert!(decode_bytes(&[0xb8]).is_err());
        assert!(u64::decode(&[]).is_err());
    }

    #[test]
    fn decode_rejects_list_as_bytes() {
        assert_eq!(
            decode_bytes(&[0xc1, 0x01]),
            Err(RLPDecodeError::UnexpectedList)
        );
    }

    #[test]
    fn decode_rejects_non_minimal_long_forms() {
        // a long-string prefix whose payload fits in the short form
        let mut data = vec![0xb8, 0x01, 0xaa];
        assert!(decode_rlp_item(&data).is_err());
        // leading zero in the length of a long string
        data = vec![0xb9, 0x00, 0x38];
        data.extend(std::iter::repeat_n(0xaa, 0x38));
        assert!(decode_rlp_item(&data).is_err());
    }

    #[test]
    fn item_with_prefix_round_trip() {
        let data = [0x83, b'd', b'o', b'g', 0x01];
        let (item, rest) = get_item_with_prefix(&data).unwrap();
        assert_eq!(item, &[0x83, b'd', b'o', b'g']);
        assert_eq!(rest, &[0x01]);
    }

    #[test]
    fn decode_integer_list() {
        let decoded = Vec::<u64>::decode(&[0xc3, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }
}
