use std::cmp::Ordering;

/// A list of nibbles (half-bytes), the trie's internal key form.
/// A trailing 16 marks the sequence as a leaf key; data nibbles are `0..=15`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nibbles {
    data: Vec<u8>,
}

impl Nibbles {
    /// Create `Nibbles` from hex-encoded nibbles.
    pub const fn from_hex(hex: Vec<u8>) -> Self {
        Self { data: hex }
    }

    /// Splits incoming bytes into nibbles and appends the leaf flag (a 16 nibble at the end).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_raw(bytes, true)
    }

    /// Splits incoming bytes into nibbles, appending the leaf flag if `is_leaf` is set.
    pub fn from_raw(bytes: &[u8], is_leaf: bool) -> Self {
        let mut data: Vec<u8> = Vec::with_capacity(bytes.len() * 2 + 1);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0F);
        }
        if is_leaf {
            data.push(16);
        }
        Self { data }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns the amount of nibbles.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the nibbles carry the leaf flag (16) at the end.
    pub fn is_leaf(&self) -> bool {
        self.data.last() == Some(&16)
    }

    /// Combines the nibbles back into bytes, stripping the leaf flag.
    /// Returns `None` if the remaining nibble count is odd.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let data = match self.data.split_last() {
            Some((16, init)) => init,
            _ => &self.data[..],
        };
        if data.len() % 2 != 0 {
            return None;
        }
        Some(data.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect())
    }

    /// If `prefix` is a prefix of self, consume it and return true.
    pub fn skip_prefix(&mut self, prefix: &Nibbles) -> bool {
        if self.len() >= prefix.len() && self.data[..prefix.len()] == *prefix.as_ref() {
            self.data = self.data[prefix.len()..].to_vec();
            true
        } else {
            false
        }
    }

    /// Compares self to another, comparing prefixes only in case of unequal lengths.
    pub fn compare_prefix(&self, prefix: &Nibbles) -> Ordering {
        if self.len() > prefix.len() {
            self.data[..prefix.len()].cmp(&prefix.data)
        } else {
            self.data[..].cmp(&prefix.data[..self.len()])
        }
    }

    /// Returns the shared nibble count from the start (longest common prefix).
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Removes and returns the first nibble.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u8> {
        (!self.is_empty()).then(|| self.data.remove(0))
    }

    /// Removes and returns the first nibble if it is a suitable choice index (aka < 16).
    pub fn next_choice(&mut self) -> Option<usize> {
        self.next().filter(|choice| *choice < 16).map(usize::from)
    }

    /// Returns the nibbles after the given offset.
    pub fn offset(&self, offset: usize) -> Nibbles {
        self.slice(offset, self.len())
    }

    /// Returns the nibbles between the start and end indexes.
    pub fn slice(&self, start: usize, end: usize) -> Nibbles {
        Nibbles::from_hex(self.data[start..end].to_vec())
    }

    /// Extends the nibbles with another list of nibbles.
    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(other.as_ref());
    }

    /// Return the nibble at the given index, will panic if the index is out of range.
    pub fn at(&self, i: usize) -> usize {
        self.data[i] as usize
    }

    /// Inserts a nibble at the start.
    pub fn prepend(&mut self, nibble: u8) {
        self.data.insert(0, nibble);
    }

    /// Inserts a nibble at the end.
    pub fn append(&mut self, nibble: u8) {
        self.data.push(nibble);
    }

    /// Returns a copy of self with the nibble added at the end.
    pub fn append_new(&self, nibble: u8) -> Nibbles {
        let mut data = self.data.clone();
        data.push(nibble);
        Nibbles { data }
    }

    /// Concatenates self and another Nibbles returning a new Nibbles.
    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        Nibbles {
            data: [&self.data[..], &other.data[..]].concat(),
        }
    }

    /// Encodes the nibbles in hex-prefix compact form.
    ///
    /// The terminator is stripped before encoding; the first byte's high
    /// nibble carries the flags:
    ///
    /// ```text
    /// node type    path length    |    prefix    hexchar
    /// --------------------------------------------------
    /// extension    even           |    0000      0x0
    /// extension    odd            |    0001      0x1
    /// leaf         even           |    0010      0x2
    /// leaf         odd            |    0011      0x3
    /// ```
    pub fn encode_compact(&self) -> Vec<u8> {
        let is_leaf = self.is_leaf();
        let mut hex = if is_leaf {
            &self.data[..self.data.len() - 1]
        } else {
            &self.data[..]
        };
        let mut first = if is_leaf { 0x20 } else { 0x00 };
        if hex.len() % 2 == 1 {
            first |= 0x10 | hex[0];
            hex = &hex[1..];
        }

        let mut compact = Vec::with_capacity(hex.len() / 2 + 1);
        compact.push(first);
        for pair in hex.chunks(2) {
            compact.push(pair[0] << 4 | pair[1]);
        }
        compact
    }

    /// Decodes nibbles from hex-prefix compact form.
    pub fn decode_compact(compact: &[u8]) -> Self {
        Self::from_hex(compact_to_hex(compact))
    }
}

impl AsRef<[u8]> for Nibbles {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

// Ported from go-ethereum's trie/encoding.go (compactToHex)
fn compact_to_hex(compact: &[u8]) -> Vec<u8> {
    if compact.is_empty() {
        return vec![];
    }
    let mut base = keybytes_to_hex(compact);
    // delete terminator flag
    if base[0] < 2 {
        base.truncate(base.len() - 1);
    }
    // apply odd flag
    let chop = 2 - (base[0] & 1) as usize;
    base[chop..].to_vec()
}

fn keybytes_to_hex(keybytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(keybytes.len() * 2 + 1);
    for byte in keybytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles.push(16);
    nibbles
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bytes_appends_terminator() {
        let n = Nibbles::from_bytes(&[0xAB, 0xCD]);
        assert_eq!(n.as_ref(), &[0xA, 0xB, 0xC, 0xD, 16]);
        assert!(n.is_leaf());
    }

    #[test]
    fn from_raw_extension_has_no_terminator() {
        let n = Nibbles::from_raw(&[0xAB, 0xCD], false);
        assert_eq!(n.as_ref(), &[0xA, 0xB, 0xC, 0xD]);
        assert!(!n.is_leaf());
    }

    #[test]
    fn to_bytes_round_trip() {
        let key = vec![0x12, 0x34, 0x56];
        assert_eq!(Nibbles::from_bytes(&key).to_bytes(), Some(key.clone()));
        assert_eq!(Nibbles::from_raw(&key, false).to_bytes(), Some(key));
    }

    #[test]
    fn to_bytes_rejects_odd_length() {
        assert_eq!(Nibbles::from_hex(vec![1, 2, 3]).to_bytes(), None);
        assert_eq!(Nibbles::from_hex(vec![1, 2, 3, 16]).to_bytes(), None);
        assert_eq!(Nibbles::from_hex(vec![]).to_bytes(), Some(vec![]));
    }

    #[test]
    fn skip_prefix_true() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 3]);
        assert!(a.skip_prefix(&b));
        assert_eq!(a.as_ref(), &[4, 5])
    }

    #[test]
    fn skip_prefix_same_length() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        assert!(a.skip_prefix(&b));
        assert!(a.is_empty());
    }

    #[test]
    fn skip_prefix_longer_prefix() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3]);
        let b = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        assert!(!a.skip_prefix(&b));
        assert_eq!(a.as_ref(), &[1, 2, 3])
    }

    #[test]
    fn skip_prefix_false() {
        let mut a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        let b = Nibbles::from_hex(vec![1, 2, 4]);
        assert!(!a.skip_prefix(&b));
        assert_eq!(a.as_ref(), &[1, 2, 3, 4, 5])
    }

    #[test]
    fn count_prefix() {
        let a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        assert_eq!(a.count_prefix(&a), a.len());
        assert_eq!(a.count_prefix(&Nibbles::from_hex(vec![1, 2, 3])), 3);
        assert_eq!(a.count_prefix(&Nibbles::from_hex(vec![2, 3])), 0);
    }

    #[test]
    fn compare_prefix_orders() {
        let a = Nibbles::from_hex(vec![1, 2, 3, 4, 5]);
        assert_eq!(a.compare_prefix(&a), Ordering::Equal);
        assert_eq!(
            a.compare_prefix(&Nibbles::from_hex(vec![1, 2, 4])),
            Ordering::Less
        );
        assert_eq!(
            a.compare_prefix(&Nibbles::from_hex(vec![1, 2, 2])),
            Ordering::Greater
        );
        // prefixes compare equal regardless of which side is longer
        assert_eq!(
            a.compare_prefix(&Nibbles::from_hex(vec![1, 2, 3])),
            Ordering::Equal
        );
        assert_eq!(
            Nibbles::from_hex(vec![1, 2, 3]).compare_prefix(&a),
            Ordering::Equal
        );
    }

    #[test]
    fn next_and_next_choice() {
        let mut n = Nibbles::from_hex(vec![1, 16]);
        assert_eq!(n.next_choice(), Some(1));
        // the terminator is not a valid choice index
        assert_eq!(n.next_choice(), None);
        assert!(n.is_empty());
        assert_eq!(n.next(), None);
    }

    #[test]
    fn slice_offset_at() {
        let n = Nibbles::from_hex(vec![0xA, 0xB, 0xC, 0xD, 0xE]);
        assert_eq!(n.at(0), 0xA);
        assert_eq!(n.at(4), 0xE);
        assert_eq!(n.slice(1, 4).as_ref(), &[0xB, 0xC, 0xD]);
        assert_eq!(n.offset(2).as_ref(), &[0xC, 0xD, 0xE]);
    }

    #[test]
    fn prepend_append_concat() {
        let mut n = Nibbles::from_hex(vec![1, 2, 3]);
        n.prepend(4);
        n.append(5);
        assert_eq!(n.as_ref(), &[4, 1, 2, 3, 5]);

        let a = Nibbles::from_hex(vec![1, 2]);
        let b = Nibbles::from_hex(vec![3, 4]);
        assert_eq!(a.concat(&b).as_ref(), &[1, 2, 3, 4]);
        assert_eq!(a.append_new(5).as_ref(), &[1, 2, 5]);
        assert_eq!(a.as_ref(), &[1, 2]);
    }

    #[test]
    fn encode_compact_fixtures() {
        assert_eq!(
            Nibbles::from_hex(vec![1, 2, 3, 4, 16]).encode_compact(),
            vec![0x20, 0x12, 0x34]
        );
        assert_eq!(
            Nibbles::from_hex(vec![1, 2, 3, 16]).encode_compact(),
            vec![0x31, 0x23]
        );
        assert_eq!(
            Nibbles::from_hex(vec![1, 2, 3, 4]).encode_compact(),
            vec![0x00, 0x12, 0x34]
        );
        assert_eq!(
            Nibbles::from_hex(vec![1, 2, 3]).encode_compact(),
            vec![0x11, 0x23]
        );
    }

    #[test]
    fn encode_compact_boundaries() {
        assert_eq!(Nibbles::from_hex(vec![]).encode_compact(), vec![0x00]);
        assert_eq!(Nibbles::from_hex(vec![16]).encode_compact(), vec![0x20]);
        assert_eq!(Nibbles::from_hex(vec![5, 16]).encode_compact(), vec![0x35]);
        assert_eq!(Nibbles::from_hex(vec![5]).encode_compact(), vec![0x15]);
    }

    #[test]
    fn compact_round_trip() {
        let cases = vec![
            vec![],
            vec![16],
            vec![5, 16],
            vec![5],
            vec![1, 2, 3, 4, 16],
            vec![1, 2, 3, 16],
            vec![1, 2, 3, 4],
            vec![1, 2, 3],
            vec![0xF, 0xF, 0xF, 0xF, 0xF, 16],
        ];
        for hex in cases {
            let n = Nibbles::from_hex(hex.clone());
            assert_eq!(
                Nibbles::decode_compact(&n.encode_compact()).as_ref(),
                &hex[..],
                "round trip failed for {hex:?}"
            );
        }
    }
}
