//! Opaque storage for fields the active schema does not understand.

use super::wire::RawField;
use bytes::{Bytes, BytesMut};

/// Fields read from the wire that no schema field claimed, in wire order.
///
/// Each entry keeps its tag and raw payload so it can be re-emitted byte for
/// byte on the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: Vec<RawField>,
}

impl UnknownFieldSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw field occurrence
    pub fn push(&mut self, field: RawField) {
        self.fields.push(field);
    }

    /// Appends a varint field, as used for deferred enum values
    pub fn push_varint(&mut self, number: u32, value: u64) {
        self.push(RawField::varint(number, value));
    }

    /// Returns true if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of captured occurrences
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates captured occurrences in wire order
    pub fn iter(&self) -> impl Iterator<Item = &RawField> {
        self.fields.iter()
    }

    /// Returns every occurrence of field `number`
    pub fn get(&self, number: u32) -> impl Iterator<Item = &RawField> {
        self.fields.iter().filter(move |f| f.number == number)
    }

    /// Returns true if field `number` was captured
    pub fn contains(&self, number: u32) -> bool {
        self.get(number).next().is_some()
    }

    /// Appends every occurrence, tags included, to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        for field in &self.fields {
            field.encode(buf);
        }
    }

    /// Encodes the set on its own
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl FromIterator<RawField> for UnknownFieldSet {
    fn from_iter<I: IntoIterator<Item = RawField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = &'a RawField;
    type IntoIter = std::slice::Iter<'a, RawField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Encodes a lone tag, used when building fixtures
#[cfg(test)]
pub(crate) fn tag(number: u32, wire_type: super::wire::WireType) -> Vec<u8> {
    let mut buf = BytesMut::new();
    super::wire::encode_key(number, wire_type, &mut buf);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::wire::WireType;

    #[test]
    fn test_varint_entries_encode_with_tag() {
        let mut set = UnknownFieldSet::new();
        set.push_varint(5, 42);
        assert_eq!(set.len(), 1);
        assert!(set.contains(5));
        assert!(!set.contains(4));

        let mut expected = tag(5, WireType::Varint);
        expected.push(42);
        assert_eq!(set.to_bytes().to_vec(), expected);
    }

    #[test]
    fn test_preserves_order_and_payload() {
        let set: UnknownFieldSet = vec![
            RawField {
                number: 9,
                wire_type: WireType::Len,
                raw: Bytes::from_static(&[2, b'o', b'k']),
            },
            RawField {
                number: 3,
                wire_type: WireType::I32,
                raw: Bytes::from_static(&[1, 0, 0, 0]),
            },
        ]
        .into_iter()
        .collect();

        let numbers: Vec<_> = set.iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![9, 3]);
        assert_eq!(
            set.to_bytes().to_vec(),
            vec![0x4A, 2, b'o', b'k', 0x1D, 1, 0, 0, 0]
        );
    }
}
