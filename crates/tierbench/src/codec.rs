//! Row codec
//!
//! A row is a flat concatenation of field pairs with no header and no
//! terminator:
//! ```text
//! [name_len: u32 LE][name bytes][value_len: u32 LE][value bytes] ...
//! ```
//! The row ends where the buffer ends. Buffers come back from the engine,
//! so every length prefix is bounds-checked while decoding.

use nom::{
    multi::length_data,
    number::complete::le_u32,
    sequence::pair,
    IResult,
};

use crate::error::{Error, Result};

/// Bytes of framing per field pair
pub const PAIR_OVERHEAD: usize = 8;

/// One named field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name
    pub name: Vec<u8>,
    /// Field value
    pub value: Vec<u8>,
}

impl Field {
    /// Build a field from anything byte-like
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered field list
pub type Record = Vec<Field>;

/// Size `encode` will produce for `record`
pub fn encoded_len(record: &[Field]) -> usize {
    record
        .iter()
        .map(|f| PAIR_OVERHEAD + f.name.len() + f.value.len())
        .sum()
}

/// Serialize a record, preserving field order
pub fn encode(record: &[Field]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(record));
    for field in record {
        put_bytes(&mut out, &field.name)?;
        put_bytes(&mut out, &field.value)?;
    }
    Ok(out)
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::FieldTooLarge { len: bytes.len() })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Decode every field in the buffer
pub fn decode(bytes: &[u8]) -> Result<Record> {
    Pairs::new(bytes)
        .map(|pair| pair.map(|(name, value)| Field::new(name, value)))
        .collect()
}

/// Decode only the requested fields, returned in request order.
///
/// The buffer is walked once. A stored field that is not the one currently
/// wanted is parked, so requests in storage order never park anything and
/// reordered requests still resolve in a single pass. Decoding stops as
/// soon as every request is satisfied.
pub fn decode_filtered<F: AsRef<[u8]>>(bytes: &[u8], fields: &[F]) -> Result<Record> {
    let mut out = Vec::with_capacity(fields.len());
    let mut parked: Vec<(&[u8], &[u8])> = Vec::new();
    let mut pairs = Pairs::new(bytes);

    'wanted: for wanted in fields {
        let wanted = wanted.as_ref();

        if let Some(pos) = parked.iter().position(|(name, _)| *name == wanted) {
            let (name, value) = parked.remove(pos);
            out.push(Field::new(name, value));
            continue;
        }

        for pair in pairs.by_ref() {
            let (name, value) = pair?;
            if name == wanted {
                out.push(Field::new(name, value));
                continue 'wanted;
            }
            parked.push((name, value));
        }
    }

    if out.len() != fields.len() {
        return Err(Error::IncompleteRecord {
            expected: fields.len(),
            found: out.len(),
        });
    }
    Ok(out)
}

fn field_pair(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    pair(length_data(le_u32), length_data(le_u32))(input)
}

/// Cursor over the field pairs of an encoded row
struct Pairs<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> Pairs<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }

        match field_pair(self.input) {
            Ok((rest, pair)) => {
                self.offset += self.input.len() - rest.len();
                self.input = rest;
                Some(Ok(pair))
            }
            Err(err) => {
                let reason = match err {
                    nom::Err::Incomplete(nom::Needed::Size(n)) => {
                        format!("length prefix runs {} bytes past the end", n)
                    }
                    nom::Err::Incomplete(nom::Needed::Unknown) => {
                        "length prefix runs past the end".to_string()
                    }
                    nom::Err::Error(e) | nom::Err::Failure(e) => {
                        format!("truncated pair ({:?})", e.code)
                    }
                };
                self.input = &[];
                Some(Err(Error::MalformedEncoding {
                    offset: self.offset,
                    reason,
                }))
            }
        }
    }
}
