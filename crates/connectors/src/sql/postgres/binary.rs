//! PostgreSQL `COPY ... (FORMAT BINARY)` codec for [`Record`] rows.
//!
//! Layout: an 11-byte signature, a 32-bit flags word, a 32-bit header
//! extension length (plus extension bytes), then one tuple per row. A tuple is
//! a 16-bit field count followed by `(i32 length, bytes)` pairs, `-1` marking
//! NULL. The payload ends with a 16-bit `-1` trailer. All integers are
//! big-endian.
//!
//! Only the framing lives here. Field values go through the driver's
//! [`ToSql`]/[`FromSql`] implementations for [`RECORD_TYPES`], the same ones
//! `BinaryCopyInWriter` and `BinaryCopyOutStream` use against a live server.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use model::records::record::{RECORD_COLUMNS, Record};
use thiserror::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

pub const COPY_SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

/// Column types in [`RECORD_COLUMNS`] order.
pub static RECORD_TYPES: [Type; 6] = [
    Type::UUID,
    Type::TEXT,
    Type::TEXT,
    Type::TEXT,
    Type::TIMESTAMPTZ,
    Type::BOOL,
];

const HEADER_LEN: usize = COPY_SIGNATURE.len() + 4 + 4;
const FLAG_HAS_OIDS: i32 = 1 << 16;
const FIELD_COUNT: i16 = 6;
const TRAILER: i16 = -1;
const NULL_LENGTH: i32 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload does not start with the PGCOPY signature")]
    InvalidSignature,

    #[error("Payloads with OID columns are not supported")]
    UnsupportedOids,

    #[error("Expected {expected} fields per row, found {found}")]
    FieldCount { expected: i16, found: i16 },

    #[error("Invalid length {found} for column '{column}'")]
    FieldLength { column: &'static str, found: i32 },

    #[error("Column '{0}' is NOT NULL but the row carries NULL")]
    UnexpectedNull(&'static str),

    #[error("Column '{column}': {reason}")]
    Field { column: &'static str, reason: String },

    #[error("Payload ended in the middle of a row ({0} bytes left over)")]
    Truncated(usize),

    #[error("Payload ended without the COPY trailer")]
    MissingTrailer,

    #[error("{0} bytes follow the COPY trailer")]
    TrailingData(usize),
}

/// Record fields as driver parameters, in [`RECORD_COLUMNS`] order.
pub fn record_params(record: &Record) -> [&(dyn ToSql + Sync); 6] {
    [
        &record.id,
        &record.surname,
        &record.name,
        &record.patronymic,
        &record.created_at,
        &record.is_active,
    ]
}

/// Writes the COPY header (no flags, empty extension area).
pub fn encode_header(dst: &mut BytesMut) {
    dst.reserve(HEADER_LEN);
    dst.put_slice(COPY_SIGNATURE);
    dst.put_i32(0);
    dst.put_i32(0);
}

/// Writes one tuple.
pub fn encode_row(record: &Record, dst: &mut BytesMut) -> Result<(), CodecError> {
    dst.reserve(2 + 6 * 4 + record.size_bytes());
    dst.put_i16(FIELD_COUNT);
    for (index, value) in record_params(record).into_iter().enumerate() {
        put_field(dst, value, index)?;
    }
    Ok(())
}

pub fn encode_trailer(dst: &mut BytesMut) {
    dst.put_i16(TRAILER);
}

/// Encodes a complete payload: header, every row, trailer.
pub fn encode_all<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<Bytes, CodecError> {
    let mut dst = BytesMut::new();
    encode_header(&mut dst);
    for record in records {
        encode_row(record, &mut dst)?;
    }
    encode_trailer(&mut dst);
    Ok(dst.freeze())
}

fn put_field(
    dst: &mut BytesMut,
    value: &(dyn ToSql + Sync),
    index: usize,
) -> Result<(), CodecError> {
    let column = RECORD_COLUMNS[index];
    let at = dst.len();
    dst.put_i32(0);

    let is_null = value
        .to_sql_checked(&RECORD_TYPES[index], dst)
        .map_err(|e| CodecError::Field {
            column,
            reason: e.to_string(),
        })?;

    let len = match is_null {
        IsNull::Yes => NULL_LENGTH,
        IsNull::No => i32::try_from(dst.len() - at - 4).map_err(|_| CodecError::FieldLength {
            column,
            found: i32::MAX,
        })?,
    };
    dst[at..at + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Incremental decoder: feed arbitrary chunks, pull complete rows.
///
/// A row is only consumed once all of its bytes are buffered, so a partially
/// received row is never surfaced.
#[derive(Debug, Default)]
pub struct BinaryRowDecoder {
    buf: BytesMut,
    header_done: bool,
    finished: bool,
    rows: u64,
}

impl BinaryRowDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn rows_decoded(&self) -> u64 {
        self.rows
    }

    /// Returns the next complete row, or `None` when more bytes are needed or
    /// the trailer has been reached.
    pub fn decode_next(&mut self) -> Result<Option<Record>, CodecError> {
        if self.finished {
            return match self.buf.len() {
                0 => Ok(None),
                n => Err(CodecError::TrailingData(n)),
            };
        }

        if !self.header_done && !self.read_header()? {
            return Ok(None);
        }

        if self.buf.len() < 2 {
            return Ok(None);
        }

        let count = i16::from_be_bytes([self.buf[0], self.buf[1]]);
        if count == TRAILER {
            self.buf.advance(2);
            self.finished = true;
            return match self.buf.len() {
                0 => Ok(None),
                n => Err(CodecError::TrailingData(n)),
            };
        }
        if count != FIELD_COUNT {
            return Err(CodecError::FieldCount {
                expected: FIELD_COUNT,
                found: count,
            });
        }

        let Some(row_len) = self.buffered_row_len()? else {
            return Ok(None);
        };

        let mut row = self.buf.split_to(row_len).freeze();
        row.advance(2);
        let fields: [Option<Bytes>; 6] = std::array::from_fn(|_| read_field(&mut row));

        let record = Record {
            id: required(&fields, 0)?,
            surname: required(&fields, 1)?,
            name: required(&fields, 2)?,
            patronymic: nullable(&fields, 3)?,
            created_at: required(&fields, 4)?,
            is_active: required(&fields, 5)?,
        };

        self.rows += 1;
        Ok(Some(record))
    }

    /// Validates that the payload ended cleanly once the input is exhausted.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.finished {
            return match self.buf.len() {
                0 => Ok(()),
                n => Err(CodecError::TrailingData(n)),
            };
        }
        match self.buf.len() {
            0 => Err(CodecError::MissingTrailer),
            n => Err(CodecError::Truncated(n)),
        }
    }

    fn read_header(&mut self) -> Result<bool, CodecError> {
        let prefix = self.buf.len().min(COPY_SIGNATURE.len());
        if self.buf[..prefix] != COPY_SIGNATURE[..prefix] {
            return Err(CodecError::InvalidSignature);
        }
        if self.buf.len() < HEADER_LEN {
            return Ok(false);
        }

        let flags = i32::from_be_bytes(read4(&self.buf, 11));
        if flags & FLAG_HAS_OIDS != 0 {
            return Err(CodecError::UnsupportedOids);
        }
        let ext_len = i32::from_be_bytes(read4(&self.buf, 15));
        if ext_len < 0 {
            return Err(CodecError::FieldLength {
                column: "header extension",
                found: ext_len,
            });
        }

        let total = HEADER_LEN + ext_len as usize;
        if self.buf.len() < total {
            return Ok(false);
        }
        self.buf.advance(total);
        self.header_done = true;
        Ok(true)
    }

    /// Length of the tuple at the front of the buffer, if it is fully buffered.
    fn buffered_row_len(&self) -> Result<Option<usize>, CodecError> {
        let mut offset = 2;
        for column in RECORD_COLUMNS {
            if self.buf.len() < offset + 4 {
                return Ok(None);
            }
            let len = i32::from_be_bytes(read4(&self.buf, offset));
            offset += 4;
            match len {
                NULL_LENGTH => {}
                n if n < 0 => return Err(CodecError::FieldLength { column, found: n }),
                n => offset += n as usize,
            }
        }
        Ok((self.buf.len() >= offset).then_some(offset))
    }
}

fn read4(buf: &[u8], at: usize) -> [u8; 4] {
    [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
}

fn read_field(row: &mut Bytes) -> Option<Bytes> {
    let len = row.get_i32();
    (len != NULL_LENGTH).then(|| row.split_to(len as usize))
}

fn from_sql<'a, T: FromSql<'a>>(raw: &'a [u8], index: usize) -> Result<T, CodecError> {
    T::from_sql(&RECORD_TYPES[index], raw).map_err(|e| CodecError::Field {
        column: RECORD_COLUMNS[index],
        reason: e.to_string(),
    })
}

fn required<'a, T: FromSql<'a>>(
    fields: &'a [Option<Bytes>; 6],
    index: usize,
) -> Result<T, CodecError> {
    let raw = fields[index]
        .as_deref()
        .ok_or(CodecError::UnexpectedNull(RECORD_COLUMNS[index]))?;
    from_sql(raw, index)
}

fn nullable<'a, T: FromSql<'a>>(
    fields: &'a [Option<Bytes>; 6],
    index: usize,
) -> Result<Option<T>, CodecError> {
    fields[index]
        .as_deref()
        .map(|raw| from_sql(raw, index))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample(n: u128, patronymic: Option<&str>) -> Record {
        Record {
            id: Uuid::from_u128(n),
            surname: format!("Фамилия-{n}"),
            name: format!("name \"{n}\""),
            patronymic: patronymic.map(str::to_string),
            created_at: Utc.timestamp_micros(1_743_359_547_123_456).unwrap(),
            is_active: n % 2 == 1,
        }
    }

    fn decode_all(decoder: &mut BinaryRowDecoder) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(record) = decoder.decode_next().unwrap() {
            out.push(record);
        }
        out
    }

    fn put_raw(dst: &mut BytesMut, value: &[u8]) {
        dst.put_i32(value.len() as i32);
        dst.put_slice(value);
    }

    /// A single row whose `created_at` field carries `micros` verbatim.
    fn payload_with_timestamp(micros: i64) -> BytesMut {
        let mut dst = BytesMut::new();
        encode_header(&mut dst);
        dst.put_i16(6);
        put_raw(&mut dst, Uuid::from_u128(1).as_bytes());
        put_raw(&mut dst, b"surname");
        put_raw(&mut dst, b"name");
        dst.put_i32(-1);
        put_raw(&mut dst, &micros.to_be_bytes());
        put_raw(&mut dst, &[1]);
        dst
    }

    #[test]
    fn test_export_payload_decodes_to_identical_records() {
        let records = vec![
            sample(1, Some("Ivanovich")),
            sample(2, None),
            sample(3, Some("")),
        ];
        let payload = encode_all(&records).unwrap();

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&payload);
        let decoded = decode_all(&mut decoder);

        assert_eq!(decoded, records);
        assert!(decoder.is_finished());
        assert_eq!(decoder.rows_decoded(), 3);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_seven_digit_source_timestamp_survives_the_round_trip() {
        let json = r#"[{
            "id": "00000000-0000-0000-0000-000000000009",
            "surname": "Sidorov",
            "name": "Petr",
            "createdAt": "2025-03-30T18:32:27.1234567+00:00",
            "isActive": false
        }]"#;
        let records: Vec<Record> = serde_json::from_str(json).unwrap();

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&encode_all(&records).unwrap());

        assert_eq!(decode_all(&mut decoder), records);
    }

    #[test]
    fn test_header_layout_matches_postgres() {
        let payload = encode_all(&[]).unwrap();
        assert_eq!(&payload[..11], b"PGCOPY\n\xff\r\n\0");
        assert_eq!(&payload[11..19], &[0u8; 8]);
        assert_eq!(&payload[19..], &[0xff, 0xff]);
    }

    #[test]
    fn test_timestamp_uses_postgres_epoch() {
        let mut dst = BytesMut::new();
        let record = Record {
            created_at: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 1).unwrap(),
            ..sample(1, None)
        };
        encode_row(&record, &mut dst).unwrap();
        // count + id + surname + name + null patronymic, then the timestamp field
        let at = 2 + (4 + 16) + (4 + record.surname.len()) + (4 + record.name.len()) + 4;
        assert_eq!(&dst[at..at + 4], &8i32.to_be_bytes());
        assert_eq!(&dst[at + 4..at + 12], &1_000_000i64.to_be_bytes());
    }

    #[test]
    fn test_out_of_range_timestamp_is_a_codec_error() {
        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&payload_with_timestamp(i64::MAX));

        assert!(matches!(
            decoder.decode_next(),
            Err(CodecError::Field {
                column: "created_at",
                ..
            })
        ));
    }

    #[test]
    fn test_short_uuid_is_rejected() {
        let mut dst = BytesMut::new();
        encode_header(&mut dst);
        dst.put_i16(6);
        put_raw(&mut dst, &[0xab; 4]);
        put_raw(&mut dst, b"surname");
        put_raw(&mut dst, b"name");
        dst.put_i32(-1);
        put_raw(&mut dst, &0i64.to_be_bytes());
        put_raw(&mut dst, &[0]);

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&dst);
        assert!(matches!(
            decoder.decode_next(),
            Err(CodecError::Field { column: "id", .. })
        ));
    }

    #[test]
    fn test_any_chunking_yields_the_same_rows() {
        let records: Vec<_> = (1..=5).map(|n| sample(n, Some("x"))).collect();
        let payload = encode_all(&records).unwrap();

        for chunk_size in 1..=payload.len() {
            let mut decoder = BinaryRowDecoder::new();
            let mut decoded = Vec::new();
            for chunk in payload.chunks(chunk_size) {
                decoder.extend(chunk);
                decoded.extend(decode_all(&mut decoder));
            }
            assert_eq!(decoded, records, "chunk size {chunk_size}");
            decoder.finish().unwrap();
        }
    }

    #[test]
    fn test_truncated_payload_is_reported() {
        let payload = encode_all(&[sample(1, None)]).unwrap();
        let cut = payload.len() - 5;

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&payload[..cut]);
        assert_eq!(decoder.decode_next(), Ok(None));
        assert!(matches!(decoder.finish(), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_missing_trailer_is_reported() {
        let mut dst = BytesMut::new();
        encode_header(&mut dst);
        encode_row(&sample(1, None), &mut dst).unwrap();

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&dst);
        assert_eq!(decode_all(&mut decoder).len(), 1);
        assert_eq!(decoder.finish(), Err(CodecError::MissingTrailer));
    }

    #[test]
    fn test_bytes_after_the_trailer_are_reported() {
        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&encode_all(&[sample(1, None)]).unwrap());
        assert_eq!(decode_all(&mut decoder).len(), 1);

        decoder.extend(b"xyz");
        assert_eq!(decoder.decode_next(), Err(CodecError::TrailingData(3)));
        assert_eq!(decoder.finish(), Err(CodecError::TrailingData(3)));
    }

    #[test]
    fn test_bad_signature_fails_early() {
        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(b"[{\"id\"");
        assert_eq!(decoder.decode_next(), Err(CodecError::InvalidSignature));
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        let mut dst = BytesMut::new();
        encode_header(&mut dst);
        dst.put_i16(2);
        dst.put_i32(-1);
        dst.put_i32(-1);

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&dst);
        assert_eq!(
            decoder.decode_next(),
            Err(CodecError::FieldCount {
                expected: 6,
                found: 2
            })
        );
    }

    #[test]
    fn test_null_in_required_column_is_rejected() {
        let mut dst = BytesMut::new();
        encode_header(&mut dst);
        dst.put_i16(6);
        put_raw(&mut dst, Uuid::from_u128(1).as_bytes());
        dst.put_i32(-1); // surname
        put_raw(&mut dst, b"name");
        dst.put_i32(-1);
        put_raw(&mut dst, &0i64.to_be_bytes());
        put_raw(&mut dst, &[1]);

        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&dst);
        assert_eq!(
            decoder.decode_next(),
            Err(CodecError::UnexpectedNull("surname"))
        );
    }

    #[test]
    fn test_garbage_never_panics() {
        let payload = encode_all(&[sample(1, Some("p")), sample(2, None)]).unwrap();
        for i in 0..payload.len() {
            let mut mutated = payload.to_vec();
            mutated[i] ^= 0xa5;
            let mut decoder = BinaryRowDecoder::new();
            decoder.extend(&mutated);
            while let Ok(Some(_)) = decoder.decode_next() {}
        }
    }
}
