use bytes::{BufMut, BytesMut};
use chrono::SecondsFormat;
use model::records::record::Record;

/// Encodes records as lines for `COPY ... FROM STDIN (FORMAT csv, NULL '\N')`.
///
/// Text values are always quoted, so an empty string and a literal `\N` stay
/// distinguishable from NULL.
pub struct PgCopyValueEncoder;

impl PgCopyValueEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_record(&self, record: &Record, dst: &mut BytesMut) {
        let mut line = String::with_capacity(record.size_bytes() + 64);
        line.push_str(&record.id.hyphenated().to_string());
        line.push(',');
        line.push_str(&escape_csv_string(&record.surname));
        line.push(',');
        line.push_str(&escape_csv_string(&record.name));
        line.push(',');
        match &record.patronymic {
            Some(patronymic) => line.push_str(&escape_csv_string(patronymic)),
            None => line.push_str(&self.encode_null()),
        }
        line.push(',');
        line.push_str(
            &record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        line.push(',');
        line.push_str(if record.is_active { "true" } else { "false" });
        line.push('\n');

        dst.put_slice(line.as_bytes());
    }

    pub fn encode_null(&self) -> String {
        "\\N".to_string()
    }
}

impl Default for PgCopyValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn escape_csv_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    for ch in s.chars() {
        if ch == '"' {
            out.push('"'); // double the quote
        }
        out.push(ch);
    }

    out.push('"');
    out
}
