use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Column order shared by every wire format that carries records positionally
/// (binary COPY, CSV COPY and multi-row INSERT statements).
pub const RECORD_COLUMNS: [&str; 6] = [
    "id",
    "surname",
    "name",
    "patronymic",
    "created_at",
    "is_active",
];

/// A single user row moved from the source to the destination table.
///
/// `id` is the pagination key: it is unique at the source and compared with
/// `Uuid`'s byte ordering, which matches PostgreSQL's `uuid` ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: Uuid,
    pub surname: String,
    pub name: String,
    #[serde(default)]
    pub patronymic: Option<String>,
    /// Microsecond precision, the resolution of `timestamptz`.
    #[serde(deserialize_with = "deserialize_micros")]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Record {
    /// Approximate payload size, used for throughput logging.
    pub fn size_bytes(&self) -> usize {
        16 + self.surname.len()
            + self.name.len()
            + self.patronymic.as_ref().map_or(0, String::len)
            + 8
            + 1
    }
}

fn deserialize_micros<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(|ts| ts.trunc_subsecs(6))
}
