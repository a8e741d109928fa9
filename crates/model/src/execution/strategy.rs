use crate::execution::errors::SelectorError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How records are pulled from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchKind {
    /// `page`/`pageSize` paging, page numbers starting at 1.
    OffsetPaging,
    /// `lastId`/`pageSize` paging over the ordered identifier.
    KeysetPaging,
    /// One long-lived response with an incrementally parsed JSON array.
    ServerStream,
    /// PostgreSQL binary COPY payload decoded row by row.
    BinaryExport,
}

/// How records are written to the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertKind {
    /// Change-tracked rows flushed as one transaction every batch.
    Tracked,
    /// Plain buffer flushed with a multi-row insert plus a metadata sync.
    Bulk,
    /// Whole sequence streamed into a single text COPY.
    Copy,
    /// Whole sequence streamed into a single binary COPY on a dedicated connection.
    BinaryImport,
}

const FETCH_EXPECTED: &str = "offset (1), keyset (2), stream (3), binary (4)";
const INSERT_EXPECTED: &str = "tracked (1), bulk (2), copy (3), binary (4)";

impl FetchKind {
    pub const ALL: [FetchKind; 4] = [
        FetchKind::OffsetPaging,
        FetchKind::KeysetPaging,
        FetchKind::ServerStream,
        FetchKind::BinaryExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::OffsetPaging => "offset",
            FetchKind::KeysetPaging => "keyset",
            FetchKind::ServerStream => "stream",
            FetchKind::BinaryExport => "binary",
        }
    }
}

impl InsertKind {
    pub const ALL: [InsertKind; 4] = [
        InsertKind::Tracked,
        InsertKind::Bulk,
        InsertKind::Copy,
        InsertKind::BinaryImport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsertKind::Tracked => "tracked",
            InsertKind::Bulk => "bulk",
            InsertKind::Copy => "copy",
            InsertKind::BinaryImport => "binary",
        }
    }
}

impl FromStr for FetchKind {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "offset" | "offset-paging" | "efoffsetpaging" | "1" => Ok(FetchKind::OffsetPaging),
            "keyset" | "keyset-paging" | "efkeysetpaging" | "2" => Ok(FetchKind::KeysetPaging),
            "stream" | "server-stream" | "efstream" | "3" => Ok(FetchKind::ServerStream),
            "binary" | "binary-export" | "npgsqlcopy" | "4" => Ok(FetchKind::BinaryExport),
            "" | "0" | "undefined" => Err(SelectorError::Undefined("fetch")),
            other => Err(SelectorError::Unknown {
                role: "fetch",
                value: other.to_string(),
                expected: FETCH_EXPECTED,
            }),
        }
    }
}

impl FromStr for InsertKind {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tracked" | "typical" | "eftypical" | "1" => Ok(InsertKind::Tracked),
            "bulk" | "efbulk" | "2" => Ok(InsertKind::Bulk),
            "copy" | "bulk-copy" | "linq2db" | "3" => Ok(InsertKind::Copy),
            "binary" | "binary-import" | "npgsqlcopy" | "4" => Ok(InsertKind::BinaryImport),
            "" | "0" | "undefined" => Err(SelectorError::Undefined("insert")),
            other => Err(SelectorError::Unknown {
                role: "insert",
                value: other.to_string(),
                expected: INSERT_EXPECTED,
            }),
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InsertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
