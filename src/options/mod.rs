//! Per-operation options
//!
//! - WriteOption: named write concern levels
//! - FindOptions: projection, sort, limit, skip and batch size for finds
//! - UpdateOptions: write option, upsert and multi for updates and replaces
//!
//! All three are plain serde types using the camelCase JSON keys callers
//! already use for documents, and map onto the driver's option structs.

use std::fmt;
use std::str::FromStr;

use mongodb::options::{Acknowledgment, WriteConcern};
use serde::{Deserialize, Serialize};

use crate::codec::{JsonCodec, JsonObject};
use crate::error::{ConfigError, Result};

/// Write concern levels selectable per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteOption {
    /// Wait for the primary to acknowledge the write
    Acknowledged,
    /// Fire and forget
    Unacknowledged,
    /// Acknowledged and flushed to disk
    Fsynced,
    /// Acknowledged and committed to the journal
    Journaled,
    /// Acknowledged by at least two members
    ReplicaAcknowledged,
    /// Acknowledged by a majority of members
    Majority,
}

impl WriteOption {
    pub const ALL: [WriteOption; 6] = [
        WriteOption::Acknowledged,
        WriteOption::Unacknowledged,
        WriteOption::Fsynced,
        WriteOption::Journaled,
        WriteOption::ReplicaAcknowledged,
        WriteOption::Majority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOption::Acknowledged => "ACKNOWLEDGED",
            WriteOption::Unacknowledged => "UNACKNOWLEDGED",
            WriteOption::Fsynced => "FSYNCED",
            WriteOption::Journaled => "JOURNALED",
            WriteOption::ReplicaAcknowledged => "REPLICA_ACKNOWLEDGED",
            WriteOption::Majority => "MAJORITY",
        }
    }

    /// Whether the server reports back on writes made with this option.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, WriteOption::Unacknowledged)
    }

    /// Convert to the driver's write concern.
    ///
    /// The driver has no fsync flag; journaling is the closest durable
    /// equivalent, so `Fsynced` and `Journaled` map to the same concern.
    pub fn to_write_concern(&self) -> WriteConcern {
        let mut wc = WriteConcern::default();
        match self {
            WriteOption::Acknowledged => wc.w = Some(Acknowledgment::Nodes(1)),
            WriteOption::Unacknowledged => wc.w = Some(Acknowledgment::Nodes(0)),
            WriteOption::Fsynced | WriteOption::Journaled => {
                wc.w = Some(Acknowledgment::Nodes(1));
                wc.journal = Some(true);
            }
            WriteOption::ReplicaAcknowledged => wc.w = Some(Acknowledgment::Nodes(2)),
            WriteOption::Majority => wc.w = Some(Acknowledgment::Majority),
        }
        wc
    }
}

/// Whether a driver write concern expects acknowledgment.
pub(crate) fn write_concern_acknowledged(wc: Option<&WriteConcern>) -> bool {
    !matches!(
        wc.and_then(|wc| wc.w.as_ref()),
        Some(Acknowledgment::Nodes(0))
    )
}

impl fmt::Display for WriteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteOption {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        WriteOption::ALL
            .into_iter()
            .find(|opt| opt.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "writeOption".to_string(),
                value: s.to_string(),
            })
    }
}

/// Options for find operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    /// Projection; empty returns every field
    pub fields: JsonObject,
    /// Sort specification
    pub sort: JsonObject,
    /// Maximum number of documents, -1 for no limit
    pub limit: i64,
    /// Number of documents to skip
    pub skip: i64,
    /// Cursor batch size used by batch finds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            fields: JsonObject::new(),
            sort: JsonObject::new(),
            limit: -1,
            skip: 0,
            batch_size: None,
        }
    }
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: JsonObject) -> Self {
        self.fields = fields;
        self
    }

    pub fn sort(mut self, sort: JsonObject) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Build driver find options.
    ///
    /// Non-positive limits mean "no limit" and negative skips are ignored.
    pub fn to_driver(&self, codec: &JsonCodec) -> Result<mongodb::options::FindOptions> {
        let mut find_opts = mongodb::options::FindOptions::default();
        find_opts.projection = codec.encode_optional(Some(&self.fields))?;
        find_opts.sort = codec.encode_optional(Some(&self.sort))?;
        if self.limit > 0 {
            find_opts.limit = Some(self.limit);
        }
        if self.skip > 0 {
            find_opts.skip = Some(self.skip as u64);
        }
        find_opts.batch_size = self.batch_size;
        Ok(find_opts)
    }
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
    /// Write concern for this call; the client default applies when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_option: Option<WriteOption>,
    /// Insert a document when nothing matches
    pub upsert: bool,
    /// Update every matching document instead of the first one
    pub multi: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_option(mut self, write_option: WriteOption) -> Self {
        self.write_option = Some(write_option);
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub(crate) fn to_update_options(&self) -> mongodb::options::UpdateOptions {
        let mut options = mongodb::options::UpdateOptions::default();
        options.upsert = Some(self.upsert);
        options.write_concern = self.write_option.map(|w| w.to_write_concern());
        options
    }

    pub(crate) fn to_replace_options(&self) -> mongodb::options::ReplaceOptions {
        let mut options = mongodb::options::ReplaceOptions::default();
        options.upsert = Some(self.upsert);
        options.write_concern = self.write_option.map(|w| w.to_write_concern());
        options
    }
}
