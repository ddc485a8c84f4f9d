//! Domain models for discovered versions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upstream column carrying the region
pub const REGION_COLUMN: &str = "Region";
/// Upstream column carrying the human-readable version label
pub const VERSION_NAME_COLUMN: &str = "VersionsName";
/// Upstream column carrying the build identifier
pub const BUILD_ID_COLUMN: &str = "BuildId";
/// Upstream column carrying the build configuration hash
pub const BUILD_CONFIG_COLUMN: &str = "BuildConfig";

/// One upstream data line, keyed by column name
pub type ParsedFieldRow = BTreeMap<String, String>;

/// A persisted discovery of one (product, region, version, build) tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VersionRecord {
    /// Storage-assigned, strictly increasing; breaks ties between equal timestamps
    pub id: i64,
    pub product: String,
    pub region: String,
    pub version_name: String,
    pub build_id: String,
    pub build_config: String,
    pub discovered_at: DateTime<Utc>,
}

impl VersionRecord {
    pub fn key(&self) -> VersionKey<'_> {
        VersionKey {
            product: &self.product,
            region: &self.region,
            version_name: &self.version_name,
            build_id: &self.build_id,
        }
    }

    /// Ordering used by every "most recent" query: newest first, higher id first
    pub fn recency_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .discovered_at
            .cmp(&self.discovered_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A record that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersionRecord {
    pub product: String,
    pub region: String,
    pub version_name: String,
    pub build_id: String,
    pub build_config: String,
    pub discovered_at: DateTime<Utc>,
}

impl NewVersionRecord {
    pub fn key(&self) -> VersionKey<'_> {
        VersionKey {
            product: &self.product,
            region: &self.region,
            version_name: &self.version_name,
            build_id: &self.build_id,
        }
    }
}

/// Dedup key: identifies a version regardless of its build config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey<'a> {
    pub product: &'a str,
    pub region: &'a str,
    pub version_name: &'a str,
    pub build_id: &'a str,
}

impl VersionKey<'_> {
    pub fn to_owned_key(&self) -> OwnedVersionKey {
        OwnedVersionKey {
            product: self.product.to_string(),
            region: self.region.to_string(),
            version_name: self.version_name.to_string(),
            build_id: self.build_id.to_string(),
        }
    }
}

/// Owned form of [`VersionKey`], for use in indexes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnedVersionKey {
    pub product: String,
    pub region: String,
    pub version_name: String,
    pub build_id: String,
}

/// Fields of interest pulled out of a [`ParsedFieldRow`]
///
/// Upstream may omit any column; absence is kept explicit until the row is
/// validated by [`VersionCandidate::into_record`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCandidate {
    pub region: Option<String>,
    pub version_name: Option<String>,
    pub build_id: Option<String>,
    pub build_config: Option<String>,
}

/// Why an upstream row cannot become a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RowRejection {
    /// Dedup-key field absent or blank
    #[error("row has no value for {0}")]
    MissingField(&'static str),

    /// PostgreSQL `TEXT` cannot hold NUL
    #[error("row value for {0} contains a NUL byte")]
    NulByte(&'static str),
}

impl VersionCandidate {
    pub fn from_row(row: &ParsedFieldRow) -> Self {
        let field = |name: &str| row.get(name).map(|value| value.trim().to_string());

        Self {
            region: field(REGION_COLUMN),
            version_name: field(VERSION_NAME_COLUMN),
            build_id: field(BUILD_ID_COLUMN),
            build_config: field(BUILD_CONFIG_COLUMN),
        }
    }

    /// Validate identity fields and stamp the discovery time
    ///
    /// Blank identity values count as missing. Values containing NUL are
    /// refused since the store cannot hold them. A missing build config becomes
    /// an empty string since it is not part of the dedup key.
    pub fn into_record(
        self,
        product: &str,
        discovered_at: DateTime<Utc>,
    ) -> Result<NewVersionRecord, RowRejection> {
        fn storable(value: String, column: &'static str) -> Result<String, RowRejection> {
            if value.contains('\0') {
                return Err(RowRejection::NulByte(column));
            }
            Ok(value)
        }

        fn required(value: Option<String>, column: &'static str) -> Result<String, RowRejection> {
            let value = value
                .filter(|v| !v.is_empty())
                .ok_or(RowRejection::MissingField(column))?;
            storable(value, column)
        }

        Ok(NewVersionRecord {
            product: product.to_string(),
            region: required(self.region, REGION_COLUMN)?,
            version_name: required(self.version_name, VERSION_NAME_COLUMN)?,
            build_id: required(self.build_id, BUILD_ID_COLUMN)?,
            build_config: storable(self.build_config.unwrap_or_default(), BUILD_CONFIG_COLUMN)?,
            discovered_at,
        })
    }
}
