/// Job and owner identifiers are UUIDs (v7 for jobs, so they sort by creation).
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
