use std::collections::BTreeMap;

/// All entity identifiers are UUIDs generated by the application.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Attribute name -> value pairs carried by a notification.
pub type Attributes = BTreeMap<String, String>;

/// Generate a new time-ordered entity id (UUID v7).
pub fn new_id() -> EntityId {
    uuid::Uuid::now_v7()
}
