//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `New*` struct carrying everything an insert needs
//! - `Deserialize` request DTOs validated with `validator`

pub mod channel;
pub mod delivery_attempt;
pub mod dispatch_job;
pub mod notification;
pub mod subscription;
