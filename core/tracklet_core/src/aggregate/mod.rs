//! Reducers over the normalized MetricsLog. Each is a pure function of the table rows,
//! plus the local offset wherever hour or day buckets are involved.

pub mod apps;
pub mod breaks;
pub mod focus;
pub mod hourly;
pub mod monitor;
pub mod summary;
pub mod switches;
pub mod table;
pub mod timeline;

pub use table::{Column, MetricsTable};
