//! Data models for the data-access layer.

pub mod param;
pub mod row;

pub use param::Param;
pub use row::Row;
