use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("invalid {field}")]
    InvalidDate { field: &'static str },

    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("student {student} has more than one status in check-in record {record}")]
    OverlappingStatus { record: Uuid, student: Uuid },
}
