use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

use super::repo_types::{ActivityRecord, Category, NewRecord, RecordFilter, RecordPatch, RepeatType};
use crate::{error::AppError, timefmt};

pub const MAX_LIMIT: i64 = 1000;

fn default_true() -> bool {
    true
}

fn default_interval() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub pet_id: Uuid,
    pub category: Category,
    pub title: String,
    #[serde(with = "timefmt::naive")]
    pub date: PrimitiveDateTime,
    #[serde(with = "timefmt::naive")]
    pub time: PrimitiveDateTime,
    #[serde(default)]
    pub repeat_type: RepeatType,
    #[serde(default = "default_interval")]
    pub repeat_interval: i32,
    #[serde(default, with = "timefmt::naive::option")]
    pub repeat_end_date: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub repeat_count: Option<i32>,
    #[serde(default = "default_true")]
    pub notify: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub food_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

impl CreateRecordRequest {
    pub fn validate(self) -> Result<NewRecord, AppError> {
        check_title(&self.title)?;
        check_interval(self.repeat_interval)?;
        check_count(self.repeat_count)?;
        Ok(NewRecord {
            pet_id: self.pet_id,
            category: self.category,
            title: self.title.trim().to_string(),
            date: self.date,
            time: self.time,
            repeat_type: self.repeat_type,
            repeat_interval: self.repeat_interval,
            repeat_end_date: self.repeat_end_date,
            repeat_count: self.repeat_count,
            notify: self.notify,
            notes: self.notes,
            food_type: self.food_type,
            quantity: self.quantity,
            duration: self.duration,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRecordRequest {
    pub category: Option<Category>,
    pub title: Option<String>,
    #[serde(default, with = "timefmt::naive::option")]
    pub date: Option<PrimitiveDateTime>,
    #[serde(default, with = "timefmt::naive::option")]
    pub time: Option<PrimitiveDateTime>,
    pub repeat_type: Option<RepeatType>,
    pub repeat_interval: Option<i32>,
    #[serde(default, deserialize_with = "nullable_naive")]
    pub repeat_end_date: Option<Option<PrimitiveDateTime>>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub repeat_count: Option<Option<i32>>,
    pub notify: Option<bool>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub food_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub quantity: Option<Option<String>>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub duration: Option<Option<String>>,
}

fn nullable_naive<'de, D>(deserializer: D) -> Result<Option<Option<PrimitiveDateTime>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    timefmt::naive::option::deserialize(deserializer).map(Some)
}

impl UpdateRecordRequest {
    pub fn validate(self) -> Result<RecordPatch, AppError> {
        if let Some(title) = &self.title {
            check_title(title)?;
        }
        if let Some(interval) = self.repeat_interval {
            check_interval(interval)?;
        }
        if let Some(count) = self.repeat_count {
            check_count(count)?;
        }
        Ok(RecordPatch {
            category: self.category,
            title: self.title.map(|t| t.trim().to_string()),
            date: self.date,
            time: self.time,
            repeat_type: self.repeat_type,
            repeat_interval: self.repeat_interval,
            repeat_end_date: self.repeat_end_date,
            repeat_count: self.repeat_count,
            notify: self.notify,
            notes: self.notes,
            food_type: self.food_type,
            quantity: self.quantity,
            duration: self.duration,
        })
    }
}

fn check_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::validation("Title must not be empty"));
    }
    Ok(())
}

fn check_interval(interval: i32) -> Result<(), AppError> {
    if interval < 1 {
        return Err(AppError::validation("repeat_interval must be at least 1"));
    }
    Ok(())
}

fn check_count(count: Option<i32>) -> Result<(), AppError> {
    if matches!(count, Some(c) if c < 1) {
        return Err(AppError::validation("repeat_count must be at least 1"));
    }
    Ok(())
}

fn default_limit() -> i64 {
    100
}

fn check_page(skip: i64, limit: i64) -> Result<(), AppError> {
    if skip < 0 {
        return Err(AppError::validation("skip must not be negative"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(())
}

fn start_of(day: Date) -> PrimitiveDateTime {
    PrimitiveDateTime::new(day, Time::MIDNIGHT)
}

fn start_of_next(day: Date) -> Result<PrimitiveDateTime, AppError> {
    day.next_day()
        .map(start_of)
        .ok_or_else(|| AppError::validation("Date out of range"))
}

/// `GET /records?pet_id=..`
#[derive(Debug, Deserialize)]
pub struct PetRecordsQuery {
    pub pet_id: Uuid,
    pub category: Option<Category>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PetRecordsQuery {
    pub fn into_filter(self) -> Result<RecordFilter, AppError> {
        check_page(self.skip, self.limit)?;
        Ok(RecordFilter {
            pet_id: Some(self.pet_id),
            category: self.category,
            skip: self.skip,
            limit: self.limit,
            ..Default::default()
        })
    }
}

/// `GET /records/all-user-pets`
#[derive(Debug, Deserialize)]
pub struct AllRecordsQuery {
    pub category: Option<Category>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl AllRecordsQuery {
    pub fn into_filter(self) -> Result<RecordFilter, AppError> {
        check_page(self.skip, self.limit)?;
        Ok(RecordFilter {
            category: self.category,
            skip: self.skip,
            limit: self.limit,
            ..Default::default()
        })
    }
}

/// `GET /records/by-date?date=YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct ByDateQuery {
    #[serde(with = "timefmt::date")]
    pub date: Date,
    pub category: Option<Category>,
}

impl ByDateQuery {
    pub fn into_filter(self) -> Result<RecordFilter, AppError> {
        Ok(RecordFilter {
            category: self.category,
            from: Some(start_of(self.date)),
            until: Some(start_of_next(self.date)?),
            limit: MAX_LIMIT,
            ..Default::default()
        })
    }
}

/// `GET /records/by-date-range`; both ends inclusive.
#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    #[serde(with = "timefmt::date")]
    pub start_date: Date,
    #[serde(with = "timefmt::date")]
    pub end_date: Date,
    pub category: Option<Category>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl DateRangeQuery {
    pub fn into_filter(self) -> Result<RecordFilter, AppError> {
        if self.end_date < self.start_date {
            return Err(AppError::validation("end_date must not be before start_date"));
        }
        check_page(self.skip, self.limit)?;
        Ok(RecordFilter {
            category: self.category,
            from: Some(start_of(self.start_date)),
            until: Some(start_of_next(self.end_date)?),
            skip: self.skip,
            limit: self.limit,
            ..Default::default()
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub category: Category,
    pub title: String,
    #[serde(with = "timefmt::naive")]
    pub date: PrimitiveDateTime,
    #[serde(with = "timefmt::naive")]
    pub time: PrimitiveDateTime,
    pub repeat_type: RepeatType,
    pub repeat_interval: i32,
    #[serde(with = "timefmt::naive::option")]
    pub repeat_end_date: Option<PrimitiveDateTime>,
    pub repeat_count: Option<i32>,
    pub notify: bool,
    pub notes: Option<String>,
    pub food_type: Option<String>,
    pub quantity: Option<String>,
    pub duration: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ActivityRecord> for RecordResponse {
    fn from(r: ActivityRecord) -> Self {
        Self {
            id: r.id,
            pet_id: r.pet_id,
            category: r.category,
            title: r.title,
            date: r.date,
            time: r.time,
            repeat_type: r.repeat_type,
            repeat_interval: r.repeat_interval,
            repeat_end_date: r.repeat_end_date,
            repeat_count: r.repeat_count,
            notify: r.notify,
            notes: r.notes,
            food_type: r.food_type,
            quantity: r.quantity,
            duration: r.duration,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationsDisabled {
    pub updated: u64,
}
