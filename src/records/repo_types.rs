use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_category", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Feeding,
    Care,
    Activity,
}

/// Recurrence unit. `None` means a one-off entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "repeat_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RepeatType {
    #[default]
    None,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub category: Category,
    pub title: String,
    pub date: PrimitiveDateTime,
    pub time: PrimitiveDateTime,
    pub repeat_type: RepeatType,
    pub repeat_interval: i32,
    pub repeat_end_date: Option<PrimitiveDateTime>,
    pub repeat_count: Option<i32>,
    pub notify: bool,
    pub notes: Option<String>,
    // feeding
    pub food_type: Option<String>,
    pub quantity: Option<String>,
    // activity
    pub duration: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub pet_id: Uuid,
    pub category: Category,
    pub title: String,
    pub date: PrimitiveDateTime,
    pub time: PrimitiveDateTime,
    pub repeat_type: RepeatType,
    pub repeat_interval: i32,
    pub repeat_end_date: Option<PrimitiveDateTime>,
    pub repeat_count: Option<i32>,
    pub notify: bool,
    pub notes: Option<String>,
    pub food_type: Option<String>,
    pub quantity: Option<String>,
    pub duration: Option<String>,
}

/// Partial update; see `PetPatch` for the `Option<Option<_>>` convention.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub category: Option<Category>,
    pub title: Option<String>,
    pub date: Option<PrimitiveDateTime>,
    pub time: Option<PrimitiveDateTime>,
    pub repeat_type: Option<RepeatType>,
    pub repeat_interval: Option<i32>,
    pub repeat_end_date: Option<Option<PrimitiveDateTime>>,
    pub repeat_count: Option<Option<i32>>,
    pub notify: Option<bool>,
    pub notes: Option<Option<String>>,
    pub food_type: Option<Option<String>>,
    pub quantity: Option<Option<String>>,
    pub duration: Option<Option<String>>,
}

impl RecordPatch {
    pub fn apply(self, rec: &mut ActivityRecord) {
        if let Some(v) = self.category {
            rec.category = v;
        }
        if let Some(v) = self.title {
            rec.title = v;
        }
        if let Some(v) = self.date {
            rec.date = v;
        }
        if let Some(v) = self.time {
            rec.time = v;
        }
        if let Some(v) = self.repeat_type {
            rec.repeat_type = v;
        }
        if let Some(v) = self.repeat_interval {
            rec.repeat_interval = v;
        }
        if let Some(v) = self.repeat_end_date {
            rec.repeat_end_date = v;
        }
        if let Some(v) = self.repeat_count {
            rec.repeat_count = v;
        }
        if let Some(v) = self.notify {
            rec.notify = v;
        }
        if let Some(v) = self.notes {
            rec.notes = v;
        }
        if let Some(v) = self.food_type {
            rec.food_type = v;
        }
        if let Some(v) = self.quantity {
            rec.quantity = v;
        }
        if let Some(v) = self.duration {
            rec.duration = v;
        }
    }
}

/// Listing filter. Always scoped to one owner; the rest narrows further.
/// `from` is inclusive and `until` exclusive, both on the record `date`.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub pet_id: Option<Uuid>,
    pub category: Option<Category>,
    pub from: Option<PrimitiveDateTime>,
    pub until: Option<PrimitiveDateTime>,
    pub skip: i64,
    pub limit: i64,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            pet_id: None,
            category: None,
            from: None,
            until: None,
            skip: 0,
            limit: 100,
        }
    }
}

/// In-memory counterpart of the SQL `WHERE` clause in `PgRecordRepo::list`.
#[cfg(test)]
impl RecordFilter {
    pub fn matches(&self, rec: &ActivityRecord) -> bool {
        self.pet_id.map_or(true, |p| rec.pet_id == p)
            && self.category.map_or(true, |c| rec.category == c)
            && self.from.map_or(true, |f| rec.date >= f)
            && self.until.map_or(true, |u| rec.date < u)
    }
}
