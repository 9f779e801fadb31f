use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{ActivityRecord, NewRecord, RecordFilter, RecordPatch};
use crate::db::RepoResult;

/// Columns of `activity_records` under the alias `r`.
const RECORD_COLUMNS: &str = "r.id, r.pet_id, r.category, r.title, r.date, r.time, r.repeat_type, \
                              r.repeat_interval, r.repeat_end_date, r.repeat_count, r.notify, \
                              r.notes, r.food_type, r.quantity, r.duration, r.created_at, \
                              r.updated_at";

/// Activity record storage. Ownership is always resolved through the pet's
/// owner; records of other users' pets are invisible.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// `None` when `new.pet_id` is not owned by `owner`.
    async fn create(&self, owner: Uuid, new: NewRecord) -> RepoResult<Option<ActivityRecord>>;
    async fn list(&self, owner: Uuid, filter: &RecordFilter) -> RepoResult<Vec<ActivityRecord>>;
    async fn pet_owned(&self, owner: Uuid, pet_id: Uuid) -> RepoResult<bool>;
    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<ActivityRecord>>;
    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: RecordPatch,
    ) -> RepoResult<Option<ActivityRecord>>;
    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool>;
    /// Clear `notify` on every record of every pet of `owner`; returns rows changed.
    async fn disable_notifications(&self, owner: Uuid) -> RepoResult<u64>;
}

#[derive(Clone)]
pub struct PgRecordRepo {
    db: PgPool,
}

impl PgRecordRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordRepo for PgRecordRepo {
    async fn create(&self, owner: Uuid, new: NewRecord) -> RepoResult<Option<ActivityRecord>> {
        let rec = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            INSERT INTO activity_records AS r
                (pet_id, category, title, date, time, repeat_type, repeat_interval,
                 repeat_end_date, repeat_count, notify, notes, food_type, quantity, duration)
            SELECT p.id, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
              FROM pets p
             WHERE p.id = $1 AND p.user_id = $2
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(new.pet_id)
        .bind(owner)
        .bind(new.category)
        .bind(&new.title)
        .bind(new.date)
        .bind(new.time)
        .bind(new.repeat_type)
        .bind(new.repeat_interval)
        .bind(new.repeat_end_date)
        .bind(new.repeat_count)
        .bind(new.notify)
        .bind(&new.notes)
        .bind(&new.food_type)
        .bind(&new.quantity)
        .bind(&new.duration)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn list(&self, owner: Uuid, filter: &RecordFilter) -> RepoResult<Vec<ActivityRecord>> {
        let rows = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            SELECT {}
            FROM activity_records r
            JOIN pets p ON p.id = r.pet_id
            WHERE p.user_id = $1
              AND ($2::uuid IS NULL OR r.pet_id = $2)
              AND ($3::activity_category IS NULL OR r.category = $3)
              AND ($4::timestamp IS NULL OR r.date >= $4)
              AND ($5::timestamp IS NULL OR r.date < $5)
            ORDER BY r.date ASC, r.time ASC, r.id ASC
            OFFSET $6 LIMIT $7
            "#,
            RECORD_COLUMNS
        ))
        .bind(owner)
        .bind(filter.pet_id)
        .bind(filter.category)
        .bind(filter.from)
        .bind(filter.until)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn pet_owned(&self, owner: Uuid, pet_id: Uuid) -> RepoResult<bool> {
        let (owned,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM pets WHERE id = $1 AND user_id = $2)",
        )
        .bind(pet_id)
        .bind(owner)
        .fetch_one(&self.db)
        .await?;
        Ok(owned)
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<ActivityRecord>> {
        let rec = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            SELECT {}
            FROM activity_records r
            JOIN pets p ON p.id = r.pet_id
            WHERE r.id = $1 AND p.user_id = $2
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: RecordPatch,
    ) -> RepoResult<Option<ActivityRecord>> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            SELECT {}
            FROM activity_records r
            JOIN pets p ON p.id = r.pet_id
            WHERE r.id = $1 AND p.user_id = $2
            FOR UPDATE OF r
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut rec) = current else {
            return Ok(None);
        };
        patch.apply(&mut rec);

        let updated = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            UPDATE activity_records AS r
               SET category = $2, title = $3, date = $4, time = $5, repeat_type = $6,
                   repeat_interval = $7, repeat_end_date = $8, repeat_count = $9,
                   notify = $10, notes = $11, food_type = $12, quantity = $13,
                   duration = $14, updated_at = now()
             WHERE r.id = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(rec.id)
        .bind(rec.category)
        .bind(&rec.title)
        .bind(rec.date)
        .bind(rec.time)
        .bind(rec.repeat_type)
        .bind(rec.repeat_interval)
        .bind(rec.repeat_end_date)
        .bind(rec.repeat_count)
        .bind(rec.notify)
        .bind(&rec.notes)
        .bind(&rec.food_type)
        .bind(&rec.quantity)
        .bind(&rec.duration)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query(
            r#"
            DELETE FROM activity_records r
             USING pets p
             WHERE r.pet_id = p.id AND r.id = $1 AND p.user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn disable_notifications(&self, owner: Uuid) -> RepoResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE activity_records r
               SET notify = FALSE, updated_at = now()
              FROM pets p
             WHERE r.pet_id = p.id AND p.user_id = $1 AND r.notify
            "#,
        )
        .bind(owner)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }
}
