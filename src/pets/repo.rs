use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewPet, Pet, PetPatch};
use crate::db::RepoResult;

const PET_COLUMNS: &str = "id, user_id, name, species, breed, gender, birthdate, weight, notes, \
                           created_at, updated_at";

/// Pet storage. Every call is scoped to `owner`; a pet owned by someone else
/// behaves exactly like a missing one.
#[async_trait]
pub trait PetRepo: Send + Sync {
    async fn list(&self, owner: Uuid) -> RepoResult<Vec<Pet>>;
    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<Pet>>;
    async fn create(&self, owner: Uuid, new: NewPet) -> RepoResult<Pet>;
    async fn update(&self, owner: Uuid, id: Uuid, patch: PetPatch) -> RepoResult<Option<Pet>>;
    /// Removes the pet and its activity records.
    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool>;
}

#[derive(Clone)]
pub struct PgPetRepo {
    db: PgPool,
}

impl PgPetRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PetRepo for PgPetRepo {
    async fn list(&self, owner: Uuid) -> RepoResult<Vec<Pet>> {
        let rows = sqlx::query_as::<_, Pet>(&format!(
            r#"
            SELECT {}
            FROM pets
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
            PET_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<Pet>> {
        let pet = sqlx::query_as::<_, Pet>(&format!(
            "SELECT {} FROM pets WHERE id = $1 AND user_id = $2",
            PET_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(pet)
    }

    async fn create(&self, owner: Uuid, new: NewPet) -> RepoResult<Pet> {
        let pet = sqlx::query_as::<_, Pet>(&format!(
            r#"
            INSERT INTO pets (user_id, name, species, breed, gender, birthdate, weight, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            PET_COLUMNS
        ))
        .bind(owner)
        .bind(&new.name)
        .bind(&new.species)
        .bind(&new.breed)
        .bind(new.gender)
        .bind(new.birthdate)
        .bind(new.weight)
        .bind(&new.notes)
        .fetch_one(&self.db)
        .await?;
        Ok(pet)
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: PetPatch) -> RepoResult<Option<Pet>> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, Pet>(&format!(
            "SELECT {} FROM pets WHERE id = $1 AND user_id = $2 FOR UPDATE",
            PET_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut pet) = current else {
            return Ok(None);
        };
        patch.apply(&mut pet);

        let updated = sqlx::query_as::<_, Pet>(&format!(
            r#"
            UPDATE pets
               SET name = $2, species = $3, breed = $4, gender = $5,
                   birthdate = $6, weight = $7, notes = $8, updated_at = now()
             WHERE id = $1
            RETURNING {}
            "#,
            PET_COLUMNS
        ))
        .bind(pet.id)
        .bind(&pet.name)
        .bind(&pet.species)
        .bind(&pet.breed)
        .bind(pet.gender)
        .bind(pet.birthdate)
        .bind(pet.weight)
        .bind(&pet.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM activity_records r
             USING pets p
             WHERE r.pet_id = p.id AND p.id = $1 AND p.user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&mut *tx)
        .await?;
        let res = sqlx::query("DELETE FROM pets WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }
}
