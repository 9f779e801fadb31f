use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pet_gender", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Pet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub gender: Gender,
    pub birthdate: Date,
    pub weight: f64, // kg
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPet {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub gender: Gender,
    pub birthdate: Date,
    pub weight: f64,
    pub notes: Option<String>,
}

/// Partial update. `None` leaves a field as is; for nullable columns
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PetPatch {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<Option<String>>,
    pub gender: Option<Gender>,
    pub birthdate: Option<Date>,
    pub weight: Option<f64>,
    pub notes: Option<Option<String>>,
}

impl PetPatch {
    pub fn apply(self, pet: &mut Pet) {
        if let Some(v) = self.name {
            pet.name = v;
        }
        if let Some(v) = self.species {
            pet.species = v;
        }
        if let Some(v) = self.breed {
            pet.breed = v;
        }
        if let Some(v) = self.gender {
            pet.gender = v;
        }
        if let Some(v) = self.birthdate {
            pet.birthdate = v;
        }
        if let Some(v) = self.weight {
            pet.weight = v;
        }
        if let Some(v) = self.notes {
            pet.notes = v;
        }
    }
}
