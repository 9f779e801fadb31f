use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::{Gender, NewPet, Pet, PetPatch};
use crate::{error::AppError, timefmt};

#[derive(Debug, Deserialize)]
pub struct CreatePetRequest {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(with = "timefmt::date")]
    pub birthdate: Date,
    pub weight: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreatePetRequest {
    pub fn validate(self) -> Result<NewPet, AppError> {
        check_name(&self.name)?;
        if self.species.trim().is_empty() {
            return Err(AppError::validation("Species must not be empty"));
        }
        check_weight(self.weight)?;
        Ok(NewPet {
            name: self.name.trim().to_string(),
            species: self.species.trim().to_string(),
            breed: self.breed,
            gender: self.gender,
            birthdate: self.birthdate,
            weight: self.weight,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePetRequest {
    pub name: Option<String>,
    pub species: Option<String>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub breed: Option<Option<String>>,
    pub gender: Option<Gender>,
    #[serde(default, deserialize_with = "timefmt::date::option::deserialize")]
    pub birthdate: Option<Date>,
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "timefmt::nullable")]
    pub notes: Option<Option<String>>,
}

impl UpdatePetRequest {
    pub fn validate(self) -> Result<PetPatch, AppError> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(species) = &self.species {
            if species.trim().is_empty() {
                return Err(AppError::validation("Species must not be empty"));
            }
        }
        if let Some(weight) = self.weight {
            check_weight(weight)?;
        }
        Ok(PetPatch {
            name: self.name.map(|n| n.trim().to_string()),
            species: self.species.map(|s| s.trim().to_string()),
            breed: self.breed,
            gender: self.gender,
            birthdate: self.birthdate,
            weight: self.weight,
            notes: self.notes,
        })
    }
}

fn check_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Name must not be empty"));
    }
    Ok(())
}

fn check_weight(weight: f64) -> Result<(), AppError> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(AppError::validation("Weight must be greater than 0"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct PetResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub gender: Gender,
    #[serde(with = "timefmt::date")]
    pub birthdate: Date,
    pub weight: f64,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Pet> for PetResponse {
    fn from(p: Pet) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            species: p.species,
            breed: p.breed,
            gender: p.gender,
            birthdate: p.birthdate,
            weight: p.weight,
            notes: p.notes,
            created_at: p.created_at,
        }
    }
}
