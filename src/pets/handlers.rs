use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreatePetRequest, PetResponse, UpdatePetRequest};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

pub(crate) const RESOURCE: &str = "pet";

pub fn pet_routes() -> Router<AppState> {
    Router::new()
        .route("/pets", get(list_pets).post(create_pet))
        .route(
            "/pets/:id",
            get(get_pet).put(update_pet).patch(update_pet).delete(delete_pet),
        )
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_pets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<PetResponse>>> {
    let pets = state.pets.list(user.id).await?;
    Ok(Json(pets.into_iter().map(PetResponse::from).collect()))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_pet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreatePetRequest>,
) -> AppResult<(StatusCode, Json<PetResponse>)> {
    let new = payload.validate()?;
    let pet = state.pets.create(user.id, new).await?;
    info!(pet_id = %pet.id, "pet created");
    Ok((StatusCode::CREATED, Json(PetResponse::from(pet))))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_pet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PetResponse>> {
    let pet = state
        .pets
        .get(user.id, id)
        .await?
        .ok_or(AppError::Denied(RESOURCE))?;
    Ok(Json(PetResponse::from(pet)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_pet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePetRequest>,
) -> AppResult<Json<PetResponse>> {
    let patch = payload.validate()?;
    let pet = state
        .pets
        .update(user.id, id, patch)
        .await?
        .ok_or(AppError::Denied(RESOURCE))?;
    info!(pet_id = %pet.id, "pet updated");
    Ok(Json(PetResponse::from(pet)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_pet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.pets.delete(user.id, id).await? {
        return Err(AppError::Denied(RESOURCE));
    }
    info!(pet_id = %id, "pet deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::testing::TestClient;

    fn rex() -> Value {
        json!({
            "name": "Rex",
            "species": "dog",
            "breed": "beagle",
            "gender": "MALE",
            "birthdate": "2020-05-01",
            "weight": 12.5,
            "notes": "likes walks"
        })
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;

        let (status, created) = client.post("/pets", Some(&token), rex()).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap();

        let (status, fetched) = client.get(&format!("/pets/{}", id), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);
        assert_eq!(fetched["birthdate"], "2020-05-01");

        let (_, list) = client.get("/pets", Some(&token)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_unspecified_fields() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;
        let (_, created) = client.post("/pets", Some(&token), rex()).await;
        let uri = format!("/pets/{}", created["id"].as_str().unwrap());

        let (status, updated) = client
            .send("PUT", &uri, Some(&token), json!({ "weight": 13.0, "breed": null }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["weight"], 13.0);
        assert_eq!(updated["breed"], Value::Null);
        assert_eq!(updated["name"], "Rex");
        assert_eq!(updated["notes"], "likes walks");
        assert_eq!(updated["birthdate"], "2020-05-01");

        let (status, _) = client
            .send("PUT", &uri, Some(&token), json!({ "weight": -1 }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_users_are_denied() {
        let client = TestClient::new();
        let alice = client.register("a@x.com").await;
        let bob = client.register("b@x.com").await;
        let (_, created) = client.post("/pets", Some(&alice), rex()).await;
        let uri = format!("/pets/{}", created["id"].as_str().unwrap());

        let (status, body) = client.get(&uri, Some(&bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Access denied or pet not found");

        let (status, _) = client
            .send("PUT", &uri, Some(&bob), json!({ "name": "Stolen" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = client.send("DELETE", &uri, Some(&bob), Value::Null).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let missing = format!("/pets/{}", uuid::Uuid::new_v4());
        let (status, other) = client.get(&missing, Some(&alice)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(other, body);

        let (_, list) = client.get("/pets", Some(&bob)).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_pet() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;
        let (_, created) = client.post("/pets", Some(&token), rex()).await;
        let uri = format!("/pets/{}", created["id"].as_str().unwrap());

        let (status, _) = client.send("DELETE", &uri, Some(&token), Value::Null).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = client.get(&uri, Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
