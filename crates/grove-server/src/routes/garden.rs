//! Profiles, plants, onboarding and growth evaluation.

use axum::extract::{Path, State};
use axum::Json;
use grove_core::{AddPlant, Garden, GroveError, OnboardingGoal, PlantWithRules};
use grove_store::Profile;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPlantRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(flatten)]
    pub plant: AddPlant,
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub goals: Vec<OnboardingGoal>,
}

/// `POST /api/garden/evaluate`
pub async fn evaluate(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<Value>> {
    let updates = state.grove.evaluate_garden_growth(&req.user_id).await?;
    Ok(Json(json!({ "success": true, "updates": updates })))
}

/// `GET /api/garden/{user_id}`
pub async fn show(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Garden>> {
    Ok(Json(state.grove.garden(&user_id).await?))
}

/// `POST /api/profiles`
pub async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<Profile>> {
    Ok(Json(state.grove.create_profile(&req.user_id).await?))
}

/// `POST /api/plants`
pub async fn add_plant(
    State(state): State<AppState>,
    Json(req): Json<AddPlantRequest>,
) -> Result<Json<PlantWithRules>> {
    Ok(Json(state.grove.add_plant(&req.user_id, req.plant).await?))
}

/// `POST /api/onboarding`
pub async fn onboarding(
    State(state): State<AppState>,
    Json(req): Json<OnboardingRequest>,
) -> Result<Json<Value>> {
    if req.goals.is_empty() {
        return Err(GroveError::Validation("at least one goal is required".to_string()).into());
    }
    let outcome = state.grove.complete_onboarding(&req.user_id, req.goals).await?;
    Ok(Json(json!({
        "success": true,
        "plants_created": outcome.plants_created,
    })))
}
