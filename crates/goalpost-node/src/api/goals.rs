//! Goal set and goal endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use goalpost_core::{
    GoalKey, GoalRecord, GoalSet, GoalSetId, GoalState, Push, Registration,
};
use goalpost_engine::{ActorContext, Admission, GoalUpdate};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::state::AppState;

/// Request to register the goals planned for a push.
#[derive(Debug, Deserialize)]
pub struct CreateGoalSetRequest {
    /// Registration creating the goals; defaults to the node's own.
    pub registration: Option<String>,

    /// Goal set id; generated when absent.
    pub goal_set_id: Option<String>,

    pub push: Push,

    pub goals: Vec<GoalInput>,
}

#[derive(Debug, Deserialize)]
pub struct GoalInput {
    pub unique_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub environment: String,
    pub state: Option<GoalState>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub pre_approval_required: bool,
    #[serde(default)]
    pub retry_feasible: bool,
    pub data: Option<String>,
}

/// A goal set with its goals.
#[derive(Debug, Serialize)]
pub struct GoalSetResponse {
    pub goal_set: GoalSet,
    pub goals: Vec<GoalRecord>,
}

/// Request to move a goal to another state.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub state: GoalState,

    /// Version the caller last read.
    pub version: u64,

    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,

    pub description: Option<String>,
    pub phase: Option<String>,
    pub url: Option<String>,
    pub data: Option<String>,
    pub error: Option<String>,
}

/// Register a planned goal set.
pub async fn create_goal_set(
    State(state): State<AppState>,
    Json(req): Json<CreateGoalSetRequest>,
) -> Result<(StatusCode, Json<GoalSetResponse>), ApiError> {
    let engine = &state.engine;
    let tracker = match req.registration {
        Some(registration) => engine.tracker().with_registration(Registration::new(registration)),
        None => engine.tracker().clone(),
    };
    let goal_set_id = req.goal_set_id.map(GoalSetId::from).unwrap_or_default();
    let creator = tracker.system();
    let push = req.push;

    let goals = req
        .goals
        .into_iter()
        .map(|input| {
            let mut builder = GoalRecord::builder(goal_set_id.clone(), input.unique_name)
                .commit(push.repo.clone(), push.branch.clone(), push.sha.clone())
                .environment(input.environment)
                .approval_required(input.approval_required)
                .pre_approval_required(input.pre_approval_required)
                .retry_feasible(input.retry_feasible);
            if let Some(name) = input.name {
                builder = builder.name(name);
            }
            if let Some(goal_state) = input.state {
                builder = builder.state(goal_state);
            }
            if let Some(data) = input.data {
                builder = builder.data(data);
            }
            builder.build(creator.clone())
        })
        .collect::<goalpost_core::Result<Vec<_>>>()?;

    let goal_set = engine.plan_goal_set(goals).await?;
    let goals = engine.goals(&goal_set.goal_set_id).await?;

    Ok((StatusCode::CREATED, Json(GoalSetResponse { goal_set, goals })))
}

/// Get a goal set and its goals.
pub async fn get_goal_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GoalSetResponse>, ApiError> {
    let id = GoalSetId::from(id);
    let goal_set = state.engine.goal_set(&id).await?;
    let goals = state.engine.goals(&id).await?;
    Ok(Json(GoalSetResponse { goal_set, goals }))
}

/// Ask whether a goal set may start.
pub async fn admit_goal_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Admission>, ApiError> {
    let id = GoalSetId::from(id);
    // 404 for unknown ids rather than a silent "not admitted".
    state.engine.goal_set(&id).await?;
    Ok(Json(state.engine.admit(&id).await?))
}

/// Transition a goal.
pub async fn transition_goal(
    State(state): State<AppState>,
    Path((id, unique_name)): Path<(String, String)>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<GoalRecord>, ApiError> {
    let key = GoalKey::new(GoalSetId::from(id), unique_name);
    let context = ActorContext {
        correlation_id: req.correlation_id,
        channel_id: req.channel_id,
        user_id: req.user_id,
    };
    let update = GoalUpdate {
        description: req.description,
        phase: req.phase,
        url: req.url,
        data: req.data,
        error: req.error,
    };

    let goal = state
        .engine
        .transition(&key, req.version, req.state, &context, update)
        .await?;
    Ok(Json(goal))
}

/// Every persisted version of a goal.
pub async fn goal_history(
    State(state): State<AppState>,
    Path((id, unique_name)): Path<(String, String)>,
) -> Result<Json<Vec<GoalRecord>>, ApiError> {
    let key = GoalKey::new(GoalSetId::from(id), unique_name);
    Ok(Json(state.engine.history(&key).await?))
}
