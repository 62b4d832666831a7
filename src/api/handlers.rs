use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{InteractionKind, MusicAgent, ProfileSummary, RecommendationResult, Song},
    services::onboarding::{self, OnboardingRecord},
};

use super::{
    extract::{AppJson, AppQuery},
    AppState,
};

/// Largest page a search may return
const MAX_SEARCH_LIMIT: usize = 100;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarBy {
    #[default]
    Features,
    Metadata,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub n: Option<usize>,
    #[serde(default)]
    pub by: SimilarBy,
}

#[derive(Debug, Serialize)]
pub struct SimilarSong {
    #[serde(flatten)]
    pub song: Song,
    /// Feature similarity; absent for metadata matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SimilarSongsResponse {
    pub song_id: String,
    pub by: SimilarBy,
    pub songs: Vec<SimilarSong>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Pop,
    Classical,
    GenreFocused,
    General,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub agent_id: String,
    pub archetype: Archetype,
    pub primary_genre: Option<String>,
    #[serde(default)]
    pub secondary_genres: Vec<String>,
}

impl CreateAgentRequest {
    fn into_agent(self) -> AppResult<MusicAgent> {
        let agent_id = self.agent_id.trim();
        if agent_id.is_empty() {
            return Err(AppError::InvalidInput("agent_id must not be empty".to_string()));
        }

        Ok(match self.archetype {
            Archetype::Pop => MusicAgent::pop(agent_id),
            Archetype::Classical => MusicAgent::classical(agent_id),
            Archetype::General => MusicAgent::general(agent_id),
            Archetype::GenreFocused => {
                let primary = self
                    .primary_genre
                    .as_deref()
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .ok_or_else(|| {
                        AppError::InvalidInput(
                            "primary_genre is required for genre_focused agents".to_string(),
                        )
                    })?;
                let secondaries: Vec<&str> =
                    self.secondary_genres.iter().map(String::as_str).collect();
                MusicAgent::genre_focused(agent_id, primary, &secondaries)
            }
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub archetype: String,
    pub genres: Vec<String>,
    pub onboarded: bool,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub song_id: String,
    pub rating: Option<u8>,
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    Popular,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub n: Option<usize>,
    pub fallback: Option<Fallback>,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let inner = state.inner.read().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "songs": inner.manager.catalog().len(),
            "agents": inner.agents.len(),
        })),
    )
}

/// Search songs by name or artist
pub async fn search_songs(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<SearchParams>,
) -> AppResult<Json<Vec<Song>>> {
    if params.q.trim().is_empty() {
        return Err(AppError::InvalidInput("Query must not be empty".to_string()));
    }
    let limit = params.limit.unwrap_or(20).min(MAX_SEARCH_LIMIT);

    let inner = state.inner.read().await;
    let songs = inner
        .manager
        .catalog()
        .search(&params.q, limit)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(songs))
}

pub async fn get_song(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> AppResult<Json<Song>> {
    let inner = state.inner.read().await;
    inner
        .manager
        .catalog()
        .get_song(&song_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Song {}", song_id)))
}

/// Songs close to one song, by audio features or by artist/genre/era
pub async fn similar_songs(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    AppQuery(params): AppQuery<SimilarParams>,
) -> AppResult<Json<SimilarSongsResponse>> {
    let n = params.n.unwrap_or(state.config.default_recommendations);
    let inner = state.inner.read().await;

    let songs = match params.by {
        SimilarBy::Features => inner
            .manager
            .similar_songs_by_features(&song_id, n)?
            .into_iter()
            .map(|entry| SimilarSong {
                song: entry.song,
                similarity: Some(entry.score),
            })
            .collect(),
        SimilarBy::Metadata => inner
            .manager
            .catalog()
            .similar_songs_by_metadata(&song_id, n)?
            .into_iter()
            .map(|song| SimilarSong {
                song: song.clone(),
                similarity: None,
            })
            .collect(),
    };

    Ok(Json(SimilarSongsResponse {
        song_id,
        by: params.by,
        songs,
    }))
}

/// Number of catalog songs per genre
pub async fn genre_distribution(State(state): State<AppState>) -> Json<BTreeMap<String, usize>> {
    let inner = state.inner.read().await;
    Json(inner.manager.catalog().genre_distribution())
}

/// Register a new agent
pub async fn create_agent(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateAgentRequest>,
) -> AppResult<(StatusCode, Json<MusicAgent>)> {
    let agent = request.into_agent()?;

    let mut inner = state.inner.write().await;
    if inner.agents.contains_key(&agent.agent_id) {
        return Err(AppError::Conflict(format!(
            "Agent {} already exists",
            agent.agent_id
        )));
    }

    tracing::info!(agent_id = %agent.agent_id, archetype = %agent.archetype, "Agent registered");
    inner.agents.insert(agent.agent_id.clone(), agent.clone());

    Ok((StatusCode::CREATED, Json(agent)))
}

/// Get all registered agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    let inner = state.inner.read().await;
    let agents = inner
        .agents
        .values()
        .map(|agent| AgentSummary {
            agent_id: agent.agent_id.clone(),
            archetype: agent.archetype.clone(),
            genres: agent
                .genre_preferences
                .iter()
                .map(|gp| gp.genre.clone())
                .collect(),
            onboarded: inner.manager.has_profile(&agent.agent_id),
        })
        .collect();
    Json(agents)
}

/// Run onboarding for a registered agent
pub async fn onboard_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<(StatusCode, Json<OnboardingRecord>)> {
    let mut guard = state.inner.write().await;
    let inner = &mut *guard;

    let agent = inner
        .agents
        .get(&agent_id)
        .ok_or_else(|| AppError::NotFound(format!("Agent {}", agent_id)))?;

    let record = onboarding::onboard_agent(&mut inner.manager, agent, Utc::now(), &mut inner.rng)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<ProfileSummary>> {
    let inner = state.inner.read().await;
    inner
        .manager
        .profile(&agent_id)
        .map(|profile| Json(profile.summary()))
        .ok_or_else(|| AppError::NotFound(format!("Profile for agent {}", agent_id)))
}

/// Record a listen or rating and return the updated profile
pub async fn add_interaction(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    AppJson(request): AppJson<InteractionRequest>,
) -> AppResult<(StatusCode, Json<ProfileSummary>)> {
    let mut inner = state.inner.write().await;
    inner.manager.add_interaction(
        &agent_id,
        &request.song_id,
        request.rating,
        request.skipped,
        InteractionKind::Listen,
        Utc::now(),
    )?;

    let summary = inner
        .manager
        .profile(&agent_id)
        .map(|profile| profile.summary())
        .ok_or_else(|| AppError::Internal(format!("Profile for {} vanished", agent_id)))?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Ranked recommendations for an agent
///
/// Agents without a profile get a 404 unless `fallback=popular` is given.
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    AppQuery(params): AppQuery<RecommendationParams>,
) -> AppResult<Json<RecommendationResult>> {
    let n = params.n.unwrap_or(state.config.default_recommendations);
    let now = Utc::now();
    let inner = state.inner.read().await;

    if !inner.manager.has_profile(&agent_id) && params.fallback == Some(Fallback::Popular) {
        return Ok(Json(inner.manager.popular_fallback(&agent_id, n, now)));
    }

    let result = inner.manager.get_recommendations(&agent_id, n, now)?;
    Ok(Json(result))
}
