//! Reasoning handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use polikg_common::{
    errors::{AppError, Result},
    reasoning::{HopRecord, Pattern, StepType, StopReason},
    schema::{Entity, EntityType},
};

/// Entity as produced by the upstream NLU
#[derive(Debug, Deserialize, Serialize)]
pub struct EntityInput {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// Body shared by classification and reasoning turns
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    #[serde(default)]
    #[validate(length(max = 10))]
    pub entities: Vec<EntityInput>,

    /// Best-guess relation type; unknown names are ignored by the classifier
    pub best_relation: Option<String>,
}

impl QuestionRequest {
    /// Validate and map entity types onto the graph vocabulary
    fn into_parts(self) -> Result<(String, Vec<Entity>, Option<String>)> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        let entities = self
            .entities
            .into_iter()
            .map(|e| {
                EntityType::parse(&e.entity_type)
                    .map(|t| Entity::new(e.text, t))
                    .ok_or(AppError::UnknownVocabulary {
                        kind: "entity type".to_string(),
                        value: e.entity_type,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((self.question, entities, self.best_relation))
    }
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub pattern: Pattern,
    pub steps: Vec<StepType>,
    pub max_hops: usize,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub turn_id: Uuid,
    pub pattern: Pattern,
    pub hop_count: usize,
    pub stop_reason: StopReason,
    pub report: String,
    pub hops: Vec<HopRecord>,
    pub discovered_entities: Vec<String>,
    pub explored_relations: Vec<String>,
    pub processing_time_ms: u64,
}

/// Classify a question without touching the graph
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<ClassifyResponse>> {
    let (question, entities, best_relation) = request.into_parts()?;

    let classification = state
        .reasoner
        .classify(&question, &entities, best_relation.as_deref());

    Ok(Json(ClassifyResponse {
        pattern: classification.pattern,
        steps: classification.steps,
        max_hops: classification.max_hops,
    }))
}

/// Run one multi-hop reasoning turn
pub async fn run_turn(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<TurnResponse>> {
    let start = Instant::now();
    let (question, entities, best_relation) = request.into_parts()?;

    let outcome = tokio::time::timeout(
        state.config.request_timeout(),
        state
            .reasoner
            .run_turn(&question, entities, best_relation.as_deref()),
    )
    .await
    .map_err(|_| AppError::ServiceUnavailable {
        message: "Reasoning turn exceeded the request timeout".to_string(),
    })?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        turn_id = %outcome.turn_id,
        pattern = %outcome.pattern,
        hops = outcome.hop_count,
        latency_ms = processing_time_ms,
        "Reasoning turn served"
    );

    Ok(Json(TurnResponse {
        turn_id: outcome.turn_id,
        pattern: outcome.pattern,
        hop_count: outcome.hop_count,
        stop_reason: outcome.stop_reason,
        report: outcome.report,
        hops: outcome.hops,
        discovered_entities: outcome.discovered_entities,
        explored_relations: outcome.explored_relations,
        processing_time_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use polikg_common::{
        config::AppConfig,
        store::{GraphStore, Row},
        Reasoner,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Answers every query with one birthplace row
    struct FixedStore;

    #[async_trait]
    impl GraphStore for FixedStore {
        async fn execute(&self, _query: &str) -> Result<Vec<Row>> {
            let row = json!({"name": "Nguyễn Văn A", "birth_place": "Hà Nội"});
            Ok(vec![row.as_object().cloned().unwrap_or_default()])
        }

        fn backend(&self) -> &str {
            "fixed"
        }
    }

    fn app() -> Router {
        let config = Arc::new(AppConfig::default());
        let reasoner = Arc::new(Reasoner::new(Arc::new(FixedStore), config.reasoning.clone()));
        crate::create_router(AppState { config, reasoner }).unwrap()
    }

    async fn post(uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_classify_endpoint() {
        let (status, body) = post(
            "/v1/classify",
            json!({
                "question": "Nguyễn Văn A sinh ra ở đâu?",
                "entities": [{"text": "Nguyễn Văn A", "type": "Politician"}],
                "best_relation": "BORN_AT"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pattern"], "simple");
        assert_eq!(body["steps"], json!(["intent", "explore", "explore"]));
        assert_eq!(body["max_hops"], 3);
    }

    #[tokio::test]
    async fn test_turn_endpoint() {
        let (status, body) = post(
            "/v1/turns",
            json!({
                "question": "Nguyễn Văn A sinh ra ở đâu?",
                "entities": [{"text": "Nguyễn Văn A", "type": "Politician"}],
                "best_relation": "BORN_AT"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pattern"], "simple");
        assert!(body["hop_count"].as_u64().unwrap() >= 1);
        assert!(body["report"].as_str().unwrap().starts_with("Bước 1: "));
        assert_eq!(body["hops"][0]["step"], "intent");
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let (status, body) = post("/v1/turns", json!({"question": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.is_object());
    }

    #[tokio::test]
    async fn test_unknown_entity_type_rejected() {
        let (status, _) = post(
            "/v1/classify",
            json!({
                "question": "Ai?",
                "entities": [{"text": "X", "type": "Spaceship"}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_router_rejects_request_timeout_below_turn_budget() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;
        config.reasoning.decider_timeout_ms = 800;
        let config = Arc::new(config);
        let reasoner = Arc::new(Reasoner::new(Arc::new(FixedStore), config.reasoning.clone()));

        let err = crate::create_router(AppState { config, reasoner }).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let response = app()
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::builder().uri("/v1/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
