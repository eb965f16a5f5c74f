//! JSON endpoints consumed by the browser client.
//!
//! Every request is stateless: the client sends the business profile, the
//! bottleneck and any dialog or multi-agent state it holds, and receives the
//! next state back.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chokepoint_agent::{generator::PromptVariant, runtime::AgentRuntime};
use chokepoint_core::suggestions::SuggestionBoard;
use chokepoint_core::{
    ApplicationError, Bottleneck, BusinessProfile, ChatMessage, DialogState, FieldSuggestion,
    InterfaceError, MultiAgentState, RefinedBottleneck,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub auto_apply_suggestions: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/chat/init", post(chat_init))
        .route("/api/chat", post(chat))
        .route("/api/generate-prompt", post(generate_prompt))
        .route("/api/multi-agent", post(multi_agent))
        .with_state(state)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => {
                warn!(
                    event_name = "api.request.rejected",
                    correlation_id = %self.0.correlation_id(),
                    error = %self.0.message(),
                    "request rejected"
                );
                StatusCode::BAD_REQUEST
            }
            InterfaceError::Internal { .. } => {
                error!(
                    event_name = "api.request.failed",
                    correlation_id = %self.0.correlation_id(),
                    error = %self.0.message(),
                    "request failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.0.message().to_owned() })).into_response()
    }
}

/// Per-request correlation id plus the error constructors that carry it.
struct RequestScope {
    correlation_id: String,
}

impl RequestScope {
    fn start(route: &'static str) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "api.request.received",
            correlation_id = %correlation_id,
            route,
            "request received"
        );
        Self { correlation_id }
    }

    fn body<T: DeserializeOwned>(
        &self,
        payload: Result<Json<T>, JsonRejection>,
    ) -> Result<T, ApiError> {
        payload.map(|Json(body)| body).map_err(|rejection| self.invalid(rejection.body_text()))
    }

    fn invalid(&self, message: impl Into<String>) -> ApiError {
        self.fail(ApplicationError::Validation(message.into()))
    }

    fn integration(&self, error: anyhow::Error) -> ApiError {
        self.fail(ApplicationError::Integration(format!("{error:#}")))
    }

    fn fail(&self, error: ApplicationError) -> ApiError {
        ApiError(error.into_interface(self.correlation_id.clone()))
    }

    fn done(&self, route: &'static str) {
        info!(
            event_name = "api.request.completed",
            correlation_id = %self.correlation_id,
            route,
            "request completed"
        );
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub business_data: Option<BusinessProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub bottlenecks: Vec<Bottleneck>,
}

pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let scope = RequestScope::start("analyze");
    let request = scope.body(payload)?;
    let Some(business) = request.business_data else {
        return Err(scope.invalid("Business data is required"));
    };
    if !business.is_complete() {
        return Err(scope.invalid("All fields are required"));
    }

    let bottlenecks =
        state.runtime.analyzer.analyze(&business).await.map_err(|error| scope.integration(error))?;
    scope.done("analyze");
    Ok(Json(AnalyzeResponse { bottlenecks }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitRequest {
    #[serde(default)]
    pub business_data: Option<BusinessProfile>,
    #[serde(default)]
    pub bottleneck: Option<Bottleneck>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitResponse {
    pub dialog_state: DialogState,
}

pub async fn chat_init(
    State(state): State<AppState>,
    payload: Result<Json<ChatInitRequest>, JsonRejection>,
) -> Result<Json<ChatInitResponse>, ApiError> {
    let scope = RequestScope::start("chat_init");
    let request = scope.body(payload)?;
    let (Some(business), Some(bottleneck)) = (request.business_data, request.bottleneck) else {
        return Err(scope.invalid("Business data and bottleneck are required"));
    };

    let dialog_state = state.runtime.dialog.initialize(&business, &bottleneck).await;
    scope.done("chat_init");
    Ok(Json(ChatInitResponse { dialog_state }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub business_data: Option<BusinessProfile>,
    #[serde(default)]
    pub bottleneck: Option<Bottleneck>,
    #[serde(default)]
    pub dialog_state: Option<DialogState>,
    #[serde(default)]
    pub user_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub updated_dialog_state: DialogState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_bottleneck: Option<RefinedBottleneck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_bottleneck: Option<Bottleneck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_suggestions: Option<Vec<FieldSuggestion>>,
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let scope = RequestScope::start("chat");
    let request = scope.body(payload)?;
    let (Some(business), Some(bottleneck), Some(dialog_state)) =
        (request.business_data, request.bottleneck, request.dialog_state)
    else {
        return Err(scope.invalid("Business data, bottleneck, and dialog state are required"));
    };
    let user_message = request.user_message.unwrap_or_default();
    if user_message.trim().is_empty() {
        return Err(scope.invalid("User message is required"));
    }
    if dialog_state.bottleneck_id != bottleneck.id {
        return Err(scope.invalid(format!(
            "Dialog state belongs to bottleneck `{}`, not `{}`",
            dialog_state.bottleneck_id, bottleneck.id
        )));
    }

    let outcome = state
        .runtime
        .dialog
        .advance_turn(&business, &bottleneck, dialog_state, &user_message)
        .await
        .map_err(|error| scope.integration(error))?;

    let (updated_bottleneck, field_suggestions) = if outcome.suggestions.is_empty() {
        (None, None)
    } else if state.auto_apply_suggestions {
        let updated = auto_apply(&scope, &bottleneck, outcome.suggestions.clone());
        (updated, Some(outcome.suggestions))
    } else {
        (None, Some(outcome.suggestions))
    };

    scope.done("chat");
    Ok(Json(ChatResponse {
        message: outcome.message,
        updated_dialog_state: outcome.state,
        refined_bottleneck: outcome.refined,
        updated_bottleneck,
        field_suggestions,
    }))
}

fn auto_apply(
    scope: &RequestScope,
    bottleneck: &Bottleneck,
    suggestions: Vec<FieldSuggestion>,
) -> Option<Bottleneck> {
    let (patch, rejected) = SuggestionBoard::new(suggestions).apply_all();
    for (suggestion, error) in rejected {
        warn!(
            event_name = "api.chat.suggestion_rejected",
            correlation_id = %scope.correlation_id,
            field = suggestion.field.as_str(),
            error = %error,
            "suggestion could not be applied"
        );
    }
    if patch.is_empty() {
        return None;
    }
    let mut updated = bottleneck.clone();
    updated.apply_patch(&patch);
    Some(updated)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePromptRequest {
    #[serde(default)]
    pub business_data: Option<BusinessProfile>,
    #[serde(default)]
    pub bottleneck: Option<Bottleneck>,
    #[serde(default)]
    pub refined_bottleneck: Option<RefinedBottleneck>,
    #[serde(default)]
    pub variant: PromptVariant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratePromptResponse {
    pub prompt: String,
}

pub async fn generate_prompt(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePromptRequest>, JsonRejection>,
) -> Result<Json<GeneratePromptResponse>, ApiError> {
    let scope = RequestScope::start("generate_prompt");
    let request = scope.body(payload)?;
    let (Some(business), Some(bottleneck)) = (request.business_data, request.bottleneck) else {
        return Err(scope.invalid("Business data and bottleneck are required"));
    };

    let prompt = state
        .runtime
        .generator
        .generate(request.variant, &business, &bottleneck, request.refined_bottleneck.as_ref())
        .await
        .map_err(|error| scope.integration(error))?;
    scope.done("generate_prompt");
    Ok(Json(GeneratePromptResponse { prompt }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentRequest {
    #[serde(default)]
    pub business_data: Option<BusinessProfile>,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub multi_agent_state: Option<MultiAgentState>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentResponse {
    pub multi_agent_state: MultiAgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottlenecks: Option<Vec<Bottleneck>>,
}

impl From<MultiAgentState> for MultiAgentResponse {
    fn from(state: MultiAgentState) -> Self {
        let question = state.current_question.clone().filter(|question| !question.is_empty());
        let bottlenecks = (!state.bottlenecks.is_empty()).then(|| state.bottlenecks.clone());
        Self { multi_agent_state: state, question, bottlenecks }
    }
}

pub async fn multi_agent(
    State(state): State<AppState>,
    payload: Result<Json<MultiAgentRequest>, JsonRejection>,
) -> Result<Json<MultiAgentResponse>, ApiError> {
    let scope = RequestScope::start("multi_agent");
    let request = scope.body(payload)?;
    let Some(business) = request.business_data else {
        return Err(scope.invalid("Business data is required"));
    };

    let answer = request.user_message.filter(|message| !message.trim().is_empty());
    let session = match (request.multi_agent_state, answer) {
        (Some(session), Some(answer)) => {
            match state.runtime.orchestrator.process_user_answer(session.clone(), &answer).await {
                Ok(next) => next,
                Err(error) => {
                    warn!(
                        event_name = "api.multi_agent.recovered",
                        correlation_id = %scope.correlation_id,
                        error = %format!("{error:#}"),
                        "answer processing failed, returning previous state"
                    );
                    session.recovered(error)
                }
            }
        }
        _ => state
            .runtime
            .orchestrator
            .initialize(business)
            .await
            .map_err(|error| scope.integration(error))?,
    };

    scope.done("multi_agent");
    Ok(Json(MultiAgentResponse::from(session)))
}
