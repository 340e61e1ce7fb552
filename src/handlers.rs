use std::{convert::Infallible, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::ProviderConfig,
    errors::{tag_provider, AppError},
    metrics::AppMetrics,
    models::{ChatRequest, HealthResponse, ResearchRequest, StatusResponse},
    prompts::{chat_prompt, discover_prompt, research_prompt, RESEARCH_SYSTEM_PROMPT},
    provider::{Dispatcher, ProviderError},
    state::AppState,
};

pub async fn root(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::for_config(&state.config.resolve()))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal(format!("metrics render failed: {error}")).into_response(),
    }
}

pub async fn research(State(state): State<AppState>, Json(request): Json<ResearchRequest>) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();
    let config = state.config.resolve();

    let response = match request.validated_topic() {
        Ok(topic) => {
            let prompt = research_prompt(topic, request.depth());
            stream_response(&state, "/research", config.clone(), prompt)
        }
        Err(message) => AppError::BadRequest(message).into_response(),
    };

    observe(&state, "/research", &config, &response, started);
    response
}

pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();
    let config = state.config.resolve();

    let response = match request.validated_message() {
        Ok(message) => {
            let history = request.history.as_deref().unwrap_or_default();
            let prompt = chat_prompt(history, message);
            stream_response(&state, "/chat", config.clone(), prompt)
        }
        Err(message) => AppError::BadRequest(message).into_response(),
    };

    observe(&state, "/chat", &config, &response, started);
    response
}

pub async fn discover(State(state): State<AppState>, Json(request): Json<ResearchRequest>) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();
    let config = state.config.resolve();

    let response = match request.validated_topic() {
        Ok(topic) => stream_response(&state, "/discover", config.clone(), discover_prompt(topic)),
        Err(message) => AppError::BadRequest(message).into_response(),
    };

    observe(&state, "/discover", &config, &response, started);
    response
}

fn observe(state: &AppState, path: &str, config: &ProviderConfig, response: &Response, started: Instant) {
    state.metrics.observe_request(
        path,
        "POST",
        config.kind.as_str(),
        response.status().as_u16(),
        started.elapsed(),
    );
}

fn stream_response(state: &AppState, path: &'static str, config: ProviderConfig, prompt: String) -> Response {
    let request_id = format!("req_{}", Uuid::new_v4());
    info!(
        request_id = %request_id,
        path,
        provider = %config.kind,
        model = %config.model,
        prompt_chars = prompt.chars().count(),
        "research request accepted"
    );

    let mut headers = HeaderMap::new();
    tag_provider(&mut headers, &config);
    let body = Body::from_stream(fragment_stream(
        state.dispatcher.as_ref().clone(),
        state.metrics.as_ref().clone(),
        config,
        prompt,
        request_id,
    ));

    let mut response = ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response();
    response.headers_mut().extend(headers);
    response
}

/// Forwards fragments verbatim. A backend failure becomes one trailing
/// `Error:` line and ends the body cleanly.
pub fn fragment_stream(
    dispatcher: Dispatcher,
    metrics: AppMetrics,
    config: ProviderConfig,
    prompt: String,
    request_id: String,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    async_stream::stream! {
        let provider = config.kind.as_str();
        match dispatcher.stream(&prompt, RESEARCH_SYSTEM_PROMPT, &config).await {
            Ok(mut fragments) => {
                let mut count = 0usize;
                while let Some(next) = fragments.next().await {
                    match next {
                        Ok(fragment) => {
                            count += 1;
                            metrics.observe_fragment(provider);
                            yield Ok::<String, Infallible>(fragment);
                        }
                        Err(error) => {
                            metrics.observe_backend_error(provider, "read");
                            warn!(request_id = %request_id, provider, error = %error, "backend stream failed");
                            yield Ok::<String, Infallible>(error_marker(&error));
                            break;
                        }
                    }
                }
                info!(request_id = %request_id, provider, fragments = count, "research stream finished");
            }
            Err(error) => {
                metrics.observe_backend_error(provider, "start");
                warn!(request_id = %request_id, provider, error = %error, "backend request failed");
                yield Ok::<String, Infallible>(error_marker(&error));
            }
        }
    }
}

fn error_marker(error: &ProviderError) -> String {
    format!("\n\nError: {error}")
}
