//! HTTP host for the match function, called by the Open Match backend

use super::service::MatchFunctionService;
use crate::openmatch::messages::{RunRequest, RunResponse, StreamFrame, RUN_MATCH_FUNCTION_PATH};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MatchFunctionServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MatchFunctionServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50502,
        }
    }
}

pub struct MatchFunctionServer {
    config: MatchFunctionServerConfig,
    service: Arc<MatchFunctionService>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MatchFunctionServer {
    pub fn new(config: MatchFunctionServerConfig, service: Arc<MatchFunctionService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            service,
            shutdown_tx,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid match function address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind match function server on {}", addr))?;
        info!("Match function listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Match function server shutdown signal received");
            })
            .await?;

        info!("Match function server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to match function server: {}", e);
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(RUN_MATCH_FUNCTION_PATH, post(run_handler))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(self.service.clone())
    }
}

/// Streams one `{"result":{"proposal":...}}` line per proposal
async fn run_handler(
    State(service): State<Arc<MatchFunctionService>>,
    Json(request): Json<RunRequest>,
) -> Response {
    debug!("Match function run requested for '{}'", request.profile.name);

    match service.run(&request.profile).await {
        Ok(proposals) => {
            let mut body = String::new();
            for proposal in proposals {
                match serde_json::to_string(&StreamFrame::result(RunResponse { proposal })) {
                    Ok(line) => {
                        body.push_str(&line);
                        body.push('\n');
                    }
                    Err(e) => {
                        error!("Failed to encode proposal: {}", e);
                        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
                    }
                }
            }

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap_or_else(|e| {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                })
        }
        Err(e) => {
            error!(
                "Match function failed for profile '{}': {:#}",
                request.profile.name, e
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{:#}", e))
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let frame = StreamFrame::<RunResponse>::error(message, status.as_u16());
    (status, Json(frame)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchfunction::service::PlayerCapacityMatchMaker;
    use crate::openmatch::stream::decode_body;
    use crate::openmatch::StaticQueryService;
    use crate::types::{Pool, Profile, Ticket};
    use axum::http::Request;
    use tower::ServiceExt;

    fn server(capacity: i64) -> MatchFunctionServer {
        let tickets = (0..4).map(|i| Ticket::new(format!("t{}", i))).collect();
        let query = Arc::new(StaticQueryService::new().with_pool("pool_mode_Nova", tickets));
        let service = Arc::new(MatchFunctionService::new(
            query,
            Arc::new(PlayerCapacityMatchMaker::new(capacity)),
        ));
        MatchFunctionServer::new(MatchFunctionServerConfig::default(), service)
    }

    fn run_request() -> Request<Body> {
        let request = RunRequest {
            profile: Profile {
                name: "nova".to_string(),
                pools: vec![Pool {
                    name: "pool_mode_Nova".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        };
        Request::builder()
            .method("POST")
            .uri(RUN_MATCH_FUNCTION_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&request).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_streams_proposals() {
        let response = server(2).router().oneshot(run_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let proposals: Vec<RunResponse> = decode_body(&bytes).unwrap();

        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].proposal.match_profile, "nova");
    }

    #[tokio::test]
    async fn test_run_reports_failures() {
        let response = server(0).router().oneshot(run_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = server(1)
            .router()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
