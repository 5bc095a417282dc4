use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use rand::{distributions::Alphanumeric, Rng};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use local_evaluation::config::{Config, EnvMsDuration};

pub const PROJECT_API_KEY: &str = "phc_project_token";
pub const PERSONAL_API_KEY: &str = "phx_personal_key";

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub query: Option<String>,
}

#[derive(Clone)]
struct ServerState {
    response: Arc<Mutex<(StatusCode, String)>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Stands in for the PostHog definitions endpoint.
pub struct ServerHandle {
    pub addr: SocketAddr,
    state: ServerState,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn start(status: StatusCode, body: String) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        let state = ServerState {
            response: Arc::new(Mutex::new((status, body))),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/api/feature_flag/local_evaluation", get(local_evaluation))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
        });
        ServerHandle {
            addr,
            state,
            shutdown,
        }
    }

    pub fn set_response(&self, status: StatusCode, body: String) {
        *self.state.response.lock().unwrap() = (status, body);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> Config {
        Config {
            host: format!("http://{}", self.addr),
            project_api_key: PROJECT_API_KEY.to_string(),
            personal_api_key: PERSONAL_API_KEY.to_string(),
            polling_interval: EnvMsDuration(Duration::from_secs(30)),
            request_timeout: EnvMsDuration(Duration::from_secs(5)),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

async fn local_evaluation(
    State(state): State<ServerState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    state
        .requests
        .lock()
        .unwrap()
        .push(RecordedRequest { headers, query });

    let (status, body) = state.response.lock().unwrap().clone();
    (status, [("content-type", "application/json")], body)
}
