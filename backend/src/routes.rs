use std::{sync::Arc, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    BoxError, Router,
};
use serde_json::{json, Value};
use shared::{DeletedTask, NewTask, Suggestion, Task, TaskId, TaskPatch};
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{error::ApiError, store::TaskStore, suggest::Suggester};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub suggester: Option<Arc<dyn Suggester>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/suggestions", get(suggestions))
        .route("/health", get(health))
        .with_state(state)
}

/// Wraps `router` with the per-request timeout and request tracing.
/// An expired request is answered with the usual JSON error body.
pub fn with_request_layers(router: Router, timeout: Duration) -> Router {
    router
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Middleware(err.to_string())
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state
        .store
        .list()
        .await
        .map_err(ApiError::store("Error retrieving tasks"))?;
    Ok(Json(tasks))
}

async fn get_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Task>, ApiError> {
    let id: TaskId = id.parse()?;
    state
        .store
        .get(id)
        .await
        .map_err(ApiError::store("Error retrieving task"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(new_task) = payload?;
    new_task.validate()?;

    let task = state
        .store
        .create(new_task)
        .await
        .map_err(ApiError::store("Error adding task"))?;
    tracing::info!(id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let id: TaskId = id.parse()?;
    let Json(patch) = payload?;
    patch.validate()?;

    state
        .store
        .update(id, patch)
        .await
        .map_err(ApiError::store("Error updating task"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn delete_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeletedTask>, ApiError> {
    let id: TaskId = id.parse()?;
    let deleted_task = state
        .store
        .delete(id)
        .await
        .map_err(ApiError::store("Error deleting task"))?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(id = %deleted_task.id, "task deleted");

    Ok(Json(DeletedTask {
        message: "Task deleted successfully".to_string(),
        deleted_task,
    }))
}

async fn suggestions(State(state): State<AppState>) -> Result<Json<Suggestion>, ApiError> {
    let suggester = state.suggester.as_ref().ok_or(ApiError::SuggestionsDisabled)?;
    let names: Vec<String> = state
        .store
        .list()
        .await
        .map_err(ApiError::store("Error retrieving tasks"))?
        .into_iter()
        .map(|task| task.name)
        .collect();

    let suggestions = suggester.suggest(&names).await?;
    Ok(Json(Suggestion { suggestions }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
    };
    use serde::de::DeserializeOwned;
    use shared::{ErrorBody, DEFAULT_COLOR};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        store::{MemoryTaskStore, StoreError},
        suggest::SuggestionError,
    };

    struct FakeSuggester {
        seen: Mutex<Vec<String>>,
        delay: Duration,
        reply: Result<String, SuggestionError>,
    }

    impl FakeSuggester {
        fn replying(reply: Result<String, SuggestionError>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                reply,
            }
        }
    }

    #[async_trait]
    impl Suggester for FakeSuggester {
        async fn suggest(&self, task_names: &[String]) -> Result<String, SuggestionError> {
            *self.seen.lock().unwrap() = task_names.to_vec();
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    /// Store whose every operation fails, for the 500 paths.
    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::Corrupt {
            key: "task:broken".to_string(),
            reason: "unavailable".to_string(),
        }
    }

    #[async_trait]
    impl TaskStore for BrokenStore {
        async fn list(&self) -> Result<Vec<Task>, StoreError> {
            Err(broken())
        }
        async fn get(&self, _: TaskId) -> Result<Option<Task>, StoreError> {
            Err(broken())
        }
        async fn create(&self, _: NewTask) -> Result<Task, StoreError> {
            Err(broken())
        }
        async fn update(&self, _: TaskId, _: TaskPatch) -> Result<Option<Task>, StoreError> {
            Err(broken())
        }
        async fn delete(&self, _: TaskId) -> Result<Option<Task>, StoreError> {
            Err(broken())
        }
    }

    fn app() -> Router {
        router(AppState {
            store: Arc::new(MemoryTaskStore::default()),
            suggester: None,
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn create_patch_delete_scenario() {
        let app = app();

        let (status, body) = send(&app, Method::POST, "/tasks", Some(r#"{"name":"Buy milk"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Task = parse(&body);
        assert_eq!(created.name, "Buy milk");
        assert!(!created.completed);
        assert_eq!(created.color, DEFAULT_COLOR);

        let uri = format!("/tasks/{}", created.id);
        let (status, body) = send(&app, Method::PATCH, &uri, Some(r#"{"completed":true}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let updated: Task = parse(&body);
        assert!(updated.completed);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.color, created.color);

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let deleted: DeletedTask = parse(&body);
        assert_eq!(deleted.message, "Task deleted successfully");
        assert_eq!(deleted.deleted_task, updated);

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorBody = parse(&body);
        assert_eq!(error.message, "Task not found");
    }

    #[tokio::test]
    async fn list_counts_creates_minus_deletes() {
        let app = app();
        let mut ids = Vec::new();
        for name in ["one", "two", "three", "four", "five"] {
            let body = format!(r#"{{"name":"{name}"}}"#);
            let (_, created) = send(&app, Method::POST, "/tasks", Some(&body)).await;
            ids.push(parse::<Task>(&created).id);
        }
        for id in &ids[..2] {
            send(&app, Method::DELETE, &format!("/tasks/{id}"), None).await;
        }

        let (status, body) = send(&app, Method::GET, "/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<String> = parse::<Vec<Task>>(&body).into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["three", "four", "five"]);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = app();
        let uri = format!("/tasks/{}", TaskId::generate());
        for (method, body) in [
            (Method::GET, None),
            (Method::PATCH, Some(r#"{"name":"x"}"#)),
            (Method::DELETE, None),
        ] {
            let (status, _) = send(&app, method, &uri, body).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/tasks/507f1f77bcf86cd799439011", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorBody>(&body).message, "Invalid task id");

        let (status, _) = send(&app, Method::DELETE, "/tasks/42", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_cannot_change_id() {
        let app = app();
        let (_, body) = send(&app, Method::POST, "/tasks", Some(r#"{"name":"a"}"#)).await;
        let created: Task = parse(&body);

        let other = TaskId::generate();
        let patch = format!(r#"{{"id":"{other}","name":"b"}}"#);
        let (status, body) = send(&app, Method::PATCH, &format!("/tasks/{}", created.id), Some(&patch)).await;
        assert_eq!(status, StatusCode::OK);
        let updated: Task = parse(&body);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "b");
    }

    #[tokio::test]
    async fn explicit_false_and_color_are_kept() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/tasks",
            Some(r##"{"name":"a","completed":false,"color":"#065535"}"##),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Task = parse(&body);
        assert!(!created.completed);
        assert_eq!(created.color, "#065535");
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let app = app();
        for body in [
            r#"{"name":"   "}"#,
            r#"{"name":"a","color":"purple"}"#,
            r#"{"name":"a","completed":"yes"}"#,
            r#"{"completed":true}"#,
            "not json",
        ] {
            let (status, bytes) = send(&app, Method::POST, "/tasks", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
            assert!(parse::<ErrorBody>(&bytes).error.is_some());
        }

        let (status, _) = send(&app, Method::GET, "/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn store_failures_are_500_with_detail() {
        let app = router(AppState {
            store: Arc::new(BrokenStore),
            suggester: None,
        });
        let (status, body) = send(&app, Method::GET, "/tasks", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = parse(&body);
        assert_eq!(error.message, "Error retrieving tasks");
        assert!(error.error.unwrap().contains("unavailable"));

        let (status, _) = send(&app, Method::POST, "/tasks", Some(r#"{"name":"a"}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn suggestions_pass_task_names() {
        let store = Arc::new(MemoryTaskStore::default());
        store.create(NewTask::named("Buy milk")).await.unwrap();
        store.create(NewTask::named("Walk dog")).await.unwrap();
        let suggester = Arc::new(FakeSuggester::replying(Ok("Water the plants".to_string())));
        let app = router(AppState {
            store,
            suggester: Some(suggester.clone()),
        });

        let (status, body) = send(&app, Method::GET, "/suggestions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<Suggestion>(&body).suggestions, "Water the plants");
        assert_eq!(*suggester.seen.lock().unwrap(), ["Buy milk", "Walk dog"]);
    }

    #[tokio::test]
    async fn suggestions_report_missing_config_and_upstream_failure() {
        let (status, _) = send(&app(), Method::GET, "/suggestions", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let app = router(AppState {
            store: Arc::new(MemoryTaskStore::default()),
            suggester: Some(Arc::new(FakeSuggester::replying(Err(SuggestionError::Timeout)))),
        });
        let (status, body) = send(&app, Method::GET, "/suggestions", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(parse::<ErrorBody>(&body).error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn upstream_timeout_surfaces_inside_the_server_timeout() {
        let app = with_request_layers(
            router(AppState {
                store: Arc::new(MemoryTaskStore::default()),
                suggester: Some(Arc::new(FakeSuggester::replying(Err(SuggestionError::Timeout)))),
            }),
            Duration::from_secs(5),
        );
        let (status, body) = send(&app, Method::GET, "/suggestions", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(parse::<ErrorBody>(&body).error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn expired_requests_get_a_json_error_body() {
        let mut slow = FakeSuggester::replying(Ok("too late".to_string()));
        slow.delay = Duration::from_secs(2);
        let app = with_request_layers(
            router(AppState {
                store: Arc::new(MemoryTaskStore::default()),
                suggester: Some(Arc::new(slow)),
            }),
            Duration::from_millis(50),
        );

        let (status, body) = send(&app, Method::GET, "/suggestions", None).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        let error: ErrorBody = parse(&body);
        assert_eq!(error.message, "Request timed out");
        assert!(error.error.is_some());

        let (status, _) = send(&app, Method::GET, "/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn requests_are_traced_at_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = with_request_layers(app(), Duration::from_secs(5));
        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("finished processing request"), "{output}");
    }
}
