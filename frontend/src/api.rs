use serde::de::DeserializeOwned;
use shared::{DeletedTask, ErrorBody, NewTask, Suggestion, Task, TaskId, TaskPatch};
use thiserror::Error;
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{console, window, AbortController, Request, RequestInit, Response};

/// Requests still running after this long are aborted and reported as timeouts.
const REQUEST_TIMEOUT_MS: i32 = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("http {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Decode(String),
}

pub async fn fetch_tasks() -> Result<Vec<Task>, ApiError> {
    send_json("GET", "/tasks", None).await
}

pub async fn create_task(new_task: &NewTask) -> Result<Task, ApiError> {
    let body = encode(new_task)?;
    send_json("POST", "/tasks", Some(body)).await
}

pub async fn update_task(id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
    let body = encode(patch)?;
    send_json("PATCH", &format!("/tasks/{}", id), Some(body)).await
}

pub async fn delete_task(id: TaskId) -> Result<DeletedTask, ApiError> {
    send_json("DELETE", &format!("/tasks/{}", id), None).await
}

pub async fn fetch_suggestions() -> Result<String, ApiError> {
    let suggestion: Suggestion = send_json("GET", "/suggestions", None).await?;
    Ok(suggestion.suggestions)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn network(context: &str) -> impl Fn(JsValue) -> ApiError + '_ {
    move |err| ApiError::Network(format!("{}: {:?}", context, err))
}

/// Turns a non-2xx response body into an error, preferring the server's `message`.
fn status_error(status: u16, text: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(text)
        .map(|body| body.message)
        .unwrap_or_else(|_| "request failed".to_string());
    ApiError::Status { status, message }
}

async fn send_json<T: DeserializeOwned>(
    method: &str,
    url: &str,
    body: Option<String>,
) -> Result<T, ApiError> {
    let window = window().ok_or_else(|| ApiError::Network("no window".to_string()))?;

    let opts = RequestInit::new();
    opts.set_method(method);
    if let Some(body) = &body {
        opts.set_body(&JsValue::from_str(body));
    }

    let controller = AbortController::new().map_err(network("Failed to create abort controller"))?;
    let signal = controller.signal();
    opts.set_signal(Some(&signal));

    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(network("Failed to create request"))?;
    if body.is_some() {
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(network("Failed to set header"))?;
    }

    let abort = Closure::wrap(Box::new(move || controller.abort()) as Box<dyn FnMut()>);
    let timer = window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            abort.as_ref().unchecked_ref(),
            REQUEST_TIMEOUT_MS,
        )
        .map_err(network("Failed to arm request timeout"))?;

    let result = JsFuture::from(window.fetch_with_request(&request)).await;
    let text = match result {
        Ok(response) => {
            let response: Response = response.into();
            let text = match response.text() {
                Ok(promise) => JsFuture::from(promise).await,
                Err(err) => Err(err),
            };
            text.map(|text| (response.status(), response.ok(), text.as_string().unwrap_or_default()))
        }
        Err(err) => Err(err),
    };
    window.clear_timeout_with_handle(timer);
    drop(abort);

    let (status, ok, text) = match text {
        Ok(parts) => parts,
        Err(_) if signal.aborted() => return Err(ApiError::Timeout),
        Err(err) => return Err(network("Failed to send request")(err)),
    };

    if !ok {
        console::log_1(&format!("{} {} failed with {}: {}", method, url, status, text).into());
        return Err(status_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_uses_server_message() {
        let err = status_error(404, r#"{"message":"Task not found"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 404,
                message: "Task not found".to_string()
            }
        );
    }

    #[test]
    fn status_error_falls_back_to_code() {
        let err = status_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "http 502: request failed");
    }
}
