use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::http::{Method, Request, Response, StatusCode, request::TargetForm};
use crate::message::{ControlMessage, MessageReply, reply_channel};
use crate::router::CacheRouter;

/// Routes one request received by the proxy.
///
/// Absolute-form requests are intercepted by the router; a network failure
/// with no fallback becomes `502 Bad Gateway`, except for writes (`POST`,
/// `PUT`, `PATCH`, `DELETE`), which are queued for the next background sync
/// and answered with `202 Accepted`. Origin-form requests address the
/// worker itself:
///
/// | Request                   | Body                 | Event               |
/// |---------------------------|----------------------|---------------------|
/// | `POST /message`           | JSON control message | message             |
/// | `POST /sync`              | sync tag             | sync                |
/// | `POST /push`              | push payload         | push                |
/// | `POST /notificationclick` | action id            | notification click  |
pub async fn dispatch(router: Arc<CacheRouter>, request: Request) -> Response {
    if request.target_form() == TargetForm::Absolute {
        let deferred = is_deferrable(request.method()).then(|| request.clone());
        return match (router.on_fetch(request).await, deferred) {
            (Ok(response), _) => response,
            (Err(e), Some(request)) => {
                warn!(url = %request.url(), error = %e, "write failed offline, queued for sync");
                router.enqueue_sync(request).await;
                Response::new(StatusCode::ACCEPTED)
            }
            (Err(e), None) => Response::new(StatusCode::BAD_GATEWAY).body(e.to_string()),
        };
    }

    if request.method() != &Method::Post {
        return Response::new(StatusCode::NOT_FOUND);
    }

    let body = String::from_utf8_lossy(request.body_bytes()).into_owned();
    let text = body.trim();
    let payload = (!text.is_empty()).then_some(text);

    match request.path() {
        "/message" => handle_message(&router, text),
        "/sync" => {
            let tag = payload.unwrap_or(router.config().sync_tag.as_str());
            json(StatusCode::OK, &router.on_sync(tag).await)
        }
        "/push" => json(StatusCode::OK, &router.on_push(payload)),
        "/notificationclick" => match router.on_notification_click(payload) {
            Some(command) => json(StatusCode::OK, &command),
            None => Response::new(StatusCode::NO_CONTENT),
        },
        other => {
            debug!(path = other, "unknown control endpoint");
            Response::new(StatusCode::NOT_FOUND)
        }
    }
}

fn is_deferrable(method: &Method) -> bool {
    matches!(
        method,
        Method::Post | Method::Put | Method::Patch | Method::Delete
    )
}

fn handle_message(router: &CacheRouter, text: &str) -> Response {
    let message = match ControlMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "rejecting control message");
            return json(
                StatusCode::BAD_REQUEST,
                &MessageReply::Error {
                    error: e.to_string(),
                },
            );
        }
    };

    let (port, mut reply) = reply_channel();
    router.on_message(message, Some(port));
    match reply.try_recv() {
        Ok(answer) => json(StatusCode::OK, &answer),
        Err(_) => Response::new(StatusCode::NO_CONTENT),
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    Response::json(status, value).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize control reply");
        Response::new(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use crate::config::RouterConfig;
    use crate::fetch::FetchError;

    fn offline_router() -> Arc<CacheRouter> {
        let fetcher = |req: Request| async move {
            Err::<Response, _>(FetchError::transport(req.url(), "offline"))
        };
        Arc::new(CacheRouter::new(
            RouterConfig::new("v7", vec![]),
            Arc::new(MemoryStorage::new()),
            fetcher,
        ))
    }

    fn control(path: &str, body: &str) -> Request {
        let raw = format!(
            "POST {path} HTTP/1.1\r\nHost: 127.0.0.1:8080\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req.body(body.to_owned())
    }

    #[tokio::test]
    async fn get_version_over_http() {
        let resp = dispatch(offline_router(), control("/message", r#"{"type":"GET_VERSION"}"#)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body_ref().as_ref(), br#"{"version":"v7"}"#);
    }

    #[tokio::test]
    async fn malformed_message_is_400() {
        let resp = dispatch(offline_router(), control("/message", r#"{"type":"NOPE"}"#)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn proxied_failure_is_502() {
        let req = Request::get("http://example.com/search").unwrap();
        let resp = dispatch(offline_router(), req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn proxied_api_call_gets_503_json() {
        let req = Request::get("https://firestore.googleapis.com/v1/vehicles").unwrap();
        let resp = dispatch(offline_router(), req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers().get("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn offline_write_is_queued_for_sync() {
        let router = offline_router();
        let write = Request::new(
            Method::Post,
            url::Url::parse("https://firestore.googleapis.com/v1/vehicles").unwrap(),
        )
        .body("{}");

        let resp = dispatch(Arc::clone(&router), write).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = dispatch(router, control("/sync", "")).await;
        assert_eq!(resp.body_ref().as_ref(), br#"{"replayed":0,"pending":1}"#);
    }

    #[tokio::test]
    async fn close_click_is_no_content() {
        let resp = dispatch(offline_router(), control("/notificationclick", "close")).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = dispatch(offline_router(), control("/notificationclick", "explore")).await;
        assert_eq!(
            resp.body_ref().as_ref(),
            br#"{"command":"open_window","url":"/?section=explore"}"#
        );
    }

    #[tokio::test]
    async fn unknown_endpoint_is_404() {
        let resp = dispatch(offline_router(), control("/nope", "")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
