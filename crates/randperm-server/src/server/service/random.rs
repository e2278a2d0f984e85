//! `POST /random`: the whole permutation in a single JSON array.
//!
//! Accepts both `multipart/form-data` (what a browser `FormData` submits) and
//! `application/x-www-form-urlencoded` bodies.

use super::{error::ServiceError, handler::GeneratorService, protocol::CountParams};
use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Request, State, multipart::MultipartError},
    http::header,
};

/// Validates the form, runs one generation to completion and returns it.
///
/// An unreadable body is treated like an empty form, so every client mistake
/// is reported the same way: `400` with `[]`.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn random(
    State(service): State<GeneratorService>,
    request: Request,
) -> Result<Json<Vec<u32>>, ServiceError> {
    service.ensure_serving()?;

    let params = read_params(request).await;

    let config = params.config(service.limits()).inspect_err(|e| {
        tracing::warn!("Rejected /random request: {}", e);
    })?;

    let values = service.start(config)?.collect().await.inspect_err(|e| {
        tracing::warn!("/random generation failed: {}", e);
    })?;

    Ok(Json(values))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("multipart/form-data"))
}

async fn read_params(request: Request) -> CountParams {
    if is_multipart(&request) {
        let params = match Multipart::from_request(request, &()).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(rejection) => {
                tracing::debug!("Unreadable multipart body: {}", rejection);
                return CountParams::default();
            }
        };
        return params.unwrap_or_else(|e| {
            tracing::debug!("Malformed multipart body: {}", e);
            CountParams::default()
        });
    }

    match Form::<CountParams>::from_request(request, &()).await {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::debug!("Unreadable form body: {}", rejection);
            CountParams::default()
        }
    }
}

/// Picks `countNumbers` and `countThreads` out of a multipart body, skipping
/// any other field.
async fn read_multipart(mut multipart: Multipart) -> Result<CountParams, MultipartError> {
    let mut params = CountParams::default();
    while let Some(field) = multipart.next_field().await? {
        let slot = match field.name() {
            Some("countNumbers") => &mut params.count_numbers,
            Some("countThreads") => &mut params.count_threads,
            _ => continue,
        };
        *slot = Some(field.text().await?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use crate::server::{config::ServerConfig, service::handler::{GeneratorService, router}};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    fn form(body: &'static str) -> Request<Body> {
        Request::post("/random")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn call(service: &GeneratorService, request: Request<Body>) -> (StatusCode, Vec<u32>) {
        let response = router(service.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn returns_a_permutation() {
        let service = GeneratorService::new(ServerConfig::default());
        let (status, mut values) = call(&service, form("countNumbers=10&countThreads=4")).await;

        assert_eq!(status, StatusCode::OK);
        values.sort_unstable();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
        assert_eq!(service.inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_value() {
        let service = GeneratorService::new(ServerConfig::default());
        let (status, values) = call(&service, form("countNumbers=1&countThreads=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(values, vec![0]);
    }

    fn multipart(fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--XB\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str("--XB--\r\n");

        Request::post("/random")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XB")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accepts_multipart_form_data() {
        let service = GeneratorService::new(ServerConfig::default());
        let request = multipart(&[
            ("countNumbers", "5"),
            ("ignored", "x"),
            ("countThreads", "2"),
        ]);
        let (status, mut values) = call(&service, request).await;

        assert_eq!(status, StatusCode::OK);
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_multipart_gets_an_empty_array() {
        let service = GeneratorService::new(ServerConfig::default());

        for request in [
            multipart(&[("countNumbers", "5"), ("countThreads", "33")]),
            multipart(&[("countThreads", "2")]),
            multipart(&[]),
        ] {
            let (status, values) = call(&service, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(values.is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_requests_get_an_empty_array() {
        let service = GeneratorService::new(ServerConfig::default());

        for body in [
            "countNumbers=10&countThreads=33",
            "countNumbers=0&countThreads=4",
            "countNumbers=-3&countThreads=4",
            "countNumbers=ten&countThreads=4",
            "countThreads=4",
            "",
        ] {
            let (status, values) = call(&service, form(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert!(values.is_empty(), "body {body:?}");
        }
        assert_eq!(service.inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_content_type_is_a_bad_request() {
        let service = GeneratorService::new(ServerConfig::default());
        let request = Request::post("/random").body(Body::empty()).unwrap();
        let (status, values) = call(&service, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(values.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_after_shutdown() {
        let service = GeneratorService::new(ServerConfig::default());
        service.shutdown().await;

        let (status, values) = call(&service, form("countNumbers=10&countThreads=4")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(values.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_follows_shutdown() {
        let service = GeneratorService::new(ServerConfig::default());
        let request = || Request::get("/health").body(Body::empty()).unwrap();

        let response = router(service.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        service.shutdown().await;
        let response = router(service.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
