use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{HeaderMap, header, request::Parts},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JsonBody
///
/// JSON request body whose rejections are `AppError`s. An empty body reads as
/// `T::default()`, so every field is absent and the handler reports the first
/// missing one as `MissingInput`. A body that is not JSON, or does not fit
/// `T`, is `MalformedPayload`.
#[derive(Debug, Clone, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json_content = has_json_content_type(req.headers());

        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::debug!("request body unreadable: {}", e.body_text());
            AppError::MalformedPayload
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        if !json_content {
            tracing::debug!("request body sent without a JSON content type");
            return Err(AppError::MalformedPayload);
        }

        let Json(value) = Json::<T>::from_bytes(&bytes)?;
        Ok(Self(value))
    }
}

/// PathId
///
/// Path parameters whose rejection is `AppError::MalformedId` (400), e.g. an
/// id that is not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct PathId<T>(pub T);

impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_json_content_types() {
        assert!(has_json_content_type(&headers("application/json")));
        assert!(has_json_content_type(&headers("application/json; charset=utf-8")));
        assert!(has_json_content_type(&headers("application/problem+json")));
    }

    #[test]
    fn test_non_json_content_types() {
        assert!(!has_json_content_type(&HeaderMap::new()));
        assert!(!has_json_content_type(&headers("text/plain")));
        assert!(!has_json_content_type(&headers("application/x-www-form-urlencoded")));
    }
}
