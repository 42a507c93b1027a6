//! UUID path parameter extractor.

use crate::errors::AppError;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// Path extractor that parses the single path parameter as a UUID.
///
/// A malformed id rejects with a 400 before the handler runs, so
/// handlers only ever see a valid `Uuid`.
pub struct UuidPath(pub Uuid);

impl<S> FromRequestParts<S> for UuidPath
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| e.into_response())?;

        Uuid::try_parse(&raw).map(UuidPath).map_err(|_| {
            AppError::BadRequest(format!("Invalid UUID in path: {raw}")).into_response()
        })
    }
}
