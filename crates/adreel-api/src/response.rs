//! Success envelope shared by every JSON route.

use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: u32,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub timestamp: String,
}

pub type ApiJson<T> = Json<ApiResponse<T>>;

pub fn ok<T: Serialize>(data: T) -> ApiJson<T> {
    Json(ApiResponse {
        success: true,
        data,
        pagination: None,
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub fn paginated<T: Serialize>(data: T, pagination: Pagination) -> ApiJson<T> {
    Json(ApiResponse {
        success: true,
        data,
        pagination: Some(pagination),
        timestamp: Utc::now().to_rfc3339(),
    })
}
