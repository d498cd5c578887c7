//! Common API utilities shared across versions

pub mod middleware;
pub mod utils;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Standard success envelope returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status_code.as_u16(),
            data,
            message: message.into(),
            success: status_code.as_u16() < 400,
        }
    }

    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, data, message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Page envelope for paginated listings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, limit: i64, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + limit - 1) / limit
        };
        Self {
            items,
            page,
            limit,
            total_pages,
            total_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_uses_the_camel_case_contract() {
        let envelope = ApiResponse::ok(json!({"id": "1"}), "Fetched");
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["data"]["id"], "1");
        assert_eq!(value["message"], "Fetched");
        assert_eq!(value["success"], true);
    }

    #[test]
    fn created_envelope_reports_201() {
        let envelope = ApiResponse::created(json!({}), "Created");
        assert_eq!(envelope.status_code, 201);
        assert!(envelope.success);
    }

    #[test]
    fn page_math_rounds_up() {
        let page = Page::new(vec![1, 2, 3, 4, 5], 2, 5, 11);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 11);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn empty_result_set_has_zero_pages() {
        let page: Page<i64> = Page::new(Vec::new(), 1, 10, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_items, 0);
    }

    #[test]
    fn page_envelope_serializes_with_camel_case_keys() {
        let page = Page::new(vec![json!({"id": "v1"})], 1, 10, 1);
        let value = serde_json::to_value(&page).unwrap();

        assert!(value.get("items").is_some());
        assert!(value.get("totalPages").is_some());
        assert!(value.get("totalItems").is_some());
    }
}
