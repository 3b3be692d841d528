//! Uniform response envelope shared by every HTTP endpoint.
//!
//! Success bodies carry `error_code = 0`; failures are rendered by
//! [`crate::error::AppError`] with `error_code` equal to the HTTP status.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fixed page size for every paginated listing.
pub const PAGE_SIZE: i64 = 50;
/// Highest `?page=` accepted from a client.
pub const MAX_PAGE: i64 = 1_000_000;

/// Row offset of `page`, clamped so it never overflows.
pub fn page_offset(page: i64, limit: i64) -> i64 {
    page.max(0).saturating_mul(limit.max(0))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub error_code: u16,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::with_message("Success", data)
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            error_code: 0,
            error_description: message.into(),
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::with_message("Created", data)
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            error_code: 0,
            error_description: message.into(),
            data: None,
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn meta(&self) -> PaginationMeta {
        PaginationMeta::new(self.page, self.limit, self.total)
    }

    /// Slice an already materialized, already sorted collection.
    pub fn from_vec(items: Vec<T>, page: i64, limit: i64) -> Self {
        let total = items.len() as i64;
        let offset = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
        let items = items
            .into_iter()
            .skip(offset)
            .take(limit.max(0) as usize)
            .collect();
        Self {
            items,
            page,
            limit,
            total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiListResponse<T: Serialize> {
    pub error_code: u16,
    pub error_description: String,
    pub list: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
}

impl<T: Serialize> ApiListResponse<T> {
    pub fn unpaged(list: Vec<T>) -> Self {
        Self {
            error_code: 0,
            error_description: "Success".to_string(),
            list,
            meta: None,
        }
    }
}

impl<T: Serialize> From<Page<T>> for ApiListResponse<T> {
    fn from(page: Page<T>) -> Self {
        let meta = page.meta();
        Self {
            error_code: 0,
            error_description: "Success".to_string(),
            list: page.items,
            meta: Some(meta),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiListResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// `?page=` query parameter, zero-indexed.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Result<i64, AppError> {
        match self.page {
            None => Ok(0),
            Some(p) if (0..=MAX_PAGE).contains(&p) => Ok(p),
            Some(_) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid page parameter"
            ))),
        }
    }
}
