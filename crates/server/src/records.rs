use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use dealdesk_core::domain::customer::{Customer, CustomerId};
use dealdesk_core::domain::deal::{Deal, DealFilter, DealId, DealStage};
use dealdesk_core::domain::user::{User, UserId};
use dealdesk_db::repositories::{CustomerFilter, UserFilter};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{not_found, reject, storage, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub department: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub industry: Option<String>,
    /// Substring of the customer name.
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DealQuery {
    pub sales_user_id: Option<String>,
    pub customer_id: Option<String>,
    pub deal_stage: Option<String>,
    pub service_type: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users", get(list_users))
        .route("/api/v1/users/{user_id}", get(get_user))
        .route("/api/v1/customers", get(list_customers))
        .route("/api/v1/customers/{customer_id}", get(get_customer))
        .route("/api/v1/deals", get(list_deals))
        .route("/api/v1/deals/{deal_id}", get(get_deal))
}

/// Empty query-string values (`?role=`) behave like absent ones.
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let filter =
        UserFilter { department: non_blank(query.department), role: non_blank(query.role) };
    state.users.list(&filter).await.map(Json).map_err(storage)
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<User>> {
    match state.users.find_by_id(&UserId(user_id.clone())).await.map_err(storage)? {
        Some(user) => Ok(Json(user)),
        None => Err(not_found("user", user_id)),
    }
}

async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<Json<Vec<Customer>>> {
    let filter = CustomerFilter {
        industry: non_blank(query.industry),
        keyword: non_blank(query.search),
    };
    state.customers.list(&filter).await.map(Json).map_err(storage)
}

async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Customer>> {
    match state.customers.find_by_id(&CustomerId(customer_id.clone())).await.map_err(storage)? {
        Some(customer) => Ok(Json(customer)),
        None => Err(not_found("customer", customer_id)),
    }
}

async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<DealQuery>,
) -> ApiResult<Json<Vec<Deal>>> {
    let deal_stage = non_blank(query.deal_stage)
        .map(|stage| stage.parse::<DealStage>())
        .transpose()
        .map_err(|error| reject(error.into()))?;

    let filter = DealFilter {
        sales_user_id: non_blank(query.sales_user_id).map(UserId),
        customer_id: non_blank(query.customer_id).map(CustomerId),
        deal_stage,
        service_type: non_blank(query.service_type),
    };
    state.deals.list(&filter).await.map(Json).map_err(storage)
}

async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> ApiResult<Json<Deal>> {
    match state.deals.find_by_id(&DealId(deal_id.clone())).await.map_err(storage)? {
        Some(deal) => Ok(Json(deal)),
        None => Err(not_found("deal", deal_id)),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::app::testing::{get_json, seeded_state};

    fn ids(body: &Value, field: &str) -> Vec<String> {
        body.as_array()
            .expect("array body")
            .iter()
            .map(|row| row[field].as_str().expect("id field").to_string())
            .collect()
    }

    #[tokio::test]
    async fn user_filters_combine() {
        let (status, body) =
            get_json(seeded_state().await, "/api/v1/users?department=%E5%96%B6%E6%A5%AD%E9%83%A8")
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body, "user_id"), vec!["1", "2"]);

        let uri = "/api/v1/users?department=%E5%96%B6%E6%A5%AD%E9%83%A8\
                   &role=%E3%83%9E%E3%83%8D%E3%83%BC%E3%82%B8%E3%83%A3%E3%83%BC";
        let (status, body) = get_json(seeded_state().await, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body, "user_id"), vec!["2"]);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (status, body) = get_json(seeded_state().await, "/api/v1/users/999").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "user `999` was not found");
    }

    #[tokio::test]
    async fn customer_search_matches_name_substring() {
        let (status, body) =
            get_json(seeded_state().await, "/api/v1/customers?search=KDDI").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body, "customer_id"), vec!["1"]);
    }

    #[tokio::test]
    async fn blank_filters_list_everything() {
        let (status, body) =
            get_json(seeded_state().await, "/api/v1/customers?industry=&search=").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body, "customer_id").len(), 3);
    }

    #[tokio::test]
    async fn deal_filters_combine_and_stage_accepts_wire_form() {
        let (status, body) = get_json(
            seeded_state().await,
            "/api/v1/deals?sales_user_id=1&deal_stage=negotiation",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body, "deal_id"), vec!["1"]);
        assert_eq!(body[0]["deal_stage"], "negotiation");
        assert_eq!(body[0]["deal_amount"], 50_000_000);
    }

    #[tokio::test]
    async fn unknown_deal_stage_is_bad_request() {
        let (status, body) =
            get_json(seeded_state().await, "/api/v1/deals?deal_stage=closed").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("closed")));
    }

    #[tokio::test]
    async fn deal_detail_and_missing_deal() {
        let state = seeded_state().await;

        let (status, body) = get_json(state.clone(), "/api/v1/deals/4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deal_stage"], "won");
        assert_eq!(body["last_contact_date"], "2026-01-30");

        let (status, _) = get_json(state, "/api/v1/deals/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
