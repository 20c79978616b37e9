//! API client for the expense server's GraphQL endpoint.
//!
//! This module provides the `ApiClient` struct for logging in, registering,
//! refreshing tokens and working with expenses and categories.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::TokenRefresher;
use crate::models::{
    CategoriesInput, Category, CreateExpenseInput, Expense, ExpenseReport, ExpensesInput,
    LoginRequest, LoginResponse, RegisterRequest, TokenPair, UpdateExpenseInput, User,
};

use super::{queries, ApiError};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) read queries.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// API client for the expense server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client for the given GraphQL endpoint
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            endpoint: self.endpoint.clone(),
            token: Some(token),
            initial_backoff: self.initial_backoff,
        }
    }

    /// Shorten the rate-limit backoff (tests)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send one GraphQL operation and pull `field` out of `data`. No retries.
    async fn execute<V, T>(&self, query: &str, field: &str, variables: V) -> Result<T, ApiError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint.as_str())
            .headers(self.auth_headers()?)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // GraphQL servers report validation failures as 400 with an errors array
            if status == StatusCode::BAD_REQUEST {
                if let Ok(parsed) = serde_json::from_str::<GraphQlResponse>(&body) {
                    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
                        return Err(Self::graphql_error(errors));
                    }
                }
            }
            return Err(ApiError::from_status(status, &body));
        }

        let parsed: GraphQlResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("not a GraphQL response: {}", e)))?;

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            return Err(Self::graphql_error(errors));
        }

        let value = parsed
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .filter(|v| !v.is_null())
            .ok_or_else(|| ApiError::InvalidResponse(format!("missing '{}' in response data", field)))?;

        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected '{}' payload: {}", field, e)))
    }

    fn graphql_error(errors: Vec<GraphQlError>) -> ApiError {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        ApiError::from_graphql(&messages)
    }

    /// Read queries are idempotent, so 429 responses are retried with backoff.
    async fn query<V, T>(&self, query: &str, field: &str, variables: V) -> Result<T, ApiError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match self.execute(query, field, &variables).await {
                Err(ApiError::RateLimited) => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(field = field, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                }
                other => return other,
            }
        }
    }

    // ===== Authentication =====

    /// Log in and return the issued credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        let input = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response: LoginResponse = self
            .execute(queries::LOGIN, "login", json!({ "input": input }))
            .await
            .context("Login request failed")?;

        let pair = response
            .into_token_pair()
            .ok_or_else(|| ApiError::Rejected("login".to_string()))?;
        debug!(email = email, "Login accepted");
        Ok(pair)
    }

    /// Create an account. The user still has to log in afterwards.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let user: User = self
            .execute(queries::REGISTER, "register", json!({ "input": request }))
            .await
            .context("Registration request failed")?;
        debug!(user_id = %user.id, "Account registered");
        Ok(user)
    }

    // ===== Expenses =====

    pub async fn expenses(&self, input: &ExpensesInput) -> Result<Vec<Expense>> {
        self.query(queries::EXPENSES, "expenses", json!({ "input": input }))
            .await
            .context("Failed to fetch expenses")
    }

    pub async fn expenses_report(&self, input: &ExpensesInput) -> Result<Vec<ExpenseReport>> {
        self.query(queries::EXPENSES_REPORT, "expensesReport", json!({ "input": input }))
            .await
            .context("Failed to fetch expense report")
    }

    pub async fn categories(&self, input: &CategoriesInput) -> Result<Vec<Category>> {
        self.query(queries::CATEGORIES, "categories", json!({ "input": input }))
            .await
            .context("Failed to fetch categories")
    }

    pub async fn create_expense(&self, input: &CreateExpenseInput) -> Result<Expense> {
        self.execute(queries::CREATE_EXPENSE, "createExpense", json!({ "input": input }))
            .await
            .context("Failed to create expense")
    }

    pub async fn update_expense(&self, input: &UpdateExpenseInput) -> Result<Expense> {
        let mut expense: Expense = self
            .execute(queries::UPDATE_EXPENSE, "updateExpense", json!({ "input": input }))
            .await
            .context("Failed to update expense")?;
        if expense.id.is_empty() {
            expense.id = input.id.clone();
        }
        Ok(expense)
    }

    pub async fn remove_expense(&self, id: &str) -> Result<Expense> {
        let mut expense: Expense = self
            .execute(queries::REMOVE_EXPENSE, "removeExpense", json!({ "id": id }))
            .await
            .context("Failed to remove expense")?;
        if expense.id.is_empty() {
            expense.id = id.to_string();
        }
        Ok(expense)
    }
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let response: LoginResponse = self
            .execute(
                queries::REFRESH_TOKEN,
                "refreshToken",
                json!({ "accessToken": refresh_token }),
            )
            .await?;

        response
            .into_token_pair()
            .ok_or_else(|| ApiError::Rejected("refresh token".to_string()))
    }
}
