use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::error::{ApiError, GENERIC_SERVER_MESSAGE};
use crate::api::types::{
  ListEnvelope, LogEntry, Order, OrderFilter, OrderStatus, Product, ProductForm, QuantityPatch,
  StockAdjustment, Warehouse,
};
use crate::session::{Role, Session, SessionContext};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Default API location of a locally running backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/";

/// Error payload the server attaches to failed requests.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  errors: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
  token: String,
  #[serde(default)]
  role: Option<Role>,
  #[serde(default)]
  username: Option<String>,
}

/// Builder for [`InventoryClient`].
pub struct InventoryClientBuilder {
  base_url: String,
  session: Option<SessionContext>,
  timeout: Option<Duration>,
}

impl InventoryClientBuilder {
  /// Attach the session whose token is sent with every request.
  pub fn session(mut self, session: SessionContext) -> Self {
    self.session = Some(session);
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> Result<InventoryClient> {
    let mut base_url = self.base_url.trim().to_string();
    if !base_url.ends_with('/') {
      base_url.push('/');
    }
    let base =
      Url::parse(&base_url).map_err(|e| eyre!("Invalid API url {}: {}", self.base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid API url {}: not a base url", self.base_url));
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let mut http = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = self.timeout {
      http = http.timeout(timeout);
    }
    let http = http
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(InventoryClient {
      http,
      base,
      session: self.session.unwrap_or_else(|| SessionContext::new(None)),
    })
  }
}

/// Client for the inventory REST API.
#[derive(Clone)]
pub struct InventoryClient {
  http: reqwest::Client,
  base: Url,
  session: SessionContext,
}

impl InventoryClient {
  pub fn builder(base_url: impl Into<String>) -> InventoryClientBuilder {
    InventoryClientBuilder {
      base_url: base_url.into(),
      session: None,
      timeout: None,
    }
  }

  pub fn session(&self) -> &SessionContext {
    &self.session
  }

  /// Build an endpoint URL from escaped path segments.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    // Checked in the builder
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  /// Send an authenticated request and map failures onto [`ApiError`].
  async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
    let request = match self.session.token() {
      Some(token) => request.bearer_auth(token),
      None => request,
    };
    let response = request
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;

    if response.status() == StatusCode::UNAUTHORIZED {
      self.session.expire();
      return Err(ApiError::Unauthorized);
    }

    check_status(response).await
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
    debug!(%url, "GET");
    let response = self.send(self.http.get(url)).await?;
    decode(response).await
  }

  async fn get_list<T: DeserializeOwned>(&self, url: Url) -> ApiResult<Vec<T>> {
    let envelope: ListEnvelope<T> = self.get_json(url).await?;
    Ok(envelope.into_items())
  }

  /// Exchange credentials for a session and install it.
  ///
  /// A 401 here means bad credentials, not an expired session.
  pub async fn login(&self, username: &str, password: &str) -> ApiResult<Session> {
    let url = self.endpoint(&["auth", "login"]);
    debug!(%url, username, "POST login");
    let response = self
      .http
      .post(url)
      .json(&json!({ "username": username.trim(), "password": password.trim() }))
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;

    if response.status() == StatusCode::UNAUTHORIZED {
      return Err(ApiError::Server {
        status: 401,
        message: "Invalid credentials".to_string(),
      });
    }

    let login: LoginResponse = decode(check_status(response).await?).await?;
    let session = Session {
      token: login.token,
      role: login.role,
      username: login.username.or_else(|| Some(username.trim().to_string())),
    };
    self.session.establish(session.clone());
    Ok(session)
  }

  pub async fn register_employee(&self, username: &str, password: &str, role: Role) -> ApiResult<()> {
    let url = self.endpoint(&["auth", "register"]);
    debug!(%url, username, "POST register");
    self
      .send(
        self
          .http
          .post(url)
          .json(&json!({ "username": username, "password": password, "role": role })),
      )
      .await?;
    Ok(())
  }

  /// List warehouses whose name matches `search` (all when empty).
  pub async fn list_warehouses(&self, search: &str) -> ApiResult<Vec<Warehouse>> {
    let mut url = self.endpoint(&["api", "warehouses"]);
    url.query_pairs_mut().append_pair("search", search);
    self.get_list(url).await
  }

  pub async fn get_warehouse(&self, warehouse_id: &str) -> ApiResult<Warehouse> {
    self
      .get_json(self.endpoint(&["api", "warehouses", warehouse_id]))
      .await
  }

  /// List products stored in a warehouse, narrowed by `search`.
  pub async fn list_products(&self, warehouse_id: &str, search: &str) -> ApiResult<Vec<Product>> {
    let mut url = self.endpoint(&["api", "products", warehouse_id]);
    url.query_pairs_mut().append_pair("search", search);
    self.get_list(url).await
  }

  pub async fn create_product(&self, warehouse_id: &str, form: &ProductForm) -> ApiResult<Product> {
    let url = self.endpoint(&["api", "products", warehouse_id]);
    debug!(%url, name = %form.name, "POST product");
    let body = product_multipart(form).await?;
    decode(self.send(self.http.post(url).multipart(body)).await?).await
  }

  pub async fn update_product(
    &self,
    warehouse_id: &str,
    product_id: &str,
    form: &ProductForm,
  ) -> ApiResult<Product> {
    let url = self.endpoint(&["api", "products", warehouse_id, product_id]);
    debug!(%url, "PUT product");
    let body = product_multipart(form).await?;
    decode(self.send(self.http.put(url).multipart(body)).await?).await
  }

  pub async fn delete_product(&self, warehouse_id: &str, product_id: &str) -> ApiResult<()> {
    let url = self.endpoint(&["api", "products", warehouse_id, product_id]);
    debug!(%url, "DELETE product");
    self.send(self.http.delete(url)).await?;
    Ok(())
  }

  /// Apply a stock adjustment.
  ///
  /// Returns the updated product when the server sends one back.
  pub async fn adjust_quantity(
    &self,
    warehouse_id: &str,
    product_id: &str,
    adjustment: StockAdjustment,
  ) -> ApiResult<Option<Product>> {
    let url = self.endpoint(&["api", "products", warehouse_id, product_id, "quantity"]);
    debug!(%url, action = ?adjustment.action(), value = adjustment.value(), "PATCH quantity");
    let body = QuantityPatch {
      action: adjustment.action(),
      value: adjustment.value(),
      warehouse_id,
    };
    let response = self.send(self.http.patch(url).json(&body)).await?;
    decode_optional(response).await
  }

  pub async fn list_orders(&self, filter: &OrderFilter) -> ApiResult<Vec<Order>> {
    let mut url = self.endpoint(&["api", "orders"]);
    {
      let mut query = url.query_pairs_mut();
      if let Some(warehouse_id) = &filter.warehouse_id {
        query.append_pair("warehouseId", warehouse_id);
      }
      if let Some(status) = filter.status {
        query.append_pair("status", status.wire_name());
      }
    }
    self.get_list(url).await
  }

  pub async fn update_order_status(
    &self,
    warehouse_id: &str,
    order_id: &str,
    status: OrderStatus,
  ) -> ApiResult<Order> {
    let url = self.endpoint(&["api", "orders", warehouse_id, order_id, "status"]);
    debug!(%url, status = status.wire_name(), "PATCH order status");
    let response = self
      .send(self.http.patch(url).json(&json!({ "newStatus": status })))
      .await?;
    decode(response).await
  }

  pub async fn delete_order(&self, warehouse_id: &str, order_id: &str) -> ApiResult<()> {
    let url = self.endpoint(&["api", "orders", warehouse_id, order_id]);
    debug!(%url, "DELETE order");
    self.send(self.http.delete(url)).await?;
    Ok(())
  }

  pub async fn list_logs(&self, warehouse_id: &str) -> ApiResult<Vec<LogEntry>> {
    self
      .get_list(self.endpoint(&["api", "logs", warehouse_id]))
      .await
  }

  /// Download the spreadsheet export of all products.
  pub async fn export_report(&self) -> ApiResult<Vec<u8>> {
    let url = self.endpoint(&["api", "reports", "products", "export"]);
    debug!(%url, "GET report");
    let response = self.send(self.http.get(url)).await?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
  }
}

/// Map non-success statuses (other than 401) onto [`ApiError`].
async fn check_status(response: Response) -> ApiResult<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body: ErrorBody = response
    .bytes()
    .await
    .ok()
    .and_then(|b| serde_json::from_slice(&b).ok())
    .unwrap_or_default();

  Err(error_from_body(status, body))
}

fn error_from_body(status: StatusCode, body: ErrorBody) -> ApiError {
  let message = body
    .message
    .filter(|m| !m.trim().is_empty())
    .unwrap_or_else(|| GENERIC_SERVER_MESSAGE.to_string());

  match body.errors {
    Some(errors) if status == StatusCode::BAD_REQUEST => ApiError::Validation {
      message,
      fields: errors
        .into_iter()
        .map(|(field, value)| (field, field_messages(value)))
        .collect(),
    },
    _ => ApiError::Server {
      status: status.as_u16(),
      message,
    },
  }
}

/// Field errors arrive as a list of messages or a single message.
fn field_messages(value: Value) -> Vec<String> {
  match value {
    Value::Array(items) => items
      .into_iter()
      .filter_map(|v| v.as_str().map(String::from))
      .collect(),
    Value::String(s) => vec![s],
    _ => Vec::new(),
  }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
  let bytes = response.bytes().await?;
  Ok(serde_json::from_slice(&bytes)?)
}

/// Decode a body the server may leave empty.
async fn decode_optional<T: DeserializeOwned>(response: Response) -> ApiResult<Option<T>> {
  let bytes = response.bytes().await?;
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(None);
  }
  match serde_json::from_slice(&bytes) {
    Ok(value) => Ok(Some(value)),
    Err(e) => {
      debug!(error = %e, "response body is not the updated record");
      Ok(None)
    }
  }
}

async fn product_multipart(form: &ProductForm) -> ApiResult<Form> {
  let mut body = Form::new()
    .text("name", form.name.clone())
    .text("quantity", form.quantity.to_string())
    .text("criticalValue", form.critical_value.to_string())
    .text("category", form.category.clone());

  if let Some(path) = &form.photo {
    let bytes = tokio::fs::read(path)
      .await
      .map_err(|e| ApiError::Network(format!("failed to read {}: {}", path.display(), e)))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "photo".to_string());
    body = body.part("photo", Part::bytes(bytes).file_name(file_name));
  }

  Ok(body)
}
