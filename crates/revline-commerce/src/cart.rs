//! Cart creation against the headless commerce API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result, checkout_url::rewrite_checkout_url};

const CART_CREATE_MUTATION: &str = r#"
mutation cartCreate($input: CartInput!) {
  cartCreate(input: $input) {
    cart { id checkoutUrl }
    userErrors { field message }
  }
}
"#;

// ─── Input ───────────────────────────────────────────────────────────────────

/// A custom attribute attached to a cart line (e.g. the fitment vehicle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartAttribute {
  pub key:   String,
  pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub merchandise_id: String,
  pub quantity:       u32,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub attributes:     Vec<CartAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartInput {
  pub lines:          Vec<CartLine>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub discount_codes: Vec<String>,
}

// ─── Response wire shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
  data: Option<CartCreateData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCreateData {
  cart_create: CartCreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCreatePayload {
  cart:        Option<CartHandle>,
  #[serde(default)]
  user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartHandle {
  id:           String,
  checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
  message: String,
}

/// The result of a successful cart creation, with the checkout URL already
/// rewritten to the canonical host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCart {
  pub cart_id:      String,
  pub checkout_url: Url,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Connection settings for the commerce API.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
  /// GraphQL endpoint, e.g. `https://shop.myshopify.com/api/2024-07/graphql`.
  pub endpoint:      String,
  pub access_token:  String,
  /// Canonical checkout subdomain, e.g. `checkout.example.com`.
  pub checkout_host: String,
}

/// Async client for the commerce GraphQL API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct CommerceClient {
  client:        Client,
  config:        CommerceConfig,
  checkout_base: Url,
}

impl CommerceClient {
  pub fn new(config: CommerceConfig) -> Result<Self> {
    let checkout_base = Url::parse(&format!("https://{}/", config.checkout_host))
      .map_err(|_| Error::InvalidHost(config.checkout_host.clone()))?;
    let client = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self { client, config, checkout_base })
  }

  /// Create a cart and return its id plus the canonical checkout URL.
  ///
  /// Validation failures are returned before any network call. User-facing
  /// errors from the API surface as [`Error::Checkout`] carrying the first
  /// message.
  pub async fn create_cart(&self, input: &CartInput) -> Result<CreatedCart> {
    validate(input)?;

    let resp = self
      .client
      .post(&self.config.endpoint)
      .header("X-Shopify-Storefront-Access-Token", &self.config.access_token)
      .json(&serde_json::json!({
        "query": CART_CREATE_MUTATION,
        "variables": { "input": input },
      }))
      .send()
      .await?
      .error_for_status()?;

    let body: GraphQlResponse = resp.json().await?;
    into_created(body, &self.checkout_base)
  }
}

fn validate(input: &CartInput) -> Result<()> {
  if input.lines.is_empty() {
    return Err(Error::Validation("cart has no line items".into()));
  }
  if let Some(line) = input.lines.iter().find(|l| l.quantity == 0) {
    return Err(Error::Validation(format!(
      "line {} has zero quantity",
      line.merchandise_id
    )));
  }
  Ok(())
}

fn into_created(body: GraphQlResponse, checkout_base: &Url) -> Result<CreatedCart> {
  let payload = body.data.map(|d| d.cart_create).ok_or(Error::MissingCart)?;

  if let Some(first) = payload.user_errors.first() {
    return Err(Error::Checkout(first.message.clone()));
  }
  let cart = payload.cart.ok_or(Error::MissingCart)?;

  Ok(CreatedCart {
    checkout_url: rewrite_checkout_url(&cart.checkout_url, checkout_base),
    cart_id:      cart.id,
  })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
