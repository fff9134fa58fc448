//! [`RestRemoteStore`] — the REST implementation of [`RemoteStore`].

use std::time::Duration;

use reqwest::Client;
use uuid::Uuid;

use revline_core::{
  identity::UserId,
  record::{Collection, RemoteRecord},
  store::RemoteStore,
};

use crate::{Error, Result};

/// Connection settings for the remote persistence service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
  pub base_url: String,
  pub api_key:  String,
}

/// Async HTTP client for the row-oriented persistence service.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based. Requests
/// are bounded by a 10 s client timeout so a wedged backend surfaces as an
/// error instead of hanging the sync flow.
#[derive(Clone)]
pub struct RestRemoteStore {
  client: Client,
  config: RemoteConfig,
}

impl RestRemoteStore {
  pub fn new(config: RemoteConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, collection: Collection) -> String {
    format!(
      "{}/{}",
      self.config.base_url.trim_end_matches('/'),
      collection.table()
    )
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req
      .header("apikey", &self.config.api_key)
      .bearer_auth(&self.config.api_key)
  }

  async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(Error::Api { status: status.as_u16(), message })
  }
}

impl RemoteStore for RestRemoteStore {
  type Error = Error;

  /// `GET /{table}?user_id=eq.<uuid>`
  async fn select_by_user(
    &self,
    collection: Collection,
    user_id: UserId,
  ) -> Result<Vec<RemoteRecord>> {
    let resp = self
      .auth(self.client.get(self.url(collection)))
      .query(&[("user_id", format!("eq.{user_id}"))])
      .send()
      .await?;

    Ok(Self::check(resp).await?.json().await?)
  }

  /// `POST /{table}` with merge-duplicates resolution — insert if absent,
  /// replace if present, keyed by primary id.
  async fn upsert(&self, collection: Collection, row: RemoteRecord) -> Result<()> {
    let resp = self
      .auth(self.client.post(self.url(collection)))
      .header("Prefer", "resolution=merge-duplicates")
      .json(&row)
      .send()
      .await?;

    Self::check(resp).await?;
    Ok(())
  }

  /// `DELETE /{table}?id=eq.<uuid>`
  async fn delete(&self, collection: Collection, id: Uuid) -> Result<()> {
    let resp = self
      .auth(self.client.delete(self.url(collection)))
      .query(&[("id", format!("eq.{id}"))])
      .send()
      .await?;

    Self::check(resp).await?;
    Ok(())
  }
}
