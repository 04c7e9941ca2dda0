// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! JSON REST backend in the realtime-database dialect.
//!
//! Data lives under `{database_url}/users/{uid}/{collection}.json`; sign-in
//! goes through the identity toolkit password endpoint. There is no
//! streaming channel, so live updates poll the collection and forward the
//! document whenever it differs from the last one seen.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChangeSink, Identity, RecordKey, RemoteBackend, RemoteCollection, Subscription};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::utils::http_client;

pub struct RestRemote {
    client: Client,
    config: RemoteConfig,
}

#[derive(Deserialize)]
struct SignInResponse {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(rename = "idToken")]
    id_token: String,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured { message: String },
    Plain(String),
}

impl RestRemote {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let client = http_client(Duration::from_secs(config.timeout_secs.max(1)))?;
        Ok(Self { client, config })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs.max(1))
    }

    fn collection_url(&self, user: &Identity, collection: RemoteCollection) -> String {
        format!(
            "{}/users/{}/{}.json",
            self.config.database_url.trim_end_matches('/'),
            user.user_id,
            collection.as_str()
        )
    }

    fn record_url(&self, user: &Identity, collection: RemoteCollection, key: &str) -> String {
        format!(
            "{}/users/{}/{}/{}.json",
            self.config.database_url.trim_end_matches('/'),
            user.user_id,
            collection.as_str(),
            key
        )
    }
}

fn with_auth(req: RequestBuilder, user: &Identity) -> RequestBuilder {
    match &user.token {
        Some(token) => req.query(&[("auth", token)]),
        None => req,
    }
}

/// Maps non-success statuses onto [`RemoteError`].
async fn check(resp: Response) -> RemoteResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::AuthRequired);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RemoteError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Structured { message },
        })
        | Ok(ErrorBody {
            error: ErrorDetail::Plain(message),
        }) => message,
        Err(_) => body.trim().to_string(),
    }
}

async fn fetch(client: &Client, url: &str, user: &Identity) -> RemoteResult<Value> {
    let resp = with_auth(client.get(url), user).send().await?;
    let doc = check(resp).await?.json::<Value>().await?;
    Ok(doc)
}

#[async_trait]
impl RemoteBackend for RestRemote {
    async fn authenticate(&self) -> RemoteResult<Identity> {
        if self.config.api_key.is_empty() || self.config.email.is_empty() {
            return Err(RemoteError::AuthFailed(
                "api_key and email must be configured".into(),
            ));
        }
        let url = format!(
            "{}/v1/accounts:signInWithPassword",
            self.config.auth_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .query(&[("key", &self.config.api_key)])
            .json(&json!({
                "email": self.config.email,
                "password": self.config.password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::AuthFailed(error_message(&body)));
        }
        let signed_in: SignInResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        debug!("signed in as {}", signed_in.local_id);
        Ok(Identity {
            user_id: signed_in.local_id,
            token: Some(signed_in.id_token),
        })
    }

    async fn deauthenticate(&self) -> RemoteResult<()> {
        // ID tokens are stateless; forgetting the identity is enough.
        Ok(())
    }

    async fn push(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        record: Value,
    ) -> RemoteResult<RecordKey> {
        let url = self.collection_url(user, collection);
        let resp = with_auth(self.client.post(&url), user)
            .json(&record)
            .send()
            .await?;
        let pushed: PushResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        Ok(pushed.name)
    }

    async fn set(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        document: Value,
    ) -> RemoteResult<()> {
        let url = self.collection_url(user, collection);
        let resp = with_auth(self.client.put(&url), user)
            .json(&document)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn pull(&self, user: &Identity, collection: RemoteCollection) -> RemoteResult<Value> {
        fetch(&self.client, &self.collection_url(user, collection), user).await
    }

    async fn delete_record(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        key: &str,
    ) -> RemoteResult<()> {
        let url = self.record_url(user, collection, key);
        let resp = with_auth(self.client.delete(&url), user).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        sink: ChangeSink,
    ) -> RemoteResult<Subscription> {
        let client = self.client.clone();
        let url = self.collection_url(user, collection);
        let user = user.clone();
        let period = self.poll_interval();
        let mut last = fetch(&client, &url, &user).await?;

        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sink.is_closed() {
                    break;
                }
                match fetch(&client, &url, &user).await {
                    Ok(doc) if doc != last => {
                        last = doc.clone();
                        if sink.send(doc).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!("poll of {url} failed: {e}"),
                }
            }
        });
        Ok(Subscription::new(move || poller.abort()))
    }
}
