// Facebook Graph API (page publishing).
//
// Videos publish as Reels through the two-phase `video_reels` flow: `start`
// yields a video id and upload URL, the bytes go up as one binary POST with
// `offset`/`file_size` headers, and `finish` sets the description and flips
// `video_state` to PUBLISHED. Photo sets upload as unpublished `/photos` by
// URL and are attached to one `/feed` post at finalize.

use crate::chunk;
use crate::config::OAuthApp;
use crate::instagram::exchange_token;
use crate::util::json_of;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use unipost_core::domain::{
    AssetKind, Destination, DestinationAuth, DestinationCredential, DispatchError, TokenGrant,
};
use unipost_core::port::{
    DestinationAdapter, PostMeta, RefreshError, StagedAsset, TokenRefresher, UploadSession,
};

const GRAPH: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookAdapter {
    client: Client,
}

impl FacebookAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stage_err(reason: impl ToString) -> DispatchError {
        DispatchError::StageFailed {
            destination: Destination::Facebook,
            reason: reason.to_string(),
        }
    }

    fn publish_err(reason: impl ToString) -> DispatchError {
        DispatchError::PublishFailed {
            destination: Destination::Facebook,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DestinationAdapter for FacebookAdapter {
    fn destination(&self) -> Destination {
        Destination::Facebook
    }

    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        _meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        // Photos need no session; the ids are collected during upload.
        if asset.kind == AssetKind::PhotoSet {
            if asset.source_refs.is_empty() {
                return Err(Self::stage_err("photo set has no source urls"));
            }
            return Ok(UploadSession::default());
        }

        let response = self
            .client
            .post(format!("{}/{}/video_reels", GRAPH, auth.account_id))
            .query(&[
                ("upload_phase", "start"),
                ("access_token", auth.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(Self::stage_err)?;
        let value = json_of(response).await.map_err(Self::stage_err)?;

        let video_id = value["video_id"]
            .as_str()
            .ok_or_else(|| Self::stage_err(format!("start phase returned no video_id: {}", value)))?;
        let upload_url = value["upload_url"]
            .as_str()
            .ok_or_else(|| Self::stage_err("start phase returned no upload_url"))?;
        debug!(video_id = %video_id, "reel session started");

        Ok(UploadSession {
            media_id: video_id.to_string(),
            upload_url: Some(upload_url.to_string()),
            ..UploadSession::default()
        })
    }

    async fn upload_bytes(
        &self,
        auth: &DestinationAuth,
        session: &mut UploadSession,
        asset: &StagedAsset,
    ) -> Result<(), DispatchError> {
        let upload_err = |reason: String| DispatchError::UploadFailed {
            destination: Destination::Facebook,
            reason,
        };

        if asset.kind == AssetKind::PhotoSet {
            // Unpublished photo uploads by URL; the feed post at finalize
            // attaches them.
            for url in &asset.source_refs {
                let response = self
                    .client
                    .post(format!("{}/{}/photos", GRAPH, auth.account_id))
                    .query(&[
                        ("url", url.as_str()),
                        ("published", "false"),
                        ("access_token", auth.access_token.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| upload_err(e.to_string()))?;
                let value = json_of(response).await.map_err(upload_err)?;
                let id = value["id"]
                    .as_str()
                    .ok_or_else(|| upload_err(format!("photo upload returned no id: {}", value)))?;
                session.part_tags.push(id.to_string());
            }
            return Ok(());
        }

        let upload_url = session
            .upload_url
            .as_deref()
            .ok_or_else(|| upload_err("session has no upload url".into()))?;
        let bytes = chunk::read_all(asset.primary_path())
            .await
            .map_err(|e| upload_err(format!("reading staged file: {}", e)))?;

        let response = self
            .client
            .post(upload_url)
            .header("Authorization", format!("OAuth {}", auth.access_token))
            .header("offset", "0")
            .header("file_size", bytes.len().to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let value = json_of(response).await.map_err(upload_err)?;
        if !value["success"].as_bool().unwrap_or(false) {
            return Err(upload_err(format!("binary upload rejected: {}", value)));
        }
        Ok(())
    }

    /// Facebook ingests fast enough that `finish` can follow the upload
    /// directly; there is no container status to poll.
    async fn await_readiness(
        &self,
        _auth: &DestinationAuth,
        _session: &UploadSession,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn finalize(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
        meta: &PostMeta,
    ) -> Result<String, DispatchError> {
        if !session.part_tags.is_empty() {
            // Photo post: one feed entry carrying every uploaded photo.
            let attached: Vec<serde_json::Value> = session
                .part_tags
                .iter()
                .map(|id| serde_json::json!({ "media_fbid": id }))
                .collect();
            let response = self
                .client
                .post(format!("{}/{}/feed", GRAPH, auth.account_id))
                .query(&[
                    ("message", meta.caption.as_str()),
                    (
                        "attached_media",
                        serde_json::to_string(&attached)
                            .map_err(Self::publish_err)?
                            .as_str(),
                    ),
                    ("access_token", auth.access_token.as_str()),
                ])
                .send()
                .await
                .map_err(Self::publish_err)?;
            let value = json_of(response).await.map_err(Self::publish_err)?;
            return value["id"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Self::publish_err(format!("feed post returned no id: {}", value)));
        }

        let response = self
            .client
            .post(format!("{}/{}/video_reels", GRAPH, auth.account_id))
            .query(&[
                ("upload_phase", "finish"),
                ("video_id", session.media_id.as_str()),
                ("description", meta.caption.as_str()),
                ("video_state", "PUBLISHED"),
                ("access_token", auth.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(Self::publish_err)?;
        let value = json_of(response).await.map_err(Self::publish_err)?;
        if !value["success"].as_bool().unwrap_or(false) {
            return Err(Self::publish_err(format!("finish phase rejected: {}", value)));
        }
        Ok(session.media_id.clone())
    }

    async fn resolve_permalink(
        &self,
        auth: &DestinationAuth,
        native_post_id: &str,
    ) -> Option<String> {
        let response = self
            .client
            .get(format!("{}/{}", GRAPH, native_post_id))
            .query(&[
                ("fields", "permalink_url"),
                ("access_token", auth.access_token.as_str()),
            ])
            .send()
            .await
            .ok()?;
        let value = json_of(response).await.ok()?;
        let permalink = value["permalink_url"].as_str()?;
        if permalink.starts_with("http") {
            Some(permalink.to_string())
        } else {
            Some(format!("https://www.facebook.com{}", permalink))
        }
    }
}

/// Same `fb_exchange_token` flow as Instagram, against the page token.
pub struct FacebookRefresher {
    client: Client,
    app: OAuthApp,
}

impl FacebookRefresher {
    pub fn new(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }
}

#[async_trait]
impl TokenRefresher for FacebookRefresher {
    fn destination(&self) -> Destination {
        Destination::Facebook
    }

    async fn refresh(
        &self,
        credential: &DestinationCredential,
    ) -> Result<TokenGrant, RefreshError> {
        exchange_token(&self.client, &self.app, &credential.access_token).await
    }
}
