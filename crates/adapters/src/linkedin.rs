// LinkedIn REST API (versioned, Rest.li protocol).
//
// `videos?action=initializeUpload` dictates the part layout: each part gets
// its own byte range and upload URL, and the `PUT`s (no auth header on the
// upload links) return ETags that `finalizeUpload` needs. The share itself
// is created via `rest/posts`; the new post URN comes back in the
// `x-restli-id` header.

use crate::chunk;
use crate::config::OAuthApp;
use crate::util::{self, json_of, Readiness, CHUNK_RETRY_LIMIT};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;
use unipost_core::domain::{
    Destination, DestinationAuth, DestinationCredential, DispatchError, TokenGrant,
};
use unipost_core::port::destination::require_video;
use unipost_core::port::{
    ByteRange, DestinationAdapter, PostMeta, RefreshError, StagedAsset, TokenRefresher,
    UploadSession,
};

const API: &str = "https://api.linkedin.com";
const OAUTH_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const LINKEDIN_VERSION: &str = "202511";

pub struct LinkedinAdapter {
    client: Client,
}

impl LinkedinAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stage_err(reason: impl ToString) -> DispatchError {
        DispatchError::StageFailed {
            destination: Destination::Linkedin,
            reason: reason.to_string(),
        }
    }

    fn rest(&self, method: reqwest::Method, url: String, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .header("LinkedIn-Version", LINKEDIN_VERSION)
    }
}

#[async_trait]
impl DestinationAdapter for LinkedinAdapter {
    fn destination(&self) -> Destination {
        Destination::Linkedin
    }

    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        _meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        require_video(Destination::Linkedin, asset)?;

        let body = json!({
            "initializeUploadRequest": {
                "owner": format!("urn:li:person:{}", auth.account_id),
                "fileSizeBytes": asset.size_bytes,
                "uploadThumbnail": false,
            }
        });
        let response = self
            .rest(
                reqwest::Method::POST,
                format!("{}/rest/videos?action=initializeUpload", API),
                &auth.access_token,
            )
            .json(&body)
            .send()
            .await
            .map_err(Self::stage_err)?;
        let value = json_of(response).await.map_err(Self::stage_err)?;

        let session_value = value
            .get("value")
            .ok_or_else(|| Self::stage_err(format!("initializeUpload returned no value: {}", value)))?;
        let video_urn = session_value["video"]
            .as_str()
            .ok_or_else(|| Self::stage_err("no video urn in upload session"))?;
        let upload_token = session_value["uploadToken"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let mut byte_ranges = Vec::new();
        for instruction in session_value["uploadInstructions"]
            .as_array()
            .ok_or_else(|| Self::stage_err("no upload instructions"))?
        {
            byte_ranges.push(ByteRange {
                first: instruction["firstByte"].as_u64().unwrap_or(0),
                last: instruction["lastByte"].as_u64().unwrap_or(0),
                upload_url: instruction["uploadUrl"]
                    .as_str()
                    .ok_or_else(|| Self::stage_err("upload instruction missing url"))?
                    .to_string(),
            });
        }
        debug!(video_urn = %video_urn, parts = byte_ranges.len(), "upload session initialized");

        Ok(UploadSession {
            media_id: video_urn.to_string(),
            upload_token: Some(upload_token),
            byte_ranges,
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
            destination: Destination::Linkedin,
            reason,
        };
        let path = asset.primary_path();
        let ranges = session.byte_ranges.clone();

        for range in &ranges {
            let bytes = chunk::read_range(path, range.first, range.last)
                .await
                .map_err(|e| upload_err(format!("reading part {}-{}: {}", range.first, range.last, e)))?;

            let mut attempt = 0;
            let etag = loop {
                attempt += 1;
                // The pre-signed part URLs carry their own auth.
                let result = self
                    .client
                    .put(&range.upload_url)
                    .body(bytes.clone())
                    .send()
                    .await;
                match result {
                    Ok(r) if r.status().is_success() => {
                        match r.headers().get("ETag").and_then(|v| v.to_str().ok()) {
                            Some(etag) => break etag.to_string(),
                            None => {
                                return Err(upload_err(format!(
                                    "part {}-{} returned no ETag",
                                    range.first, range.last
                                )))
                            }
                        }
                    }
                    Ok(r) if attempt >= CHUNK_RETRY_LIMIT => {
                        return Err(upload_err(format!(
                            "part {}-{} rejected with status {}",
                            range.first,
                            range.last,
                            r.status()
                        )));
                    }
                    Err(e) if attempt >= CHUNK_RETRY_LIMIT => {
                        return Err(upload_err(format!(
                            "part {}-{}: {}",
                            range.first, range.last, e
                        )));
                    }
                    _ => continue,
                }
            };
            session.part_tags.push(etag);
        }

        let finalize = json!({
            "finalizeUploadRequest": {
                "video": session.media_id,
                "uploadToken": session.upload_token.as_deref().unwrap_or(""),
                "uploadedPartIds": session.part_tags,
            }
        });
        let response = self
            .rest(
                reqwest::Method::POST,
                format!("{}/rest/videos?action=finalizeUpload", API),
                &auth.access_token,
            )
            .json(&finalize)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(upload_err(format!(
                "finalizeUpload rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// The original flow slept a flat five seconds here; polling the video
    /// status is both faster and safer for large files.
    async fn await_readiness(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
    ) -> Result<(), DispatchError> {
        let client = self.client.clone();
        let token = auth.access_token.clone();
        // URN goes into the path percent-encoded per Rest.li convention.
        let encoded = session.media_id.replace(':', "%3A");

        util::poll_readiness(Destination::Linkedin, move || {
            let client = client.clone();
            let token = token.clone();
            let encoded = encoded.clone();
            async move {
                let response = client
                    .get(format!("{}/rest/videos/{}", API, encoded))
                    .bearer_auth(&token)
                    .header("X-Restli-Protocol-Version", "2.0.0")
                    .header("LinkedIn-Version", LINKEDIN_VERSION)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                let value = json_of(response).await?;
                match value["status"].as_str().unwrap_or("") {
                    "AVAILABLE" => Ok(Readiness::Ready),
                    "PROCESSING_FAILED" => {
                        Ok(Readiness::Failed("video processing failed".into()))
                    }
                    _ => Ok(Readiness::Pending),
                }
            }
        })
        .await
    }

    async fn finalize(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
        meta: &PostMeta,
    ) -> Result<String, DispatchError> {
        let publish_err = |reason: String| DispatchError::PublishFailed {
            destination: Destination::Linkedin,
            reason,
        };

        let body = json!({
            "author": format!("urn:li:person:{}", auth.account_id),
            "commentary": meta.caption,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": [],
            },
            "content": {
                "media": { "id": session.media_id }
            },
            "lifecycleState": "PUBLISHED",
        });
        let response = self
            .rest(
                reqwest::Method::POST,
                format!("{}/rest/posts", API),
                &auth.access_token,
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(publish_err(format!(
                "share creation failed with {}: {}",
                status,
                util::truncate(&text, 300)
            )));
        }
        response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| publish_err("share created but x-restli-id header missing".into()))
    }

    async fn resolve_permalink(
        &self,
        _auth: &DestinationAuth,
        native_post_id: &str,
    ) -> Option<String> {
        Some(format!(
            "https://www.linkedin.com/feed/update/{}",
            native_post_id
        ))
    }
}

/// 3-legged refresh via the LinkedIn token endpoint; requires the
/// `offline_access` scope at link time.
pub struct LinkedinRefresher {
    client: Client,
    app: OAuthApp,
}

impl LinkedinRefresher {
    pub fn new(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }
}

#[async_trait]
impl TokenRefresher for LinkedinRefresher {
    fn destination(&self) -> Destination {
        Destination::Linkedin
    }

    async fn refresh(
        &self,
        credential: &DestinationCredential,
    ) -> Result<TokenGrant, RefreshError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(RefreshError::RefreshTokenMissing)?;

        let response = self
            .client
            .post(OAUTH_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        let value = json_of(response).await.map_err(RefreshError::Rejected)?;

        let access_token = value["access_token"]
            .as_str()
            .ok_or_else(|| RefreshError::Rejected(format!("no access_token in response: {}", value)))?;
        Ok(TokenGrant {
            access_token: access_token.to_string(),
            refresh_token: value["refresh_token"].as_str().map(str::to_string),
            expires_in_ms: value["expires_in"].as_i64().unwrap_or(5_184_000) * 1000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use unipost_core::domain::AssetKind;

    #[tokio::test]
    async fn photo_sets_are_rejected_at_stage() {
        let adapter = LinkedinAdapter::new(Client::new());
        let asset = StagedAsset {
            kind: AssetKind::PhotoSet,
            paths: vec![PathBuf::from("/tmp/a.jpg")],
            source_refs: vec!["a.jpg".into()],
            size_bytes: 10,
            staging_dir: PathBuf::from("/tmp"),
        };
        let auth = DestinationAuth {
            access_token: "t".into(),
            account_id: "a".into(),
        };
        let meta = PostMeta {
            caption: "c".into(),
            description: String::new(),
        };
        assert!(matches!(
            adapter.stage(&auth, &asset, &meta).await.unwrap_err(),
            DispatchError::Unsupported { .. }
        ));
    }

    #[tokio::test]
    async fn permalink_is_built_from_the_post_urn() {
        let adapter = LinkedinAdapter::new(Client::new());
        let auth = DestinationAuth {
            access_token: "t".into(),
            account_id: "a".into(),
        };
        assert_eq!(
            adapter
                .resolve_permalink(&auth, "urn:li:share:123")
                .await
                .as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:123")
        );
    }
}
