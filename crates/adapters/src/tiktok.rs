// TikTok Content Posting API.
//
// Wire shape: `POST /v2/post/publish/video/init/` (title, privacy, chunking
// plan) hands back a publish id plus one upload URL; the file goes up as
// 10 MiB `PUT`s with `Content-Range`; `/v2/post/publish/status/fetch/`
// reports ingest progress. Publishing happens server-side once ingest
// completes, so `finalize` only echoes the publish id, and TikTok exposes no
// permalink for API uploads.

use crate::chunk::{self, TIKTOK_CHUNK_SIZE};
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
    DestinationAdapter, PostMeta, RefreshError, StagedAsset, TokenRefresher, UploadSession,
};

const OPEN_API: &str = "https://open.tiktokapis.com";
const TITLE_LIMIT: usize = 50;

pub struct TiktokAdapter {
    client: Client,
}

impl TiktokAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stage_err(reason: impl ToString) -> DispatchError {
        DispatchError::StageFailed {
            destination: Destination::Tiktok,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DestinationAdapter for TiktokAdapter {
    fn destination(&self) -> Destination {
        Destination::Tiktok
    }

    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        require_video(Destination::Tiktok, asset)?;
        let chunks = chunk::plan_chunks(asset.size_bytes, TIKTOK_CHUNK_SIZE);

        let title = util::truncate(&meta.caption, TITLE_LIMIT);
        let body = json!({
            "post_info": {
                "title": title,
                "privacy_level": "PUBLIC_TO_ANYONE",
                "video_cover_timestamp_ms": 1000,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": asset.size_bytes,
                "chunk_size": TIKTOK_CHUNK_SIZE,
                "total_chunk_count": chunks.len(),
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/post/publish/video/init/", OPEN_API))
            .bearer_auth(&auth.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::stage_err)?;
        let value = json_of(response).await.map_err(Self::stage_err)?;

        let data = &value["data"];
        let publish_id = data["publish_id"]
            .as_str()
            .ok_or_else(|| Self::stage_err(format!("init response missing publish_id: {}", value)))?;
        let upload_url = data["upload_url"]
            .as_str()
            .ok_or_else(|| Self::stage_err("init response missing upload_url"))?;

        Ok(UploadSession {
            media_id: publish_id.to_string(),
            upload_url: Some(upload_url.to_string()),
            ..UploadSession::default()
        })
    }

    async fn upload_bytes(
        &self,
        _auth: &DestinationAuth,
        session: &mut UploadSession,
        asset: &StagedAsset,
    ) -> Result<(), DispatchError> {
        let upload_err = |reason: String| DispatchError::UploadFailed {
            destination: Destination::Tiktok,
            reason,
        };
        let upload_url = session
            .upload_url
            .as_deref()
            .ok_or_else(|| upload_err("session has no upload url".into()))?;
        let total = asset.size_bytes;
        let path = asset.primary_path();

        for (index, (first, last)) in
            chunk::plan_chunks(total, TIKTOK_CHUNK_SIZE).into_iter().enumerate()
        {
            let bytes = chunk::read_range(path, first, last)
                .await
                .map_err(|e| upload_err(format!("reading chunk {}: {}", index, e)))?;

            let mut attempt = 0;
            loop {
                attempt += 1;
                let result = self
                    .client
                    .put(upload_url)
                    .header("Content-Type", "video/mp4")
                    .header("Content-Range", chunk::content_range(first, last, total))
                    .body(bytes.clone())
                    .send()
                    .await;

                match result {
                    Ok(r) if r.status().as_u16() == 200 || r.status().as_u16() == 206 => {
                        debug!(publish_id = %session.media_id, chunk = index, "chunk accepted");
                        break;
                    }
                    Ok(r) if attempt >= CHUNK_RETRY_LIMIT => {
                        return Err(upload_err(format!(
                            "chunk {} rejected with status {}",
                            index,
                            r.status()
                        )));
                    }
                    Err(e) if attempt >= CHUNK_RETRY_LIMIT => {
                        return Err(upload_err(format!("chunk {}: {}", index, e)));
                    }
                    _ => continue,
                }
            }
        }
        Ok(())
    }

    async fn await_readiness(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
    ) -> Result<(), DispatchError> {
        let client = self.client.clone();
        let token = auth.access_token.clone();
        let publish_id = session.media_id.clone();

        util::poll_readiness(Destination::Tiktok, move || {
            let client = client.clone();
            let token = token.clone();
            let publish_id = publish_id.clone();
            async move {
                let response = client
                    .post(format!("{}/v2/post/publish/status/fetch/", OPEN_API))
                    .bearer_auth(&token)
                    .json(&json!({ "publish_id": publish_id }))
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                let value = json_of(response).await?;
                match value["data"]["status"].as_str().unwrap_or("") {
                    "PUBLISH_COMPLETE" | "SEND_TO_USER_INBOX" => Ok(Readiness::Ready),
                    "FAILED" => Ok(Readiness::Failed(format!(
                        "publish failed: {}",
                        value["data"]["fail_reason"].as_str().unwrap_or("unknown")
                    ))),
                    _ => Ok(Readiness::Pending),
                }
            }
        })
        .await
    }

    /// TikTok flips visibility itself once ingest completes; the publish id
    /// is the native id.
    async fn finalize(
        &self,
        _auth: &DestinationAuth,
        session: &UploadSession,
        _meta: &PostMeta,
    ) -> Result<String, DispatchError> {
        Ok(session.media_id.clone())
    }

    async fn resolve_permalink(
        &self,
        _auth: &DestinationAuth,
        _native_post_id: &str,
    ) -> Option<String> {
        None
    }
}

/// `refresh_token` grant against the TikTok token endpoint. TikTok rotates
/// the refresh token on every exchange.
pub struct TiktokRefresher {
    client: Client,
    app: OAuthApp,
}

impl TiktokRefresher {
    pub fn new(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }
}

#[async_trait]
impl TokenRefresher for TiktokRefresher {
    fn destination(&self) -> Destination {
        Destination::Tiktok
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
            .post(format!("{}/v2/oauth/token/", OPEN_API))
            .form(&[
                ("client_key", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
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
            expires_in_ms: value["expires_in"].as_i64().unwrap_or(24 * 60 * 60) * 1000,
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
        let adapter = TiktokAdapter::new(Client::new());
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
        let err = adapter.stage(&auth, &asset, &meta).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn finalize_echoes_the_publish_id() {
        let adapter = TiktokAdapter::new(Client::new());
        let session = UploadSession {
            media_id: "pub-123".into(),
            ..UploadSession::default()
        };
        let auth = DestinationAuth {
            access_token: "t".into(),
            account_id: "a".into(),
        };
        let meta = PostMeta {
            caption: "c".into(),
            description: String::new(),
        };
        assert_eq!(adapter.finalize(&auth, &session, &meta).await.unwrap(), "pub-123");
        assert_eq!(adapter.resolve_permalink(&auth, "pub-123").await, None);
    }
}
