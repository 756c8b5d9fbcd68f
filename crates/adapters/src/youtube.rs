// YouTube Data API v3 resumable upload.
//
// `POST upload/youtube/v3/videos?uploadType=resumable` carries the snippet
// (title/description/category) and status (privacy) and returns the session
// URL in the `Location` header. The bytes go up as 1 MiB `PUT`s with
// `Content-Range`; HTTP 308 means "send the next chunk", 200/201 carries the
// final video resource. The video is public on completion, so there is
// nothing left for finalize beyond reporting the id.

use crate::chunk::{self, YOUTUBE_CHUNK_SIZE};
use crate::config::OAuthApp;
use crate::util::{json_of, truncate, CHUNK_RETRY_LIMIT};
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

const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TITLE_LIMIT: usize = 100;

pub struct YoutubeAdapter {
    client: Client,
}

impl YoutubeAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stage_err(reason: impl ToString) -> DispatchError {
        DispatchError::StageFailed {
            destination: Destination::Youtube,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DestinationAdapter for YoutubeAdapter {
    fn destination(&self) -> Destination {
        Destination::Youtube
    }

    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        require_video(Destination::Youtube, asset)?;

        let body = json!({
            "snippet": {
                "title": truncate(&meta.caption, TITLE_LIMIT),
                "description": meta.description,
                "categoryId": "22",
            },
            "status": {
                "privacyStatus": "public",
                "selfDeclaredMadeForKids": false,
            },
        });
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&auth.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", asset.size_bytes.to_string())
            .json(&body)
            .send()
            .await
            .map_err(Self::stage_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::stage_err(format!(
                "session init failed with {}: {}",
                status,
                truncate(&text, 300)
            )));
        }
        let session_url = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Self::stage_err("no Location header on resumable session"))?
            .to_string();
        debug!("resumable session opened");

        Ok(UploadSession {
            upload_url: Some(session_url),
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
            destination: Destination::Youtube,
            reason,
        };
        let session_url = session
            .upload_url
            .as_deref()
            .ok_or_else(|| upload_err("session has no upload url".into()))?;
        let total = asset.size_bytes;
        let path = asset.primary_path();

        for (index, (first, last)) in
            chunk::plan_chunks(total, YOUTUBE_CHUNK_SIZE).into_iter().enumerate()
        {
            let bytes = chunk::read_range(path, first, last)
                .await
                .map_err(|e| upload_err(format!("reading chunk {}: {}", index, e)))?;

            let mut attempt = 0;
            loop {
                attempt += 1;
                let result = self
                    .client
                    .put(session_url)
                    .bearer_auth(&auth.access_token)
                    .header("Content-Range", chunk::content_range(first, last, total))
                    .body(bytes.clone())
                    .send()
                    .await;

                match result {
                    // 308: chunk stored, session expects more bytes.
                    Ok(r) if r.status().as_u16() == 308 => break,
                    Ok(r) if r.status().is_success() => {
                        // The last chunk answers with the video resource.
                        let value = json_of(r).await.map_err(&upload_err)?;
                        session.media_id = value["id"]
                            .as_str()
                            .ok_or_else(|| {
                                upload_err(format!("video resource has no id: {}", value))
                            })?
                            .to_string();
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

        if session.media_id.is_empty() {
            return Err(upload_err(
                "upload completed without a video resource".into(),
            ));
        }
        Ok(())
    }

    /// A 200 on the final chunk means the video is accepted; YouTube's own
    /// transcode continues in the background without blocking publication.
    async fn await_readiness(
        &self,
        _auth: &DestinationAuth,
        _session: &UploadSession,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn finalize(
        &self,
        _auth: &DestinationAuth,
        session: &UploadSession,
        _meta: &PostMeta,
    ) -> Result<String, DispatchError> {
        if session.media_id.is_empty() {
            return Err(DispatchError::PublishFailed {
                destination: Destination::Youtube,
                reason: "no video id recorded".into(),
            });
        }
        Ok(session.media_id.clone())
    }

    async fn resolve_permalink(
        &self,
        _auth: &DestinationAuth,
        native_post_id: &str,
    ) -> Option<String> {
        Some(format!("https://www.youtube.com/watch?v={}", native_post_id))
    }
}

/// Google OAuth `refresh_token` grant; access tokens run about an hour.
pub struct YoutubeRefresher {
    client: Client,
    app: OAuthApp,
}

impl YoutubeRefresher {
    pub fn new(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }
}

#[async_trait]
impl TokenRefresher for YoutubeRefresher {
    fn destination(&self) -> Destination {
        Destination::Youtube
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
            .post(TOKEN_URL)
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
        // Google does not rotate the refresh token on this grant.
        Ok(TokenGrant {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_in_ms: value["expires_in"].as_i64().unwrap_or(3600) * 1000,
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
        let adapter = YoutubeAdapter::new(Client::new());
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
    async fn permalink_is_the_watch_url() {
        let adapter = YoutubeAdapter::new(Client::new());
        let auth = DestinationAuth {
            access_token: "t".into(),
            account_id: "a".into(),
        };
        assert_eq!(
            adapter.resolve_permalink(&auth, "abc123").await.as_deref(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
    }

    #[tokio::test]
    async fn finalize_requires_a_recorded_video_id() {
        let adapter = YoutubeAdapter::new(Client::new());
        let auth = DestinationAuth {
            access_token: "t".into(),
            account_id: "a".into(),
        };
        let meta = PostMeta {
            caption: "c".into(),
            description: String::new(),
        };
        let empty = UploadSession::default();
        assert!(adapter.finalize(&auth, &empty, &meta).await.is_err());

        let done = UploadSession {
            media_id: "vid-1".into(),
            ..UploadSession::default()
        };
        assert_eq!(adapter.finalize(&auth, &done, &meta).await.unwrap(), "vid-1");
    }
}
