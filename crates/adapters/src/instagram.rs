// Instagram Graph API (via graph.facebook.com).
//
// Videos publish as Reels: a resumable media container is created with the
// caption, the bytes go to the dedicated `rupload` host in one shot, and the
// container is polled (`status_code`) until FINISHED before `media_publish`.
// Photo sets publish by URL: one image container per photo (carousel items
// when there is more than one) and a carousel container on top.

use crate::chunk;
use crate::config::OAuthApp;
use crate::util::{self, json_of, Readiness};
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
const RUPLOAD: &str = "https://rupload.facebook.com/ig-api-upload";

/// Meta's long-lived tokens run 60 days.
const DEFAULT_EXPIRES_IN_SECS: i64 = 5_184_000;

pub struct InstagramAdapter {
    client: Client,
}

impl InstagramAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stage_err(reason: impl ToString) -> DispatchError {
        DispatchError::StageFailed {
            destination: Destination::Instagram,
            reason: reason.to_string(),
        }
    }

    async fn create_container(
        &self,
        auth: &DestinationAuth,
        params: &[(&str, &str)],
    ) -> Result<String, DispatchError> {
        let response = self
            .client
            .post(format!("{}/{}/media", GRAPH, auth.account_id))
            .query(params)
            .query(&[("access_token", auth.access_token.as_str())])
            .send()
            .await
            .map_err(Self::stage_err)?;
        let value = json_of(response).await.map_err(Self::stage_err)?;
        value["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Self::stage_err(format!("container response missing id: {}", value)))
    }

    /// Image containers by source URL, plus a carousel on top when the set
    /// has more than one photo.
    async fn stage_photos(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        if asset.source_refs.is_empty() {
            return Err(Self::stage_err("photo set has no source urls"));
        }
        if asset.source_refs.len() == 1 {
            let id = self
                .create_container(
                    auth,
                    &[
                        ("image_url", asset.source_refs[0].as_str()),
                        ("caption", meta.caption.as_str()),
                    ],
                )
                .await?;
            return Ok(UploadSession {
                media_id: id,
                ..UploadSession::default()
            });
        }

        let mut children = Vec::with_capacity(asset.source_refs.len());
        for url in &asset.source_refs {
            let id = self
                .create_container(
                    auth,
                    &[("image_url", url.as_str()), ("is_carousel_item", "true")],
                )
                .await?;
            children.push(id);
        }
        let carousel = self
            .create_container(
                auth,
                &[
                    ("media_type", "CAROUSEL"),
                    ("children", children.join(",").as_str()),
                    ("caption", meta.caption.as_str()),
                ],
            )
            .await?;
        Ok(UploadSession {
            media_id: carousel,
            part_tags: children,
            ..UploadSession::default()
        })
    }
}

#[async_trait]
impl DestinationAdapter for InstagramAdapter {
    fn destination(&self) -> Destination {
        Destination::Instagram
    }

    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError> {
        if asset.kind == AssetKind::PhotoSet {
            return self.stage_photos(auth, asset, meta).await;
        }

        let container = self
            .create_container(
                auth,
                &[
                    ("media_type", "REELS"),
                    ("caption", meta.caption.as_str()),
                    ("upload_type", "resumable"),
                ],
            )
            .await?;
        debug!(container = %container, "reel container created");
        Ok(UploadSession {
            upload_url: Some(format!("{}/{}", RUPLOAD, container)),
            media_id: container,
            ..UploadSession::default()
        })
    }

    async fn upload_bytes(
        &self,
        auth: &DestinationAuth,
        session: &mut UploadSession,
        asset: &StagedAsset,
    ) -> Result<(), DispatchError> {
        // Photo containers were created by URL; no bytes to push.
        if asset.kind == AssetKind::PhotoSet {
            return Ok(());
        }
        let upload_err = |reason: String| DispatchError::UploadFailed {
            destination: Destination::Instagram,
            reason,
        };
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
            .bearer_auth(&auth.access_token)
            .header("offset", "0")
            .header("file_size", bytes.len().to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let value = json_of(response).await.map_err(upload_err)?;

        if !value["success"].as_bool().unwrap_or(false) {
            return Err(upload_err(format!("rupload rejected the bytes: {}", value)));
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
        let container = session.media_id.clone();

        util::poll_readiness(Destination::Instagram, move || {
            let client = client.clone();
            let token = token.clone();
            let container = container.clone();
            async move {
                let response = client
                    .get(format!("{}/{}", GRAPH, container))
                    .query(&[("fields", "status_code"), ("access_token", token.as_str())])
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                let value = json_of(response).await?;
                match value["status_code"].as_str().unwrap_or("") {
                    "FINISHED" => Ok(Readiness::Ready),
                    "ERROR" => Ok(Readiness::Failed("container entered ERROR state".into())),
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
        _meta: &PostMeta,
    ) -> Result<String, DispatchError> {
        let publish_err = |reason: String| DispatchError::PublishFailed {
            destination: Destination::Instagram,
            reason,
        };
        let response = self
            .client
            .post(format!("{}/{}/media_publish", GRAPH, auth.account_id))
            .query(&[
                ("creation_id", session.media_id.as_str()),
                ("access_token", auth.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        let value = json_of(response).await.map_err(publish_err)?;
        value["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| publish_err(format!("media_publish returned no id: {}", value)))
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
                ("fields", "permalink"),
                ("access_token", auth.access_token.as_str()),
            ])
            .send()
            .await
            .ok()?;
        let value = json_of(response).await.ok()?;
        value["permalink"].as_str().map(str::to_string)
    }
}

/// `fb_exchange_token` flow: the current long-lived token is traded for a
/// fresh 60-day one. No refresh token is involved.
pub struct InstagramRefresher {
    client: Client,
    app: OAuthApp,
}

impl InstagramRefresher {
    pub fn new(client: Client, app: OAuthApp) -> Self {
        Self { client, app }
    }
}

#[async_trait]
impl TokenRefresher for InstagramRefresher {
    fn destination(&self) -> Destination {
        Destination::Instagram
    }

    async fn refresh(
        &self,
        credential: &DestinationCredential,
    ) -> Result<TokenGrant, RefreshError> {
        exchange_token(&self.client, &self.app, &credential.access_token).await
    }
}

/// Shared by the Instagram and Facebook refreshers; both ride the Graph
/// `oauth/access_token` exchange.
pub(crate) async fn exchange_token(
    client: &Client,
    app: &OAuthApp,
    current_token: &str,
) -> Result<TokenGrant, RefreshError> {
    let response = client
        .get(format!("{}/oauth/access_token", GRAPH))
        .query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("fb_exchange_token", current_token),
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
        refresh_token: None,
        expires_in_ms: value["expires_in"]
            .as_i64()
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            * 1000,
    })
}
