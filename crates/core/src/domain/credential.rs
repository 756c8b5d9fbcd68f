// Destination credential records.

use super::destination::Destination;
use super::post::OwnerId;
use serde::{Deserialize, Serialize};

/// Stored OAuth credential for one (owner, destination) pair.
///
/// `expires_at` only ever moves forward: refresh extends it, nothing shortens
/// it. Tokens must never reach logs in cleartext, hence the masked `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationCredential {
    pub owner: OwnerId,
    pub destination: Destination,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch ms.
    pub expires_at: i64,
    /// Native account id on the destination (open_id, ig user id, page id,
    /// person URN, channel id).
    pub account_id: String,
    pub updated_at: i64,
}

impl DestinationCredential {
    /// Whether the credential is inside the destination's refresh margin.
    pub fn needs_refresh(&self, now_millis: i64) -> bool {
        now_millis + self.destination.refresh_margin_ms() >= self.expires_at
    }
}

impl std::fmt::Debug for DestinationCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationCredential")
            .field("owner", &self.owner)
            .field("destination", &self.destination)
            .field("access_token", &mask(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask),
            )
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// A freshly-minted grant returned by a destination's token endpoint.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some destinations rotate the refresh token; `None` keeps the old one.
    pub refresh_token: Option<String>,
    /// Lifetime of the new access token in ms.
    pub expires_in_ms: i64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &mask(&self.access_token))
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .field("expires_in_ms", &self.expires_in_ms)
            .finish()
    }
}

/// What an adapter needs to make authenticated calls: a currently-valid
/// bearer token plus the native account id.
#[derive(Clone)]
pub struct DestinationAuth {
    pub access_token: String,
    pub account_id: String,
}

impl std::fmt::Debug for DestinationAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationAuth")
            .field("access_token", &mask(&self.access_token))
            .field("account_id", &self.account_id)
            .finish()
    }
}

fn mask(token: &str) -> String {
    if token.len() <= 6 {
        "***".to_string()
    } else {
        format!("{}***", &token[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(expires_at: i64) -> DestinationCredential {
        DestinationCredential {
            owner: "owner-1".into(),
            destination: Destination::Tiktok,
            access_token: "act.super-secret-token".into(),
            refresh_token: Some("rft.super-secret-refresh".into()),
            expires_at,
            account_id: "open-id-1".into(),
            updated_at: 0,
        }
    }

    #[test]
    fn refresh_triggers_inside_margin_only() {
        let margin = Destination::Tiktok.refresh_margin_ms();
        let now = 1_000_000;

        assert!(!cred(now + margin + 1).needs_refresh(now));
        assert!(cred(now + margin).needs_refresh(now));
        assert!(cred(now - 1).needs_refresh(now));
    }

    #[test]
    fn debug_output_never_contains_tokens() {
        let rendered = format!("{:?}", cred(0));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("act.***") || rendered.contains("***"));
    }
}
