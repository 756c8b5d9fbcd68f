// OAuth app credentials per destination, read from the environment.

use tracing::warn;
use unipost_core::domain::Destination;

/// Client id/secret pair issued by a destination's developer console.
#[derive(Clone, Default)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

/// OAuth apps for all five destinations. Missing variables leave an empty
/// app: adapters still work with stored tokens, only refresh exchanges fail.
#[derive(Clone, Default)]
pub struct AdapterConfig {
    pub youtube: OAuthApp,
    pub tiktok: OAuthApp,
    pub instagram: OAuthApp,
    pub facebook: OAuthApp,
    pub linkedin: OAuthApp,
}

impl AdapterConfig {
    /// Read `{DESTINATION}_CLIENT_ID` / `{DESTINATION}_CLIENT_SECRET` for
    /// each destination.
    pub fn from_env() -> Self {
        Self {
            youtube: app_from_env(Destination::Youtube),
            tiktok: app_from_env(Destination::Tiktok),
            instagram: app_from_env(Destination::Instagram),
            facebook: app_from_env(Destination::Facebook),
            linkedin: app_from_env(Destination::Linkedin),
        }
    }
}

fn app_from_env(destination: Destination) -> OAuthApp {
    let prefix = destination.as_str().to_ascii_uppercase();
    let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).unwrap_or_default();
    let client_secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).unwrap_or_default();
    if client_id.is_empty() || client_secret.is_empty() {
        warn!(destination = %destination, "oauth app not configured; token refresh will fail");
    }
    OAuthApp {
        client_id,
        client_secret,
    }
}
