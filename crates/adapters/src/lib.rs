// UniPost destination adapters: one module per destination implementing the
// publish protocol over HTTP, plus the matching token refreshers.

pub mod chunk;
pub mod config;
pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod youtube;

mod util;

pub use config::{AdapterConfig, OAuthApp};

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use unipost_core::application::AdapterSet;
use unipost_core::domain::Destination;
use unipost_core::port::TokenRefresher;

/// HTTP client tuned for media uploads: bounded connect time, no overall
/// request timeout (chunk PUTs of large files run long by design).
pub fn default_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .user_agent(concat!("unipost/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// All five destination adapters over one shared client.
pub fn build_adapter_set(client: &Client) -> AdapterSet {
    AdapterSet::new()
        .register(Arc::new(youtube::YoutubeAdapter::new(client.clone())))
        .register(Arc::new(tiktok::TiktokAdapter::new(client.clone())))
        .register(Arc::new(instagram::InstagramAdapter::new(client.clone())))
        .register(Arc::new(facebook::FacebookAdapter::new(client.clone())))
        .register(Arc::new(linkedin::LinkedinAdapter::new(client.clone())))
}

/// One token refresher per destination, for the token lifecycle manager.
pub fn build_refresher_set(
    client: &Client,
    config: &AdapterConfig,
) -> HashMap<Destination, Arc<dyn TokenRefresher>> {
    let mut refreshers: HashMap<Destination, Arc<dyn TokenRefresher>> = HashMap::new();
    refreshers.insert(
        Destination::Youtube,
        Arc::new(youtube::YoutubeRefresher::new(
            client.clone(),
            config.youtube.clone(),
        )),
    );
    refreshers.insert(
        Destination::Tiktok,
        Arc::new(tiktok::TiktokRefresher::new(
            client.clone(),
            config.tiktok.clone(),
        )),
    );
    refreshers.insert(
        Destination::Instagram,
        Arc::new(instagram::InstagramRefresher::new(
            client.clone(),
            config.instagram.clone(),
        )),
    );
    refreshers.insert(
        Destination::Facebook,
        Arc::new(facebook::FacebookRefresher::new(
            client.clone(),
            config.facebook.clone(),
        )),
    );
    refreshers.insert(
        Destination::Linkedin,
        Arc::new(linkedin::LinkedinRefresher::new(
            client.clone(),
            config.linkedin.clone(),
        )),
    );
    refreshers
}

#[cfg(test)]
mod tests {
    use super::*;
    use unipost_core::port::DestinationAdapter;

    #[test]
    fn every_destination_has_an_adapter_and_a_refresher() {
        let client = default_client();
        let adapters = build_adapter_set(&client);
        let refreshers = build_refresher_set(&client, &AdapterConfig::default());

        for destination in Destination::ALL {
            let adapter = adapters
                .get(destination)
                .unwrap_or_else(|| panic!("no adapter for {}", destination));
            assert_eq!(adapter.destination(), destination);
            assert_eq!(
                refreshers
                    .get(&destination)
                    .unwrap_or_else(|| panic!("no refresher for {}", destination))
                    .destination(),
                destination
            );
        }
    }
}
