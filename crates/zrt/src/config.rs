use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct RuntimeConfig {
    #[serde(flatten)]
    pub servers: BTreeMap<String, RuntimeServer>,
}

/// Connection settings for one Zigbee runtime server.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RuntimeServer {
    pub url: Url,
    pub reconnect_interval_secs: Option<NonZeroU32>,
}

impl RuntimeServer {
    /// Websocket endpoint for this server.
    ///
    /// The configuration accepts plain http(s) urls for convenience;
    /// the scheme is mapped to the websocket equivalent here.
    #[must_use]
    pub fn websocket_url(&self) -> Url {
        let mut url = self.url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // set_scheme only fails for special-scheme transitions that
        // cannot occur for the fixed values above
        let _ = url.set_scheme(scheme);
        url
    }
}
