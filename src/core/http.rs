use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::redirect::Policy;
use reqwest::Client;

const APP_USER_AGENT: &str = concat!("MangoLauncher-RuntimeManager/", env!("CARGO_PKG_VERSION"));

/// Client used for runtime packages.
///
/// Redirects are disabled here; the provisioner follows `Location` itself so
/// that it can cap the number of hops.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .redirect(Policy::none())
        .connect_timeout(Duration::from_secs(30))
        .build()
}
