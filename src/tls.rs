//! Shared TLS client configuration.
//!
//! Builds a single [`rustls::ClientConfig`] backed by the bundled
//! webpki root store. The same config is handed to the WebSocket
//! connector and to every `reqwest` client so all outbound TLS goes
//! through one root-of-trust.

use rustls::ClientConfig;

/// Builds a [`ClientConfig`] whose root store contains the webpki
/// certificate bundle.
pub fn build_tls_config() -> ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
