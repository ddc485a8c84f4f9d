//! Shared fixtures for integration tests

#![allow(dead_code)]

use patchwatch_tracker::config::UpstreamConfig;
use patchwatch_tracker::ProtocolClient;
use wiremock::MockServer;

pub const VERSIONS_HEADER: &str = "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16";

/// A versions document with one data line per `(region, build_id)`
pub fn versions_body(seqn: u64, builds: &[(&str, &str)]) -> String {
    let mut body = format!("{VERSIONS_HEADER}\n## seqn = {seqn}\n");
    for (region, build_id) in builds {
        body.push_str(&format!(
            "{region}|cfg{build_id}|cdn{build_id}||{build_id}|11.0.2.{build_id}|pc{build_id}\n"
        ));
    }
    body
}

pub fn upstream_config(server: &MockServer, timeout_secs: u64) -> UpstreamConfig {
    UpstreamConfig {
        base_url: server.uri(),
        fetch_timeout_secs: timeout_secs,
        user_agent: "Mozilla/5.0".to_string(),
    }
}

pub fn client_for(server: &MockServer, timeout_secs: u64) -> ProtocolClient {
    ProtocolClient::new(&upstream_config(server, timeout_secs)).expect("client builds")
}
