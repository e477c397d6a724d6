use qdrant_client::{Qdrant, config::QdrantConfig};
use std::time::Duration;
use super::store::VectorDBError;

/// The REST port is what people usually put in `QDRANT_URL`; the client
/// speaks gRPC, which listens one port up.
pub fn grpc_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", url),
    };
    let rest = rest.trim_end_matches('/');

    let rest = match rest.strip_suffix(":6333") {
        Some(host) => format!("{}:6334", host),
        None => rest.to_string(),
    };

    format!("{}://{}", scheme, rest)
}

pub async fn create_qdrant_client(url: &str, api_key: Option<&str>) -> Result<Qdrant, VectorDBError> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.check_compatibility = false;
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);
    config.api_key = api_key.map(str::to_string);

    let client = Qdrant::new(config)
        .map_err(|e| VectorDBError::Connection(e.to_string()))?;

    // Test the connection
    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!("Failed to connect to Qdrant: {}", e)))
        }
    }
}
