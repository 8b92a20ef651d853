use std::env;
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Runtime configuration for the node service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_path: PathBuf,
    pub fcm_endpoint: String,
    pub fcm_server_key: String,
    pub build_id: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let storage_path = env::var("SHOPME_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/shopme"));
        let fcm_endpoint =
            env::var("SHOPME_FCM_ENDPOINT").unwrap_or_else(|_| DEFAULT_FCM_ENDPOINT.to_string());
        let fcm_server_key = env::var("SHOPME_FCM_SERVER_KEY").unwrap_or_default();
        let build_id = env::var("SHOPME_BUILD_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        Ok(Self {
            host,
            port,
            storage_path,
            fcm_endpoint,
            fcm_server_key,
            build_id,
        })
    }
}
