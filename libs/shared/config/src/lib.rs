use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub whatsapp_api_url: String,
    pub whatsapp_api_token: String,
    pub meeting_link_base_url: String,
    pub app_env: String,
    pub token_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            whatsapp_api_url: env::var("WHATSAPP_API_URL")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_API_URL not set, using empty value");
                    String::new()
                }),
            whatsapp_api_token: env::var("WHATSAPP_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_API_TOKEN not set, using empty value");
                    String::new()
                }),
            meeting_link_base_url: env::var("MEETING_LINK_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("MEETING_LINK_BASE_URL not set, using default");
                    "https://meet.medibook.health".to_string()
                }),
            app_env: env::var("APP_ENV")
                .unwrap_or_else(|_| {
                    warn!("APP_ENV not set, defaulting to development");
                    "development".to_string()
                }),
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("TOKEN_TTL_HOURS not set or invalid, defaulting to 24");
                    24
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    pub fn is_whatsapp_configured(&self) -> bool {
        !self.whatsapp_api_url.is_empty() && !self.whatsapp_api_token.is_empty()
    }
}
