use serde::Deserialize;
use std::env;

pub const DEFAULT_MASTERY_THRESHOLD: i32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    /// Fallback mastery threshold applied when a subject does not carry
    /// its own `mastery_threshold` value.
    pub default_mastery_threshold: i32,
}

impl Config {
    /// Layered load: `config/{APP_ENV}.toml` (optional) overridden by
    /// `APP__`-prefixed environment variables, with plain env vars and
    /// built-in defaults as the last resort.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let string_key = |toml_key: &str, env_key: &str, fallback: &str| {
            settings
                .get_string(toml_key)
                .or_else(|_| env::var(env_key))
                .unwrap_or_else(|_| fallback.to_string())
        };

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if app_env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let default_mastery_threshold = settings
            .get_int("mastery.default_threshold")
            .ok()
            .map(|value| value as i32)
            .or_else(|| {
                env::var("DEFAULT_MASTERY_THRESHOLD")
                    .ok()
                    .and_then(|value| value.parse().ok())
            })
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MASTERY_THRESHOLD);

        Ok(Config {
            mongo_uri: string_key(
                "database.mongo_uri",
                "MONGO_URI",
                "mongodb://localhost:27017/quizbank",
            ),
            redis_uri: string_key("redis.uri", "REDIS_URI", "redis://127.0.0.1:6379/0"),
            mongo_database: string_key("database.mongo_database", "MONGO_DATABASE", "quizbank"),
            jwt_secret,
            default_mastery_threshold,
        })
    }
}
