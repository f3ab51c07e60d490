use control_core::router::{env_var, env_var_opt, env_var_or, env_var_parse, DependencyError};

/// Startup configuration for the gateway, read once from the environment
/// per §6. A missing required variable is a fatal startup error — logged
/// and the process exits non-zero, never a panic.
#[derive(Debug, Clone)]
pub struct Config {
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
    pub rabbitmq_host: String,
    pub rabbitmq_port: u16,
    pub rabbitmq_vhost: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_secure: bool,
    pub s3_bucket: String,
    pub telegram_bot_token: String,
    pub telegram_admin_user_id: i64,
    pub downloads_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, DependencyError> {
        Ok(Config {
            rabbitmq_user: env_var("RABBITMQ_USER")?,
            rabbitmq_pass: env_var("RABBITMQ_PASS")?,
            rabbitmq_host: env_var_or("RABBITMQ_HOST", "localhost"),
            rabbitmq_port: env_var_parse("RABBITMQ_PORT", 5672),
            rabbitmq_vhost: env_var_or("RABBITMQ_VHOST", "/"),
            redis_host: env_var_or("REDIS_HOST", "localhost"),
            redis_port: env_var_parse("REDIS_PORT", 6379),
            redis_password: env_var_opt("REDIS_PASSWORD"),
            s3_endpoint: env_var("S3_ENDPOINT")?,
            s3_access_key: env_var("S3_ACCESS_KEY")?,
            s3_secret_key: env_var("S3_SECRET_KEY")?,
            s3_secure: env_var_parse("S3_SECURE", true),
            s3_bucket: env_var("S3_BUCKET")?,
            telegram_bot_token: env_var("TELEGRAM_BOT_TOKEN")?,
            telegram_admin_user_id: env_var("TELEGRAM_ADMIN_USER_ID")?
                .parse()
                .map_err(|_| DependencyError::ConfigError("TELEGRAM_ADMIN_USER_ID must be an integer".into()))?,
            downloads_dir: env_var_or("DOWNLOADS_DIR", "./downloads"),
        })
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!("redis://:{password}@{}:{}", self.redis_host, self.redis_port),
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }

    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_host, self.rabbitmq_port, self.rabbitmq_vhost
        )
    }
}
