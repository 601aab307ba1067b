use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub max_connections: u32,
    pub seed_demo: bool,
    pub admin_email: String,
    pub admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let database_url =
            get("DATABASE_URL").unwrap_or_else(|| "sqlite://./data/fixit.db".to_string());
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = get("PORT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);
        let max_connections = get("DB_MAX_CONNECTIONS")
            .and_then(|value| value.parse().ok())
            .filter(|value| *value > 0)
            .unwrap_or(5);
        let seed_demo = get("SEED_DEMO")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let admin_email = get("ADMIN_EMAIL").unwrap_or_else(|| "admin@fixit.local".to_string());
        let admin_password = get("ADMIN_PASSWORD").unwrap_or_else(|| "admin".to_string());

        Self {
            database_url,
            bind_addr,
            port,
            max_connections,
            seed_demo,
            admin_email,
            admin_password,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.database_url, "sqlite://./data/fixit.db");
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.max_connections, 5);
        assert!(!config.seed_demo);
    }

    #[test]
    fn values_are_read_and_bad_numbers_ignored() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "9000"),
            ("DB_MAX_CONNECTIONS", "zero"),
            ("SEED_DEMO", "TRUE"),
            ("BIND_ADDR", "127.0.0.1"),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.max_connections, 5);
        assert!(config.seed_demo);
    }
}
