use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String, max_connections: u32 },
    /// Process-local store, optionally seeded from a JSON file
    Memory { seed: Option<PathBuf> },
}

pub struct Config {
    pub backend: StoreBackend,
    pub jwt_secret: String,
    pub listen_addr: String,
    /// Comma-separated allowed CORS origins. If empty or "*", allows all origins (dev mode).
    pub cors_origins: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let backend = match var("STORE_BACKEND").as_deref() {
            Some("memory") => StoreBackend::Memory {
                seed: var("MEMORY_SEED").map(PathBuf::from),
            },
            _ => StoreBackend::Postgres {
                database_url: var("DATABASE_URL").expect("DATABASE_URL must be set"),
                max_connections: var("DB_MAX_CONNECTIONS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
        };
        Self {
            backend,
            jwt_secret: var("JWT_SECRET").expect("JWT_SECRET must be set"),
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            cors_origins: var("CORS_ORIGINS").unwrap_or_else(|| "*".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn postgres_is_the_default_backend() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/lw"), ("JWT_SECRET", "s")]);
        assert_eq!(
            cfg.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/lw".to_string(),
                max_connections: 10,
            }
        );
        assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
        assert_eq!(cfg.cors_origins, "*");
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let cfg = config(&[
            ("STORE_BACKEND", "memory"),
            ("MEMORY_SEED", "seed.json"),
            ("JWT_SECRET", "s"),
        ]);
        assert_eq!(
            cfg.backend,
            StoreBackend::Memory {
                seed: Some(PathBuf::from("seed.json"))
            }
        );
    }

    #[test]
    #[should_panic(expected = "JWT_SECRET must be set")]
    fn secret_is_required() {
        config(&[("STORE_BACKEND", "memory")]);
    }
}
