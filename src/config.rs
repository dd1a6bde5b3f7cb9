use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Row cap for the history endpoint (`limit` query values are clamped
    /// to this).
    pub history_limit: i64,
    /// Broadcast channel capacity, i.e. the per-subscriber backlog bound.
    pub relay_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: optional("DATABASE_URL", "sqlite://garden.db"),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "3001")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            history_limit: parse_positive("HISTORY_LIMIT", &optional("HISTORY_LIMIT", "1000"))?,
            relay_capacity: parse_positive("RELAY_CAPACITY", &optional("RELAY_CAPACITY", "256"))?
                as usize,
        })
    }
}

/// Parse a strictly positive integer setting, erroring on zero so that a
/// misconfigured cap can't silently disable an endpoint.
fn parse_positive(key: &str, raw: &str) -> Result<i64> {
    let n: i64 = raw
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got: {raw:?}"))?;
    anyhow::ensure!(n > 0, "{key} must be greater than zero, got: {n}");
    Ok(n)
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_accepts_plain_integers() {
        assert_eq!(parse_positive("HISTORY_LIMIT", "1000").unwrap(), 1000);
        assert_eq!(parse_positive("RELAY_CAPACITY", "1").unwrap(), 1);
    }

    #[test]
    fn parse_positive_rejects_zero() {
        let err = parse_positive("HISTORY_LIMIT", "0").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn parse_positive_rejects_garbage() {
        let err = parse_positive("RELAY_CAPACITY", "lots").unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }
}
