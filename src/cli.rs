use crate::config::RestoreConfig;
use clap::Parser;
use regex::Regex;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Restore soft-deleted paths of a hierarchical storage container"
)]
pub struct Cli {
    /// Storage account URI, e.g. https://<account>.dfs.core.windows.net
    #[arg(short = 'u', long, value_parser = parse_storage_uri)]
    pub storage_uri: String,

    /// Container to restore deleted items in
    #[arg(short = 'c', long, value_parser = parse_container)]
    pub container: String,

    /// Storage account access key; the ambient identity is used when absent
    #[arg(short = 'k', long, env = "AZURE_STORAGE_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Concurrency ceiling at start
    #[arg(long)]
    pub initial_concurrency: Option<usize>,

    /// Lowest ceiling the controller backs off to
    #[arg(long)]
    pub min_concurrency: Option<usize>,

    /// Highest ceiling the controller recovers to
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Serve live status as JSON on this address, e.g. 127.0.0.1:8473
    #[arg(long)]
    pub status_addr: Option<String>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn restore_config(&self) -> RestoreConfig {
        let defaults = RestoreConfig::default();
        RestoreConfig {
            initial_concurrency: self
                .initial_concurrency
                .unwrap_or(defaults.initial_concurrency),
            min_concurrency: self.min_concurrency.unwrap_or(defaults.min_concurrency),
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            status_bind_addr: self.status_addr.clone(),
            ..defaults
        }
    }
}

pub fn parse_storage_uri(uri: &str) -> Result<String, String> {
    let pattern = Regex::new(r"^https://[a-z0-9]{3,24}\.(blob|dfs)\.[a-z0-9-]+(\.[a-z0-9-]+)+$")
        .map_err(|err| err.to_string())?;
    if pattern.is_match(uri) {
        Ok(uri.to_string())
    } else {
        Err("expected https://<account>.(blob|dfs).<domain>, e.g. \
             https://myaccount.dfs.core.windows.net"
            .to_string())
    }
}

pub fn parse_container(name: &str) -> Result<String, String> {
    if !(3..=63).contains(&name.len()) {
        return Err("container name must be between 3 and 63 characters".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("container name can only contain lowercase letters, numbers and hyphens".into());
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err("container name cannot start or end with a hyphen".into());
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_blob_and_dfs_uris() {
        assert!(parse_storage_uri("https://acct.dfs.core.windows.net").is_ok());
        assert!(parse_storage_uri("https://acct01.blob.core.chinacloudapi.cn").is_ok());
    }

    #[test]
    fn rejects_malformed_uris() {
        for uri in [
            "http://acct.dfs.core.windows.net",
            "https://acct.file.core.windows.net",
            "https://ac.dfs.core.windows.net",
            "https://Acct.dfs.core.windows.net",
            "https://acct.dfs.core.windows.net/container",
        ] {
            assert!(parse_storage_uri(uri).is_err(), "{uri}");
        }
    }

    #[test]
    fn validates_container_names() {
        assert!(parse_container("data-lake-01").is_ok());
        assert!(parse_container("ab").is_err());
        assert!(parse_container(&"a".repeat(64)).is_err());
        assert!(parse_container("Data").is_err());
        assert!(parse_container("-data").is_err());
        assert!(parse_container("data-").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "mass-undelete",
            "-u",
            "https://acct.dfs.core.windows.net",
            "-c",
            "data",
            "--max-concurrency",
            "200",
        ])
        .expect("args");
        let config = cli.restore_config();
        assert_eq!(config.max_concurrency, 200);
        assert_eq!(config.min_concurrency, 10);
        assert!(cli.access_key.is_none() || std::env::var("AZURE_STORAGE_KEY").is_ok());
    }
}
