//! Home directory registry

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::HomeConfig;
use crate::error::{Error, Result};

/// Per-user home paths with a template fallback for unmapped users
pub struct HomeDirectories {
    template: String,
    homes: RwLock<HashMap<String, String>>,
}

impl HomeDirectories {
    pub fn new(config: &HomeConfig) -> Self {
        Self {
            template: config.default_template.clone(),
            homes: RwLock::new(config.users.clone()),
        }
    }

    /// Home path for `user`
    pub async fn lookup(&self, user: &str) -> String {
        if let Some(home) = self.homes.read().await.get(user) {
            return home.clone();
        }
        self.template.replace("{user}", user)
    }

    /// Register or replace a mapping
    pub async fn insert(&self, user: &str, home: &str) -> Result<()> {
        if user.is_empty() {
            return Err(Error::InvalidArgument("user name cannot be empty".into()));
        }
        if !home.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "home directory {} must be absolute",
                home
            )));
        }

        self.homes
            .write()
            .await
            .insert(user.to_string(), home.to_string());
        info!("Home directory for {} set to {}", user, home);
        Ok(())
    }

    /// Users with an explicit mapping
    pub async fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.homes.read().await.keys().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_fallback() {
        let homes = HomeDirectories::new(&HomeConfig::default());

        assert_eq!(homes.lookup("admin").await, "/home/admin");
        assert_eq!(homes.lookup("alice").await, "/home/alice");

        homes.insert("alice", "/srv/alice").await.unwrap();
        assert_eq!(homes.lookup("alice").await, "/srv/alice");
        assert_eq!(homes.users().await, vec!["admin", "alice"]);
    }

    #[tokio::test]
    async fn test_insert_validation() {
        let homes = HomeDirectories::new(&HomeConfig::default());

        assert!(matches!(homes.insert("", "/x").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(homes.insert("bob", "relative").await, Err(Error::InvalidArgument(_))));
    }
}
