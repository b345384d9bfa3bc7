use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path deliveries are received on.
    #[serde(default = "default_path")]
    pub path: String,
    /// Shared secret for HMAC verification of deliveries. When unset, no
    /// verification is done and every request is processed.
    #[serde(default)]
    pub secret: Option<String>,
    /// When false, pushed tags produce events just like pushed branches.
    #[serde(default = "default_ignore_tags")]
    pub ignore_tags: bool,
    /// Pull request actions that may produce an event. When unset, every
    /// action is accepted.
    #[serde(default)]
    pub pull_request_actions: Option<Vec<String>>,
}

fn default_port() -> u16 {
    80
}

fn default_path() -> String {
    "/postreceive".to_owned()
}

fn default_ignore_tags() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            path: default_path(),
            secret: None,
            ignore_tags: default_ignore_tags(),
            pull_request_actions: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.path.starts_with('/'),
            "webhook path `{}` must start with a `/`",
            self.path
        );
        Ok(())
    }

    pub fn action_allowed(&self, action: &str) -> bool {
        match &self.pull_request_actions {
            Some(allowed) => allowed.iter().any(|a| a == action),
            None => true,
        }
    }
}
