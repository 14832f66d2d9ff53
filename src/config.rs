use std::path::PathBuf;

/// Default TCP port the dispatcher listens on.
pub const DEFAULT_PORT: u16 = 9714;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub port: u16,
    pub hosts_info_file: PathBuf,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            hosts_info_file: PathBuf::from("hosts-info"),
        }
    }
}

impl DispatcherConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_hosts_info_file(mut self, path: PathBuf) -> Self {
        self.hosts_info_file = path;
        self
    }
}
