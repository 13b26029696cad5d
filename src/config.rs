//! Port configuration

/// Port configuration options
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Include diagnostic detail (argument dumps, frame sending state)
    /// in error messages
    pub status_messages: bool,

    /// Stamp outgoing frame batches with the wall-clock time.
    ///
    /// Ports relaying frames from a remote peer keep the peer's timing and
    /// send a zero timestamp instead.
    pub stamp_frames: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            status_messages: true,
            stamp_frames: true,
        }
    }
}

impl PortConfig {
    /// Configuration for a port that relays frames from a remote peer
    pub fn client() -> Self {
        Self {
            stamp_frames: false,
            ..Default::default()
        }
    }

    /// Enable or disable diagnostic detail in error messages
    pub fn status_messages(mut self, enabled: bool) -> Self {
        self.status_messages = enabled;
        self
    }

    /// Enable or disable frame timestamps
    pub fn stamp_frames(mut self, enabled: bool) -> Self {
        self.stamp_frames = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();

        assert!(config.status_messages);
        assert!(config.stamp_frames);
    }

    #[test]
    fn test_client_config() {
        let config = PortConfig::client();

        assert!(!config.stamp_frames);
        assert!(config.status_messages);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PortConfig::default()
            .status_messages(false)
            .stamp_frames(false);

        assert!(!config.status_messages);
        assert!(!config.stamp_frames);
    }
}
