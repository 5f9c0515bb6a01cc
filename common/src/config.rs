use std::time::Duration;

/// Process-wide settings, built once by the front end and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Upper bound on concurrent probes in any single fan-out.
    ///
    /// A plugin's own `concurrency` parameter is clamped to this value.
    pub max_concurrency: usize,
    /// Extra time granted to an external tool beyond the deadline a plugin
    /// derives from its parameters.
    pub deadline_slack: Duration,
    /// 0 shows everything, 1 hides progress output, 2 prints only the result.
    pub quiet: u8,
    pub no_banner: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 256,
            deadline_slack: Duration::from_secs(5),
            quiet: 0,
            no_banner: false,
        }
    }
}

impl Config {
    /// Effective concurrency for a plugin that asked for `requested` slots.
    pub fn ceiling(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_concurrency.max(1))
    }

    pub fn deadline(&self, base: Duration) -> Duration {
        base + self.deadline_slack
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_clamped() {
        let config = Config { max_concurrency: 64, ..Config::default() };
        assert_eq!(config.ceiling(0), 1);
        assert_eq!(config.ceiling(50), 50);
        assert_eq!(config.ceiling(1000), 64);
    }

    #[test]
    fn deadline_adds_slack() {
        let config = Config::default();
        assert_eq!(config.deadline(Duration::from_secs(10)), Duration::from_secs(15));
    }
}
