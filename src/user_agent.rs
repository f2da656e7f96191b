use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identifier sent when rotation is disabled
pub const DEFAULT_USER_AGENT: &str = concat!("web-search-mcp/", env!("CARGO_PKG_VERSION"));

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Round-robin pool of outbound User-Agent strings.
///
/// Rotation starts at a random offset so separate processes do not march
/// through the pool in lockstep. This is a courtesy against being blocked,
/// not a security control.
#[derive(Debug)]
pub struct UserAgentPool {
    rotate: bool,
    next: AtomicUsize,
}

impl UserAgentPool {
    pub fn new(rotate: bool) -> Self {
        let start = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        Self {
            rotate,
            next: AtomicUsize::new(start),
        }
    }

    /// User agent for the next outbound request
    pub fn next(&self) -> &'static str {
        if !self.rotate {
            return DEFAULT_USER_AGENT;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
        USER_AGENTS[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_changes_agent_per_request() {
        let pool = UserAgentPool::new(true);
        let first = pool.next();
        let second = pool.next();
        assert_ne!(first, second);
        assert!(USER_AGENTS.contains(&first));
    }

    #[test]
    fn test_rotation_cycles_through_pool() {
        let pool = UserAgentPool::new(true);
        let seen: std::collections::HashSet<_> =
            (0..USER_AGENTS.len()).map(|_| pool.next()).collect();
        assert_eq!(seen.len(), USER_AGENTS.len());
    }

    #[test]
    fn test_fixed_agent_without_rotation() {
        let pool = UserAgentPool::new(false);
        assert_eq!(pool.next(), DEFAULT_USER_AGENT);
        assert_eq!(pool.next(), DEFAULT_USER_AGENT);
    }
}
