use std::time::Duration;

/// Runtime configuration, sourced from the environment with sensible
/// defaults. Every timer in the server flows from here so integration tests
/// can compress the timings.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the HTTP/WebSocket listener.
    pub port: u16,
    /// How long a private invitation stays pending before both sides are
    /// notified and the temporary room is dropped.
    pub invitation_timeout: Duration,
    /// How long a player waits in the public queue before being timed out.
    pub queue_timeout: Duration,
    /// Per-player clock budget for a new game.
    pub game_clock: Duration,
    /// Pause between pairing two public-queue players and emitting
    /// `game_start`, so clients can transition their UI.
    pub game_start_delay: Duration,
    /// Pause between a checkmate notification and tearing the room down.
    pub room_cleanup_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8081,
            invitation_timeout: Duration::from_secs(20),
            queue_timeout: Duration::from_secs(60),
            game_clock: Duration::from_secs(600),
            game_start_delay: Duration::from_secs(2),
            room_cleanup_delay: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            port: env_parsed("PORT").unwrap_or(defaults.port),
            invitation_timeout: env_secs("INVITATION_TIMEOUT_SECS")
                .unwrap_or(defaults.invitation_timeout),
            queue_timeout: env_secs("QUEUE_TIMEOUT_SECS").unwrap_or(defaults.queue_timeout),
            game_clock: env_secs("GAME_CLOCK_SECS").unwrap_or(defaults.game_clock),
            game_start_delay: env_secs("GAME_START_DELAY_SECS")
                .unwrap_or(defaults.game_start_delay),
            room_cleanup_delay: env_secs("ROOM_CLEANUP_DELAY_SECS")
                .unwrap_or(defaults.room_cleanup_delay),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parsed::<u64>(key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = Config::default();
        assert_eq!(config.port, 8081);
        assert_eq!(config.invitation_timeout, Duration::from_secs(20));
        assert_eq!(config.queue_timeout, Duration::from_secs(60));
        assert_eq!(config.game_clock, Duration::from_secs(600));
        assert_eq!(config.game_start_delay, Duration::from_secs(2));
        assert_eq!(config.room_cleanup_delay, Duration::from_secs(2));
    }
}
