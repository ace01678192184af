//! Maps persisted settings onto the network layer's runtime types.

use std::time::Duration;

use ultrastar_config::{ConnectionSettings, ControllerConfig};
use ultrastar_net::{ConnectionConfig, Endpoint, LineConfig, ReconnectConfig, SocketConfig};

/// Connection tunables from the `connection` section.
pub fn connection_config(settings: &ConnectionSettings) -> ConnectionConfig {
    ConnectionConfig {
        reconnect: ReconnectConfig {
            delay: Duration::from_millis(settings.reconnect_delay_ms),
        },
        pacing_delay: Duration::from_millis(settings.pacing_delay_ms),
        line: LineConfig {
            // A zero limit would reject every line.
            max_line_len: settings.max_line_len.max(1),
        },
    }
}

/// Socket options; only the keepalive idle time is configurable.
pub fn socket_config(settings: &ConnectionSettings) -> SocketConfig {
    SocketConfig {
        keepalive_idle: Duration::from_secs(settings.keepalive_idle_secs),
        ..Default::default()
    }
}

pub fn endpoint(controller: &ControllerConfig) -> Endpoint {
    Endpoint::new(controller.host.clone(), controller.port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_network_defaults() {
        let config = connection_config(&ConnectionSettings::default());
        let expected = ConnectionConfig::default();
        assert_eq!(config.reconnect.delay, expected.reconnect.delay);
        assert_eq!(config.pacing_delay, expected.pacing_delay);
        assert_eq!(config.line.max_line_len, expected.line.max_line_len);
        assert_eq!(
            socket_config(&ConnectionSettings::default()),
            SocketConfig::default()
        );
    }

    #[test]
    fn test_custom_timings() {
        let settings = ConnectionSettings {
            reconnect_delay_ms: 500,
            pacing_delay_ms: 0,
            max_line_len: 0,
            keepalive_idle_secs: 5,
        };
        let config = connection_config(&settings);
        assert_eq!(config.reconnect.delay, Duration::from_millis(500));
        assert_eq!(config.pacing_delay, Duration::ZERO);
        assert_eq!(config.line.max_line_len, 1);
        assert_eq!(socket_config(&settings).keepalive_idle, Duration::from_secs(5));
    }

    #[test]
    fn test_endpoint_from_controller() {
        let controller = ControllerConfig {
            name: "den".into(),
            host: "192.168.0.9".into(),
            port: 4455,
        };
        assert_eq!(endpoint(&controller).to_string(), "192.168.0.9:4455");
    }
}
