// ─────────────────────────────────────────────────────────────────────
// SND Online Model — Value Sources
// ─────────────────────────────────────────────────────────────────────
//! Where the loop's input values come from.
//!
//! - `TestSource` draws uniform samples from the current envelope, in
//!   internal units. Used for dry runs without a control system.
//! - `LiveSource` reads control-system channels through a
//!   `ChannelClient`, in external (device) units.
//!
//! A source never fails a whole read because one channel failed: each
//! channel's outcome is reported inline as a `ChannelReading`.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use snd_types::{ChannelReading, Declarations, SourceKind, TwinError, TwinResult};

use crate::reference::ReferenceState;

/// Environment variable holding the channel gateway base URL.
pub const GATEWAY_URL_ENV: &str = "SND_GATEWAY_URL";

/// Wall-clock seconds since the UNIX epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub trait ValueSource: Send {
    fn kind(&self) -> SourceKind;

    /// Read the named model variables. `reference` is the current anchor;
    /// synthetic sources sample from its envelope, live sources ignore it.
    fn read(
        &mut self,
        names: &[String],
        reference: &ReferenceState,
    ) -> BTreeMap<String, ChannelReading>;
}

/// Uniform samples within each variable's current range.
pub struct TestSource {
    rng: StdRng,
}

impl TestSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl ValueSource for TestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Test
    }

    fn read(
        &mut self,
        names: &[String],
        reference: &ReferenceState,
    ) -> BTreeMap<String, ChannelReading> {
        let timestamp = unix_now();
        names
            .iter()
            .map(|name| {
                let reading = match reference.variable(name) {
                    Some(var) => {
                        let range = var.value_range;
                        let value = if range.width() > 0.0 {
                            self.rng.random_range(range.low..=range.high)
                        } else {
                            range.low
                        };
                        ChannelReading::Value { value, timestamp }
                    }
                    None => ChannelReading::error("undeclared variable"),
                };
                (name.clone(), reading)
            })
            .collect()
    }
}

/// Reads one control-system channel.
pub trait ChannelClient: Send {
    fn read_channel(&self, channel: &str) -> ChannelReading;
}

/// HTTP/JSON channel gateway: `GET {base}/channels/{channel}` answers
/// `{"value": .., "timestamp": ..}` or `{"error": ..}`.
pub struct GatewayClient {
    base_url: String,
    agent: ureq::Agent,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Build from `SND_GATEWAY_URL`. A missing address is a startup failure.
    pub fn from_env(timeout: Duration) -> TwinResult<Self> {
        match std::env::var(GATEWAY_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(Self::new(url, timeout)),
            _ => Err(TwinError::Configuration(format!(
                "{GATEWAY_URL_ENV} environment variable is not set"
            ))),
        }
    }

    pub fn channel_url(&self, channel: &str) -> String {
        format!("{}/channels/{}", self.base_url, channel)
    }
}

impl ChannelClient for GatewayClient {
    fn read_channel(&self, channel: &str) -> ChannelReading {
        let response = match self.agent.get(&self.channel_url(channel)).call() {
            Ok(response) => response,
            Err(e) => return ChannelReading::error(e.to_string()),
        };
        let body = match response.into_string() {
            Ok(body) => body,
            Err(e) => return ChannelReading::error(format!("unreadable response: {e}")),
        };
        parse_gateway_reply(&body)
    }
}

fn parse_gateway_reply(body: &str) -> ChannelReading {
    serde_json::from_str::<ChannelReading>(body)
        .unwrap_or_else(|e| ChannelReading::error(format!("malformed gateway reply: {e}")))
}

/// Channel client that delegates to a closure.
type ReadFn = Box<dyn Fn(&str) -> ChannelReading + Send>;

pub struct ExternalClient {
    read_fn: ReadFn,
}

impl ExternalClient {
    pub fn new(read_fn: impl Fn(&str) -> ChannelReading + Send + 'static) -> Self {
        Self {
            read_fn: Box::new(read_fn),
        }
    }
}

impl ChannelClient for ExternalClient {
    fn read_channel(&self, channel: &str) -> ChannelReading {
        (self.read_fn)(channel)
    }
}

/// Model variables bound to control-system channels.
pub struct LiveSource {
    bindings: BTreeMap<String, String>,
    client: Box<dyn ChannelClient>,
}

impl LiveSource {
    /// Bind `names` to their declared channels. Every name must be declared.
    pub fn connect(
        names: &[String],
        declarations: &Declarations,
        client: Box<dyn ChannelClient>,
    ) -> TwinResult<Self> {
        declarations.ensure_covers(names.iter().map(String::as_str))?;
        let bindings = names
            .iter()
            .map(|name| Ok((name.clone(), declarations.channel(name)?.to_string())))
            .collect::<TwinResult<BTreeMap<_, _>>>()?;
        log::info!("bound {} variables to live channels", bindings.len());
        Ok(Self { bindings, client })
    }

    pub fn channel(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }
}

impl ValueSource for LiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn read(
        &mut self,
        names: &[String],
        _reference: &ReferenceState,
    ) -> BTreeMap<String, ChannelReading> {
        names
            .iter()
            .map(|name| {
                let reading = match self.bindings.get(name) {
                    Some(channel) => match self.client.read_channel(channel) {
                        ChannelReading::Error { error } => {
                            ChannelReading::error(format!("{channel}: {error}"))
                        }
                        ok => ok,
                    },
                    None => ChannelReading::error("no channel bound"),
                };
                (name.clone(), reading)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use snd_types::{ValueRange, Variable};

    use super::*;

    fn reference() -> ReferenceState {
        ReferenceState::from_variables(
            vec![
                Variable::new("energy", 9500.0, ValueRange::new(9000.0, 10000.0)),
                Variable::new("m1", 5.0, ValueRange::new(5.0, 5.0)),
            ],
            &["energy".to_string()],
        )
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_test_source_within_envelope() {
        let mut source = TestSource::new(Some(7));
        let r = reference();
        for _ in 0..50 {
            let batch = source.read(&names(&["energy", "m1"]), &r);
            match batch["energy"] {
                ChannelReading::Value { value, .. } => assert!((9000.0..=10000.0).contains(&value)),
                ref other => panic!("unexpected {other:?}"),
            }
            assert!(matches!(
                batch["m1"],
                ChannelReading::Value { value, .. } if value == 5.0
            ));
        }
    }

    #[test]
    fn test_test_source_seeded_is_deterministic() {
        let r = reference();
        let a = TestSource::new(Some(3)).read(&names(&["energy"]), &r);
        let b = TestSource::new(Some(3)).read(&names(&["energy"]), &r);
        let value = |m: &BTreeMap<String, ChannelReading>| match m["energy"] {
            ChannelReading::Value { value, .. } => value,
            _ => f64::NAN,
        };
        assert_eq!(value(&a), value(&b));
    }

    #[test]
    fn test_test_source_unknown_variable() {
        let mut source = TestSource::new(Some(1));
        let batch = source.read(&names(&["t9_x"]), &reference());
        assert!(matches!(batch["t9_x"], ChannelReading::Error { .. }));
    }

    fn declarations() -> Declarations {
        Declarations::from_json(
            r#"{"energy": {"channel": "SND:ENERGY", "factor": 1000.0},
                "m1": {"channel": "SND:M1"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_live_source_reads_channels() {
        let client = ExternalClient::new(|channel| match channel {
            "SND:ENERGY" => ChannelReading::Value {
                value: 9.5,
                timestamp: 100.0,
            },
            _ => ChannelReading::error("timeout"),
        });
        let mut source =
            LiveSource::connect(&names(&["energy", "m1"]), &declarations(), Box::new(client))
                .unwrap();
        assert_eq!(source.channel("m1"), Some("SND:M1"));
        let batch = source.read(&names(&["energy", "m1"]), &reference());
        assert_eq!(
            batch["energy"],
            ChannelReading::Value {
                value: 9.5,
                timestamp: 100.0
            }
        );
        assert_eq!(batch["m1"], ChannelReading::error("SND:M1: timeout"));
        assert_eq!(source.kind(), SourceKind::Live);
    }

    #[test]
    fn test_live_source_requires_declarations() {
        let client = ExternalClient::new(|_| ChannelReading::error("unused"));
        let result = LiveSource::connect(&names(&["energy", "t4_x"]), &declarations(), Box::new(client));
        assert!(matches!(result, Err(TwinError::Configuration(_))));
    }

    #[test]
    fn test_gateway_reply_parsing() {
        assert_eq!(
            parse_gateway_reply(r#"{"value": 1.25, "timestamp": 5.5}"#),
            ChannelReading::Value {
                value: 1.25,
                timestamp: 5.5
            }
        );
        assert!(matches!(
            parse_gateway_reply("<html>"),
            ChannelReading::Error { .. }
        ));
    }

    #[test]
    fn test_gateway_channel_url() {
        let client = GatewayClient::new("http://gw:8080/", Duration::from_secs(1));
        assert_eq!(client.channel_url("SND:T1:TH1"), "http://gw:8080/channels/SND:T1:TH1");
    }
}
