use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_WG_COMMAND: &str = "wg";

/// Zero-based position of the received-bytes field in the flattened dump output.
const RX_BYTES_FIELD: usize = 8;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter query failed: {0}")]
    Query(String),
    #[error("unexpected counter output: {0}")]
    Parse(String),
}

/// Provides the cumulative received-byte counter of an interface.
#[async_trait]
pub trait CounterSource: Send {
    async fn sample(&mut self, interface: &str) -> Result<u64, CounterError>;
}

/// Reads the counter from `wg show <interface> dump`.
#[derive(Debug, Clone)]
pub struct WgCounterSource {
    command: String,
}

impl WgCounterSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for WgCounterSource {
    fn default() -> Self {
        Self::new(DEFAULT_WG_COMMAND)
    }
}

#[async_trait]
impl CounterSource for WgCounterSource {
    async fn sample(&mut self, interface: &str) -> Result<u64, CounterError> {
        let output = Command::new(&self.command)
            .args(["show", interface, "dump"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                CounterError::Query(format!(
                    "failed to run `{} show {interface} dump`: {err}",
                    self.command
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CounterError::Query(format!(
                "`{} show {interface} dump` exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        parse_rx_bytes(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extracts the received-byte count from `wg show <if> dump` output.
///
/// The whole output is split on tabs without regard to line breaks, so rows
/// run together into a single token stream and field 8 of that stream is the
/// counter. This matches the single-peer layout only.
pub fn parse_rx_bytes(output: &str) -> Result<u64, CounterError> {
    let tokens: Vec<&str> = output.split('\t').collect();
    let Some(field) = tokens.get(RX_BYTES_FIELD) else {
        return Err(CounterError::Parse(format!(
            "expected at least {} tab-separated fields, got {}",
            RX_BYTES_FIELD + 1,
            tokens.len()
        )));
    };

    let field = field.trim();
    field
        .parse::<u64>()
        .map_err(|err| CounterError::Parse(format!("field {RX_BYTES_FIELD} is {field:?}: {err}")))
}
