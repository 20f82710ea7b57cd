pub mod config;
pub mod counter;
pub mod monitor;
pub mod outcome;
pub mod runner;


pub use config::{ConfigError, MonitorConfig};
pub use counter::{parse_rx_bytes, CounterError, CounterSource, WgCounterSource};
pub use monitor::{Monitor, MonitorState};
pub use outcome::{RecoveryReport, RecoveryStep, StepReport, TickOutcome};
pub use runner::{CommandOutcome, CommandRunner, ShellRunner};
