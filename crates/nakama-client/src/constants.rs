//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default application namespace under which the social graph is stored.
pub const DEFAULT_NAMESPACE: &str = "dapp";

/// Bound on every one-shot store read. A read that yields nothing within
/// this window counts as "not found"; there is no retry.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Capacity of the process-wide block signal bus.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 64;

/// A self-declared alias is cut at the first occurrence of this character
/// (`alice.eth` → `alice`).
pub const ALIAS_DELIMITER: char = '.';

/// File name of the client config under the user config directory.
pub const CONFIG_FILE_NAME: &str = "client.ron";
