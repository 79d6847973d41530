/// Home-automation sinks that receive the warning result.
///
/// Submodules:
/// - `domoticz`: Domoticz JSON API client.

pub mod domoticz;

pub use domoticz::Domoticz;
