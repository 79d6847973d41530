// Weather warning bridge: KNMI warning notifications to a Domoticz device.
//
// Data flow: notification -> `ingest::intake` -> `queue` ->
// `ingest::acquire` -> local document -> `warnings` -> `sink`, all paced
// by the `scheduler` control loop.

pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod warnings;
