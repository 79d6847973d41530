/// Notification intake and document retrieval.
///
/// Submodules:
/// - `intake`: transport callback boundary; queues announced documents.
/// - `mqtt`: broker connection driving the intake callbacks.
/// - `knmi`: open data API client.
/// - `acquire`: drains the queue into the local document with retries.

pub mod acquire;
pub mod intake;
pub mod knmi;
pub mod mqtt;
