/// Warning document handling.
///
/// Submodules:
/// - `document`: XML to element tree, in document order.
/// - `extract`: aggregates one location's warnings into a `WarningResult`.
/// - `render`: weekday/hour header and operator text.

pub mod document;
pub mod extract;
pub mod render;

pub use extract::{LocalDocument, WarningExtractor};
pub use render::Renderer;
