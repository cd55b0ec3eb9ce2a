//! What the bridge draws itself.
//!
//! - **renderer**: raw mode, frame assembly, repaint of the game after an overlay
//! - **overlay**: help, map and debug boxes
//!
//! # Frame
//!
//! ```text
//! base view   (repainted from the screen mirror only when an overlay was up)
//! └── overlay (help / map / debug, centered, cursor saved and restored)
//! ```

pub mod overlay;
pub mod renderer;

pub use overlay::{DebugInfo, Overlay};
pub use renderer::Renderer;
