// Bananashop Core Library
// Scene model, transforms, undo history, interaction and compositing

pub mod error;
pub mod transform;
pub mod layer;
pub mod scene;
pub mod hit_test;
pub mod history;
pub mod tool;
pub mod store;
pub mod interaction;
pub mod image_io;
pub mod renderer;
pub mod scheduler;
pub mod export;
pub mod ai;
pub mod shortcuts;
pub mod credentials;

pub use error::EditorError;
pub use layer::{Layer, LayerId};
pub use store::{EditorState, EditorStore};
