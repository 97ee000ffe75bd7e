//! Model components: embedding streams, the distance scorer, the combined
//! pair model, and the tensor bridge from flat feature buffers.

pub mod bridge;
pub mod distance;
pub mod embedder;
pub mod pair;
