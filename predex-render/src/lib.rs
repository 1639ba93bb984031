pub mod font;
pub mod render;
pub use font::{load_font, FONT_CANDIDATES};
pub use render::{wrap_words, EntryLayout, EntryView, SkiaRenderer};
