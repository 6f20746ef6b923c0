pub mod render;
pub use render::{
    decode_image, render_text_pixmap, slide_progress, tile_offset, ChoiceLayout, FrameStats, TileRenderer,
    PALETTE, SLIDE_DURATION,
};
