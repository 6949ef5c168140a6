//! Image decoder pipeline: DEFLATE (G), PNG (H), JPEG (I) — all emitting
//! row callbacks of RGB565 pixels (spec §4.5, §4.6).

pub mod deflate;
pub mod jpeg;
pub mod png;
