//! Lumen Core
//!
//! Value types shared by picture producers and the Lumen compositing engine:
//!
//! - **Geometry**: points, sizes, rects, rounded rects and 3x3 transforms
//! - **Paint**: colors, blend modes, stroke parameters, gradient and image
//!   shaders, mask filters and backdrop filters
//! - **Content**: vector paths, decoded images and pre-laid-out text runs
//! - **Pictures**: immutable command logs and the recorder that builds them
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{Color, Paint, PictureRecorder, Rect};
//!
//! let mut recorder = PictureRecorder::new();
//! recorder.save_layer(Rect::new(0.0, 0.0, 100.0, 100.0), Paint::opacity(0.5)).unwrap();
//! recorder.draw_rect(Rect::new(0.0, 0.0, 100.0, 100.0), Paint::fill(Color::BLUE));
//! recorder.restore().unwrap();
//!
//! let picture = recorder.end_recording().unwrap();
//! assert_eq!(picture.len(), 3);
//! ```

pub mod color;
pub mod error;
pub mod geometry;
pub mod image;
pub mod matrix;
pub mod paint;
pub mod path;
pub mod picture;
pub mod text;

pub use color::Color;
pub use error::{PictureError, Result};
pub use geometry::{CornerRadii, Point, RRect, Rect, Size};
pub use image::{Image, ImageId};
pub use matrix::Matrix3;
pub use paint::{
    BlendMode, BlurStyle, FilterMode, GradientStop, GradientStops, ImageFilter, MaskFilter, Paint,
    PaintStyle, Shader, StrokeCap, StrokeJoin, TileMode,
};
pub use path::{Path, PathCommand, PathShape};
pub use picture::{DrawCommand, Picture, PictureRecorder};
pub use text::{TextBlob, TextShadow};
