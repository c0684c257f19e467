//! Built-in sample pictures
//!
//! Each sample exercises one engine path end to end:
//! - `clip` - rect clips merged into a scissor, a circle clip on the stencil
//! - `layer` - a translucent layer composited over a background
//! - `shadow` - analytic rounded-rect shadows and a blurred mask fallback
//! - `backdrop` - a frosted panel blurring what is behind it

use clap::ValueEnum;
use lumen_core::{
    BlurStyle, Color, GradientStop, ImageFilter, MaskFilter, Paint, Path, Picture,
    PictureRecorder, Point, RRect, Rect, Result, Shader,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Sample {
    Clip,
    Layer,
    Shadow,
    Backdrop,
}

impl Sample {
    pub fn build(self) -> Result<Picture> {
        let mut recorder = PictureRecorder::new();
        match self {
            Sample::Clip => clip(&mut recorder)?,
            Sample::Layer => layer(&mut recorder)?,
            Sample::Shadow => shadow(&mut recorder)?,
            Sample::Backdrop => backdrop(&mut recorder)?,
        }
        recorder.end_recording()
    }
}

fn background(recorder: &mut PictureRecorder) {
    recorder.draw_rect(
        Rect::new(0.0, 0.0, 800.0, 600.0),
        Paint::fill(Color::WHITE).with_shader(Shader::linear(
            Point::new(0.0, 0.0),
            Point::new(0.0, 600.0),
            [
                GradientStop::new(0.0, Color::from_hex(0xf0f4ff)),
                GradientStop::new(1.0, Color::from_hex(0xc8d4f0)),
            ],
        )),
    );
}

fn clip(recorder: &mut PictureRecorder) -> Result<()> {
    background(recorder);

    recorder.save();
    recorder.clip_rect(Rect::new(100.0, 100.0, 300.0, 300.0));
    recorder.clip_rect(Rect::new(200.0, 200.0, 300.0, 300.0));
    recorder.draw_rect(Rect::new(0.0, 0.0, 800.0, 600.0), Paint::fill(Color::RED));
    recorder.restore()?;

    recorder.save();
    recorder.clip_path(Path::circle(Point::new(600.0, 300.0), 120.0));
    for i in 0..6 {
        let y = 180.0 + i as f32 * 40.0;
        let color = if i % 2 == 0 { Color::BLUE } else { Color::GREEN };
        recorder.draw_rect(Rect::new(480.0, y, 240.0, 40.0), Paint::fill(color));
    }
    recorder.restore()
}

fn layer(recorder: &mut PictureRecorder) -> Result<()> {
    background(recorder);
    recorder.draw_circle(Point::new(300.0, 300.0), 150.0, Paint::fill(Color::RED));

    recorder.save_layer(Rect::new(250.0, 150.0, 400.0, 300.0), Paint::opacity(0.5))?;
    recorder.draw_rrect(
        RRect::new(Rect::new(250.0, 150.0, 400.0, 300.0), 24.0),
        Paint::fill(Color::BLUE),
    );
    recorder.draw_path(
        Path::line(Point::new(270.0, 170.0), Point::new(630.0, 430.0)),
        Paint::stroke(Color::WHITE, 6.0),
    );
    recorder.restore()
}

fn shadow(recorder: &mut PictureRecorder) -> Result<()> {
    background(recorder);

    for (i, sigma) in [2.0, 6.0, 12.0].into_iter().enumerate() {
        let card = RRect::new(
            Rect::new(80.0 + i as f32 * 230.0, 120.0, 180.0, 120.0),
            12.0,
        );
        recorder.draw_rrect(
            RRect::new(card.rect.offset(0.0, sigma * 0.5), 12.0),
            Paint::fill(Color::BLACK.with_alpha(0.4)).with_mask_filter(MaskFilter::shadow(sigma)),
        );
        recorder.draw_rrect(card, Paint::fill(Color::WHITE));
    }

    // Rotated shadows leave the analytic path
    recorder.save();
    recorder.rotate_about(0.3, Point::new(400.0, 420.0));
    recorder.draw_rect(
        Rect::new(320.0, 370.0, 160.0, 100.0),
        Paint::fill(Color::BLACK.with_alpha(0.4)).with_mask_filter(MaskFilter::shadow(8.0)),
    );
    recorder.restore()?;

    recorder.draw_circle(
        Point::new(650.0, 450.0),
        60.0,
        Paint::fill(Color::BLUE).with_mask_filter(MaskFilter::blur(BlurStyle::Normal, 5.0)),
    );
    Ok(())
}

fn backdrop(recorder: &mut PictureRecorder) -> Result<()> {
    background(recorder);
    for i in 0..8 {
        let x = 60.0 + i as f32 * 90.0;
        let color = if i % 2 == 0 { Color::RED } else { Color::BLUE };
        recorder.draw_circle(Point::new(x, 300.0), 50.0, Paint::fill(color));
    }

    let panel = Rect::new(150.0, 200.0, 500.0, 200.0);
    recorder.save_layer(
        panel,
        Paint::default().with_backdrop(ImageFilter::blur(8.0, 8.0)),
    )?;
    recorder.draw_rrect(
        RRect::new(panel, 16.0),
        Paint::fill(Color::WHITE.with_alpha(0.3)),
    );
    recorder.restore()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sample_records() {
        for sample in Sample::value_variants() {
            let picture = sample.build().unwrap();
            assert!(!picture.is_empty(), "{:?}", sample);
        }
    }

    #[test]
    fn test_samples_flush() {
        use lumen_gpu::{FlusherConfig, PictureFlusher};

        let mut flusher = PictureFlusher::new(FlusherConfig::standard());
        for sample in Sample::value_variants() {
            let picture = sample.build().unwrap();
            let list = flusher.flush(&picture).unwrap();
            assert!(list.summary().draws > 0, "{:?}", sample);
            flusher.reclaim(list);
        }
    }
}
