//! Replay tests: pictures in, command lists out

use std::sync::Arc;

use lumen_core::{
    BlendMode, BlurStyle, Color, CornerRadii, DrawCommand, GradientStop, Image, ImageFilter, ImageId,
    MaskFilter, Matrix3, Paint, Path, Picture, PictureRecorder, Point, RRect, Rect, Shader,
    TextBlob, TextShadow, TileMode,
};
use lumen_gpu::{
    gaussian_kernel, BoxGlyphShaper, CommandList, DeviceRect, FlushError, FlusherConfig,
    GlyphShaper, GpuCommand, LyonTessellator, PictureFlusher, ProgramKind, ShapedText,
    StencilMode, TargetId, TexMode, TextureSource,
};

fn flush(picture: &Picture) -> CommandList {
    PictureFlusher::new(FlusherConfig::testing())
        .flush(picture)
        .unwrap()
}

fn record(f: impl FnOnce(&mut PictureRecorder)) -> Picture {
    let mut recorder = PictureRecorder::new();
    f(&mut recorder);
    recorder.end_recording().unwrap()
}

fn rect_command(rect: Rect) -> DrawCommand {
    DrawCommand::DrawPath {
        path: Path::rect(rect),
        paint: Paint::fill(Color::RED),
    }
}

fn bind(target: TargetId, clear: bool) -> GpuCommand {
    GpuCommand::BindTarget { target, clear }
}

// ─────────────────────────────────────────────────────────────────────────────
// Save / restore balance
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_balanced_saves_flush() {
    let picture = record(|r| {
        r.save();
        r.translate(10.0, 10.0);
        r.save();
        r.clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        r.draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), Paint::fill(Color::RED));
        r.restore().unwrap();
        r.restore().unwrap();
    });
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    let list = flusher.flush(&picture).unwrap();
    assert_eq!(list.color_draws().count(), 1);
    assert_eq!(flusher.layer_stats().outstanding(), 0);
}

#[test]
fn test_extra_restore_is_error() {
    let picture = Picture::new(
        vec![
            DrawCommand::Save,
            DrawCommand::Restore,
            DrawCommand::Restore,
            rect_command(Rect::new(0.0, 0.0, 10.0, 10.0)),
        ],
        Rect::new(0.0, 0.0, 10.0, 10.0),
    );
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    assert_eq!(
        flusher.flush(&picture).err(),
        Some(FlushError::UnmatchedRestore { index: 2 })
    );

    // The flusher recovers for the next frame
    let ok = record(|r| r.draw_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Paint::fill(Color::RED)));
    assert_eq!(flusher.flush(&ok).unwrap().color_draws().count(), 1);
    assert_eq!(flusher.layer_stats().outstanding(), 0);
}

#[test]
fn test_aborted_flush_returns_meshes() {
    let picture = Picture::new(
        vec![
            rect_command(Rect::new(0.0, 0.0, 10.0, 10.0)),
            DrawCommand::Restore,
        ],
        Rect::new(0.0, 0.0, 10.0, 10.0),
    );
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    assert!(flusher.flush(&picture).is_err());
    assert_eq!(flusher.mesh_stats().outstanding(), 0);
    assert_eq!(flusher.layer_stats().outstanding(), 0);
}

#[test]
fn test_unbalanced_nested_picture_is_error() {
    let nested = Picture::new(vec![DrawCommand::Save], Rect::ZERO);
    let picture = record(|r| r.draw_picture(nested));
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    assert_eq!(
        flusher.flush(&picture).err(),
        Some(FlushError::UnbalancedPicture { depth: 1 })
    );
}

#[test]
fn test_nested_restore_cannot_pop_outer_save() {
    let nested = Picture::new(vec![DrawCommand::Restore], Rect::ZERO);
    let picture = record(|r| {
        r.save();
        r.draw_picture(nested);
        r.restore().unwrap();
    });
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    assert_eq!(
        flusher.flush(&picture).err(),
        Some(FlushError::UnmatchedRestore { index: 0 })
    );
}

#[test]
fn test_nested_picture_state_is_scoped() {
    let nested = record(|r| {
        r.translate(10.0, 0.0);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::RED));
    });
    let picture = record(|r| {
        r.draw_picture(nested);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::BLUE));
    });
    let list = flush(&picture);
    let draws: Vec<_> = list.color_draws().collect();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].uniforms.mesh_matrix[0][2], 10.0);
    assert_eq!(draws[1].uniforms.mesh_matrix[0][2], 0.0);
}

#[test]
fn test_deeply_nested_pictures() {
    let mut picture = Arc::new(record(|r| {
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::RED));
    }));
    for _ in 0..500 {
        let inner = picture.clone();
        picture = Arc::new(record(|r| r.draw_picture(inner)));
    }
    assert_eq!(flush(&picture).color_draws().count(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Clipping
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rect_clip_becomes_scissor() {
    let picture = record(|r| {
        r.save();
        r.clip_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        r.draw_rect(Rect::new(50.0, 50.0, 100.0, 100.0), Paint::fill(Color::RED));
        r.restore().unwrap();
    });
    let list = flush(&picture);

    assert_eq!(list.commands.len(), 3);
    assert_eq!(list.commands[0], bind(TargetId::SURFACE, true));
    assert_eq!(
        list.commands[1],
        GpuCommand::SetScissor(Some(DeviceRect::new(50, 50, 50, 50)))
    );
    let GpuCommand::Draw(draw) = &list.commands[2] else {
        panic!("expected a draw, got {:?}", list.commands[2]);
    };
    assert_eq!(draw.program, ProgramKind::Fill);
    assert_eq!(draw.uniforms.color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(draw.material.stencil, StencilMode::Always);
    assert_eq!(list.stencil_draws().count(), 0);
}

#[test]
fn test_rect_clips_intersect() {
    let picture = record(|r| {
        r.clip_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        r.clip_rect(Rect::new(50.0, 50.0, 100.0, 100.0));
        r.draw_rect(Rect::new(0.0, 0.0, 200.0, 200.0), Paint::fill(Color::RED));
    });
    let list = flush(&picture);
    let scissors: Vec<_> = list.scissors().collect();
    assert_eq!(scissors, vec![Some(DeviceRect::new(50, 50, 50, 50))]);
    assert_eq!(list.stencil_draws().count(), 0);
}

#[test]
fn test_disjoint_clips_draw_nothing() {
    let picture = record(|r| {
        r.save();
        r.clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        r.clip_rect(Rect::new(100.0, 100.0, 50.0, 50.0));
        r.draw_rect(Rect::new(0.0, 0.0, 200.0, 200.0), Paint::fill(Color::RED));
        r.restore().unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::BLUE));
    });
    let list = flush(&picture);
    let draws: Vec<_> = list.color_draws().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].uniforms.color, [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn test_draw_outside_clip_emits_nothing() {
    let picture = record(|r| {
        r.clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        r.draw_rect(Rect::new(100.0, 100.0, 20.0, 20.0), Paint::fill(Color::RED));
    });
    let list = flush(&picture);
    assert_eq!(list.commands, vec![bind(TargetId::SURFACE, true)]);
}

#[test]
fn test_duplicate_scissor_emitted_once() {
    let picture = record(|r| {
        r.clip_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        r.draw_rect(Rect::new(-10.0, -10.0, 150.0, 150.0), Paint::fill(Color::RED));
        r.draw_rect(Rect::new(-20.0, -20.0, 180.0, 180.0), Paint::fill(Color::BLUE));
    });
    let list = flush(&picture);
    assert_eq!(list.color_draws().count(), 2);
    assert_eq!(list.scissors().count(), 1);
}

#[test]
fn test_stencil_mask_rendered_once_per_clip() {
    let picture = record(|r| {
        r.clip_path(Path::circle(Point::new(100.0, 100.0), 80.0));
        r.draw_rect(Rect::new(40.0, 40.0, 120.0, 120.0), Paint::fill(Color::RED));
        r.draw_rect(Rect::new(40.0, 40.0, 120.0, 120.0), Paint::fill(Color::BLUE));
    });
    let list = flush(&picture);

    let programs: Vec<_> = list.stencil_draws().map(|d| d.program).collect();
    assert_eq!(
        programs,
        vec![
            ProgramKind::StencilClear,
            ProgramKind::StencilWrite,
            ProgramKind::StencilIntersect
        ]
    );
    assert!(list
        .color_draws()
        .all(|d| d.material.stencil == StencilMode::Equal));
    assert_eq!(list.color_draws().count(), 2);
}

#[test]
fn test_stencil_rerendered_for_new_bounds() {
    let picture = record(|r| {
        r.clip_path(Path::circle(Point::new(100.0, 100.0), 80.0));
        r.draw_rect(Rect::new(40.0, 40.0, 120.0, 120.0), Paint::fill(Color::RED));
        r.draw_rect(Rect::new(30.0, 30.0, 140.0, 140.0), Paint::fill(Color::BLUE));
    });
    assert_eq!(flush(&picture).stencil_draws().count(), 6);
}

#[test]
fn test_stencil_precedes_clipped_draw() {
    let picture = record(|r| {
        r.clip_path(Path::circle(Point::new(100.0, 100.0), 80.0));
        r.draw_rect(Rect::new(40.0, 40.0, 120.0, 120.0), Paint::fill(Color::RED));
    });
    let list = flush(&picture);
    let stencil = list
        .position(|c| matches!(c, GpuCommand::Draw(d) if d.program == ProgramKind::StencilIntersect))
        .unwrap();
    let draw = list
        .position(|c| matches!(c, GpuCommand::Draw(d) if d.program == ProgramKind::Fill))
        .unwrap();
    assert!(stencil < draw);
}

// ─────────────────────────────────────────────────────────────────────────────
// Layers
// ─────────────────────────────────────────────────────────────────────────────

fn layer_picture() -> Picture {
    record(|r| {
        r.save_layer(Rect::new(0.0, 0.0, 100.0, 100.0), Paint::opacity(0.5))
            .unwrap();
        r.draw_rect(Rect::new(10.0, 10.0, 50.0, 50.0), Paint::fill(Color::BLUE));
        r.restore().unwrap();
    })
}

#[test]
fn test_layer_renders_then_composites() {
    let list = flush(&layer_picture());
    let layer = TargetId(1);

    assert_eq!(list.commands.len(), 7);
    assert_eq!(list.commands[0], bind(TargetId::SURFACE, true));
    let GpuCommand::AllocateTarget(desc) = &list.commands[1] else {
        panic!("expected an allocation, got {:?}", list.commands[1]);
    };
    assert_eq!((desc.id, desc.width, desc.height, desc.samples), (layer, 100, 100, 1));
    assert_eq!(list.commands[2], bind(layer, true));

    let GpuCommand::Draw(content) = &list.commands[3] else {
        panic!("expected the layer content");
    };
    assert_eq!(content.uniforms.color, [0.0, 0.0, 1.0, 1.0]);

    assert_eq!(list.commands[4], bind(TargetId::SURFACE, false));
    let GpuCommand::Draw(composite) = &list.commands[5] else {
        panic!("expected the composite");
    };
    assert_eq!(composite.program, ProgramKind::Texture);
    assert_eq!(composite.texture, Some(TextureSource::Target(layer)));
    assert_eq!(composite.uniforms.color[3], 0.5);
    assert_eq!(composite.uniforms.tex_mode, TexMode::Target as u32);
    assert_eq!(list.commands[6], GpuCommand::ReleaseTarget(layer));
}

#[test]
fn test_layer_target_scaled_by_device_pixel_ratio() {
    let config = FlusherConfig::testing().with_device_pixel_ratio(2.0);
    let list = PictureFlusher::new(config)
        .flush(&layer_picture())
        .unwrap();
    let desc = list.targets().next().unwrap();
    assert_eq!((desc.width, desc.height), (200, 200));
}

#[test]
fn test_layer_uses_msaa_samples() {
    let config = FlusherConfig::testing().with_msaa_samples(4);
    let list = PictureFlusher::new(config)
        .flush(&layer_picture())
        .unwrap();
    assert_eq!(list.targets().next().unwrap().samples, 4);
}

#[test]
fn test_target_ids_restart_each_flush() {
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    let picture = layer_picture();
    for _ in 0..2 {
        let list = flusher.flush(&picture).unwrap();
        assert_eq!(list.targets().next().unwrap().id, TargetId(1));
        flusher.reclaim(list);
    }
}

#[test]
fn test_nested_layers_release_in_order() {
    let picture = record(|r| {
        r.save_layer(Rect::new(0.0, 0.0, 100.0, 100.0), Paint::default())
            .unwrap();
        r.save_layer(Rect::new(10.0, 10.0, 50.0, 50.0), Paint::opacity(0.5))
            .unwrap();
        r.draw_rect(Rect::new(10.0, 10.0, 20.0, 20.0), Paint::fill(Color::RED));
        r.restore().unwrap();
        r.restore().unwrap();
    });
    let list = flush(&picture);
    let allocated: Vec<_> = list.targets().map(|t| t.id).collect();
    assert_eq!(allocated, vec![TargetId(1), TargetId(2)]);

    let released: Vec<_> = list
        .commands
        .iter()
        .filter_map(|c| match c {
            GpuCommand::ReleaseTarget(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(released, vec![TargetId(2), TargetId(1)]);

    let inner_composite = list
        .position(|c| {
            matches!(c, GpuCommand::Draw(d) if d.texture == Some(TextureSource::Target(TargetId(2))))
        })
        .unwrap();
    let inner_release = list
        .position(|c| *c == GpuCommand::ReleaseTarget(TargetId(2)))
        .unwrap();
    assert!(inner_composite < inner_release);
}

#[test]
fn test_raw_save_layer_composites() {
    let picture = Picture::new(
        vec![
            DrawCommand::SaveLayer {
                bounds: Rect::new(0.0, 0.0, 50.0, 50.0),
                paint: Paint::default(),
            },
            rect_command(Rect::new(0.0, 0.0, 10.0, 10.0)),
            DrawCommand::Restore,
        ],
        Rect::new(0.0, 0.0, 50.0, 50.0),
    );
    let list = flush(&picture);
    assert!(list
        .color_draws()
        .any(|d| d.texture == Some(TextureSource::Target(TargetId(1)))));
}

#[test]
fn test_backdrop_blur_samples_parent() {
    let picture = record(|r| {
        r.draw_rect(Rect::new(0.0, 0.0, 200.0, 200.0), Paint::fill(Color::GREEN));
        r.save_layer(
            Rect::new(50.0, 50.0, 100.0, 100.0),
            Paint::default().with_backdrop(ImageFilter::blur(4.0, 4.0)),
        )
        .unwrap();
        r.restore().unwrap();
    });
    let list = flush(&picture);

    // Layer, copy of the backdrop, horizontal pass
    assert_eq!(list.targets().count(), 3);
    let copy = list
        .position(|c| {
            matches!(c, GpuCommand::Draw(d) if d.texture == Some(TextureSource::Target(TargetId::SURFACE)))
        })
        .unwrap();
    let background = list
        .position(|c| matches!(c, GpuCommand::Draw(d) if d.program == ProgramKind::Fill))
        .unwrap();
    assert!(background < copy);

    let blurs: Vec<_> = list
        .color_draws()
        .filter(|d| d.program == ProgramKind::Blur)
        .collect();
    assert_eq!(blurs.len(), 2);
    assert!(blurs.iter().all(|d| d.material.blend == BlendMode::Src));
}

#[test]
fn test_backdrop_matrix_is_single_copy() {
    let picture = record(|r| {
        r.save_layer(
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Paint::default().with_backdrop(ImageFilter::matrix(
                Matrix3::scale(2.0, 2.0),
                Default::default(),
            )),
        )
        .unwrap();
        r.restore().unwrap();
    });
    let list = flush(&picture);
    assert_eq!(list.targets().count(), 1);
    let copies = list
        .color_draws()
        .filter(|d| d.texture == Some(TextureSource::Target(TargetId::SURFACE)))
        .count();
    assert_eq!(copies, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Blur
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_kernels_are_normalized() {
    for sigma in [0.5, 1.0, 2.0, 3.5, 4.0] {
        let radius = (3.0 * sigma as f32).ceil() as u32;
        let kernel = gaussian_kernel(sigma, radius, 25);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sigma {} sums to {}", sigma, sum);
        assert!(kernel.len() <= 25);
    }
}

#[test]
fn test_mask_blur_uses_two_passes() {
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(50.0, 50.0, 50.0, 50.0),
            Paint::fill(Color::RED).with_mask_filter(MaskFilter::blur(BlurStyle::Normal, 3.0)),
        );
    });
    let list = flush(&picture);

    // Shape bounds grown by 3 sigma, not the whole surface
    let targets: Vec<_> = list.targets().collect();
    assert_eq!(targets.len(), 2);
    assert!(targets.iter().all(|t| t.samples == 1));
    assert!(targets.iter().all(|t| (t.width, t.height) == (68, 68)));

    let last = list.color_draws().last().unwrap();
    assert_eq!(last.program, ProgramKind::Blur);
    assert_eq!(last.uniforms.tex_mode, TexMode::Alpha as u32);
    assert_eq!(last.uniforms.color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(last.texture, Some(TextureSource::Target(TargetId(2))));
}

#[test]
fn test_mask_blur_target_clamped_to_clip() {
    let picture = record(|r| {
        r.clip_rect(Rect::new(0.0, 0.0, 80.0, 80.0));
        r.draw_rect(
            Rect::new(50.0, 50.0, 50.0, 50.0),
            Paint::fill(Color::RED).with_mask_filter(MaskFilter::blur(BlurStyle::Normal, 3.0)),
        );
    });
    let list = flush(&picture);

    let sizes: Vec<_> = list.targets().map(|t| (t.width, t.height)).collect();
    assert_eq!(sizes, vec![(39, 39), (39, 39)]);
}

#[test]
fn test_mask_blur_outside_surface_draws_nothing() {
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(300.0, 300.0, 20.0, 20.0),
            Paint::fill(Color::RED).with_mask_filter(MaskFilter::blur(BlurStyle::Normal, 3.0)),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.targets().count(), 0);
    assert_eq!(list.color_draws().count(), 0);
}

#[test]
fn test_solid_blur_redraws_shape() {
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(50.0, 50.0, 50.0, 50.0),
            Paint::fill(Color::RED).with_mask_filter(MaskFilter::blur(BlurStyle::Solid, 3.0)),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.color_draws().last().unwrap().program, ProgramKind::Fill);
}

#[test]
fn test_shadow_under_rotation_falls_back_to_mask() {
    let picture = record(|r| {
        r.rotate_about(0.5, Point::new(100.0, 100.0));
        r.draw_rect(
            Rect::new(50.0, 50.0, 60.0, 40.0),
            Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(4.0)),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.targets().count(), 2);
    assert!(list
        .color_draws()
        .all(|d| d.program != ProgramKind::ShadowBox));
}

#[test]
fn test_uneven_rrect_shadow_falls_back_to_mask() {
    let tab = RRect {
        rect: Rect::new(50.0, 50.0, 60.0, 40.0),
        radii: CornerRadii {
            top_left: 12.0,
            top_right: 12.0,
            bottom_right: 0.0,
            bottom_left: 0.0,
        },
    };
    let picture = record(|r| {
        r.draw_rrect(tab, Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(4.0)));
    });
    let list = flush(&picture);
    assert_eq!(list.targets().count(), 2);
    assert!(list
        .color_draws()
        .all(|d| d.program != ProgramKind::ShadowRoundBox));
}

#[test]
fn test_square_shadow_uses_box_program() {
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(50.0, 50.0, 60.0, 40.0),
            Paint::fill(Color::BLACK).with_mask_filter(MaskFilter::shadow(2.0)),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.targets().count(), 0);
    assert_eq!(
        list.color_draws().next().unwrap().program,
        ProgramKind::ShadowBox
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Paint
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_picture_shader_is_unsupported() {
    let shader = Shader::Picture {
        picture: Arc::new(Picture::default()),
        tile_mode: TileMode::Clamp,
        local_matrix: Matrix3::IDENTITY,
    };
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Paint::fill(Color::RED).with_shader(shader),
        );
    });
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    assert_eq!(
        flusher.flush(&picture).err(),
        Some(FlushError::UnsupportedShader { kind: "picture" })
    );
    assert_eq!(flusher.mesh_stats().outstanding(), 0);
}

#[test]
fn test_gradients_share_ramps() {
    let gradient = || {
        Shader::linear(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            [
                GradientStop::new(0.0, Color::RED),
                GradientStop::new(1.0, Color::BLUE),
            ],
        )
    };
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(0.0, 0.0, 100.0, 50.0),
            Paint::fill(Color::WHITE).with_shader(gradient()),
        );
        r.draw_rect(
            Rect::new(0.0, 50.0, 100.0, 50.0),
            Paint::fill(Color::WHITE).with_shader(gradient()),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.gradients.len(), 1);
    assert!(list
        .color_draws()
        .all(|d| d.shader_texture == Some(TextureSource::Gradient(0))));
}

#[test]
fn test_advanced_blend_falls_back_to_src_over() {
    let picture = record(|r| {
        r.draw_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Paint::fill(Color::RED).with_blend_mode(BlendMode::Multiply),
        );
    });
    let list = flush(&picture);
    assert_eq!(
        list.color_draws().next().unwrap().material.blend,
        BlendMode::SrcOver
    );
}

#[test]
fn test_thin_stroke_fades_alpha() {
    let picture = record(|r| {
        r.draw_path(
            Path::line(Point::new(10.0, 10.0), Point::new(100.0, 10.0)),
            Paint::stroke(Color::BLACK, 0.5),
        );
        r.draw_path(
            Path::line(Point::new(10.0, 20.0), Point::new(100.0, 20.0)),
            Paint::stroke(Color::BLACK, 0.0),
        );
    });
    let list = flush(&picture);
    let alphas: Vec<f32> = list.color_draws().map(|d| d.uniforms.alpha).collect();
    assert_eq!(alphas.len(), 2);
    assert!(alphas[0] < 1.0 && alphas[0] > 0.0);
    assert_eq!(alphas[1], 1.0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Images
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_image_draw_registers_pixels() {
    let image = Image::solid(ImageId(7), 4, 4, Color::RED);
    let picture = record(|r| {
        r.draw_image(image.clone(), Point::new(10.0, 10.0), Paint::default());
        r.draw_image_rect(
            image,
            Some(Rect::new(0.0, 0.0, 2.0, 2.0)),
            Rect::new(50.0, 50.0, 20.0, 20.0),
            Paint::default(),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.images.len(), 1);
    let draws: Vec<_> = list.color_draws().collect();
    assert_eq!(draws.len(), 2);
    assert!(draws
        .iter()
        .all(|d| d.texture == Some(TextureSource::Image(ImageId(7)))
            && d.uniforms.tex_mode == TexMode::Image as u32));
}

#[test]
fn test_nine_patch_has_nine_cells() {
    let image = Image::solid(ImageId(3), 12, 12, Color::BLUE);
    let picture = record(|r| {
        r.draw_image_nine(
            image,
            None,
            Rect::new(4.0, 4.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 100.0, 60.0),
            Paint::default(),
        );
    });
    let list = flush(&picture);
    assert_eq!(list.color_draws().next().unwrap().index_count, 9 * 6);
}

#[test]
fn test_invalid_image_is_skipped() {
    let image = Image::new(ImageId(1), 4, 4, vec![0u8; 3]);
    let picture = record(|r| r.draw_image(image, Point::ZERO, Paint::default()));
    let list = flush(&picture);
    assert_eq!(list.color_draws().count(), 0);
    assert!(list.images.is_empty());
}

#[test]
fn test_invalid_image_shader_is_skipped() {
    let image = Image::new(ImageId(4), 4, 4, vec![0u8; 3]);
    let picture = record(|r| {
        r.clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        r.draw_rect(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Paint::fill(Color::RED).with_shader(Shader::image(image)),
        );
    });
    let mut flusher = PictureFlusher::new(FlusherConfig::testing());
    let list = flusher.flush(&picture).unwrap();
    assert_eq!(list.color_draws().count(), 0);
    assert!(list.images.is_empty());
    assert_eq!(flusher.mesh_stats().outstanding(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Text
// ─────────────────────────────────────────────────────────────────────────────

fn blob() -> TextBlob {
    TextBlob::new("hi", 12.0, Rect::new(0.0, 0.0, 40.0, 14.0))
}

#[test]
fn test_text_draws_one_quad_per_glyph() {
    let picture = record(|r| r.draw_text_blob(blob(), Point::new(20.0, 20.0), Paint::fill(Color::BLACK)));
    let list = flush(&picture);
    let draw = list.color_draws().next().unwrap();
    assert_eq!(draw.program, ProgramKind::Texture);
    assert_eq!(draw.index_count, 12);
    assert_eq!(draw.uniforms.tex_mode, TexMode::Alpha as u32);
    assert_eq!(draw.uniforms.mesh_matrix[0][2], 20.0);
    assert_eq!(draw.uniforms.mesh_matrix[1][2], 20.0);
}

#[test]
fn test_text_shadows_draw_first() {
    let text = blob()
        .with_shadow(TextShadow {
            offset: Point::new(2.0, 2.0),
            color: Color::GRAY,
            blur_sigma: 0.0,
        })
        .with_shadow(TextShadow {
            offset: Point::new(0.0, 4.0),
            color: Color::BLACK,
            blur_sigma: 2.0,
        });
    let picture = record(|r| r.draw_text_blob(text, Point::ZERO, Paint::fill(Color::RED)));
    let list = flush(&picture);

    // The blurred shadow renders through two mask targets
    assert_eq!(list.targets().count(), 2);
    let last = list.color_draws().last().unwrap();
    assert_eq!(last.program, ProgramKind::Texture);
    assert_eq!(last.uniforms.color, [1.0, 0.0, 0.0, 1.0]);
    let first = list.color_draws().next().unwrap();
    assert_eq!(first.uniforms.color, Color::GRAY.to_array());
}

#[test]
fn test_color_atlas_keeps_glyph_colors() {
    let shaper = BoxGlyphShaper::new().with_color_atlas(Image::solid(ImageId(9), 2, 2, Color::GREEN));
    let mut flusher =
        PictureFlusher::with_collaborators(FlusherConfig::testing(), LyonTessellator::new(), shaper);
    let picture = record(|r| {
        r.draw_text_blob(blob(), Point::ZERO, Paint::fill(Color::RED.with_alpha(0.5)));
    });
    let list = flusher.flush(&picture).unwrap();
    let draw = list.color_draws().next().unwrap();
    assert_eq!(draw.uniforms.tex_mode, TexMode::Image as u32);
    assert_eq!(draw.uniforms.color, [1.0, 1.0, 1.0, 0.5]);
}

struct PendingShaper;

impl GlyphShaper for PendingShaper {
    fn shape(&mut self, _blob: &TextBlob, _scale: f32) -> Option<ShapedText> {
        None
    }
}

#[test]
fn test_text_skipped_until_atlas_ready() {
    let mut flusher = PictureFlusher::with_collaborators(
        FlusherConfig::testing(),
        LyonTessellator::new(),
        PendingShaper,
    );
    let picture = record(|r| {
        r.draw_text_blob(blob(), Point::ZERO, Paint::fill(Color::BLACK));
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Paint::fill(Color::RED));
    });
    let list = flusher.flush(&picture).unwrap();
    assert_eq!(list.color_draws().count(), 1);
    assert_eq!(flusher.mesh_stats().outstanding(), 0);
}
