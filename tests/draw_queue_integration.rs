//! End-to-end ordering, clipping, batching, and macro behavior rendered
//! through the software backend.

use rstest::rstest;

use tessera::{
    BlendMode, Bitmap, ImageFlags, Color, Graphics, GraphicsConfig, GraphicsError, ImageData,
    SoftwareRenderer, Transform,
};

fn graphics(width: u32, height: u32) -> Graphics<SoftwareRenderer> {
    let config = GraphicsConfig {
        page_size: 64,
        large_tile_size: 16,
    };
    Graphics::with_config(SoftwareRenderer::new(width, height), width, height, config).unwrap()
}

fn fill_rect(g: &mut Graphics<SoftwareRenderer>, color: Color, z: f32) {
    let (w, h) = (g.width() as f32, g.height() as f32);
    g.draw_rect(0.0, 0.0, w, h, color, z, BlendMode::Alpha);
}

#[test]
fn higher_z_renders_on_top_regardless_of_submission_order() {
    let mut g = graphics(8, 8);
    fill_rect(&mut g, Color::GREEN, 5.0);
    fill_rect(&mut g, Color::RED, 1.0);
    fill_rect(&mut g, Color::BLUE, 3.0);
    g.flush().unwrap();
    assert_eq!(g.renderer().screen().pixel(4, 4), Color::GREEN);
}

#[test]
fn equal_z_keeps_painters_order() {
    let mut g = graphics(8, 8);
    fill_rect(&mut g, Color::RED, 2.0);
    fill_rect(&mut g, Color::GREEN, 2.0);
    fill_rect(&mut g, Color::BLUE, 2.0);
    g.flush().unwrap();
    // Last submitted wins among equal Z.
    assert_eq!(g.renderer().screen().pixel(4, 4), Color::BLUE);
}

#[test]
fn ascending_z_submissions_render_in_submission_order() {
    let mut g = graphics(8, 8);
    fill_rect(&mut g, Color::RED, 1.0);
    fill_rect(&mut g, Color::GREEN, 2.0);
    fill_rect(&mut g, Color::GREEN, 2.0);
    fill_rect(&mut g, Color::BLUE, 3.0);
    g.flush().unwrap();
    assert_eq!(g.renderer().screen().pixel(4, 4), Color::BLUE);
}

#[rstest]
#[case((0, 0, 100, 100), (50, 50, 100, 100), Some((50, 50, 50, 50)))]
#[case((0, 0, 10, 10), (2, 2, 4, 4), Some((2, 2, 4, 4)))]
#[case((0, 0, 10, 10), (20, 20, 10, 10), None)]
fn nested_clip_intersections(
    #[case] outer: (i32, i32, u32, u32),
    #[case] inner: (i32, i32, u32, u32),
    #[case] expected: Option<(i32, i32, u32, u32)>,
) {
    use tessera::graphics::clip_stack::{ClipRect, ClipRectStack};

    let mut stack = ClipRectStack::new();
    stack.begin_clipping(outer.0, outer.1, outer.2, outer.3);
    stack.begin_clipping(inner.0, inner.1, inner.2, inner.3);
    match expected {
        Some((x, y, w, h)) => {
            assert_eq!(stack.effective_rect(), Some(ClipRect::new(x, y, w, h)));
            assert!(!stack.is_fully_clipped());
        }
        None => {
            assert!(stack.is_fully_clipped());
        }
    }
}

#[test]
fn clipping_limits_rendered_pixels() {
    let mut g = graphics(8, 8);
    g.begin_clipping(2, 2, 3, 3).unwrap();
    fill_rect(&mut g, Color::RED, 0.0);
    g.end_clipping().unwrap();
    g.flush().unwrap();

    let screen = g.renderer().screen();
    assert_eq!(screen.pixel(1, 1), Color::NONE);
    assert_eq!(screen.pixel(2, 2), Color::RED);
    assert_eq!(screen.pixel(4, 4), Color::RED);
    assert_eq!(screen.pixel(5, 5), Color::NONE);
}

#[test]
fn fully_clipped_scope_submits_nothing() {
    let mut g = graphics(8, 8);
    g.begin_clipping(0, 0, 4, 4).unwrap();
    g.begin_clipping(6, 6, 2, 2).unwrap();
    fill_rect(&mut g, Color::RED, 0.0);
    fill_rect(&mut g, Color::GREEN, 1.0);
    g.end_clipping().unwrap();
    g.end_clipping().unwrap();

    let stats = g.flush().unwrap();
    assert_eq!(stats.ops, 0);
    assert_eq!(stats.draw_calls, 0);
}

#[test]
fn clip_underflow_is_reported() {
    let mut g = graphics(8, 8);
    assert!(matches!(
        g.end_clipping(),
        Err(GraphicsError::ClipStackUnderflow)
    ));
}

#[test]
fn same_texture_quads_batch_into_one_draw_call() {
    let mut g = graphics(32, 32);
    let image = g
        .create_image(&Bitmap::filled(4, 4, Color::RED), ImageFlags::NONE)
        .unwrap();
    for i in 0..6 {
        g.draw_image(&image, (i * 5) as f32, 0.0, 0.0, Color::WHITE, BlendMode::Alpha);
    }
    let stats = g.flush().unwrap();
    assert_eq!(stats.ops, 6);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.texture_binds, 1);
}

#[test]
fn interleaved_state_still_flushes_in_order() {
    let mut g = graphics(16, 16);
    let image = g
        .create_image(&Bitmap::filled(16, 16, Color::GREEN), ImageFlags::NONE)
        .unwrap();
    fill_rect(&mut g, Color::RED, 0.0);
    g.draw_image(&image, 0.0, 0.0, 1.0, Color::WHITE, BlendMode::Alpha);
    fill_rect(&mut g, Color::BLUE, 2.0);

    let stats = g.flush().unwrap();
    // Three state runs: untextured, textured, untextured.
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(g.renderer().screen().pixel(8, 8), Color::BLUE);
}

#[test]
fn transforms_apply_at_submission_time() {
    let mut g = graphics(16, 16);
    g.push_transform(&Transform::translate(8.0, 0.0));
    g.draw_rect(0.0, 0.0, 4.0, 4.0, Color::RED, 0.0, BlendMode::Alpha);
    g.pop_transform().unwrap();
    // Popped before this submission, so it lands untranslated.
    g.draw_rect(0.0, 8.0, 4.0, 4.0, Color::BLUE, 0.0, BlendMode::Alpha);
    g.flush().unwrap();

    let screen = g.renderer().screen();
    assert_eq!(screen.pixel(9, 1), Color::RED);
    assert_eq!(screen.pixel(1, 1), Color::NONE);
    assert_eq!(screen.pixel(1, 9), Color::BLUE);
}

#[test]
fn empty_recording_round_trips_transparent() {
    let mut g = graphics(16, 16);
    let mac = g.record(6, 9, |_| Ok(())).unwrap();
    assert_eq!(mac.width(), 6);
    assert_eq!(mac.height(), 9);

    let bitmap = g.image_to_bitmap(&mac).unwrap();
    assert_eq!(bitmap.width(), 6);
    assert_eq!(bitmap.height(), 9);
    assert!(bitmap.pixels().iter().all(|&p| p == Color::NONE));
}

#[test]
fn macro_insert_is_a_logic_error() {
    let mut g = graphics(16, 16);
    let mac = g.record(4, 4, |_| Ok(())).unwrap();
    let patch = Bitmap::filled(2, 2, Color::RED);
    assert!(matches!(
        g.insert_into_image(&mac, &patch, 0, 0),
        Err(GraphicsError::FrozenMacro)
    ));
}

#[test]
fn macro_replays_its_recorded_ops() {
    let mut g = graphics(16, 16);
    let mac = g
        .record(8, 8, |g| {
            g.draw_rect(0.0, 0.0, 8.0, 8.0, Color::RED, 0.0, BlendMode::Alpha);
            Ok(())
        })
        .unwrap();

    g.draw_image(&mac, 4.0, 4.0, 0.0, Color::WHITE, BlendMode::Alpha);
    g.flush().unwrap();

    let screen = g.renderer().screen();
    assert_eq!(screen.pixel(3, 3), Color::NONE);
    assert_eq!(screen.pixel(4, 4), Color::RED);
    assert_eq!(screen.pixel(11, 11), Color::RED);
    assert_eq!(screen.pixel(12, 12), Color::NONE);
}

#[test]
fn macro_freezes_internal_order() {
    let mut g = graphics(8, 8);
    let mac = g
        .record(8, 8, |g| {
            // Submitted out of Z order; compile must sort.
            g.draw_rect(0.0, 0.0, 8.0, 8.0, Color::GREEN, 5.0, BlendMode::Alpha);
            g.draw_rect(0.0, 0.0, 8.0, 8.0, Color::RED, 1.0, BlendMode::Alpha);
            Ok(())
        })
        .unwrap();
    let bitmap = g.image_to_bitmap(&mac).unwrap();
    assert_eq!(bitmap.pixel(4, 4), Color::GREEN);
}

#[test]
fn clipping_inside_recording_is_rejected() {
    let mut g = graphics(16, 16);
    let result = g.record(8, 8, |g| g.begin_clipping(0, 0, 4, 4));
    assert!(matches!(result, Err(GraphicsError::ClipWhileRecording)));
    // The failed recording left the screen queue functional.
    g.draw_rect(0.0, 0.0, 4.0, 4.0, Color::RED, 0.0, BlendMode::Alpha);
    assert_eq!(g.flush().unwrap().ops, 1);
}

#[test]
fn recording_transforms_do_not_leak_out() {
    let mut g = graphics(16, 16);
    let _ = g
        .record(8, 8, |g| {
            g.push_transform(&Transform::translate(100.0, 100.0));
            // Intentionally left pushed; the scope ends with the recording.
            Ok(())
        })
        .unwrap();
    g.draw_rect(0.0, 0.0, 4.0, 4.0, Color::RED, 0.0, BlendMode::Alpha);
    g.flush().unwrap();
    assert_eq!(g.renderer().screen().pixel(1, 1), Color::RED);
}

#[test]
fn subimage_draws_shared_texture_region() {
    let mut g = graphics(8, 8);
    let mut source = Bitmap::filled(8, 8, Color::RED);
    for y in 4..8 {
        for x in 4..8 {
            source.set_pixel(x, y, Color::BLUE);
        }
    }
    let image = g.create_image(&source, ImageFlags::NONE).unwrap();
    let sub = image.subimage(4, 4, 4, 4).unwrap();
    assert_eq!(sub.width(), 4);

    g.draw_image(&sub, 0.0, 0.0, 0.0, Color::WHITE, BlendMode::Alpha);
    g.flush().unwrap();
    assert_eq!(g.renderer().screen().pixel(1, 1), Color::BLUE);

    match (&image, &sub) {
        (ImageData::Chunk(parent), ImageData::Chunk(child)) => {
            let parent_page = parent.texture().read().unwrap().id();
            let child_page = child.texture().read().unwrap().id();
            assert_eq!(parent_page, child_page);
        }
        _ => panic!("expected chunk images"),
    }
}

#[test]
fn additive_blending_accumulates_on_screen() {
    let mut g = graphics(4, 4);
    fill_rect(&mut g, Color::rgb(60, 0, 0), 0.0);
    g.draw_rect(0.0, 0.0, 4.0, 4.0, Color::rgb(60, 0, 0), 1.0, BlendMode::Additive);
    g.flush().unwrap();
    assert_eq!(g.renderer().screen().pixel(2, 2).red(), 120);
}
