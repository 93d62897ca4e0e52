// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

use pixel_gl2d::config::DisplayConfig;
use pixel_gl2d::render::backend::{DrawMode, SoftBackend};
use pixel_gl2d::render::{Display, DisplayError};

const RED: [u8; 4] = [255, 0, 0, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

fn display(w: u32, h: u32) -> Display {
    let cfg = DisplayConfig {
        screen_width: w,
        screen_height: h,
        ..Default::default()
    };
    Display::with_config(Box::new(SoftBackend::new(w, h)), cfg).unwrap()
}

fn soft(d: &Display) -> &SoftBackend {
    d.backend().as_any().downcast_ref::<SoftBackend>().unwrap()
}

#[test]
fn test_red_triangle_on_surface() {
    let mut d = display(64, 64);
    let s = d.new_surface(64, 64, false).unwrap();
    d.draw_on(s).unwrap();
    d.set_color(255, 0, 0).unwrap();
    d.draw_triangle(0.0, 0.0, 64.0, 0.0, 0.0, 64.0).unwrap();
    assert_eq!(d.get_pixel(s, 10, 10).unwrap(), RED);
    assert_eq!(d.get_pixel(s, 50, 50).unwrap(), CLEAR);
}

#[test]
fn test_triangles_batched_into_one_draw() {
    let mut d = display(64, 64);
    for i in 0..10 {
        let x = i as f32 * 5.0;
        d.draw_triangle(x, 0.0, x + 4.0, 0.0, x, 4.0).unwrap();
    }
    assert!(soft(&d).draws().is_empty());
    d.draw_line(0.0, 0.0, 10.0, 10.0).unwrap();
    let draws = soft(&d).draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, DrawMode::Triangles);
    assert_eq!(draws[0].count, 30);
}

#[test]
fn test_quad_decomposition_order() {
    let mut d = display(64, 64);
    let px = [255u8; 2 * 2 * 4];
    let src = d.create_surface(2, 2, &px, false).unwrap();
    d.draw_from(src).unwrap();
    let dst = [1.0, 2.0, 30.0, 3.0, 31.0, 40.0, 4.0, 41.0];
    d.draw_quad([0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0], dst).unwrap();
    d.draw_background().unwrap();
    let draws = soft(&d).draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].textured);
    assert_eq!(
        draws[0].positions,
        vec![
            [1.0, 2.0],
            [30.0, 3.0],
            [31.0, 40.0],
            [1.0, 2.0],
            [31.0, 40.0],
            [4.0, 41.0]
        ]
    );
}

#[test]
fn test_textured_quad_samples_source() {
    let mut d = display(64, 64);
    let target = d.new_surface(64, 64, false).unwrap();
    d.draw_on(target).unwrap();
    #[rustfmt::skip]
    let px = [
        255, 0, 0, 255,   0, 255, 0, 255,
        0, 0, 255, 255,   255, 255, 255, 255,
    ];
    let src = d.create_surface(2, 2, &px, false).unwrap();
    d.set_filter(src, pixel_gl2d::render::FilterMode::Nearest).unwrap();
    d.draw_from(src).unwrap();
    d.draw_quad(
        [0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0],
        [0.0, 0.0, 32.0, 0.0, 32.0, 32.0, 0.0, 32.0],
    )
    .unwrap();
    assert_eq!(d.get_pixel(target, 4, 4).unwrap(), RED);
    assert_eq!(d.get_pixel(target, 20, 4).unwrap(), [0, 255, 0, 255]);
    assert_eq!(d.get_pixel(target, 4, 20).unwrap(), [0, 0, 255, 255]);
    assert_eq!(d.get_pixel(target, 20, 22).unwrap(), [255, 255, 255, 255]);
    assert_eq!(d.get_pixel(target, 40, 40).unwrap(), CLEAR);
}

#[test]
fn test_color_tints_texture() {
    let mut d = display(64, 64);
    let target = d.new_surface(16, 16, false).unwrap();
    d.draw_on(target).unwrap();
    let px = [255u8; 4];
    let src = d.create_surface(1, 1, &px, false).unwrap();
    d.draw_from(src).unwrap();
    d.set_color(255, 0, 0).unwrap();
    d.draw_point_tex(0.0, 0.0, 8.0, 8.0, 16.0).unwrap();
    assert_eq!(d.get_pixel(target, 8, 5).unwrap(), RED);
}

#[test]
fn test_debug_mode_draws_outlines() {
    let mut d = display(64, 64);
    d.toggle_debug_mode();
    assert!(d.is_debug());
    d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
    d.draw_background().unwrap();
    let draws = soft(&d).draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, DrawMode::Lines);
    assert_eq!(draws[0].count, 6);
}

#[test]
fn test_points_use_point_size() {
    let mut d = display(64, 64);
    let s = d.new_surface(32, 32, false).unwrap();
    d.draw_on(s).unwrap();
    d.set_point_size(4.0).unwrap();
    d.plot(10.0, 10.0).unwrap();
    assert_eq!(d.get_pixel(s, 9, 9).unwrap(), [255, 255, 255, 255]);
    assert_eq!(d.get_pixel(s, 11, 11).unwrap(), [255, 255, 255, 255]);
    assert_eq!(d.get_pixel(s, 13, 13).unwrap(), CLEAR);
}

#[test]
fn test_camera_moves_scene() {
    let mut d = display(64, 64);
    let s = d.new_surface(64, 64, false).unwrap();
    d.draw_on(s).unwrap();
    d.set_camera_position(20.0, 0.0).unwrap();
    d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
    assert_eq!(d.get_pixel(s, 22, 2).unwrap(), [255, 255, 255, 255]);
    assert_eq!(d.get_pixel(s, 2, 2).unwrap(), CLEAR);
    assert_eq!(d.scene_to_screen(0.0, 0.0), (20.0, 0.0));
}

#[test]
fn test_camera_round_trip() {
    let mut d = display(64, 64);
    d.set_camera_position(3.0, -4.0).unwrap();
    d.set_camera_angle(0.7).unwrap();
    d.set_camera_zoom(2.5).unwrap();
    for (x, y) in [(0.0, 0.0), (10.0, 50.0), (-30.0, 7.5)] {
        let (sx, sy) = d.scene_to_screen(x, y);
        let (bx, by) = d.screen_to_scene(sx, sy);
        assert!((bx - x).abs() < 1e-3, "{} != {}", bx, x);
        assert!((by - y).abs() < 1e-3, "{} != {}", by, y);
    }
}

#[test]
fn test_reset_camera_is_identity() {
    let mut d = display(64, 64);
    d.set_camera_angle(1.2).unwrap();
    d.set_camera_zoom(3.0).unwrap();
    d.reset_camera().unwrap();
    assert_eq!(d.camera().matrix, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(d.camera().zoom, 1.0);
}

#[test]
fn test_draw_buffer_offset() {
    let mut d = display(64, 64);
    let s = d.new_surface(64, 64, false).unwrap();
    d.draw_on(s).unwrap();
    let b = d.new_buffer(None).unwrap();
    d.use_buffer(Some(b)).unwrap();
    d.set_color(255, 0, 0).unwrap();
    d.draw_triangle(20.0, 20.0, 40.0, 20.0, 20.0, 40.0).unwrap();
    d.use_buffer(None).unwrap();
    d.draw_buffer(b, 10.0, 0.0).unwrap();
    assert_eq!(d.get_pixel(s, 12, 22).unwrap(), RED);
    assert_eq!(d.get_pixel(s, 35, 22).unwrap(), CLEAR);
    // the buffer keeps its content
    assert_eq!(d.buffer(b).unwrap().current_color, 3);
}

#[test]
fn test_user_buffer_boundary_errors() {
    let mut d = display(64, 64);
    let src = d.create_surface(1, 1, &[255u8; 4], false).unwrap();
    let b = d.new_buffer(Some(2)).unwrap();
    d.use_buffer(Some(b)).unwrap();
    d.draw_line(0.0, 0.0, 1.0, 1.0).unwrap();
    // a kind change and a full sized buffer both flush
    d.draw_point(0.0, 0.0, 1.0).unwrap();
    d.draw_point(1.0, 0.0, 1.0).unwrap();
    d.draw_point(2.0, 0.0, 1.0).unwrap();
    let draws = soft(&d).draws();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[0].mode, draws[0].count), (DrawMode::Lines, 2));
    assert_eq!((draws[1].mode, draws[1].count), (DrawMode::Points, 2));
    assert_eq!(d.buffer(b).unwrap().current_position, 1);

    // only a texture mode change is refused
    d.draw_from(src).unwrap();
    assert_eq!(
        d.draw_surface([0.0; 6], [0.0; 6]),
        Err(DisplayError::BufferIncompatible("textured triangles".to_string()))
    );
    // the default buffer takes anything
    d.use_buffer(None).unwrap();
    d.draw_surface([0.0; 6], [0.0; 6]).unwrap();
    d.draw_point(0.0, 0.0, 1.0).unwrap();
}

#[test]
fn test_flip_keeps_user_buffer() {
    let mut d = display(64, 64);
    let b = d.new_buffer(None).unwrap();
    d.use_buffer(Some(b)).unwrap();
    d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
    d.flip().unwrap();
    // only the screen quad was drawn
    assert_eq!(soft(&d).draws().len(), 1);
    assert_eq!(d.current_buffer(), b);
    assert_eq!(d.buffer(b).unwrap().current_color, 3);
}

fn one_pending_triangle(d: &Display) {
    let draws = soft(d).draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, DrawMode::Triangles);
    assert_eq!(draws[0].count, 3);
}

#[test]
fn test_use_shader_flushes_pending() {
    let mut d = display(64, 64);
    let s = d.new_shader(None, None, None).unwrap();
    d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
    d.use_shader(Some(s)).unwrap();
    one_pending_triangle(&d);
}

#[test]
fn test_draw_from_other_source_flushes_pending() {
    let mut d = display(64, 64);
    let a = d.create_surface(1, 1, &[255u8; 4], false).unwrap();
    let b = d.create_surface(1, 1, &[0u8; 4], false).unwrap();
    d.draw_from(a).unwrap();
    d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
    // same source again is a no-op
    d.draw_from(a).unwrap();
    assert!(soft(&d).draws().is_empty());
    d.draw_from(b).unwrap();
    one_pending_triangle(&d);
}

#[test]
fn test_camera_setters_flush_pending() {
    let setters: [fn(&mut Display) -> Result<(), DisplayError>; 3] = [
        |d| d.set_camera_position(5.0, 5.0),
        |d| d.set_camera_angle(0.5),
        |d| d.set_camera_zoom(2.0),
    ];
    for set in setters {
        let mut d = display(64, 64);
        d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
        set(&mut d).unwrap();
        one_pending_triangle(&d);
    }
}

#[test]
fn test_flip_composes_screen() {
    let mut d = display(64, 64);
    d.set_color(255, 0, 0).unwrap();
    d.draw_triangle(0.0, 0.0, 32.0, 0.0, 0.0, 32.0).unwrap();
    d.set_color(0, 255, 0).unwrap();
    d.set_camera_zoom(2.0).unwrap();
    d.flip().unwrap();

    let screen = soft(&d).screen();
    // scene y grows downwards on the window, GL rows grow upwards
    assert_eq!(screen.pixel(5, 58), RED);
    assert_eq!(screen.pixel(5, 5), [0, 0, 0, 255]);
    assert_eq!(screen.pixel(60, 58), [0, 0, 0, 255]);

    // context restored
    assert_eq!(d.get_color(), (0, 255, 0));
    assert_eq!(d.camera().zoom, 2.0);
    assert_eq!(d.draw_on_target(), d.screen());
    assert_eq!(d.draw_from_source(), None);
}
