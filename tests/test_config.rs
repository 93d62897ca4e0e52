// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

use pixel_gl2d::config::DisplayConfig;
use pixel_gl2d::render::backend::SoftBackend;
use pixel_gl2d::render::{Display, FilterMode};

#[test]
fn test_partial_toml_uses_defaults() {
    let cfg = DisplayConfig::from_toml_str(
        r#"
screen_width = 128
screen_height = 96
default_filter = "nearest"
"#,
    )
    .unwrap();
    let dflt = DisplayConfig::default();
    assert_eq!((cfg.screen_width, cfg.screen_height), (128, 96));
    assert_eq!(cfg.default_filter, FilterMode::Nearest);
    assert_eq!(cfg.default_buffer_size, dflt.default_buffer_size);
    assert_eq!(cfg.auto_buffer_size, dflt.auto_buffer_size);
    assert_eq!(cfg.line_width, 1.0);
    assert!(!cfg.debug);
}

#[test]
fn test_display_follows_config() {
    let cfg = DisplayConfig::from_toml_str(
        r#"
screen_width = 40
screen_height = 30
debug = true
point_size = 3.0
auto_buffer_size = 8
default_filter = "nearest"
"#,
    )
    .unwrap();
    let mut d = Display::with_config(Box::new(SoftBackend::new(40, 30)), cfg).unwrap();
    let screen = d.screen().unwrap();
    assert_eq!(d.surface_size(screen).unwrap(), (40, 30));
    assert!(d.is_debug());
    assert_eq!(d.point_size(), 3.0);
    let s = d.new_surface(4, 4, false).unwrap();
    assert_eq!(d.surface(s).unwrap().filter, FilterMode::Nearest);
    let b = d.new_buffer(None).unwrap();
    assert_eq!(d.buffer(b).unwrap().size, 8);
}

#[test]
fn test_load_missing_file() {
    assert!(DisplayConfig::load("no/such/gl2d.toml").is_err());
}
