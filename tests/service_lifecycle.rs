mod common;

use std::sync::Arc;

use image::RgbaImage;
use lumagrade::{
    CpuEngine, GradingConfig, GradingError, GradingEvent, GradingService, PresetCategory,
    ServiceStatus, SettingsPatch,
};
use parking_lot::Mutex;

fn service() -> GradingService {
    common::init_tracing();
    GradingService::with_engine(GradingConfig::default(), Arc::new(CpuEngine::new())).unwrap()
}

fn exposure(v: f32) -> SettingsPatch {
    SettingsPatch {
        exposure: Some(v),
        ..Default::default()
    }
}

fn record(svc: &GradingService) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    svc.subscribe(move |event| {
        let name = match event {
            GradingEvent::SettingsChanged(_) => "settings",
            GradingEvent::PreviewUpdated(_) => "preview",
            GradingEvent::ProcessingStarted => "started",
            GradingEvent::ProcessingCompleted { .. } => "completed",
            GradingEvent::Error { .. } => "error",
        };
        sink.lock().push(name.to_string());
    });
    log
}

#[tokio::test]
async fn processing_emits_start_then_complete() {
    let svc = service();
    let log = record(&svc);
    svc.update_settings(&exposure(0.5));
    let out = svc.process_image(common::test_frame(32, 24), None).await.unwrap();
    assert_eq!(out.dimensions(), (32, 24));
    assert_eq!(*log.lock(), ["settings", "started", "completed"]);
    assert_eq!(svc.status(), ServiceStatus::Idle);
}

#[tokio::test]
async fn zero_area_is_rejected_before_start() {
    let svc = service();
    let log = record(&svc);
    let err = svc.process_image(RgbaImage::new(0, 0), None).await.unwrap_err();
    assert!(matches!(err, GradingError::InvalidImage { width: 0, height: 0 }));
    assert!(log.lock().is_empty());
    assert_eq!(svc.status(), ServiceStatus::Idle);
}

#[tokio::test]
async fn default_settings_leave_image_unchanged() {
    let svc = service();
    let frame = common::test_frame(40, 30);
    let out = svc.process_image(frame.clone(), None).await.unwrap();
    assert!(common::max_channel_diff(&frame, &out) <= 1);
}

#[tokio::test]
async fn override_does_not_touch_current_settings() {
    let svc = service();
    let frame = common::test_frame(16, 16);
    let mut look = svc.settings();
    look.saturation = -1.0;
    let grey = svc.process_image(frame, Some(look)).await.unwrap();
    let px = grey.get_pixel(3, 3);
    assert!(px[0].abs_diff(px[1]) <= 1 && px[1].abs_diff(px[2]) <= 1);
    assert_eq!(svc.settings().saturation, 0.0);
}

#[test]
fn undo_redo_round_trip() {
    let svc = service();
    let s0 = svc.settings();
    let s1 = svc.update_settings(&exposure(0.8));
    assert_eq!(svc.undo(), Some(s0.clone()));
    assert_eq!(svc.settings(), s0);
    assert_eq!(svc.redo(), Some(s1.clone()));
    assert_eq!(svc.settings(), s1);
    assert_eq!(svc.redo(), None);
}

#[test]
fn undo_stops_at_the_first_state() {
    let svc = service();
    assert!(!svc.can_undo());
    assert_eq!(svc.undo(), None);
}

#[test]
fn history_is_bounded() {
    let svc = service();
    for i in 0..60 {
        svc.update_settings(&exposure(i as f32 * 0.01));
    }
    assert!(svc.can_undo());
    assert_eq!(svc.history_len(), 50);
    let mut steps = 0;
    while svc.undo().is_some() {
        steps += 1;
    }
    assert_eq!(steps, 49);
    // defaults and the first ten edits were evicted
    assert!((svc.settings().exposure - 0.10).abs() < 1e-6);
}

#[test]
fn out_of_range_updates_are_clamped() {
    let svc = service();
    let s = svc.update_settings(&SettingsPatch {
        exposure: Some(9.0),
        temperature: Some(50.0),
        ..Default::default()
    });
    assert_eq!(s.exposure, 2.0);
    assert_eq!(s.temperature, 2000.0);
}

#[test]
fn preset_save_and_load_round_trip() {
    let svc = service();
    let captured = svc.update_settings(&SettingsPatch {
        contrast: Some(0.3),
        vibrance: Some(0.4),
        ..Default::default()
    });
    let preset = svc
        .save_preset("Test", Some("contrasty"), Some(PresetCategory::Custom))
        .unwrap();
    svc.set_settings(Default::default());
    assert!(svc.load_preset(&preset.id));
    assert_eq!(svc.settings(), captured);
    assert!(!svc.load_preset("no-such-id"));
}

#[test]
fn builtins_are_present_and_protected() {
    let svc = service();
    let presets = svc.presets();
    assert!(presets.len() >= 4);
    let builtin = presets.iter().find(|p| p.is_builtin()).unwrap();
    assert!(!svc.delete_preset(&builtin.id));
    assert!(svc.presets().iter().any(|p| p.id == builtin.id));
    assert!(svc.load_preset(&builtin.id));
    assert_eq!(svc.settings(), builtin.settings);
}

#[test]
fn exported_presets_import_under_a_new_name() {
    let svc = service();
    let saved = svc.save_preset("Mine", None, None).unwrap();
    let json = svc.export_preset(&saved.id).unwrap().unwrap();
    let imported = svc.import_preset(&json).unwrap();
    assert_eq!(imported.name, "Mine (Imported)");
    assert_ne!(imported.id, saved.id);
    assert!(svc.delete_preset(&saved.id));
    assert!(!svc.delete_preset(&saved.id));
}

#[tokio::test]
async fn import_with_short_lattice_is_refused() {
    let svc = service();
    let before = svc.presets().len();
    let json = r#"{"name":"Short","settings":{"lut":{"data":{"size":4,"data":[0.1,0.2,0.3],"format":"cube"},"intensity":1.0}}}"#;
    assert!(matches!(
        svc.import_preset(json),
        Err(GradingError::InvalidPreset(_))
    ));
    assert_eq!(svc.presets().len(), before);

    let frame = Arc::new(common::test_frame(8, 8));
    svc.process_image(frame, None).await.unwrap();
    assert_eq!(svc.status(), ServiceStatus::Idle);
}

#[test]
fn presets_persist_in_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = GradingConfig {
        preset_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let id = {
        let svc =
            GradingService::with_engine(config.clone(), Arc::new(CpuEngine::new())).unwrap();
        svc.update_settings(&exposure(-0.5));
        svc.save_preset("Dark", None, Some(PresetCategory::Cinematic))
            .unwrap()
            .id
    };
    assert!(dir.path().join(format!("{id}.json")).exists());

    let svc = GradingService::with_engine(config, Arc::new(CpuEngine::new())).unwrap();
    assert!(svc.load_preset(&id));
    assert_eq!(svc.settings().exposure, -0.5);
    assert!(svc.delete_preset(&id));
    assert!(!dir.path().join(format!("{id}.json")).exists());
}

#[test]
fn unsubscribed_listeners_stop_receiving() {
    let svc = service();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    let id = svc.subscribe(move |_| *counter.lock() += 1);
    svc.update_settings(&exposure(0.1));
    assert!(svc.unsubscribe(id));
    svc.update_settings(&exposure(0.2));
    assert_eq!(*hits.lock(), 1);
}
