mod common;

use lumagrade::{
    ColorGradingSettings, ColorWheelSettings, ColorWheels, CpuEngine, CurvePoint, GpuEngine,
    GpuLimits, LutData, LutFormat, LutSettings, ProcessingEngine, ToneCurve, ToneMapAlgorithm,
    ToneMappingSettings, VignetteSettings, WorkingSpace,
};

use common::{init_tracing, max_channel_diff, test_frame};

/// Lattice that lifts red and crushes blue a little.
fn warm_lut(size: usize) -> LutData {
    let n = (size - 1) as f32;
    let mut data = Vec::with_capacity(size * size * size * 3);
    for b in 0..size {
        for g in 0..size {
            for r in 0..size {
                let (r, g, b) = (r as f32 / n, g as f32 / n, b as f32 / n);
                data.extend_from_slice(&[(r * 1.1 + 0.03).min(1.0), g, b * 0.9]);
            }
        }
    }
    LutData::new(size, data, LutFormat::Cube).unwrap()
}

fn busy_settings() -> ColorGradingSettings {
    ColorGradingSettings {
        exposure: 0.35,
        contrast: 0.2,
        highlights: -0.3,
        shadows: 0.25,
        whites: 0.1,
        blacks: -0.1,
        temperature: 5200.0,
        tint: 8.0,
        vibrance: 0.3,
        saturation: 0.15,
        hue: 6.0,
        lightness: 0.05,
        clarity: 0.4,
        dehaze: 0.2,
        tone_curve: ToneCurve {
            midtones: vec![
                CurvePoint::new(0.0, 0.0),
                CurvePoint::new(0.4, 0.45),
                CurvePoint::new(1.0, 1.0),
            ],
            ..Default::default()
        },
        color_wheels: ColorWheels {
            shadows: ColorWheelSettings::new(200.0, 0.3, -0.05),
            midtones: ColorWheelSettings::new(40.0, 0.1, 0.0),
            highlights: ColorWheelSettings::new(30.0, 0.2, 0.05),
        },
        vignette: VignetteSettings {
            amount: -0.4,
            ..Default::default()
        },
        lut: Some(LutSettings::new(warm_lut(9), 0.7)),
        tone_mapping: ToneMappingSettings {
            algorithm: ToneMapAlgorithm::Aces,
            exposure: 0.5,
            white_point: 6.0,
        },
    }
}

#[test]
fn gpu_and_cpu_agree_on_a_full_grade() {
    init_tracing();
    let gpu = match GpuEngine::try_new(GpuLimits::default()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("skipping: {err}");
            return;
        }
    };
    let cpu = CpuEngine::new();
    let frame = test_frame(97, 61);
    let settings = busy_settings();

    for space in [WorkingSpace::Display, WorkingSpace::Linear] {
        let a = gpu.process_image(&frame, &settings, Some(space)).unwrap();
        let b = cpu.process_image(&frame, &settings, Some(space)).unwrap();
        assert_eq!(a.dimensions(), b.dimensions());
        let diff = max_channel_diff(&a, &b);
        assert!(diff <= 3, "{space:?}: engines differ by {diff}");
    }
}

#[test]
fn identity_lut_at_full_strength_changes_nothing() {
    let cpu = CpuEngine::new();
    let frame = test_frame(40, 30);
    let base = ColorGradingSettings {
        contrast: 0.2,
        ..Default::default()
    };
    let with_lut = ColorGradingSettings {
        lut: Some(LutSettings::new(LutData::identity(17), 1.0)),
        ..base.clone()
    };
    let a = cpu.process_image(&frame, &base, None).unwrap();
    let b = cpu.process_image(&frame, &with_lut, None).unwrap();
    assert!(max_channel_diff(&a, &b) <= 1);
}

#[test]
fn zero_intensity_lut_is_ignored() {
    let cpu = CpuEngine::new();
    let frame = test_frame(24, 24);
    let base = ColorGradingSettings {
        saturation: 0.3,
        ..Default::default()
    };
    let with_lut = ColorGradingSettings {
        lut: Some(LutSettings::new(warm_lut(5), 0.0)),
        ..base.clone()
    };
    let a = cpu.process_image(&frame, &base, None).unwrap();
    let b = cpu.process_image(&frame, &with_lut, None).unwrap();
    assert!(max_channel_diff(&a, &b) <= 1);
}

#[test]
fn linear_working_space_is_neutral_at_defaults() {
    let cpu = CpuEngine::new();
    let frame = test_frame(33, 21);
    // Tiny exposure nudge defeats the identity short-circuit.
    let settings = ColorGradingSettings {
        exposure: 1e-4,
        ..Default::default()
    };
    let out = cpu
        .process_image(&frame, &settings, Some(WorkingSpace::Linear))
        .unwrap();
    assert!(max_channel_diff(&frame, &out) <= 1);
}

#[test]
fn vignette_darkens_corners_more_than_centre() {
    let cpu = CpuEngine::new();
    let frame = image::RgbaImage::from_pixel(64, 64, image::Rgba([160, 160, 160, 255]));
    let settings = ColorGradingSettings {
        vignette: VignetteSettings {
            amount: -0.8,
            ..Default::default()
        },
        ..Default::default()
    };
    let out = cpu.process_image(&frame, &settings, None).unwrap();
    let corner = out.get_pixel(0, 0)[0];
    let centre = out.get_pixel(32, 32)[0];
    assert!(corner < centre, "corner {corner} centre {centre}");
}
