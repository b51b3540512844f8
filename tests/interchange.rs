//! Interchange tests: WAV master output with the embedded render hash, and
//! MIDI round-tripping of arranged material.

use std::collections::BTreeMap;

use cadenza::io::{export_smf, import_smf, write_master};
use cadenza::song::{Mode, Section};
use cadenza::{
    arrange, generate, mix, render, render_hash, Instrument, MixConfig, RenderAssets,
    RenderHashInput, SongSpec, StyleConfig,
};

fn test_spec() -> SongSpec {
    SongSpec {
        title: "interchange".into(),
        seed: 7,
        key: "G".into(),
        mode: Mode::Major,
        tempo_bpm: 100.0,
        meter: "4/4".into(),
        sections: vec![Section {
            name: "verse".into(),
            length_bars: 4,
        }],
        harmony: BTreeMap::from([(
            "verse".into(),
            vec!["G".into(), "C".into(), "D7".into(), "G".into()],
        )]),
        density: BTreeMap::new(),
        registers: BTreeMap::new(),
        cadences: vec![],
        tension: Default::default(),
        swing: 0.0,
        outro: None,
        target_minutes: None,
    }
}

#[test]
fn master_wav_carries_the_render_hash() {
    let spec = test_spec();
    let stems = generate(&spec, spec.seed).unwrap();
    let audio = render(&stems, 44_100, &RenderAssets::synth_default()).unwrap();
    let config = MixConfig::default();
    let master = mix(audio, 44_100, &config).unwrap();

    let assets = RenderAssets::synth_default();
    let hash = render_hash(&RenderHashInput {
        spec: &spec,
        mix: &config,
        style: &StyleConfig::default(),
        asset_paths: &assets.path_labels(),
        seed: spec.seed,
        target_minutes: spec.target_minutes,
        commit: "test-commit",
    })
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.wav");
    write_master(&path, &master, 44_100, Some(&hash)).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let pos = bytes
        .windows(4)
        .position(|w| w == b"ICMT")
        .expect("comment chunk present");
    let embedded = &bytes[pos + 8..pos + 8 + hash.len()];
    assert_eq!(embedded, hash.as_bytes());

    // The file still reads back as a well-formed stereo WAV.
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 44_100);
}

#[test]
fn arranged_stems_round_trip_through_midi() {
    let mut spec = test_spec();
    let stems = generate(&spec, spec.seed).unwrap();
    let seed = spec.seed;
    let stems = arrange(&mut spec, stems, &StyleConfig::default(), seed).unwrap();

    let bytes = export_smf(&spec, &stems).unwrap();
    let imported = import_smf(&bytes).unwrap();

    assert!((imported.tempo_bpm - 100.0).abs() < 0.05);
    assert_eq!(imported.meter, (4, 4));

    // Quantization can reorder simultaneous hits of different pitches, so
    // compare (pitch, start)-sorted lists.
    let by_pitch = |notes: &[cadenza::Note]| {
        let mut sorted = notes.to_vec();
        sorted.sort_by(|a, b| {
            a.pitch
                .cmp(&b.pitch)
                .then(a.start.partial_cmp(&b.start).unwrap())
        });
        sorted
    };
    let tolerance = spec.seconds_per_beat() / 960.0 * 2.0;
    for (instrument, notes) in &stems {
        let back = by_pitch(&imported.stems[instrument]);
        let notes = by_pitch(notes);
        assert_eq!(back.len(), notes.len(), "{instrument}");
        for (a, b) in notes.iter().zip(&back) {
            assert!((a.start - b.start).abs() <= tolerance);
            assert_eq!(a.pitch, b.pitch);
            assert_eq!(a.vel, b.vel);
            assert_eq!(a.channel, b.channel);
        }
    }
}

#[test]
fn hash_distinguishes_assets_and_configs() {
    let spec = test_spec();
    let style = StyleConfig::default();
    let mix_config = MixConfig::default();
    let synth_labels = RenderAssets::synth_default().path_labels();

    let base = render_hash(&RenderHashInput {
        spec: &spec,
        mix: &mix_config,
        style: &style,
        asset_paths: &synth_labels,
        seed: 7,
        target_minutes: None,
        commit: "c1",
    })
    .unwrap();

    let other_assets = render_hash(&RenderHashInput {
        spec: &spec,
        mix: &mix_config,
        style: &style,
        asset_paths: &[("drums".into(), "/kits/acoustic".into())],
        seed: 7,
        target_minutes: None,
        commit: "c1",
    })
    .unwrap();
    assert_ne!(base, other_assets);

    let other_style = render_hash(&RenderHashInput {
        spec: &spec,
        mix: &mix_config,
        style: &StyleConfig {
            fills: false,
            ..style
        },
        asset_paths: &synth_labels,
        seed: 7,
        target_minutes: None,
        commit: "c1",
    })
    .unwrap();
    assert_ne!(base, other_style);
}

#[test]
fn per_instrument_stems_export_alongside_the_master() {
    let spec = test_spec();
    let stems = generate(&spec, spec.seed).unwrap();
    let audio = render(&stems, 44_100, &RenderAssets::synth_default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for (instrument, buffer) in &audio {
        let path = dir.path().join(format!("{instrument}.wav"));
        cadenza::io::write_stem(&path, buffer, 44_100).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, buffer.len());
    }
    assert_eq!(audio.len(), Instrument::ALL.len());
}
