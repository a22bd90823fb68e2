// Layout of imported scores: determinism, density and line breaking

use score_engine::renderers::DensityMode;
use score_engine::{ImportPipeline, LayoutEngine, Position, RenderConfig, Score};

const PIECE: &str = "\
title: Layout Piece
1=G 4/4
R: 3 3 4 5 | 5 4 3 2 | 1 1 2 3 | 3. 2_ 2 - |
R: 3 3 4 5 | 5 4 3 2 | 1 1 2 3 | 2. 1_ 1 - |
L: 1, - 5,, - | 1, - 5,, - | 1, - 5,, - | 5,, - 1, - |
L: 1, - 5,, - | 1, - 5,, - | 1, - 5,, - | 5,, - 1, - |
";

fn piece() -> Score {
    ImportPipeline::default()
        .import(PIECE.as_bytes())
        .into_result()
        .expect("piece should import")
        .0
}

#[test]
fn test_layout_is_deterministic() {
    let score = piece();
    let config = RenderConfig::default();
    let first = LayoutEngine::new().compute_layout(&score, &config);
    let second = LayoutEngine::new().compute_layout(&score.clone(), &config);
    assert_eq!(first, second);
    assert_eq!(first.measures.len(), score.measure_count());
}

#[test]
fn test_every_measure_belongs_to_one_line() {
    let score = piece();
    let layout = LayoutEngine::new().compute_layout(&score, &RenderConfig::default());
    for (i, measure) in layout.measures.iter().enumerate() {
        let system = layout.system_for_measure(i).expect("measure is placed");
        assert!(system.first_measure <= i && i < system.end_measure);
        assert_eq!(measure.system, system.index);
    }
    let covered: usize = layout
        .systems
        .iter()
        .map(|s| s.end_measure - s.first_measure)
        .sum();
    assert_eq!(covered, layout.measures.len());
}

#[test]
fn test_denser_modes_use_fewer_lines() {
    let score = piece();
    let lines = |mode| {
        LayoutEngine::new()
            .compute_layout(&score, &RenderConfig::default().with_density(mode))
            .line_count()
    };
    let compact = lines(DensityMode::Compact);
    let comfortable = lines(DensityMode::Comfortable);
    let spacious = lines(DensityMode::Spacious);
    assert!(compact <= comfortable, "{} > {}", compact, comfortable);
    assert!(comfortable <= spacious, "{} > {}", comfortable, spacious);
    assert!(spacious > 1);
}

#[test]
fn test_notes_can_be_located() {
    let score = piece();
    let layout = LayoutEngine::new().compute_layout(&score, &RenderConfig::default());
    let (beat, note) = layout
        .locate(&Position::new(0, 0, 0).with_note(0))
        .expect("first beat is laid out");
    assert_eq!(beat.track, 0);
    let note = note.expect("first note is laid out");
    assert_eq!(note.pitch, score.tracks[0].measures[0].beats[0].notes[0].pitch);
    assert!(note.x >= beat.x);
}
