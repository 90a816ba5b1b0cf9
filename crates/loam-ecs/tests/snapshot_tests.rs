//! Integration tests for snapshot save and restore.

use loam_ecs::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Velocity {
    dx: f32,
    dy: f32,
}

/// Empty marker component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PlayerTag;

/// Route rejected-section warnings to the test output. `RUST_LOG` overrides
/// the default `warn` filter.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Player at (100, 200) moving right, enemy at (450, 300).
fn populated() -> (Store, Entity, Entity) {
    let mut store = Store::new();
    let player = store.create().unwrap();
    store.emplace(player, PlayerTag).unwrap();
    store.emplace(player, Position { x: 100.0, y: 200.0 }).unwrap();
    store.emplace(player, Velocity { dx: 5.0, dy: 0.0 }).unwrap();

    let enemy = store.create().unwrap();
    store.emplace(enemy, Position { x: 450.0, y: 300.0 }).unwrap();
    (store, player, enemy)
}

fn save(writer: &SnapshotWriter<'_>) -> String {
    let mut out = JsonOutputArchive::new();
    writer
        .entities(&mut out)
        .unwrap()
        .component::<Position, _>(&mut out)
        .unwrap()
        .component::<Velocity, _>(&mut out)
        .unwrap()
        .component::<PlayerTag, _>(&mut out)
        .unwrap();
    out.to_json_string().unwrap()
}

fn load(store: &mut Store, text: &str) -> usize {
    let mut input = JsonInputArchive::from_str(text).unwrap();
    let mut loader = SnapshotLoader::new(store);
    loader
        .entities(&mut input)
        .unwrap()
        .component::<Position, _>(&mut input)
        .unwrap()
        .component::<Velocity, _>(&mut input)
        .unwrap()
        .component::<PlayerTag, _>(&mut input)
        .unwrap();
    assert_eq!(input.remaining(), 0);
    loader.orphans()
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn round_trip_into_fresh_store() {
    let (source, player, enemy) = populated();
    let text = save(&SnapshotWriter::new(&source));

    let mut dest = Store::new();
    assert_eq!(load(&mut dest, &text), 0);

    assert_eq!(dest.len(), source.len());
    assert_eq!(
        dest.get::<Position>(player).unwrap(),
        &Position { x: 100.0, y: 200.0 }
    );
    assert_eq!(
        dest.get::<Velocity>(player).unwrap(),
        &Velocity { dx: 5.0, dy: 0.0 }
    );
    assert!(dest.contains::<PlayerTag>(player));
    assert_eq!(
        dest.get::<Position>(enemy).unwrap(),
        &Position { x: 450.0, y: 300.0 }
    );
    assert!(!dest.contains::<Velocity>(enemy));
    assert!(!dest.contains::<PlayerTag>(enemy));
}

#[test]
fn empty_store_round_trip() {
    let source = Store::new();
    let text = save(&SnapshotWriter::new(&source));
    assert_eq!(text, "[0,0,0,0]");

    let mut dest = Store::new();
    assert_eq!(load(&mut dest, &text), 0);
    assert!(dest.is_empty());
}

#[test]
fn generations_survive_round_trip() {
    let mut source = Store::new();
    let a = source.create().unwrap();
    let _b = source.create().unwrap();
    source.destroy(a).unwrap();
    let a2 = source.create().unwrap();
    source.destroy(a2).unwrap();
    let a3 = source.create().unwrap();
    assert_eq!(a3.generation(), 2);
    source.emplace(a3, Position { x: 1.0, y: 1.0 }).unwrap();

    let text = save(&SnapshotWriter::new(&source));
    let mut dest = Store::new();
    load(&mut dest, &text);

    assert!(dest.valid(a3));
    assert!(!dest.valid(a));
    assert!(!dest.valid(a2));
    assert_eq!(
        dest.get::<Position>(a3).unwrap(),
        &Position { x: 1.0, y: 1.0 }
    );
}

#[test]
fn load_order_must_match_save_order() {
    init_tracing();
    let (source, _, _) = populated();
    let text = save(&SnapshotWriter::new(&source));

    // Reading the Position section as Velocity fails to decode the payload.
    let mut dest = Store::new();
    let mut input = JsonInputArchive::from_str(&text).unwrap();
    let mut loader = SnapshotLoader::new(&mut dest);
    loader.entities(&mut input).unwrap();
    let err = loader
        .component::<Velocity, _>(&mut input)
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, EcsError::CorruptSnapshot { .. }));
    drop(loader);
    assert_eq!(dest.count::<Velocity>(), 0);
}

// ---------------------------------------------------------------------------
// Orphans
// ---------------------------------------------------------------------------

#[test]
fn orphans_removes_entities_missing_from_snapshot() {
    let (source, player, enemy) = populated();
    let text = save(&SnapshotWriter::new(&source));

    let mut dest = Store::new();
    let _slot0 = dest.create().unwrap();
    let _slot1 = dest.create().unwrap();
    let extra = dest.create().unwrap();
    dest.emplace(extra, Position { x: -1.0, y: -1.0 }).unwrap();

    assert_eq!(load(&mut dest, &text), 1);
    assert!(!dest.valid(extra));
    assert!(dest.valid(player));
    assert!(dest.valid(enemy));
    assert_eq!(dest.len(), 2);
    assert_eq!(dest.count::<Position>(), 2);
}

#[test]
fn displaced_generation_is_replaced() {
    let (source, player, _) = populated();
    let text = save(&SnapshotWriter::new(&source));

    // Destination holds index 0 under a newer generation.
    let mut dest = Store::new();
    let first = dest.create().unwrap();
    dest.destroy(first).unwrap();
    let newer = dest.create().unwrap();
    assert_eq!(newer.index(), player.index());
    dest.emplace(newer, Velocity { dx: 9.0, dy: 9.0 }).unwrap();

    load(&mut dest, &text);
    assert!(!dest.valid(newer));
    assert!(dest.valid(player));
    assert_eq!(
        dest.get::<Velocity>(player).unwrap(),
        &Velocity { dx: 5.0, dy: 0.0 }
    );
    assert_eq!(dest.count::<Velocity>(), 1);
}

// ---------------------------------------------------------------------------
// Subsets
// ---------------------------------------------------------------------------

#[test]
fn subset_writes_only_chosen_entities() {
    let (source, player, enemy) = populated();
    let text = save(&SnapshotWriter::subset(&source, [enemy, enemy, Entity::NULL]));

    let mut dest = Store::new();
    load(&mut dest, &text);
    assert_eq!(dest.len(), 1);
    assert!(!dest.valid(player));
    assert_eq!(
        dest.get::<Position>(enemy).unwrap(),
        &Position { x: 450.0, y: 300.0 }
    );
    assert_eq!(dest.count::<PlayerTag>(), 0);
}

// ---------------------------------------------------------------------------
// Corrupt input
// ---------------------------------------------------------------------------

#[test]
fn component_for_unknown_entity_is_rejected_atomically() {
    init_tracing();
    let mut dest = Store::new();
    // One entity (0v0), then a Position section naming 0v0 and 5v0.
    let text = r#"[1, 0, 0,
                   2, 0, 0, {"x": 1.0, "y": 1.0}, 5, 0, {"x": 2.0, "y": 2.0}]"#;
    let mut input = JsonInputArchive::from_str(text).unwrap();
    let mut loader = SnapshotLoader::new(&mut dest);
    loader.entities(&mut input).unwrap();
    let err = loader
        .component::<Position, _>(&mut input)
        .map(|_| ())
        .unwrap_err();
    assert_eq!(loader.loaded(), 1);
    drop(loader);

    match err {
        EcsError::CorruptSnapshot { section, reason } => {
            assert!(section.ends_with("Position"));
            assert!(reason.contains("5v0"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    // The entity section stays committed; the rejected section left no trace.
    assert_eq!(dest.len(), 1);
    assert_eq!(dest.count::<Position>(), 0);
}

#[test]
fn truncated_entity_section_leaves_store_untouched() {
    init_tracing();
    let (mut dest, player, enemy) = populated();
    // Declares three handles but only carries one and a half.
    let mut input = JsonInputArchive::from_str("[3, 0, 0, 7]").unwrap();
    let err = SnapshotLoader::new(&mut dest)
        .entities(&mut input)
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, EcsError::CorruptSnapshot { section: "entities", .. }));

    assert_eq!(dest.len(), 2);
    assert!(dest.valid(player));
    assert!(dest.valid(enemy));
    assert_eq!(dest.allocator().capacity(), 2);
}

#[test]
fn truncated_component_section_is_rejected() {
    init_tracing();
    let mut dest = Store::new();
    let mut input = JsonInputArchive::from_str(r#"[1, 0, 0, 2, 0, 0, {"x": 1.0, "y": 1.0}]"#).unwrap();
    let mut loader = SnapshotLoader::new(&mut dest);
    loader.entities(&mut input).unwrap();
    assert!(loader.component::<Position, _>(&mut input).is_err());
    drop(loader);
    assert_eq!(dest.count::<Position>(), 0);
}

#[test]
fn writer_output_is_deterministic() {
    let (source, _, _) = populated();
    let first = save(&SnapshotWriter::new(&source));
    let second = save(&SnapshotWriter::new(&source));
    assert_eq!(first, second);
}
