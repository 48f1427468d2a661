//! Integration tests for undo/redo through the editor store
//!
//! Covers discrete operations, continuous edits, capacity eviction and the
//! independence of stored snapshots from later edits.

use bananashop_core::history::DEFAULT_HISTORY_CAPACITY;
use bananashop_core::layer::{CropRect, ImageSource, Layer};
use bananashop_core::transform::TransformPatch;
use bananashop_core::{EditorStore, LayerId};
use image::RgbaImage;

/// Create a store with three small layers
fn setup_three_layers() -> (EditorStore, Vec<LayerId>) {
    let mut store = EditorStore::new();
    let ids = ["Layer 1", "Layer 2", "Layer 3"]
        .iter()
        .map(|name| store.add_layer(Layer::new(ImageSource::new(RgbaImage::new(20, 10)), *name)))
        .collect();
    (store, ids)
}

fn layer_names(store: &EditorStore) -> Vec<String> {
    store.scene().layers().iter().map(|l| l.name.clone()).collect()
}

#[test]
fn test_discrete_operations_undo_in_order() {
    let (mut store, ids) = setup_three_layers();

    store.rename_layer(ids[0], "Sky");
    store.toggle_visibility(ids[1]);
    store.reorder_layers(0, 2);
    assert_eq!(layer_names(&store), vec!["Layer 2", "Layer 3", "Sky"]);

    assert_eq!(store.history().undo_description(), Some("Reorder Layers"));
    store.undo();
    assert_eq!(layer_names(&store), vec!["Sky", "Layer 2", "Layer 3"]);

    store.undo();
    assert!(store.layer(ids[1]).unwrap().visible);

    store.undo();
    assert_eq!(store.layer(ids[0]).unwrap().name, "Layer 1");

    // Redo replays the same steps
    store.redo();
    store.redo();
    store.redo();
    assert_eq!(layer_names(&store), vec!["Layer 2", "Layer 3", "Sky"]);
    assert!(!store.layer(ids[1]).unwrap().visible);
    assert!(!store.can_redo());
}

#[test]
fn test_new_operation_clears_redo() {
    let (mut store, ids) = setup_three_layers();
    store.remove_layer(ids[2]);
    store.undo();
    assert!(store.can_redo());

    store.rename_layer(ids[0], "Renamed");
    assert!(!store.can_redo());
    assert!(!store.redo());
}

#[test]
fn test_snapshots_are_independent_of_later_edits() {
    let (mut store, ids) = setup_three_layers();
    store.push_history("Move");
    store.update_layer_transform(ids[0], TransformPatch::position(500.0, 400.0));
    store.set_layer_opacity(ids[0], 0.25);

    store.undo();
    let layer = store.layer(ids[0]).unwrap();
    assert_eq!(layer.transform.x, 0.0);
    assert_eq!(layer.opacity, 1.0);
}

#[test]
fn test_continuous_edit_is_one_step() {
    let (mut store, ids) = setup_three_layers();
    let depth = store.history().undo_depth();

    for opacity in [0.9, 0.7, 0.5, 0.3] {
        store.begin_continuous_edit("Change Opacity");
        store.set_layer_opacity(ids[1], opacity);
    }
    assert!(store.end_continuous_edit());
    assert_eq!(store.history().undo_depth(), depth + 1);

    store.undo();
    assert_eq!(store.layer(ids[1]).unwrap().opacity, 1.0);
}

#[test]
fn test_continuous_edit_without_change_is_elided() {
    let (mut store, ids) = setup_three_layers();
    let depth = store.history().undo_depth();

    store.begin_continuous_edit("Change Opacity");
    store.set_layer_opacity(ids[1], 0.4);
    store.set_layer_opacity(ids[1], 1.0);
    assert!(!store.end_continuous_edit());
    assert_eq!(store.history().undo_depth(), depth);
}

#[test]
fn test_unchanged_discrete_operations_are_elided() {
    let (mut store, ids) = setup_three_layers();
    let depth = store.history().undo_depth();

    assert!(!store.rename_layer(ids[0], "Layer 1"));
    assert!(!store.reorder_layers(1, 1));
    assert!(!store.reorder_layers(0, 9));
    assert!(!store.set_layer_crop(ids[0], None));
    assert_eq!(store.history().undo_depth(), depth);

    // A crop that clamps to the same rectangle is also unchanged
    assert!(store.set_layer_crop(ids[0], Some(CropRect::new(0.0, 0.0, 50.0, 50.0))));
    assert!(!store.set_layer_crop(ids[0], Some(CropRect::new(0.0, 0.0, 20.0, 10.0))));
    assert_eq!(store.history().undo_depth(), depth + 1);
}

#[test]
fn test_capacity_keeps_most_recent_steps() {
    let (mut store, ids) = setup_three_layers();
    for i in 0..(DEFAULT_HISTORY_CAPACITY + 10) {
        store.rename_layer(ids[0], format!("Name {i}"));
    }
    assert_eq!(store.history().undo_depth(), DEFAULT_HISTORY_CAPACITY);

    let mut undone = 0;
    while store.undo() {
        undone += 1;
    }
    assert_eq!(undone, DEFAULT_HISTORY_CAPACITY);
    // The oldest reachable state is after the first ten renames
    assert_eq!(store.layer(ids[0]).unwrap().name, "Name 9");
}

#[test]
fn test_delete_and_duplicate_undo() {
    let (mut store, ids) = setup_three_layers();

    let copy = store.duplicate_layer(ids[0]).unwrap();
    assert_eq!(store.scene().len(), 4);
    assert_eq!(store.layer(copy).unwrap().name, "Layer 1 (copy)");
    assert_eq!(store.selected_layer_id(), Some(copy));

    store.select_layer(Some(ids[1]));
    store.remove_layer(ids[1]);
    assert!(store.layer(ids[1]).is_none());

    store.undo();
    assert!(store.layer(ids[1]).is_some());
    store.undo();
    assert!(store.layer(copy).is_none());
    assert_eq!(store.scene().len(), 3);
}
