use std::sync::{Arc, Mutex};

use temporalpaint::canvas::gray;
use temporalpaint::{BlendMode, CanvasAnchor, Change, Project, ToolMode};

fn pixel(project: &Project, layer: usize, x: u32, y: u32) -> image::Rgba<u8> {
    project.stack().layer(layer).unwrap().pixels.get_straight(x, y).unwrap()
}

fn fill_project(width: u32, height: u32) -> Project {
    let mut project = Project::new(width, height).unwrap();
    project.set_tool_mode(ToolMode::Fill);
    project
}

#[test]
fn fill_on_blank_4x4_covers_everything() {
    let mut project = fill_project(4, 4);
    project.set_gray_value(200);
    project.set_fill_tolerance(0);
    project.set_fill_contiguous(true);

    assert!(project.press(1.0, 1.0));
    project.release(1.0, 1.0);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(pixel(&project, 0, x, y), gray(200));
        }
    }
    assert_eq!(project.history().undo_count(), 1);
}

#[test]
fn tolerance_extremes_fill_the_whole_layer() {
    let mut project = fill_project(16, 16);
    project.set_gray_value(50);
    project.press(0.0, 0.0);
    project.release(0.0, 0.0);

    // Uniform layer, zero tolerance.
    project.set_gray_value(200);
    assert!(project.press(5.0, 5.0));
    project.release(5.0, 5.0);
    assert_eq!(pixel(&project, 0, 15, 15), gray(200));

    // Paint a bright bar, then fill with full tolerance.
    project.set_tool_mode(ToolMode::Brush);
    project.set_brush_size(3);
    project.set_gray_value(255);
    project.press(0.0, 8.0);
    project.release(16.0, 8.0);
    assert_eq!(pixel(&project, 0, 8, 8), gray(255));

    project.set_tool_mode(ToolMode::Fill);
    project.set_gray_value(10);
    project.set_fill_tolerance(100);
    project.press(1.0, 1.0);
    project.release(1.0, 1.0);
    for (x, y) in [(0, 0), (8, 8), (15, 15), (3, 9)] {
        assert_eq!(pixel(&project, 0, x, y), gray(10));
    }
}

#[test]
fn global_and_flood_agree_on_uniform_layer() {
    let mut flood = fill_project(12, 7);
    let mut global = fill_project(12, 7);
    global.set_fill_contiguous(false);
    for project in [&mut flood, &mut global] {
        project.set_gray_value(90);
        project.press(3.0, 3.0);
        project.release(3.0, 3.0);
    }
    assert_eq!(
        flood.stack().layer(0).unwrap().pixels.as_raw(),
        global.stack().layer(0).unwrap().pixels.as_raw()
    );
}

#[test]
fn opacity_is_clamped_on_read_back() {
    let mut project = Project::new(4, 4).unwrap();
    assert!(!project.set_layer_opacity(0, 1.7));
    assert_eq!(project.layers()[0].opacity, 1.0);
    assert!(project.set_layer_opacity(0, -0.5));
    assert_eq!(project.layers()[0].opacity, 0.0);
    assert_eq!(project.history().undo_count(), 1);
}

#[test]
fn resize_to_same_size_adds_no_history() {
    let mut project = Project::new(10, 10).unwrap();
    assert!(project.resize_canvas(20, 8, CanvasAnchor::TopLeft).unwrap());
    assert_eq!(project.history().undo_count(), 1);
    assert!(!project.resize_canvas(20, 8, CanvasAnchor::TopLeft).unwrap());
    assert!(!project.resize_canvas_str(20, 8, "nowhere").unwrap());
    assert_eq!(project.history().undo_count(), 1);
    assert_eq!((project.canvas_width(), project.canvas_height()), (20, 8));

    assert!(project.undo());
    assert_eq!((project.canvas_width(), project.canvas_height()), (10, 10));
}

#[test]
fn history_keeps_the_most_recent_twenty_steps() {
    let mut project = Project::new(4, 4).unwrap();
    for i in 0..25 {
        let opacity = if i % 2 == 0 { 0.25 } else { 0.75 };
        assert!(project.set_layer_opacity(0, opacity));
    }
    assert_eq!(project.history().undo_count(), 20);

    let mut undone = 0;
    while project.undo() {
        undone += 1;
    }
    assert_eq!(undone, 20);
    assert!(!project.can_undo());
    assert!(project.can_redo());
    // The five oldest entries were evicted; the floor is the state after step 4.
    assert_eq!(project.layers()[0].opacity, 0.25);
}

#[test]
fn redo_restores_the_undone_stroke() {
    let mut project = Project::new(32, 32).unwrap();
    project.set_brush_size(4);
    project.set_gray_value(180);
    project.press(2.0, 2.0);
    project.move_to(16.0, 16.0);
    project.release(30.0, 2.0);
    let painted = project.composite().unwrap().as_raw().to_vec();

    assert!(project.undo());
    assert!(project.composite().unwrap().as_raw().iter().all(|&b| b == 0));

    assert!(project.redo());
    assert_eq!(project.composite().unwrap().as_raw(), &painted[..]);
    assert!(!project.can_redo());
}

#[test]
fn last_layer_cannot_be_deleted() {
    let mut project = Project::new(4, 4).unwrap();
    assert!(!project.delete_layer(0));
    assert!(!project.delete_active_layer());
    assert_eq!(project.layer_count(), 1);
    assert!(!project.can_undo());
}

#[test]
fn temporal_stroke_midpoint_is_half_gray() {
    let mut project = Project::new(410, 20).unwrap();
    project.set_tool_mode(ToolMode::Temporal);
    project.set_brush_size(1);
    project.set_temp_start(0.0);
    project.set_temp_end(1.0);

    project.press(0.0, 10.5);
    let mut x = 2.0;
    while x < 400.0 {
        project.move_to(x, 10.5);
        x += 2.0;
    }
    assert!(project.release(400.0, 10.5));
    assert!(project.temporal_path().is_empty());

    let left = pixel(&project, 0, 199, 10)[0];
    let right = pixel(&project, 0, 200, 10)[0];
    assert!(left.abs_diff(127) <= 1, "left of centre was {left}");
    assert!(right.abs_diff(127) <= 1, "right of centre was {right}");
    assert!(pixel(&project, 0, 2, 10)[0] < 5);
    assert!(pixel(&project, 0, 398, 10)[0] > 250);
    assert_eq!(project.history().undo_description(), Some("Temporal Stroke"));
}

#[test]
fn xor_of_duplicate_cancels_in_composite() {
    let mut project = fill_project(6, 6);
    project.set_gray_value(120);
    project.press(0.0, 0.0);
    project.release(0.0, 0.0);
    assert!(project.duplicate_layer(0));
    assert!(project.set_layer_blend_mode_str(1, "xor"));
    assert_eq!(project.layers()[1].blend_mode, BlendMode::Xor);
    assert!(project.composite().unwrap().as_raw().iter().all(|&b| b == 0));
}

#[test]
fn observers_hear_layer_and_history_changes() {
    let mut project = Project::new(8, 8).unwrap();
    let seen: Arc<Mutex<Vec<Change>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let id = project.subscribe(move |c| sink.lock().unwrap().push(c));

    assert!(project.add_layer().unwrap());
    {
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&Change::Layers));
        assert!(seen.contains(&Change::UndoAvailable));
    }

    seen.lock().unwrap().clear();
    assert!(!project.set_layer_visible(0, true));
    assert!(seen.lock().unwrap().is_empty());

    assert!(project.unsubscribe(id));
    project.undo();
    assert!(seen.lock().unwrap().is_empty());
}

fn painted_count(project: &Project) -> usize {
    project.stack().layer(0).unwrap().pixels.as_raw().chunks_exact(4).filter(|p| p[3] != 0).count()
}

#[test]
fn size_one_brush_paints_on_integer_coordinates() {
    let mut project = Project::new(16, 16).unwrap();
    project.set_brush_size(1);
    project.set_gray_value(200);

    assert!(project.press(3.0, 3.0));
    assert!(project.move_to(10.0, 3.0));
    assert!(project.release(12.0, 3.0));

    for x in 3..=12 {
        assert_eq!(pixel(&project, 0, x, 3), gray(200), "x={x}");
    }
    assert_eq!(painted_count(&project), 10);
    assert_eq!(project.history().undo_count(), 1);
}

#[test]
fn size_one_temporal_stroke_paints_on_integer_coordinates() {
    let mut project = Project::new(16, 16).unwrap();
    project.set_tool_mode(ToolMode::Temporal);
    project.set_brush_size(1);

    project.press(2.0, 8.0);
    project.move_to(6.0, 8.0);
    assert!(project.release(12.0, 8.0));

    assert_eq!(painted_count(&project), 11);
    // Arc length 10: first segment midpoint 0.2, second 0.7.
    assert_eq!(pixel(&project, 0, 3, 8), gray(51));
    assert_eq!(pixel(&project, 0, 10, 8), gray(178));
}

#[test]
fn no_op_composite_fill_does_not_repaint() {
    let mut project = fill_project(5, 5);
    project.set_gray_value(40);
    project.press(0.0, 0.0);
    project.release(0.0, 0.0);
    project.set_fill_sample_all_layers(true);

    let seen: Arc<Mutex<Vec<Change>>> = Arc::default();
    let sink = Arc::clone(&seen);
    project.subscribe(move |c| sink.lock().unwrap().push(c));

    assert!(!project.press(2.0, 2.0));
    project.release(2.0, 2.0);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(project.history().undo_count(), 1);
}
