use serde::Serialize;
use uuid::Uuid;

use crate::canvas::{BlendMode, LayerStack};

/// Read-only row describing one layer, in stack order (index 0 = bottom).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub index: usize,
    pub id: Uuid,
    pub name: String,
    pub opacity: f32,
    pub visible: bool,
    pub blend_mode: BlendMode,
    pub active: bool,
}

impl LayerInfo {
    /// One row per layer, bottom first.
    pub fn collect(stack: &LayerStack) -> Vec<LayerInfo> {
        let active = stack.active_layer_index();
        stack
            .layers()
            .iter()
            .enumerate()
            .map(|(index, layer)| LayerInfo {
                index,
                id: layer.id,
                name: layer.name.clone(),
                opacity: layer.opacity,
                visible: layer.visible,
                blend_mode: layer.blend_mode,
                active: index == active,
            })
            .collect()
    }

    /// Single-line summary for logs and the headless runner.
    pub fn summary(&self) -> String {
        format!(
            "{}{} {:<16} {:>3.0}% {:<8} {}",
            if self.active { '*' } else { ' ' },
            self.index,
            self.name,
            self.opacity * 100.0,
            self.blend_mode.name(),
            if self.visible { "visible" } else { "hidden" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_stack_order_and_flag_active() {
        let mut stack = LayerStack::new(2, 2).unwrap();
        stack.add_layer().unwrap();
        stack.set_opacity(0, 0.5);
        stack.set_blend_mode(1, BlendMode::Multiply);

        let rows = LayerInfo::collect(&stack);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Layer 1");
        assert_eq!(rows[0].opacity, 0.5);
        assert!(!rows[0].active);
        assert!(rows[1].active);
        assert_eq!(rows[1].blend_mode, BlendMode::Multiply);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let stack = LayerStack::new(2, 2).unwrap();
        let json = serde_json::to_value(LayerInfo::collect(&stack)).unwrap();
        assert_eq!(json[0]["blendMode"], "normal");
        assert_eq!(json[0]["active"], true);
        assert_eq!(json[0]["index"], 0);
    }
}
