use crate::model::{LayoutPreset, Scene, Slot, SlotPosition};
use compositor_bridge::{LayoutSlot, LayoutSpec};

/// Compositor preset code for its built-in automatic grid
pub const AUTO_GRID_CODE: u8 = 0;

const EPSILON: f64 = 0.5;
/// Largest share of the output an inset may cover, in percent squared
const INSET_MAX_AREA: f64 = 2_500.0;
/// How close to an edge counts as "in the corner"
const CORNER_MARGIN: f64 = 10.0;

/// Preset implied by the slot geometry
#[must_use]
pub fn derive_preset(slots: &[Slot]) -> LayoutPreset {
	match slots {
		[_] => LayoutPreset::Solo,
		[first, second] if (first.position.w - second.position.w).abs() < EPSILON => LayoutPreset::Split,
		[_, second] if is_corner_inset(&second.position) => LayoutPreset::PictureInPicture,
		_ => LayoutPreset::AutoGrid,
	}
}

fn is_corner_inset(position: &SlotPosition) -> bool {
	let near = |a: f64, b: f64| (a - b).abs() <= CORNER_MARGIN;
	let horizontal_edge = near(position.x, 0.0) || near(position.x + position.w, 100.0);
	let vertical_edge = near(position.y, 0.0) || near(position.y + position.h, 100.0);
	position.area() <= INSET_MAX_AREA && horizontal_edge && vertical_edge
}

/// Layout command payload for a scene
#[must_use]
pub fn layout_spec(scene: &Scene) -> LayoutSpec {
	if scene.layout_preset == LayoutPreset::AutoGrid {
		return LayoutSpec::Preset(AUTO_GRID_CODE);
	}

	LayoutSpec::Slots(
		scene
			.slots
			.iter()
			.enumerate()
			.map(|(index, slot)| LayoutSlot {
				x: slot.position.x,
				y: slot.position.y,
				w: slot.position.w,
				h: slot.position.h,
				slot: index,
				z: slot.z_index,
			})
			.collect(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn slot(x: f64, y: f64, w: f64, h: f64) -> Slot {
		Slot {
			id: format!("{x}-{y}"),
			source_id: None,
			position: SlotPosition { x, y, w, h },
			z_index: 0,
		}
	}

	#[test]
	fn test_single_slot_is_solo() {
		assert_eq!(derive_preset(&[slot(0.0, 0.0, 100.0, 100.0)]), LayoutPreset::Solo);
	}

	#[test]
	fn test_equal_widths_are_split() {
		assert_eq!(derive_preset(&[slot(0.0, 0.0, 50.0, 100.0), slot(50.0, 0.0, 50.0, 100.0)]), LayoutPreset::Split);
	}

	#[test]
	fn test_small_corner_second_is_pip() {
		let slots = [slot(0.0, 0.0, 100.0, 100.0), slot(70.0, 70.0, 25.0, 25.0)];
		assert_eq!(derive_preset(&slots), LayoutPreset::PictureInPicture);
	}

	#[test]
	fn test_centered_inset_is_grid() {
		let slots = [slot(0.0, 0.0, 100.0, 100.0), slot(40.0, 40.0, 20.0, 20.0)];
		assert_eq!(derive_preset(&slots), LayoutPreset::AutoGrid);
		assert_eq!(derive_preset(&[]), LayoutPreset::AutoGrid);
	}

	#[test]
	fn test_three_slots_are_grid() {
		let slots = [slot(0.0, 0.0, 33.0, 100.0), slot(33.0, 0.0, 33.0, 100.0), slot(66.0, 0.0, 34.0, 100.0)];
		assert_eq!(derive_preset(&slots), LayoutPreset::AutoGrid);
	}

	#[test]
	fn test_grid_uses_preset_code() {
		let scene = Scene {
			id: "s".to_string(),
			name: "Grid".to_string(),
			target_output_index: 1,
			layout_preset: LayoutPreset::AutoGrid,
			slots: vec![],
		};
		assert_eq!(layout_spec(&scene), LayoutSpec::Preset(AUTO_GRID_CODE));

		let pip = Scene {
			layout_preset: LayoutPreset::PictureInPicture,
			slots: vec![slot(0.0, 0.0, 100.0, 100.0), slot(70.0, 70.0, 25.0, 25.0)],
			..scene
		};
		let LayoutSpec::Slots(slots) = layout_spec(&pip) else {
			panic!("expected explicit slots");
		};
		assert_eq!(slots[1].slot, 1);
		assert!((slots[1].x - 70.0).abs() < f64::EPSILON);
	}
}
