//! Note timeline projection
//!
//! Pure mapping from (start reference, song, counter, consumed index) to
//! each remaining note's signed distance from the hit line. Same inputs,
//! same output; nothing here reads state or time on its own.

use serde::{Deserialize, Serialize};

use crate::settings::Song;

/// One note as seen this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedNote {
    pub index: usize,
    /// `start + offset - counter`. 0 = on the hit line, >0 approaching,
    /// <0 past the line and still unresolved.
    pub distance_to_hit: i64,
    /// Inside the display window
    pub visible: bool,
}

/// Signed distance of a note target from the current counter
#[inline]
pub fn distance_to_hit(start_reference: u64, offset: u64, counter: u64) -> i64 {
    let target = start_reference as i128 + offset as i128;
    (target - counter as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[inline]
fn in_window(distance: i64, margin: u64) -> bool {
    distance.unsigned_abs() <= margin
}

/// Remaining notes inside the symmetric display window, in index order.
///
/// Returns nothing when the session has not started (`start_reference`
/// is `None`). Notes outside the window are left out.
pub fn project(
    start_reference: Option<u64>,
    song: &Song,
    counter: u64,
    consumed_index: usize,
    margin: u64,
) -> Vec<ProjectedNote> {
    project_all(start_reference, song, counter, consumed_index, margin)
        .into_iter()
        .filter(|note| note.visible)
        .collect()
}

/// Every remaining note with its visibility flag, no culling
pub fn project_all(
    start_reference: Option<u64>,
    song: &Song,
    counter: u64,
    consumed_index: usize,
    margin: u64,
) -> Vec<ProjectedNote> {
    let Some(start) = start_reference.filter(|&s| s != 0) else {
        return Vec::new();
    };

    song.offsets()
        .iter()
        .enumerate()
        .skip(consumed_index)
        .map(|(index, &offset)| {
            let distance = distance_to_hit(start, offset, counter);
            ProjectedNote {
                index,
                distance_to_hit: distance,
                visible: in_window(distance, margin),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn short_song() -> Song {
        Song::new(1, "Short", vec![0, 50, 120])
    }

    #[test]
    fn test_scenario_a_positions() {
        let notes = project(Some(1000), &short_song(), 1000, 0, 550);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].index, 0);
        assert_eq!(notes[0].distance_to_hit, 0);
        assert!(notes[0].visible);
        assert_eq!(notes[1].distance_to_hit, 50);
        assert_eq!(notes[2].distance_to_hit, 120);
    }

    #[test]
    fn test_not_started_projects_nothing() {
        assert!(project(None, &short_song(), 1000, 0, 550).is_empty());
        assert!(project(Some(0), &short_song(), 1000, 0, 550).is_empty());
    }

    #[test]
    fn test_consumed_notes_skipped() {
        let notes = project(Some(1000), &short_song(), 1060, 1, 550);
        let indices: Vec<usize> = notes.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(notes[0].distance_to_hit, -10);

        assert!(project(Some(1000), &short_song(), 1060, 3, 550).is_empty());
        assert!(project(Some(1000), &short_song(), 1060, 10, 550).is_empty());
    }

    #[test]
    fn test_window_culls_both_sides() {
        // margin 60: note 0 is 70 past, note 2 is 50 ahead
        let notes = project(Some(1000), &short_song(), 1070, 0, 60);
        let indices: Vec<usize> = notes.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 2]);

        let all = project_all(Some(1000), &short_song(), 1070, 0, 60);
        assert_eq!(all.len(), 3);
        assert!(!all[0].visible);
        assert_eq!(all[0].distance_to_hit, -70);
    }

    #[test]
    fn test_window_edges_inclusive() {
        let notes = project(Some(1000), &short_song(), 1000, 0, 50);
        let indices: Vec<usize> = notes.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_distance_extremes_saturate() {
        assert_eq!(distance_to_hit(u64::MAX, u64::MAX, 0), i64::MAX);
        assert_eq!(distance_to_hit(1, 0, u64::MAX), i64::MIN);
    }

    fn sorted_offsets() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0u64..5_000, 1..40).prop_map(|mut v| {
            v.sort_unstable();
            v
        })
    }

    proptest! {
        #[test]
        fn prop_projection_deterministic(
            offsets in sorted_offsets(),
            start in 1u64..1_000_000,
            counter in 0u64..1_010_000,
            consumed in 0usize..45,
            margin in 1u64..2_000,
        ) {
            let song = Song::new(0, "p", offsets);
            let a = project(Some(start), &song, counter, consumed, margin);
            let b = project(Some(start), &song, counter, consumed, margin);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_distance_non_increasing(
            offsets in sorted_offsets(),
            start in 1u64..1_000_000,
            mut counters in prop::collection::vec(0u64..1_010_000, 2..20),
        ) {
            counters.sort_unstable();
            let song = Song::new(0, "p", offsets);
            for index in 0..song.len() {
                let mut last = i64::MAX;
                for &counter in &counters {
                    let all = project_all(Some(start), &song, counter, 0, 1);
                    let d = all[index].distance_to_hit;
                    prop_assert!(d <= last);
                    last = d;
                }
            }
        }

        #[test]
        fn prop_only_remaining_in_window(
            offsets in sorted_offsets(),
            start in 1u64..1_000_000,
            counter in 0u64..1_010_000,
            consumed in 0usize..45,
            margin in 1u64..2_000,
        ) {
            let song = Song::new(0, "p", offsets);
            let notes = project(Some(start), &song, counter, consumed, margin);
            let mut previous = None;
            for note in &notes {
                prop_assert!(note.index >= consumed && note.index < song.len());
                prop_assert!(note.visible);
                prop_assert!(note.distance_to_hit.unsigned_abs() <= margin);
                if let Some(p) = previous {
                    prop_assert!(note.index > p);
                }
                previous = Some(note.index);
            }
        }
    }
}
