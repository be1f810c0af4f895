//! Lane packing for one month window.
//!
//! Visible tasks are clipped to the month, ordered by start day (longer bars
//! first on ties) and placed greedily into the first lane where they overlap
//! none of the lane's occupants.

use std::borrow::Borrow;

use chrono::Datelike;
use tracing::debug;

use crate::task::Task;
use crate::window::Window;

/// Day columns in a month grid, regardless of the month's length.
pub const GRID_COLUMNS: u32 = 31;

pub const BAR_HEIGHT_PX: u32 = 24;
pub const BAR_GAP_PX: u32 = 4;
pub const ROW_PADDING_PX: u32 = 8;
pub const MIN_ROW_HEIGHT_PX: u32 = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub task_id: String,
    pub lane: usize,
    pub start_offset_day: u32,
    pub end_offset_day: u32,
}

impl Placement {
    /// Days covered, both ends included.
    pub fn span(&self) -> u32 {
        (self.end_offset_day + 1).saturating_sub(self.start_offset_day)
    }

    pub fn overlaps(&self, other: &Placement) -> bool {
        self.start_offset_day <= other.end_offset_day
            && self.end_offset_day >= other.start_offset_day
    }

    pub fn left_percent(&self) -> f64 {
        f64::from(self.start_offset_day - 1) * 100.0 / f64::from(GRID_COLUMNS)
    }

    pub fn width_percent(&self) -> f64 {
        f64::from(self.span()) * 100.0 / f64::from(GRID_COLUMNS)
    }

    pub fn top_px(&self) -> u32 {
        ROW_PADDING_PX + self.lane as u32 * (BAR_HEIGHT_PX + BAR_GAP_PX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutResult {
    /// In placement order: start day ascending, longer spans first on ties.
    pub placements: Vec<Placement>,
    pub lane_count: usize,
}

impl LayoutResult {
    pub fn lane_of(&self, task_id: &str) -> Option<usize> {
        self.placements
            .iter()
            .find(|placement| placement.task_id == task_id)
            .map(|placement| placement.lane)
    }

    pub fn lane(&self, lane: usize) -> impl Iterator<Item = &Placement> {
        self.placements
            .iter()
            .filter(move |placement| placement.lane == lane)
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Pixel height of the month row holding these lanes.
    pub fn row_height_px(&self) -> u32 {
        let lanes = self.lane_count as u32;
        (lanes * (BAR_HEIGHT_PX + BAR_GAP_PX) + ROW_PADDING_PX * 2).max(MIN_ROW_HEIGHT_PX)
    }
}

/// Clips `task` to `window`, returning `(start_offset_day, end_offset_day)`,
/// or `None` when the task falls entirely outside the month or the month
/// has no representable days.
pub fn clip(task: &Task, window: Window) -> Option<(u32, u32)> {
    if window.days() == 0 {
        return None;
    }
    let month_start = window.start();
    let month_end = window.end();
    let start = task.start_date;
    let end = task.effective_end();

    if end < month_start || start > month_end {
        return None;
    }

    let start_offset = if start >= month_start { start.day() } else { 1 };
    let end_offset = if end <= month_end {
        end.day()
    } else {
        window.days()
    };
    Some((start_offset, end_offset))
}

#[tracing::instrument(skip(tasks), fields(window = %window))]
pub fn layout<T>(tasks: &[T], window: Window) -> LayoutResult
where
    T: Borrow<Task>,
{
    let mut visible: Vec<Placement> = tasks
        .iter()
        .map(Borrow::borrow)
        .filter_map(|task| {
            clip(task, window).map(|(start, end)| Placement {
                task_id: task.id.clone(),
                lane: 0,
                start_offset_day: start,
                end_offset_day: end,
            })
        })
        .collect();

    // Stable, so equal keys keep their input order.
    visible.sort_by(|a, b| {
        a.start_offset_day
            .cmp(&b.start_offset_day)
            .then_with(|| b.span().cmp(&a.span()))
    });

    let mut lanes: Vec<Vec<usize>> = Vec::new();
    for idx in 0..visible.len() {
        let candidate = &visible[idx];
        let free = lanes.iter().position(|occupants| {
            occupants
                .iter()
                .all(|&other| !candidate.overlaps(&visible[other]))
        });

        let lane = match free {
            Some(lane) => {
                lanes[lane].push(idx);
                lane
            }
            None => {
                lanes.push(vec![idx]);
                lanes.len() - 1
            }
        };
        visible[idx].lane = lane;
    }

    debug!(
        visible = visible.len(),
        lanes = lanes.len(),
        "laid out month window"
    );

    LayoutResult {
        placements: visible,
        lane_count: lanes.len(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{LayoutResult, Placement, clip, layout};
    use crate::task::Task;
    use crate::window::Window;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    fn task(id: &str, start: &str, end: &str) -> Task {
        Task::new(id.to_string(), id.to_string(), date(start), date(end))
    }

    fn feb_2024() -> Window {
        Window::new(2024, 1).expect("window")
    }

    fn assert_lanes_disjoint(result: &LayoutResult) {
        for (i, a) in result.placements.iter().enumerate() {
            for b in &result.placements[i + 1..] {
                if a.lane == b.lane {
                    assert!(
                        !a.overlaps(b),
                        "{} and {} share lane {}",
                        a.task_id,
                        b.task_id,
                        a.lane
                    );
                }
            }
        }
    }

    #[test]
    fn leap_february_scenario() {
        let tasks = vec![
            task("A", "2024-01-25", "2024-02-05"),
            task("B", "2024-02-10", "2024-02-20"),
            task("C", "2024-02-15", "2024-02-25"),
        ];
        let result = layout(&tasks, feb_2024());

        let a = &result.placements[0];
        assert_eq!(a.task_id, "A");
        assert_eq!((a.start_offset_day, a.end_offset_day), (1, 5));
        assert_eq!(result.lane_of("A"), Some(0));
        assert_eq!(result.lane_of("B"), Some(0));
        assert_eq!(result.lane_of("C"), Some(1));
        assert_eq!(result.lane_count, 2);
    }

    #[test]
    fn clips_to_month_end() {
        let spill = task("C", "2024-02-15", "2024-03-25");
        assert_eq!(clip(&spill, feb_2024()), Some((15, 29)));

        let whole = task("W", "2023-12-01", "2024-06-01");
        assert_eq!(clip(&whole, feb_2024()), Some((1, 29)));

        let before = task("X", "2024-01-01", "2024-01-31");
        assert_eq!(clip(&before, feb_2024()), None);
        let after = task("Y", "2024-03-01", "2024-03-01");
        assert_eq!(clip(&after, feb_2024()), None);
    }

    #[test]
    fn full_month_tasks_stack() {
        let tasks = vec![
            task("a", "2024-02-01", "2024-02-29"),
            task("b", "2024-01-15", "2024-03-15"),
            task("c", "2024-02-01", "2024-04-01"),
        ];
        let result = layout(&tasks, feb_2024());
        assert_eq!(result.lane_count, 3);
        assert_lanes_disjoint(&result);
    }

    #[test]
    fn disjoint_tasks_share_one_lane() {
        let tasks = vec![
            task("d", "2024-02-20", "2024-02-22"),
            task("a", "2024-02-01", "2024-02-03"),
            task("c", "2024-02-10", "2024-02-12"),
            task("b", "2024-02-04", "2024-02-09"),
        ];
        let result = layout(&tasks, feb_2024());
        assert_eq!(result.lane_count, 1);
        let order: Vec<&str> = result
            .placements
            .iter()
            .map(|p| p.task_id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn touching_days_overlap() {
        // Closed intervals: ending on the 5th and starting on the 5th collide.
        let tasks = vec![
            task("a", "2024-02-01", "2024-02-05"),
            task("b", "2024-02-05", "2024-02-08"),
        ];
        let result = layout(&tasks, feb_2024());
        assert_eq!(result.lane_count, 2);
    }

    #[test]
    fn longer_bar_claims_lane_first_on_ties() {
        let tasks = vec![
            task("short", "2024-02-03", "2024-02-04"),
            task("long", "2024-02-03", "2024-02-20"),
        ];
        let result = layout(&tasks, feb_2024());
        assert_eq!(result.placements[0].task_id, "long");
        assert_eq!(result.lane_of("long"), Some(0));
        assert_eq!(result.lane_of("short"), Some(1));
    }

    #[test]
    fn lane_holds_many_disjoint_occupants() {
        let tasks = vec![
            task("wide", "2024-02-01", "2024-02-20"),
            task("early", "2024-02-02", "2024-02-03"),
            task("gap", "2024-02-05", "2024-02-06"),
            task("late", "2024-02-22", "2024-02-23"),
            task("mid", "2024-02-10", "2024-02-12"),
        ];
        let result = layout(&tasks, feb_2024());
        assert_lanes_disjoint(&result);
        assert_eq!(result.lane_of("wide"), Some(0));
        assert_eq!(result.lane_of("early"), Some(1));
        assert_eq!(result.lane_of("gap"), Some(1));
        assert_eq!(result.lane_of("mid"), Some(1));
        assert_eq!(result.lane_of("late"), Some(0));
        assert_eq!(result.lane(1).count(), 3);
        assert_eq!(result.lane_count, 2);
    }

    #[test]
    fn identical_input_gives_identical_layout() {
        let tasks = vec![
            task("x", "2024-02-03", "2024-02-05"),
            task("y", "2024-02-03", "2024-02-05"),
            task("z", "2024-02-04", "2024-02-10"),
            task("w", "2024-01-20", "2024-02-02"),
        ];
        let first = layout(&tasks, feb_2024());
        let second = layout(&tasks, feb_2024());
        assert_eq!(first, second);
        assert_eq!(first.lane_of("x"), Some(0));
        assert_eq!(first.lane_of("y"), Some(1));
    }

    #[test]
    fn inverted_interval_becomes_single_day() {
        let tasks = vec![task("bad", "2024-02-10", "2024-02-02")];
        let result = layout(&tasks, feb_2024());
        let bar = &result.placements[0];
        assert_eq!((bar.start_offset_day, bar.end_offset_day), (10, 10));

        let outside = vec![task("bad", "2024-03-10", "2024-02-02")];
        assert!(layout(&outside, feb_2024()).is_empty());
    }

    #[test]
    fn geometry_follows_grid_columns() {
        let tasks = vec![task("a", "2024-02-01", "2024-02-29")];
        let result = layout(&tasks, feb_2024());
        let bar = &result.placements[0];
        assert_eq!(bar.left_percent(), 0.0);
        assert!((bar.width_percent() - 29.0 * 100.0 / 31.0).abs() < 1e-9);
        assert_eq!(result.row_height_px(), 44);
        assert_eq!(LayoutResult::default().row_height_px(), 40);
        assert_eq!(bar.top_px(), 8);
    }

    #[test]
    fn accepts_borrowed_tasks() {
        let owned = vec![task("a", "2024-02-01", "2024-02-02")];
        let refs: Vec<&Task> = owned.iter().collect();
        assert_eq!(layout(&refs, feb_2024()), layout(&owned, feb_2024()));
    }

    #[test]
    fn reversed_offsets_span_nothing() {
        let reversed = Placement {
            task_id: "t".to_string(),
            lane: 0,
            start_offset_day: 10,
            end_offset_day: 5,
        };
        assert_eq!(reversed.span(), 0);
        assert_eq!(reversed.width_percent(), 0.0);
    }
}
