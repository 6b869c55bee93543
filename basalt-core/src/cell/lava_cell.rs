use std::mem;

use super::{FlowParams, HEIGHT_UNITS_PER_BLOCK};
use crate::voxel::VoxelState;

/// One barrier-bounded span of a column and the fluid it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct LavaCell {
    floor: i32,
    ceiling: i32,
    fluid: i64,
    activity: f32,
    idle_ticks: u32,
    settled_ticks: u32,
    moved: i64,
    shown_top: i32,
    dirty: bool,
}

impl LavaCell {
    /// Creates an empty cell spanning `floor..ceiling` height units.
    #[must_use]
    pub fn new(floor: i32, ceiling: i32) -> Self {
        debug_assert!(floor < ceiling, "empty span {floor}..{ceiling}");
        Self {
            floor,
            ceiling,
            fluid: 0,
            activity: 0.0,
            idle_ticks: 0,
            settled_ticks: 0,
            moved: 0,
            shown_top: (ceiling - 1).div_euclid(HEIGHT_UNITS_PER_BLOCK),
            dirty: false,
        }
    }

    /// Bottom of the span in height units.
    #[must_use]
    pub fn floor(&self) -> i32 {
        self.floor
    }

    /// Top of the span in height units, exclusive.
    #[must_use]
    pub fn ceiling(&self) -> i32 {
        self.ceiling
    }

    /// The block the fluid rests on: the barrier below, or the crust block
    /// when the floor is partial.
    #[must_use]
    pub fn floor_y(&self) -> i32 {
        (self.floor - 1).div_euclid(HEIGHT_UNITS_PER_BLOCK)
    }

    /// The lowest block the span reaches into.
    #[must_use]
    pub fn base_y(&self) -> i32 {
        self.floor.div_euclid(HEIGHT_UNITS_PER_BLOCK)
    }

    /// The highest block the span reaches into.
    #[must_use]
    pub fn top_y(&self) -> i32 {
        (self.ceiling - 1).div_euclid(HEIGHT_UNITS_PER_BLOCK)
    }

    /// Returns true if block `y` lies inside the span.
    #[must_use]
    pub fn contains_y(&self, y: i32) -> bool {
        (self.base_y()..=self.top_y()).contains(&y)
    }

    /// Fluid units held.
    #[must_use]
    pub fn fluid_units(&self) -> i64 {
        self.fluid
    }

    /// Open volume of the span in fluid units.
    #[must_use]
    pub fn capacity(&self, params: &FlowParams) -> i64 {
        i64::from(self.ceiling - self.floor) * params.units_per_level
    }

    /// Capacity plus pressure headroom.
    #[must_use]
    pub fn max_fluid(&self, params: &FlowParams) -> i64 {
        self.capacity(params) + params.headroom
    }

    /// Units the cell can still take.
    #[must_use]
    pub fn free_units(&self, params: &FlowParams) -> i64 {
        (self.max_fluid(params) - self.fluid).max(0)
    }

    /// Returns true if the cell holds more than its open volume.
    #[must_use]
    pub fn is_pressurized(&self, params: &FlowParams) -> bool {
        self.fluid > self.capacity(params)
    }

    /// Pressure surface in unit heights (`height_units * units_per_level`).
    #[must_use]
    pub fn surface(&self, params: &FlowParams) -> i64 {
        let capacity = self.capacity(params);
        if self.fluid <= capacity {
            i64::from(self.floor) * params.units_per_level + self.fluid
        } else {
            i64::from(self.ceiling) * params.units_per_level
                + (self.fluid - capacity) * params.pressure_factor
        }
    }

    /// Fluid rounded to whole height levels.
    #[must_use]
    pub fn fluid_levels(&self, params: &FlowParams) -> i64 {
        (self.fluid + params.units_per_level / 2) / params.units_per_level
    }

    /// Smoothed share of a block moved per tick, in `[0, 1]`.
    #[must_use]
    pub fn activity(&self) -> f32 {
        self.activity
    }

    /// Consecutive ticks spent empty without inflow.
    #[must_use]
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Consecutive ticks without any movement.
    #[must_use]
    pub fn settled_ticks(&self) -> u32 {
        self.settled_ticks
    }

    /// Returns true if the displayed blocks may be stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(super) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Adds up to `units` and returns what did not fit.
    pub fn add_fluid(&mut self, units: i64, params: &FlowParams) -> i64 {
        let accepted = units.clamp(0, self.free_units(params));
        if accepted > 0 {
            self.fluid += accepted;
            self.moved += accepted;
            self.idle_ticks = 0;
            self.settled_ticks = 0;
            self.dirty = true;
        }
        units - accepted
    }

    /// Sets the amount directly, clamped into `0..=max_fluid`.
    pub(super) fn set_fluid(&mut self, units: i64, params: &FlowParams) {
        debug_assert!(units >= 0, "negative fluid {units}");
        self.fluid = units.clamp(0, self.max_fluid(params));
    }

    /// Takes `amount` flowing in from a neighbor.
    pub(super) fn receive(&mut self, amount: i64) {
        debug_assert!(amount >= 0);
        self.fluid += amount;
        self.moved += amount;
    }

    /// Gives up `amount` to a neighbor or a drip.
    pub(super) fn drain(&mut self, amount: i64) {
        debug_assert!(amount >= 0 && amount <= self.fluid);
        self.fluid -= amount;
        self.moved += amount;
    }

    pub(super) fn inherit_history(&mut self, from: &Self) {
        self.activity = from.activity;
        self.settled_ticks = from.settled_ticks;
        self.idle_ticks = from.idle_ticks;
    }

    /// Folds this tick's movement into the activity and idle counters.
    /// Returns true if the cell took part in any movement.
    pub(super) fn end_tick(&mut self, params: &FlowParams) -> bool {
        let moved = self.moved;
        self.moved = 0;

        let share = (moved as f32 / params.units_per_block as f32).min(1.0);
        self.activity = 0.9 * self.activity + 0.1 * share;

        if moved > 0 {
            self.settled_ticks = 0;
            self.idle_ticks = 0;
            self.dirty = true;
        } else {
            self.settled_ticks = self.settled_ticks.saturating_add(1);
            if self.fluid == 0 {
                self.idle_ticks = self.idle_ticks.saturating_add(1);
            } else {
                self.idle_ticks = 0;
            }
        }
        moved > 0
    }

    /// Whole levels of fluid held. Crust never grows past these.
    #[must_use]
    pub fn covered_levels(&self, params: &FlowParams) -> i64 {
        self.fluid / params.units_per_level
    }

    /// Turns up to `levels` whole levels of the bottom fluid into crust,
    /// capped by the fluid held and the room left in the base block.
    ///
    /// Returns the crust level of the base block afterwards and the fluid
    /// pushed out when the crust closes the span.
    pub(super) fn solidify(&mut self, levels: i32, params: &FlowParams) -> (u8, i64) {
        let crust_y = self.base_y();
        let in_block = HEIGHT_UNITS_PER_BLOCK - (self.floor - crust_y * HEIGHT_UNITS_PER_BLOCK);
        let covered = self.covered_levels(params).min(i64::from(i32::MAX)) as i32;
        let levels = levels
            .min(covered)
            .min(in_block)
            .min(self.ceiling - self.floor)
            .max(0);
        debug_assert!(levels > 0, "nothing to crust");

        self.floor += levels;
        self.fluid -= i64::from(levels) * params.units_per_level;
        let displaced = if self.floor >= self.ceiling {
            mem::take(&mut self.fluid)
        } else {
            0
        };
        self.settled_ticks = 0;
        self.dirty = true;

        ((self.floor - crust_y * HEIGHT_UNITS_PER_BLOCK) as u8, displaced)
    }

    /// The highest block that shows lava for the current amount, or
    /// `base_y - 1` when nothing is shown.
    #[must_use]
    pub fn fluid_top_y(&self, params: &FlowParams) -> i32 {
        if self.is_pressurized(params) {
            return self.top_y();
        }
        let levels = self.fluid_levels(params) as i32;
        if levels == 0 {
            return self.base_y() - 1;
        }
        (self.floor + levels - 1).div_euclid(HEIGHT_UNITS_PER_BLOCK)
    }

    /// What block `y` of the span should display.
    #[must_use]
    pub fn expected_state(&self, y: i32, params: &FlowParams) -> VoxelState {
        let block_floor = y * HEIGHT_UNITS_PER_BLOCK;
        if self.is_pressurized(params) {
            return VoxelState::FULL_LAVA;
        }

        let top = self.floor + self.fluid_levels(params) as i32;
        if top > self.floor && top > block_floor {
            // lava shown here covers any crust below it in the same block
            let level = (top - block_floor).min(HEIGHT_UNITS_PER_BLOCK);
            return VoxelState::Lava(level as u8);
        }
        if block_floor < self.floor {
            return VoxelState::SolidFlow((self.floor - block_floor) as u8);
        }
        VoxelState::Empty
    }

    /// Block range write-back has to compare this tick.
    pub(super) fn write_back_range(&self, params: &FlowParams) -> (i32, i32) {
        let top = self.shown_top.max(self.fluid_top_y(params)).min(self.top_y());
        (self.base_y(), top)
    }

    pub(super) fn finish_write_back(&mut self, params: &FlowParams) {
        self.shown_top = self.fluid_top_y(params).max(self.base_y());
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FlowParams {
        FlowParams::default()
    }

    #[test]
    fn test_surface_below_and_above_capacity() {
        let params = params();
        // floor on top of y = 10, one block of room
        let mut cell = LavaCell::new(132, 144);
        assert_eq!(cell.capacity(&params), 12_000);
        cell.set_fluid(6_000, &params);
        assert_eq!(cell.surface(&params), 132 * 1_000 + 6_000);
        assert!(!cell.is_pressurized(&params));

        cell.set_fluid(13_000, &params);
        assert!(cell.is_pressurized(&params));
        assert_eq!(cell.surface(&params), 144 * 1_000 + 1_000 * params.pressure_factor);
    }

    #[test]
    fn test_floor_and_block_span() {
        let cell = LavaCell::new(132, 180);
        assert_eq!(cell.floor_y(), 10);
        assert_eq!(cell.base_y(), 11);
        assert_eq!(cell.top_y(), 14);
        assert!(cell.contains_y(11) && cell.contains_y(14));
        assert!(!cell.contains_y(10) && !cell.contains_y(15));

        // partial floor from a crust of four levels at y = 11
        let crusted = LavaCell::new(136, 180);
        assert_eq!(crusted.floor_y(), 11);
        assert_eq!(crusted.base_y(), 11);
    }

    #[test]
    fn test_add_fluid_clamps_to_headroom() {
        let params = params();
        let mut cell = LavaCell::new(132, 144);
        let max = cell.max_fluid(&params);
        assert_eq!(cell.add_fluid(max + 500, &params), 500);
        assert_eq!(cell.fluid_units(), max);
        assert_eq!(cell.add_fluid(1, &params), 1);
        assert!(cell.is_dirty());
    }

    #[test]
    fn test_expected_states() {
        let params = params();
        let mut cell = LavaCell::new(136, 180);
        assert_eq!(cell.expected_state(11, &params), VoxelState::SolidFlow(4));
        assert_eq!(cell.expected_state(12, &params), VoxelState::Empty);

        // 3 levels of lava over the crust
        cell.set_fluid(3_000, &params);
        assert_eq!(cell.expected_state(11, &params), VoxelState::Lava(7));
        assert_eq!(cell.expected_state(12, &params), VoxelState::Empty);
        assert_eq!(cell.fluid_top_y(&params), 11);

        // 14 levels reach into the next block
        cell.set_fluid(14_000, &params);
        assert_eq!(cell.expected_state(11, &params), VoxelState::FULL_LAVA);
        assert_eq!(cell.expected_state(12, &params), VoxelState::Lava(6));
        assert_eq!(cell.fluid_top_y(&params), 12);
    }

    #[test]
    fn test_solidify_raises_floor() {
        let params = params();
        let mut cell = LavaCell::new(132, 180);
        cell.set_fluid(5_000, &params);
        assert_eq!(cell.solidify(3, &params), (3, 0));
        assert_eq!(cell.floor(), 135);
        assert_eq!(cell.fluid_units(), 2_000);

        // a crust never grows past the fluid it is made of
        assert_eq!(cell.solidify(12, &params), (5, 0));
        assert_eq!(cell.floor(), 137);
        assert_eq!(cell.fluid_units(), 0);
    }

    #[test]
    fn test_solidify_stays_in_base_block() {
        let params = params();
        let mut cell = LavaCell::new(136, 180);
        cell.set_fluid(20_000, &params);
        assert_eq!(cell.solidify(12, &params), (12, 0));
        assert_eq!(cell.floor(), 144);
        assert_eq!(cell.fluid_units(), 12_000);
    }

    #[test]
    fn test_solidify_closing_span_displaces_rest() {
        let params = params();
        // two levels of room under a barrier
        let mut cell = LavaCell::new(132, 134);
        cell.set_fluid(2_400, &params);
        assert_eq!(cell.covered_levels(&params), 2);
        assert_eq!(cell.solidify(12, &params), (2, 400));
        assert_eq!(cell.fluid_units(), 0);
    }

    #[test]
    fn test_end_tick_counters() {
        let params = params();
        let mut cell = LavaCell::new(132, 144);
        assert!(!cell.end_tick(&params));
        assert_eq!(cell.idle_ticks(), 1);
        assert_eq!(cell.settled_ticks(), 1);

        cell.add_fluid(12_000, &params);
        assert!(cell.end_tick(&params));
        assert_eq!(cell.idle_ticks(), 0);
        assert_eq!(cell.settled_ticks(), 0);
        assert!((cell.activity() - 0.1).abs() < 1e-6);

        assert!(!cell.end_tick(&params));
        assert_eq!(cell.idle_ticks(), 0);
        assert_eq!(cell.settled_ticks(), 1);
    }
}
