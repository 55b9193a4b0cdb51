// SPDX-License-Identifier: MIT

//! Selection and scrolling state for a menu screen.
//!
//! [`ScrollState`] tracks which entry is selected, which slice of entries is
//! visible, and what the renderer has to repaint. It knows nothing about how
//! entries are drawn, only how many exist and which of the two rows each one
//! sits in. Row 0 holds the boot entries, row 1 the tool entries below them.

/// How entries are laid out, which changes what the arrow keys mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScrollMode {
    /// A vertical list, up and down move by one line.
    #[default]
    Text,

    /// Two horizontal icon rows, up and down jump between the rows.
    Icons,
}

/// A cursor movement requested by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Movement {
    /// No movement, just recompute visibility.
    None,
    /// One entry back.
    Left,
    /// One entry forward.
    Right,
    /// One line up, or from row 1 to the nearest row 0 entry.
    Up,
    /// One line down, or from row 0 to the nearest row 1 entry.
    Down,
    /// One page back, or to the end of row 0.
    PageUp,
    /// One page forward, or to the start of row 1.
    PageDown,
    /// To the first entry.
    First,
    /// To the last entry.
    Last,
}

/// The scrolling state of one menu screen.
#[derive(Clone, Debug, Default)]
pub struct ScrollState {
    /// The selection before the last movement.
    pub previous_selection: usize,

    /// The selected entry.
    pub current_selection: usize,

    /// The index of the last entry.
    pub max_index: usize,

    /// The first visible entry.
    pub first_visible: usize,

    /// The last visible entry.
    pub last_visible: usize,

    /// How many entries fit on screen at once.
    pub max_visible: usize,

    /// The last entry in row 0.
    pub final_row0: usize,

    /// The first entry in row 1, or `max_index` if row 1 is empty.
    pub initial_row1: usize,

    /// The whole screen must be repainted.
    pub paint_all: bool,

    /// Only the old and new selection must be repainted.
    pub paint_selection: bool,

    /// The layout mode.
    pub mode: ScrollMode,
}

impl ScrollState {
    /// Creates the state for a screen of `item_count` entries, of which at
    /// most `max_visible` are on screen at once.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(item_count: usize, max_visible: usize, mode: ScrollMode) -> Self {
        let max_visible = max_visible.max(1);
        Self {
            max_index: item_count.saturating_sub(1),
            max_visible,
            last_visible: max_visible - 1,
            paint_all: true,
            mode,
            ..Self::default()
        }
    }

    /// Finds the row boundaries from the per-entry row numbers.
    ///
    /// In icon mode the visible window then covers at most row 0, since row 1
    /// never scrolls.
    pub fn identify_rows(&mut self, rows: &[u8]) {
        self.final_row0 = 0;
        self.initial_row1 = self.max_index;
        for (i, &row) in rows.iter().enumerate().take(self.max_index) {
            if row == 0 {
                self.final_row0 = i;
            } else if row == 1 && self.initial_row1 > i {
                self.initial_row1 = i;
            }
        }
        if self.mode == ScrollMode::Icons && self.max_visible > self.final_row0 + 1 {
            self.max_visible = self.final_row0 + 1;
        }
    }

    /// Applies one movement and recomputes visibility and paint flags.
    pub fn update(&mut self, movement: Movement) {
        self.previous_selection = self.current_selection;

        match movement {
            Movement::None => (),
            Movement::Left => {
                if self.current_selection > 0 {
                    self.current_selection -= 1;
                }
            }
            Movement::Right => {
                if self.current_selection < self.max_index {
                    self.current_selection += 1;
                }
            }
            Movement::Up => self.move_up(),
            Movement::Down => self.move_down(),
            Movement::PageUp => {
                if self.current_selection <= self.final_row0 {
                    self.current_selection =
                        self.current_selection.saturating_sub(self.max_visible);
                } else if self.current_selection == self.initial_row1 {
                    self.current_selection = self.final_row0;
                } else {
                    self.current_selection = self.initial_row1;
                }
            }
            Movement::PageDown => {
                if self.current_selection < self.final_row0 {
                    self.current_selection =
                        (self.current_selection + self.max_visible).min(self.final_row0);
                } else if self.current_selection == self.final_row0 {
                    self.current_selection += 1;
                } else {
                    self.current_selection = self.max_index;
                }
                self.current_selection = self.current_selection.min(self.max_index);
            }
            Movement::First => {
                if self.current_selection > 0 {
                    self.paint_all = true;
                    self.current_selection = 0;
                }
            }
            Movement::Last => {
                if self.current_selection < self.max_index {
                    self.paint_all = true;
                    self.current_selection = self.max_index;
                }
            }
        }

        if self.mode == ScrollMode::Text {
            self.adjust();
        }
        if !self.paint_all && self.current_selection != self.previous_selection {
            self.paint_selection = true;
        }
        self.last_visible = self.first_visible + self.max_visible - 1;
    }

    /// Row 1 to row 0, landing on the entry above the current one.
    fn move_up(&mut self) {
        if self.mode == ScrollMode::Icons {
            if self.current_selection >= self.initial_row1 {
                self.current_selection = if self.max_index > self.initial_row1 {
                    self.first_visible
                        + (self.last_visible - self.first_visible)
                            * (self.current_selection - self.initial_row1)
                            / (self.max_index - self.initial_row1)
                } else {
                    self.first_visible
                };
            }
        } else if self.current_selection > 0 {
            self.current_selection -= 1;
        }
    }

    /// Row 0 to row 1, landing on the entry below the current one.
    fn move_down(&mut self) {
        if self.mode == ScrollMode::Icons {
            if self.current_selection <= self.final_row0 {
                self.current_selection = if self.last_visible > self.first_visible {
                    self.initial_row1
                        + (self.max_index - self.initial_row1)
                            * (self.current_selection - self.first_visible)
                            / (self.last_visible - self.first_visible)
                } else {
                    self.initial_row1
                };
            }
        } else if self.current_selection < self.max_index {
            self.current_selection += 1;
        }
    }

    /// Scrolls the visible window so the selection is inside it.
    fn adjust(&mut self) {
        if self.current_selection > self.last_visible {
            self.last_visible = self.current_selection;
            self.first_visible = (1 + self.current_selection).saturating_sub(self.max_visible);
            self.paint_all = true;
        }
        if self.current_selection < self.first_visible {
            self.first_visible = self.current_selection;
            self.last_visible = self.current_selection + self.max_visible - 1;
            self.paint_all = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn text_state(item_count: usize, max_visible: usize) -> ScrollState {
        let mut state = ScrollState::new(item_count, max_visible, ScrollMode::Text);
        state.identify_rows(&alloc::vec![0; item_count]);
        state
    }

    #[test]
    fn test_walk_back_through_scrolled_list() {
        let mut state = text_state(12, 5);
        state.update(Movement::Last);
        assert_eq!(state.current_selection, 11);
        assert_eq!(state.first_visible, 7);

        for _ in 0..11 {
            state.update(Movement::Left);
        }
        assert_eq!(state.current_selection, 0);
        assert_eq!(state.first_visible, 0);
    }

    #[test]
    fn test_movement_stops_at_the_edges() {
        let mut state = text_state(3, 5);
        state.update(Movement::Left);
        assert_eq!(state.current_selection, 0);
        state.update(Movement::Last);
        state.update(Movement::Right);
        assert_eq!(state.current_selection, 2);
    }

    #[test]
    fn test_scrolling_forward_repaints_everything() {
        let mut state = text_state(12, 5);
        state.paint_all = false;
        for _ in 0..4 {
            state.update(Movement::Down);
            assert!(!state.paint_all);
            assert!(state.paint_selection);
        }
        state.update(Movement::Down);
        assert!(state.paint_all);
        assert_eq!(state.first_visible, 1);
        assert_eq!(state.last_visible, 5);
    }

    #[test]
    fn test_page_movements_respect_row_boundaries() {
        let mut state = ScrollState::new(8, 10, ScrollMode::Text);
        state.identify_rows(&[0, 0, 0, 0, 0, 1, 1, 1]);
        assert_eq!(state.final_row0, 4);
        assert_eq!(state.initial_row1, 5);

        state.update(Movement::PageDown);
        assert_eq!(state.current_selection, 4);
        state.update(Movement::PageDown);
        assert_eq!(state.current_selection, 5);
        state.update(Movement::PageUp);
        assert_eq!(state.current_selection, 4);
    }

    #[test]
    fn test_icon_mode_jumps_between_rows() {
        let mut state = ScrollState::new(8, 10, ScrollMode::Icons);
        state.identify_rows(&[0, 0, 0, 0, 0, 1, 1, 1]);
        // the visible window shrinks to the five row 0 entries
        assert_eq!(state.max_visible, 5);
        state.update(Movement::None);

        state.update(Movement::Down);
        assert_eq!(state.current_selection, 5);
        state.update(Movement::Up);
        assert_eq!(state.current_selection, 0);

        state.update(Movement::Last);
        state.update(Movement::Up);
        assert_eq!(state.current_selection, state.last_visible);
    }

    proptest! {
        #[test]
        fn test_selection_stays_visible(
            item_count in 1usize..40,
            max_visible in 1usize..12,
            movements in prop::collection::vec(0u8..8, 0..64),
        ) {
            let mut state = text_state(item_count, max_visible);
            for movement in movements {
                let movement = match movement {
                    0 => Movement::Left,
                    1 => Movement::Right,
                    2 => Movement::Up,
                    3 => Movement::Down,
                    4 => Movement::PageUp,
                    5 => Movement::PageDown,
                    6 => Movement::First,
                    _ => Movement::Last,
                };
                state.update(movement);
                prop_assert!(state.current_selection <= state.max_index);
                prop_assert!(state.first_visible <= state.current_selection);
                prop_assert!(state.current_selection <= state.last_visible);
            }
        }
    }
}
