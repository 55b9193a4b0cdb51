// SPDX-License-Identifier: MIT

//! A [`MenuRender`] implementation on top of the UEFI text console.
//!
//! The layout is one banner line, the scrolling entry list, the info lines,
//! a key hint line, and the countdown message on the bottom row. Entries are
//! padded to the console width so repainting a line fully covers the old one.

use alloc::string::String;
use core::fmt::Write;

use bootsel_rs_core::{
    BootResult,
    config::HideUi,
    menu::{MenuRender, MenuScreen, scroll::{ScrollMode, ScrollState}},
};
use uefi::{
    boot::{self, ScopedProtocol},
    proto::console::text::{Color, Output},
};

/// Renders menu screens on the system text console.
pub struct TextRender {
    /// The console output protocol.
    output: ScopedProtocol<Output>,

    /// Interface elements the user asked to hide.
    hide_ui: HideUi,

    /// An upper bound on visible entries, 0 for no bound.
    max_tags: usize,

    /// The console width in characters.
    columns: usize,

    /// The console height in characters.
    rows: usize,

    /// The first console row used by the entry list.
    menu_top: usize,
}

impl TextRender {
    /// Opens the console output protocol.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the system does not have an [`Output`].
    pub fn new(hide_ui: HideUi, max_tags: usize) -> BootResult<Self> {
        let handle = boot::get_handle_for_protocol::<Output>()?;
        let output = boot::open_protocol_exclusive::<Output>(handle)?;
        Ok(Self {
            output,
            hide_ui,
            max_tags,
            columns: 80,
            rows: 25,
            menu_top: 0,
        })
    }

    /// Writes text at a position, padded with spaces to a fixed width.
    fn write_at(&mut self, x: usize, y: usize, text: &str, width: usize) {
        let _ = self.output.set_cursor_position(x, y);
        let mut line = String::with_capacity(width);
        for c in text.chars().take(width) {
            line.push(c);
        }
        for _ in line.chars().count()..width {
            line.push(' ');
        }
        let _ = self.output.write_str(&line);
    }

    /// Repaints one entry line, highlighted when selected.
    fn paint_entry(&mut self, screen: &MenuScreen, state: &ScrollState, index: usize) {
        if index < state.first_visible || index > state.last_visible {
            return;
        }
        let row = self.menu_top + index - state.first_visible;
        if index == state.current_selection {
            let _ = self.output.set_color(Color::Black, Color::LightGray);
        } else {
            let _ = self.output.set_color(Color::LightGray, Color::Black);
        }
        let title = screen
            .entries
            .get(index)
            .map_or("", |x| x.title.as_str());
        self.write_at(2, row, title, self.columns.saturating_sub(3));
        let _ = self.output.set_color(Color::LightGray, Color::Black);
    }

    /// Paints the scroll arrows in the left margin.
    fn paint_arrows(&mut self, state: &ScrollState) {
        if self.hide_ui.contains(HideUi::ARROWS) {
            return;
        }
        let up = if state.first_visible > 0 { "^" } else { " " };
        self.write_at(0, self.menu_top, up, 1);

        let last_row = self.menu_top + state.last_visible - state.first_visible;
        let down = if state.last_visible < state.max_index { "v" } else { " " };
        self.write_at(0, last_row, down, 1);
    }
}

impl MenuRender for TextRender {
    fn init(&mut self, screen: &MenuScreen) -> (ScrollMode, usize) {
        let _ = self.output.enable_cursor(false);
        if let Ok(Some(mode)) = self.output.current_mode() {
            self.columns = mode.columns();
            self.rows = mode.rows();
        }
        self.menu_top = if self.hide_ui.contains(HideUi::BANNER) {
            0
        } else {
            2
        };

        // the info lines, the hint line and the countdown row stay visible
        let reserved = self.menu_top + screen.info_lines.len() + 3;
        let mut visible = self.rows.saturating_sub(reserved).max(1);
        if self.max_tags > 0 {
            visible = visible.min(self.max_tags);
        }
        (ScrollMode::Text, visible)
    }

    fn paint_all(&mut self, screen: &MenuScreen, state: &ScrollState) {
        let _ = self.output.set_color(Color::LightGray, Color::Black);
        let _ = self.output.clear();

        if !self.hide_ui.contains(HideUi::BANNER) {
            self.write_at(2, 0, &screen.title, self.columns.saturating_sub(3));
        }
        for index in state.first_visible..=state.last_visible.min(state.max_index) {
            self.paint_entry(screen, state, index);
        }
        self.paint_arrows(state);

        let mut row = self.menu_top + state.last_visible - state.first_visible + 2;
        for line in &screen.info_lines {
            self.write_at(2, row, line, self.columns.saturating_sub(3));
            row += 1;
        }
        if !self.hide_ui.contains(HideUi::FUNCS) {
            self.write_at(
                2,
                self.rows.saturating_sub(2),
                "Arrows to select, Enter to boot, Insert for options, Esc to rescan",
                self.columns.saturating_sub(3),
            );
        }
    }

    fn paint_selection(&mut self, screen: &MenuScreen, state: &ScrollState) {
        self.paint_entry(screen, state, state.previous_selection);
        self.paint_entry(screen, state, state.current_selection);
    }

    fn paint_timeout(&mut self, _screen: &MenuScreen, message: &str) {
        let _ = self.output.set_color(Color::LightGray, Color::Black);
        self.write_at(
            2,
            self.rows.saturating_sub(1),
            message,
            self.columns.saturating_sub(3),
        );
    }

    fn cleanup(&mut self, _screen: &MenuScreen) {
        let _ = self.output.set_color(Color::LightGray, Color::Black);
        let _ = self.output.clear();
    }
}
