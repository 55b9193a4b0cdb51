// SPDX-License-Identifier: MIT

//! Menu screens and the generic menu loop.
//!
//! A [`MenuScreen`] is a list of [`MenuEntry`] values plus a timeout. The
//! driving logic lives in [`MenuRun`], which is pure: it consumes key presses
//! and timer ticks and reports how the screen changed and when the user made
//! a choice. [`run`] wraps it in the firmware's console input for real use,
//! painting through a [`MenuRender`] implementation supplied by the frontend.

pub mod scroll;

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use uefi::{
    ResultExt, boot,
    proto::console::text::{Key, ScanCode},
};

use crate::{
    BootResult,
    menu::scroll::{Movement, ScrollMode, ScrollState},
    system::helper::contains_ignore_case,
};

/// One decisecond, the poll interval while a timeout is running.
const TICK_MICROSECONDS: usize = 100_000;

/// Why the menu loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuExit {
    /// The user chose the selected entry.
    Enter,

    /// The user backed out of the screen.
    Escape,

    /// The user asked for the detail screen of the selected entry.
    Details,

    /// The timeout expired without a key press.
    Timeout,
}

/// What booting the entry means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryTag {
    /// Start an EFI executable.
    Loader(LoaderInfo),

    /// Activate an MBR partition and hand off to the firmware's legacy boot.
    Legacy {
        /// The volume whose partition is activated.
        volume: usize,
    },

    /// Show program information.
    About,

    /// Restart the machine.
    Reboot,

    /// Power the machine off.
    Shutdown,

    /// Leave the boot selector.
    Exit,

    /// Leave a detail screen back to the main menu.
    Return,
}

/// Everything needed to start an EFI executable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoaderInfo {
    /// The volume the executable lives on.
    pub volume: usize,

    /// The path on that volume.
    pub path: String,

    /// The load options handed to the executable.
    pub options: Option<String>,

    /// Boot without switching the console to text mode first.
    pub graphics: bool,
}

/// One line of the menu.
#[derive(Clone, Debug)]
pub struct MenuEntry {
    /// The text shown to the user.
    pub title: String,

    /// A digit that selects the entry directly.
    pub shortcut_digit: Option<char>,

    /// A letter that selects the entry directly.
    pub shortcut_letter: Option<char>,

    /// Row 0 for boot entries, row 1 for tools.
    pub row: u8,

    /// What choosing the entry does.
    pub tag: EntryTag,

    /// The detail screen behind the entry, if it has one.
    pub sub_screen: Option<MenuScreen>,
}

impl MenuEntry {
    /// A plain row 0 entry with no shortcut and no detail screen.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(title: String, tag: EntryTag) -> Self {
        Self {
            title,
            shortcut_digit: None,
            shortcut_letter: None,
            row: 0,
            tag,
            sub_screen: None,
        }
    }
}

/// One screen of entries.
#[derive(Clone, Debug, Default)]
pub struct MenuScreen {
    /// The screen heading.
    pub title: String,

    /// Seconds before the default entry boots on its own, 0 for no timeout.
    pub timeout_seconds: usize,

    /// The verb shown in the countdown message.
    pub timeout_text: String,

    /// Informational lines above the entries.
    pub info_lines: Vec<String>,

    /// The entries, row 0 first.
    pub entries: Vec<MenuEntry>,
}

impl MenuScreen {
    /// Finds the entry a shortcut refers to.
    ///
    /// A single character matches shortcut digits and letters, anything
    /// longer matches as a case-insensitive substring of entry titles. The
    /// longer form serves the `default_selection` configuration directive.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find_shortcut(&self, shortcut: &str) -> Option<usize> {
        let mut chars = shortcut.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let c = c.to_ascii_uppercase();
                self.entries.iter().position(|x| {
                    x.shortcut_digit == Some(c) || x.shortcut_letter == Some(c)
                })
            }
            (Some(_), Some(_)) => self
                .entries
                .iter()
                .position(|x| contains_ignore_case(&x.title, shortcut)),
            _ => None,
        }
    }
}

/// Paints a [`MenuScreen`] for one [`run`] of the menu loop.
pub trait MenuRender {
    /// Prepares the screen and reports the layout mode and how many entries
    /// fit on it.
    fn init(&mut self, screen: &MenuScreen) -> (ScrollMode, usize);

    /// Repaints the whole screen.
    fn paint_all(&mut self, screen: &MenuScreen, state: &ScrollState);

    /// Repaints the previous and current selection only.
    fn paint_selection(&mut self, screen: &MenuScreen, state: &ScrollState);

    /// Paints or clears the countdown message.
    fn paint_timeout(&mut self, screen: &MenuScreen, message: &str);

    /// Tears the screen down after the loop returns.
    fn cleanup(&mut self, screen: &MenuScreen);
}

/// The pure state machine behind one menu screen.
pub struct MenuRun<'a> {
    /// The screen being driven.
    screen: &'a MenuScreen,

    /// The selection and scrolling state.
    pub state: ScrollState,

    /// Deciseconds until the timeout fires. `None` once a key was pressed.
    countdown: Option<usize>,
}

impl<'a> MenuRun<'a> {
    /// Starts a run of `screen`, optionally on a preselected entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(
        screen: &'a MenuScreen,
        mode: ScrollMode,
        max_visible: usize,
        default_index: Option<usize>,
    ) -> Self {
        let mut state = ScrollState::new(screen.entries.len(), max_visible, mode);
        let rows: Vec<u8> = screen.entries.iter().map(|x| x.row).collect();
        state.identify_rows(&rows);
        if let Some(index) = default_index {
            if index <= state.max_index {
                state.current_selection = index;
            }
        }
        state.update(Movement::None);

        Self {
            screen,
            state,
            countdown: (screen.timeout_seconds > 0).then(|| screen.timeout_seconds * 10),
        }
    }

    /// The selected entry index.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn selection(&self) -> usize {
        self.state.current_selection
    }

    /// Tests if the timeout is still armed.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn has_timeout(&self) -> bool {
        self.countdown.is_some()
    }

    /// The countdown message to show, while the timeout is armed.
    #[must_use = "Has no effect if the result is unused"]
    pub fn timeout_message(&self) -> Option<String> {
        self.countdown
            .map(|x| format!("{} in {} seconds", self.screen.timeout_text, (x + 5) / 10))
    }

    /// Advances the countdown by one decisecond of idle time.
    pub fn tick(&mut self) -> Option<MenuExit> {
        match self.countdown {
            Some(0) => Some(MenuExit::Timeout),
            Some(x) => {
                self.countdown = Some(x - 1);
                None
            }
            None => None,
        }
    }

    /// Feeds one key press into the state machine.
    ///
    /// Any key disarms the timeout for the rest of the run.
    pub fn press(&mut self, key: &Key) -> Option<MenuExit> {
        self.countdown = None;

        match key {
            Key::Special(code) => {
                let movement = match *code {
                    ScanCode::UP => Movement::Up,
                    ScanCode::DOWN => Movement::Down,
                    ScanCode::LEFT => Movement::Left,
                    ScanCode::RIGHT => Movement::Right,
                    ScanCode::HOME => Movement::First,
                    ScanCode::END => Movement::Last,
                    ScanCode::PAGE_UP => Movement::PageUp,
                    ScanCode::PAGE_DOWN => Movement::PageDown,
                    ScanCode::ESCAPE => return Some(MenuExit::Escape),
                    ScanCode::INSERT | ScanCode::FUNCTION_2 => return Some(MenuExit::Details),
                    _ => return None,
                };
                self.state.update(movement);
                None
            }
            Key::Printable(c) => {
                let c = char::from(*c);
                match c {
                    '\r' | '\n' | ' ' => Some(MenuExit::Enter),
                    '+' => Some(MenuExit::Details),
                    _ => {
                        let index = self.screen.find_shortcut(&c.to_string())?;
                        self.state.current_selection = index;
                        Some(MenuExit::Enter)
                    }
                }
            }
        }
    }
}

/// Runs one menu screen against the firmware console until the user decides.
///
/// Returns how the loop ended and which entry was selected at that point.
///
/// # Errors
///
/// May return an `Error` if reading console input fails.
pub fn run(
    screen: &MenuScreen,
    renderer: &mut dyn MenuRender,
    default_selection: Option<&str>,
) -> BootResult<(MenuExit, usize)> {
    let default_index = default_selection.and_then(|x| screen.find_shortcut(x));
    let (mode, max_visible) = renderer.init(screen);
    let mut run = MenuRun::new(screen, mode, max_visible, default_index);

    let exit = loop {
        if run.state.paint_all {
            renderer.paint_all(screen, &run.state);
            run.state.paint_all = false;
        } else if run.state.paint_selection {
            renderer.paint_selection(screen, &run.state);
            run.state.paint_selection = false;
        }
        if let Some(message) = run.timeout_message() {
            renderer.paint_timeout(screen, &message);
        }

        match uefi::system::with_stdin(|stdin| stdin.read_key())? {
            Some(key) => {
                let had_timeout = run.has_timeout();
                let exit = run.press(&key);
                if had_timeout {
                    renderer.paint_timeout(screen, "");
                }
                if let Some(exit) = exit {
                    break exit;
                }
            }
            None if run.has_timeout() => {
                if let Some(exit) = run.tick() {
                    break exit;
                }
                boot::stall(TICK_MICROSECONDS);
            }
            None => {
                let event = uefi::system::with_stdin(|stdin| stdin.wait_for_key_event());
                if let Some(event) = event {
                    boot::wait_for_event(&mut [event]).discard_errdata()?;
                }
            }
        }
    };

    renderer.cleanup(screen);
    Ok((exit, run.selection()))
}
