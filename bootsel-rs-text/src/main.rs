// SPDX-License-Identifier: MIT

//! Text mode frontend for the bootsel crate.
//!
//! Builds the main menu through [`BootSel`], renders it on the system text
//! console, and dispatches whatever the user picks. Escape rescans the
//! volumes so inserted media shows up without a reboot.

#![no_main]
#![no_std]

extern crate alloc;

mod console;

use alloc::{boxed::Box, format, string::ToString};
use bootsel_rs_core::{
    BootResult,
    boot::BootSel,
    error::BootError,
    menu::{self, EntryTag, MenuEntry, MenuExit, MenuScreen},
    system::log_backend::UefiLogger,
};
use log::error;
use uefi::{
    prelude::*,
    proto::console::text::Output,
    runtime::{self, ResetType},
    system::with_stdout,
};

use crate::console::TextRender;

/// The global logging instance.
static LOGGER: UefiLogger = UefiLogger::new();

/// The actual main function of the program, which returns a [`Result`].
///
/// Returns only when the user picks the exit entry, handing control back to
/// the firmware boot order.
///
/// # Errors
///
/// May return an `Error` if the boot selector could not be built, there is
/// no console, or the menu loop hits an input error.
fn main_func() -> Result<(), Box<dyn core::error::Error>> {
    uefi::helpers::init().map_err(BootError::Uefi)?;
    with_stdout(Output::clear)?;
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Warn));

    let mut bootsel = BootSel::new()?;
    let mut render = TextRender::new(bootsel.settings.hide_ui, bootsel.settings.max_tags)?;

    loop {
        let default_selection = bootsel.settings.default_selection.clone();
        let (exit, index) = menu::run(
            &bootsel.main_menu,
            &mut render,
            default_selection.as_deref(),
        )?;
        // the countdown only runs until the first menu pass
        bootsel.main_menu.timeout_seconds = 0;

        let Some(entry) = bootsel.main_menu.entries.get(index) else {
            continue;
        };
        let mut chosen = entry.tag.clone();

        match exit {
            MenuExit::Escape => {
                bootsel.rescan()?;
                continue;
            }
            MenuExit::Details => {
                let Some(sub_screen) = &entry.sub_screen else {
                    continue;
                };
                match run_sub_screen(sub_screen, &mut render)? {
                    Some(tag) => chosen = tag,
                    None => continue,
                }
            }
            MenuExit::Enter | MenuExit::Timeout => (),
        }

        match chosen {
            EntryTag::Reboot => runtime::reset(ResetType::COLD, Status::SUCCESS, None),
            EntryTag::Shutdown => runtime::reset(ResetType::SHUTDOWN, Status::SUCCESS, None),
            EntryTag::Exit => return Ok(()),
            EntryTag::Return => (),
            EntryTag::About => show_about(&mut render)?,
            EntryTag::Loader(info) => {
                if !info.graphics {
                    with_stdout(Output::clear)?;
                }
                if let Err(e) = bootsel.start_loader(&info) {
                    error!("Failed to start {}: {e}", info.path);
                    boot::stall(3_000_000);
                }
            }
            EntryTag::Legacy { volume } => match bootsel.prepare_legacy(volume) {
                Ok(()) => show_legacy_notice(&mut render)?,
                Err(e) => {
                    error!("Failed to activate the partition: {e}");
                    boot::stall(3_000_000);
                }
            },
        }
    }
}

/// Runs one detail screen and resolves what the user picked there.
///
/// Returns `None` when the user backed out, either with Escape or through
/// the return entry.
fn run_sub_screen(screen: &MenuScreen, render: &mut TextRender) -> BootResult<Option<EntryTag>> {
    let (exit, index) = menu::run(screen, render, None)?;
    if exit == MenuExit::Escape {
        return Ok(None);
    }
    match screen.entries.get(index).map(|x| x.tag.clone()) {
        Some(EntryTag::Return) | None => Ok(None),
        tag => Ok(tag),
    }
}

/// Shows the about screen until the user leaves it.
fn show_about(render: &mut TextRender) -> BootResult<()> {
    let mut screen = MenuScreen {
        title: "About bootsel".to_string(),
        ..MenuScreen::default()
    };
    screen
        .info_lines
        .push(format!("bootsel-rs {}", env!("CARGO_PKG_VERSION")));
    screen
        .info_lines
        .push("A text mode boot selector for UEFI systems".to_string());
    screen.entries.push(MenuEntry::new(
        "Return to Main Menu".to_string(),
        EntryTag::Return,
    ));
    menu::run(&screen, render, None)?;
    Ok(())
}

/// Tells the user the legacy partition is active now.
///
/// The firmware hand-off to legacy boot code is machine specific, so the
/// selector stops at making the partition active.
fn show_legacy_notice(render: &mut TextRender) -> BootResult<()> {
    let mut screen = MenuScreen {
        title: "Legacy Boot".to_string(),
        ..MenuScreen::default()
    };
    screen
        .info_lines
        .push("The partition is now marked active.".to_string());
    screen
        .info_lines
        .push("Reboot and let the firmware start the legacy OS.".to_string());
    screen.entries.push(MenuEntry::new(
        "Return to Main Menu".to_string(),
        EntryTag::Return,
    ));
    menu::run(&screen, render, None)?;
    Ok(())
}

/// The main function of the program.
#[entry]
fn main() -> Status {
    match main_func() {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            error!("Fatal error occurred: {e}");
            error!("Automatically restarting in 10 seconds");

            boot::stall(10_000_000);
            runtime::reset(ResetType::COLD, Status::SUCCESS, None)
        }
    }
}
