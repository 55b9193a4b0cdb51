//! Provides [`Settings`], the global configuration of the boot selector.
//!
//! The configuration file is a token-oriented format read with
//! [`TokenFile`]. Each line names a directive followed by its arguments.
//! Unknown directives are skipped so that files written for newer versions
//! still load, and malformed arguments leave the affected setting at its
//! default rather than failing the whole file.
//!
//! Example configuration:
//!
//! ```text
//! timeout 20
//! textonly
//! hideui banner, arrows
//! scanfor internal,external,optical,manual
//! also_scan_dirs boot,kernels
//! showtools shell, about, reboot, shutdown, exit
//! default_selection vmlinuz
//! ```
//!
//! Boot stanzas (`menuentry ... { ... }`) live in the same file but are
//! interpreted separately by [`stanza`](crate::config::stanza), after the
//! volume scan has run.

pub mod stanza;
pub mod tokens;

use alloc::string::String;
use bitflags::bitflags;
use log::warn;
use uefi::{CStr16, cstr16};

use crate::{
    BootResult,
    config::tokens::TokenFile,
    system::{fs::UefiFileSystem, helper::get_path_cstr},
};

/// The filename of the configuration file, looked up in the program's own directory.
pub const CONFIG_FILE_NAME: &CStr16 = cstr16!("bootsel.conf");

/// The number of slots in [`Settings::scan_for`].
pub const NUM_SCAN_OPTIONS: usize = 10;

/// The number of slots in [`Settings::show_tools`].
pub const NUM_TOOLS: usize = 9;

bitflags! {
    /// User interface elements that may be hidden through the `hideui` directive.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HideUi: u32 {
        /// The banner or title line above the menu.
        const BANNER = 1 << 0;

        /// The function key hints below the menu.
        const FUNCS = 1 << 1;

        /// The text label of the selected entry.
        const LABEL = 1 << 2;

        /// Generated single-user submenu entries.
        const SINGLEUSER = 1 << 3;

        /// Generated hardware test submenu entries.
        const HWTEST = 1 << 4;

        /// The scroll arrows beside the menu.
        const ARROWS = 1 << 5;

        /// Every element at once.
        const ALL = 0xffff;
    }
}

/// The menu tags that may be placed on the tool row through `showtools`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolTag {
    /// An EFI shell found on the boot volume.
    Shell,

    /// The `gptsync.efi` partition table synchronizer.
    Gptsync,

    /// The about screen.
    About,

    /// Leave the boot selector, returning to the firmware.
    Exit,

    /// Reboot the machine.
    Reboot,

    /// Power the machine off.
    Shutdown,
}

/// The global configuration of the boot selector.
pub struct Settings {
    /// Seconds before the default entry boots on its own. Zero disables the countdown.
    pub timeout: usize,

    /// The user interface elements to leave out.
    pub hide_ui: HideUi,

    /// The directory searched for entry icons.
    pub icons_dir: Option<String>,

    /// Which scans to run and in what order, one letter per slot.
    ///
    /// `i`nternal, `e`xternal, `o`ptical for EFI loader scans; `h`ard disk,
    /// `b` external and `c`d for legacy boot sector scans; `m`anual for
    /// configured stanzas. A space leaves the slot unused.
    pub scan_for: [char; NUM_SCAN_OPTIONS],

    /// Extra directories searched for loaders, comma-delimited.
    pub also_scan: Option<String>,

    /// Directories searched for filesystem drivers, comma-delimited.
    pub driver_dirs: Option<String>,

    /// The tool row layout, one optional tag per slot.
    pub show_tools: [Option<ToolTag>; NUM_TOOLS],

    /// The banner image filename.
    pub banner_file_name: Option<String>,

    /// The small selection background image filename.
    pub selection_small_file_name: Option<String>,

    /// The big selection background image filename.
    pub selection_big_file_name: Option<String>,

    /// A substring of the title of the entry to preselect.
    pub default_selection: Option<String>,

    /// Forces the text renderer even when graphics would be available.
    pub text_only: bool,

    /// The requested screen width, if `resolution` was given.
    pub requested_screen_width: Option<usize>,

    /// The requested screen height, if `resolution` was given.
    pub requested_screen_height: Option<usize>,

    /// Adds kernels without a `.efi` extension to the loader scan.
    pub scan_all_linux: bool,

    /// Caps how many entries are shown at once. Zero means no cap.
    pub max_tags: usize,
}

impl Settings {
    /// Reads the configuration from a file next to the program itself.
    ///
    /// A missing file is not an error, the defaults are returned instead.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the config path could not be built from the
    /// program's directory.
    pub fn load(fs: &mut UefiFileSystem, self_dir: &CStr16) -> BootResult<Self> {
        let path = get_path_cstr(self_dir, CONFIG_FILE_NAME)?;
        if !fs.exists(&path) {
            warn!("configuration file missing, using defaults");
            return Ok(Self::default());
        }
        match fs.read(&path) {
            Ok(buf) => Ok(Self::parse(&buf)),
            Err(e) => {
                warn!("could not read configuration file: {e}");
                Ok(Self::default())
            }
        }
    }

    /// Parses the contents of a configuration file buffer.
    #[must_use = "Has no effect if the result is unused"]
    pub fn parse(buf: &[u8]) -> Self {
        let mut settings = Self::default();
        let mut file = TokenFile::new(buf);

        while let Some(tokens) = file.read_token_line() {
            let count = tokens.len();
            match &*tokens[0].to_ascii_lowercase() {
                "timeout" => handle_int(&tokens, &mut settings.timeout),
                "hideui" | "disable" => {
                    for flag in &tokens[1..] {
                        match &*flag.to_ascii_lowercase() {
                            "banner" => settings.hide_ui |= HideUi::BANNER,
                            "label" => settings.hide_ui |= HideUi::LABEL,
                            "singleuser" => settings.hide_ui |= HideUi::SINGLEUSER,
                            "hwtest" => settings.hide_ui |= HideUi::HWTEST,
                            "arrows" => settings.hide_ui |= HideUi::ARROWS,
                            "all" => settings.hide_ui = HideUi::ALL,
                            _ => warn!("unknown hideui flag: '{flag}'"),
                        }
                    }
                }
                "icons_dir" if count == 2 => settings.icons_dir = Some(tokens[1].clone()),
                "scanfor" => {
                    settings.scan_for = [' '; NUM_SCAN_OPTIONS];
                    if let [codes] = &tokens[1..] {
                        // compact form, every character is a scan code
                        for (slot, c) in settings.scan_for.iter_mut().zip(codes.chars()) {
                            *slot = c;
                        }
                    } else {
                        for (slot, token) in settings.scan_for.iter_mut().zip(&tokens[1..]) {
                            *slot = token.chars().next().unwrap_or(' ');
                        }
                    }
                }
                "also_scan_dirs" => settings.also_scan = join_args(&tokens),
                "scan_driver_dirs" => settings.driver_dirs = join_args(&tokens),
                "showtools" => {
                    settings.show_tools = [None; NUM_TOOLS];
                    for (slot, flag) in settings.show_tools.iter_mut().zip(&tokens[1..]) {
                        *slot = match &*flag.to_ascii_lowercase() {
                            "shell" => Some(ToolTag::Shell),
                            "gptsync" => Some(ToolTag::Gptsync),
                            "about" => Some(ToolTag::About),
                            "exit" => Some(ToolTag::Exit),
                            "reboot" => Some(ToolTag::Reboot),
                            "shutdown" => Some(ToolTag::Shutdown),
                            _ => {
                                warn!("unknown showtools flag: '{flag}'");
                                None
                            }
                        };
                    }
                }
                "banner" => handle_string(&tokens, &mut settings.banner_file_name),
                "selection_small" => {
                    handle_string(&tokens, &mut settings.selection_small_file_name);
                }
                "selection_big" => handle_string(&tokens, &mut settings.selection_big_file_name),
                "default_selection" => handle_string(&tokens, &mut settings.default_selection),
                "textonly" => settings.text_only = true,
                "resolution" if count == 3 => {
                    settings.requested_screen_width = tokens[1].parse().ok();
                    settings.requested_screen_height = tokens[2].parse().ok();
                }
                "scan_all_linux_kernels" => settings.scan_all_linux = true,
                "max_tags" if count > 1 => {
                    if let Ok(value) = tokens[1].parse() {
                        settings.max_tags = value;
                    }
                }
                "menuentry" => skip_stanza(&mut file),
                _ => (),
            }
        }

        settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut scan_for = [' '; NUM_SCAN_OPTIONS];
        scan_for[..3].copy_from_slice(&['i', 'e', 'o']);

        let mut show_tools = [None; NUM_TOOLS];
        show_tools[..4].copy_from_slice(&[
            Some(ToolTag::Shell),
            Some(ToolTag::About),
            Some(ToolTag::Shutdown),
            Some(ToolTag::Reboot),
        ]);

        Self {
            timeout: 20,
            hide_ui: HideUi::empty(),
            icons_dir: None,
            scan_for,
            also_scan: None,
            driver_dirs: None,
            show_tools,
            banner_file_name: None,
            selection_small_file_name: None,
            selection_big_file_name: None,
            default_selection: None,
            text_only: false,
            requested_screen_width: None,
            requested_screen_height: None,
            scan_all_linux: false,
            max_tags: 0,
        }
    }
}

/// Handles a directive with a single integer argument.
///
/// The value is only assigned when the directive has exactly one argument
/// that parses as a number.
fn handle_int(tokens: &[String], value: &mut usize) {
    if tokens.len() != 2 {
        return;
    }
    if let Ok(parsed) = tokens[1].parse() {
        *value = parsed;
    }
}

/// Handles a directive with a single string argument.
///
/// The value is only assigned when the directive has exactly one argument.
fn handle_string(tokens: &[String], value: &mut Option<String>) {
    if tokens.len() != 2 {
        return;
    }
    *value = Some(tokens[1].clone());
}

/// Joins a directive's arguments into one comma-delimited string.
fn join_args(tokens: &[String]) -> Option<String> {
    if tokens.len() < 2 {
        return None;
    }
    Some(tokens[1..].join(","))
}

/// Consumes token lines up to and including the closing brace of a stanza.
///
/// Stanza bodies are interpreted by [`stanza`](crate::config::stanza) in a
/// later pass, once volumes are known. Here they only have to be stepped
/// over so their directives are not mistaken for global ones.
fn skip_stanza(file: &mut TokenFile) {
    while let Some(tokens) = file.read_token_line() {
        if tokens[0] == "}" {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timeout, 20);
        assert!(!settings.text_only);
        assert_eq!(&settings.scan_for[..4], &['i', 'e', 'o', ' ']);
        assert_eq!(settings.show_tools[0], Some(ToolTag::Shell));
        assert_eq!(settings.show_tools[3], Some(ToolTag::Reboot));
        assert_eq!(settings.show_tools[4], None);
    }

    #[test]
    fn test_full_config() {
        let settings = Settings::parse(
            b"timeout 5\n\
              textonly\n\
              icons_dir icons\n\
              resolution 1024 768\n\
              scan_all_linux_kernels\n\
              max_tags 7\n\
              also_scan_dirs boot kernels\n\
              default_selection vmlinuz\n",
        );
        assert_eq!(settings.timeout, 5);
        assert!(settings.text_only);
        assert_eq!(settings.icons_dir.as_deref(), Some("icons"));
        assert_eq!(settings.requested_screen_width, Some(1024));
        assert_eq!(settings.requested_screen_height, Some(768));
        assert!(settings.scan_all_linux);
        assert_eq!(settings.max_tags, 7);
        assert_eq!(settings.also_scan.as_deref(), Some("boot,kernels"));
        assert_eq!(settings.default_selection.as_deref(), Some("vmlinuz"));
    }

    #[test]
    fn test_hideui_flags_union() {
        let settings = Settings::parse(b"hideui banner\nhideui label, arrows\n");
        assert_eq!(
            settings.hide_ui,
            HideUi::BANNER | HideUi::LABEL | HideUi::ARROWS
        );
    }

    #[test]
    fn test_disable_is_an_alias_for_hideui() {
        let settings = Settings::parse(b"disable banner\n");
        assert_eq!(settings.hide_ui, HideUi::BANNER);
    }

    #[test]
    fn test_hideui_unknown_flag_ignored() {
        let settings = Settings::parse(b"hideui banner, bogus, label\n");
        assert_eq!(settings.hide_ui, HideUi::BANNER | HideUi::LABEL);
    }

    #[test]
    fn test_scanfor_slots() {
        let settings = Settings::parse(b"scanfor ieo\n");
        assert_eq!(&settings.scan_for[..3], &['i', 'e', 'o']);
        assert!(settings.scan_for[3..].iter().all(|&x| x == ' '));

        let settings = Settings::parse(b"scanfor internal,external,optical,manual\n");
        assert_eq!(&settings.scan_for[..4], &['i', 'e', 'o', 'm']);
        assert!(settings.scan_for[4..].iter().all(|&x| x == ' '));
    }

    #[test]
    fn test_showtools_replaces_defaults() {
        let settings = Settings::parse(b"showtools exit, gptsync\n");
        assert_eq!(settings.show_tools[0], Some(ToolTag::Exit));
        assert_eq!(settings.show_tools[1], Some(ToolTag::Gptsync));
        assert!(settings.show_tools[2..].iter().all(Option::is_none));
    }

    #[test]
    fn test_timeout_requires_exactly_one_argument() {
        let settings = Settings::parse(b"timeout 5 6\n");
        assert_eq!(settings.timeout, 20);
        let settings = Settings::parse(b"timeout\n");
        assert_eq!(settings.timeout, 20);
    }

    #[test]
    fn test_stanza_directives_do_not_leak_into_settings() {
        let settings = Settings::parse(
            b"timeout 9\n\
              menuentry Linux {\n\
              loader \\vmlinuz\n\
              textonly\n\
              }\n\
              max_tags 3\n",
        );
        assert_eq!(settings.timeout, 9);
        assert!(!settings.text_only);
        assert_eq!(settings.max_tags, 3);
    }
}
