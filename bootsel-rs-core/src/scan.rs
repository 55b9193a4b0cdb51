// SPDX-License-Identifier: MIT

//! Boot entry discovery.
//!
//! [`Scanner`] fills the main menu from three sources, in whatever order the
//! `scanfor` directive asks for: EFI executables found on readable volumes,
//! legacy boot sectors found by the volume scan, and `menuentry` stanzas from
//! the configuration file. A second pass adds the tool row.
//!
//! Discovery is heuristic on purpose. Well known loader paths get friendly
//! titles, loader filenames choose the operating system type that shapes each
//! entry's detail screen, and Linux kernels pick up their options file and a
//! matching initial RAM disk from their own directory.

use alloc::{
    boxed::Box,
    format,
    string::{String, ToString},
    vec::Vec,
};
use log::warn;
use uefi::{CStr16, proto::media::file::FileInfo};

use crate::{
    config::{HideUi, Settings, ToolTag, stanza},
    menu::{EntryTag, LoaderInfo, MenuEntry, MenuScreen},
    system::{
        fs::UefiFileSystem,
        helper::{basename, contains_ignore_case, dir_of, find_numbers, last_dir_name, str_to_cstr},
    },
    vol::{DiskKind, Volume, VolumeDirectory},
};

/// The standard location of the Mac OS X boot loader.
const MACOS_LOADER_PATH: &str = "\\System\\Library\\CoreServices\\boot.efi";
/// The Apple hardware diagnostics binary next to it.
const MACOS_DIAGS_PATH: &str = "\\System\\Library\\CoreServices\\.diagnostics\\diags.efi";
/// Where an EFI shell may live, comma-delimited candidates.
const SHELL_NAMES: &str = "\\EFI\\tools\\shell.efi,\\shellx64.efi";
/// Where the hybrid MBR sync tool lives.
const GPTSYNC_PATH: &str = "\\EFI\\tools\\gptsync.efi";
/// Candidate names of a kernel's options file, tried in order.
const LINUX_OPTIONS_NAMES: &str = "bootsel_linux.conf,bootsel-linux.conf,linux.conf";
/// Helper binaries that are not boot loaders.
const SKIPPED_LOADERS: [&str; 3] = ["TextMode.efi", "ebounce.efi", "GraphicsConsole.efi"];
/// How many boot entries get a number shortcut, `1` through `9`.
const NUM_SHORTCUT_DIGITS: usize = 9;

/// Loader traits derived from a loader's path alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LoaderDefaults {
    /// The operating system type character.
    os_type: Option<char>,

    /// The keyboard shortcut.
    shortcut: Option<char>,

    /// Boot in graphics mode.
    graphics: bool,
}

/// Derives the operating system type, shortcut and graphics flag from a
/// loader path, the way users expect from the filename conventions.
fn loader_defaults(loader_path: &str) -> LoaderDefaults {
    let file_name = basename(loader_path);
    let mut defaults = LoaderDefaults {
        // the directory name doubles as the shortcut, "ubuntu" gets 'U'
        shortcut: last_dir_name(loader_path).and_then(|x| x.chars().next()),
        ..LoaderDefaults::default()
    };

    if contains_ignore_case(loader_path, "bzImage") || contains_ignore_case(loader_path, "vmlinuz")
    {
        defaults.os_type = Some('L');
        defaults.shortcut = defaults.shortcut.or(Some('L'));
    } else if contains_ignore_case(loader_path, "bootsel") {
        defaults.os_type = Some('R');
        defaults.shortcut = Some('B');
    } else if loader_path.eq_ignore_ascii_case(MACOS_LOADER_PATH) {
        defaults.os_type = Some('M');
        defaults.shortcut = Some('M');
        defaults.graphics = true;
    } else if file_name.eq_ignore_ascii_case("e.efi") || file_name.eq_ignore_ascii_case("elilo.efi")
    {
        defaults.os_type = Some('E');
        defaults.shortcut = defaults.shortcut.or(Some('L'));
    } else if file_name.eq_ignore_ascii_case("cdboot.efi")
        || file_name.eq_ignore_ascii_case("bootmgr.efi")
        || file_name.eq_ignore_ascii_case("bootmgfw.efi")
    {
        defaults.os_type = Some('W');
        defaults.shortcut = Some('W');
    } else if file_name.eq_ignore_ascii_case("xom.efi") {
        defaults.os_type = Some('X');
        defaults.shortcut = Some('W');
        defaults.graphics = true;
    }

    defaults.shortcut = defaults.shortcut.map(|x| x.to_ascii_uppercase());
    defaults
}

/// Reads the options file sitting next to a Linux kernel, trying each of the
/// [`LINUX_OPTIONS_NAMES`] in turn.
fn read_linux_options(fs: &mut UefiFileSystem, loader_path: &str) -> Option<Vec<u8>> {
    let dir = dir_of(loader_path);
    for name in LINUX_OPTIONS_NAMES.split(',') {
        let Ok(path) = str_to_cstr(&format!("{dir}\\{name}")) else {
            continue;
        };
        if fs.exists(&path) {
            match fs.read(&path) {
                Ok(buf) => return Some(buf),
                Err(e) => warn!("failed to read kernel options file {name}: {e}"),
            }
        }
    }
    None
}

/// Finds the initial RAM disk matching a kernel.
///
/// Looks through the kernel's own directory for files starting with `init`
/// whose embedded version string equals the kernel's. A kernel without a
/// version string pairs only with an equally unversioned RAM disk.
fn find_initrd(fs: &mut UefiFileSystem, loader_path: &str) -> Option<String> {
    let kernel_version = find_numbers(basename(loader_path));
    let dir = dir_of(loader_path);
    let dir_c = str_to_cstr(if dir.is_empty() { "\\" } else { dir }).ok()?;

    for file in fs.read_dir(&dir_c).ok()? {
        let Ok(file) = file else {
            continue;
        };
        if file.is_directory() {
            continue;
        }
        let name = String::from(file.file_name());
        if !name.starts_with("init") {
            continue;
        }
        if find_numbers(&name) == kernel_version {
            return Some(format!("{dir}\\{name}"));
        }
    }
    None
}

/// The default options for a Linux kernel: the first line of its options
/// file, plus an `initrd=` option for the matching RAM disk.
fn main_linux_options(fs: &mut UefiFileSystem, loader_path: &str) -> Option<String> {
    let mut options = read_linux_options(fs, loader_path)
        .and_then(|buf| crate::config::tokens::TokenFile::new(&buf).read_token_line())
        .and_then(|tokens| tokens.get(1).cloned());
    if let Some(initrd) = find_initrd(fs, loader_path) {
        stanza::merge_options(&mut options, &format!("initrd={initrd}"));
    }
    options
}

/// Builds the detail screen of a loader entry for its operating system type.
///
/// Every screen starts with a "default options" entry and ends with a return
/// entry. For the Xbox loader the main entry's options are also changed to
/// skip its built-in menu, and the caller applies the returned override.
fn generate_sub_screen(
    mut fs: Option<&mut UefiFileSystem>,
    hide_ui: HideUi,
    title: &str,
    vol_name: &str,
    info: &LoaderInfo,
    os_type: Option<char>,
) -> (MenuScreen, Option<&'static str>) {
    let mut screen = MenuScreen {
        title: format!("Boot Options for {title} on {vol_name}"),
        ..MenuScreen::default()
    };
    let mut override_options = None;

    screen.entries.push(MenuEntry::new(
        "Boot using default options".to_string(),
        EntryTag::Loader(info.clone()),
    ));

    let variant = |title: &str, options: &str, graphics: bool| MenuEntry {
        title: title.to_string(),
        shortcut_digit: None,
        shortcut_letter: None,
        row: 0,
        tag: EntryTag::Loader(LoaderInfo {
            options: Some(options.to_string()),
            graphics,
            ..info.clone()
        }),
        sub_screen: None,
    };

    match os_type {
        Some('M') => {
            if !hide_ui.contains(HideUi::SINGLEUSER) {
                screen
                    .entries
                    .push(variant("Boot Mac OS X in verbose mode", "-v", false));
                screen
                    .entries
                    .push(variant("Boot Mac OS X in single user mode", "-v -s", false));
            }
            if !hide_ui.contains(HideUi::HWTEST) {
                let has_diags = fs
                    .as_deref_mut()
                    .is_some_and(|x| x.exists_str(MACOS_DIAGS_PATH).unwrap_or(false));
                if has_diags {
                    screen.entries.push(MenuEntry::new(
                        "Run Apple Hardware Test".to_string(),
                        EntryTag::Loader(LoaderInfo {
                            path: MACOS_DIAGS_PATH.to_string(),
                            options: None,
                            graphics: true,
                            ..info.clone()
                        }),
                    ));
                }
            }
        }
        Some('L') => {
            if let Some(fs) = fs {
                if let Some(buf) = read_linux_options(fs, &info.path) {
                    let initrd_option =
                        find_initrd(fs, &info.path).map(|x| format!("initrd={x}"));
                    let mut file = crate::config::tokens::TokenFile::new(&buf);
                    // the first line made the default entry already
                    let _ = file.read_token_line();
                    while let Some(tokens) = file.read_token_line() {
                        if tokens.len() < 2 {
                            continue;
                        }
                        let mut options = Some(tokens[1].clone());
                        if let Some(initrd) = &initrd_option {
                            stanza::merge_options(&mut options, initrd);
                        }
                        screen.entries.push(MenuEntry::new(
                            tokens[0].clone(),
                            EntryTag::Loader(LoaderInfo {
                                options,
                                ..info.clone()
                            }),
                        ));
                    }
                }
            }
        }
        Some('E') => {
            let file_name = basename(&info.path);
            screen.entries.push(variant(
                &format!("Run {file_name} in interactive mode"),
                "-p",
                false,
            ));
            screen.entries.push(variant(
                "Boot Linux for a 17\" iMac or a 15\" MacBook Pro (*)",
                "-d 0 i17",
                true,
            ));
            screen
                .entries
                .push(variant("Boot Linux for a 20\" iMac (*)", "-d 0 i20", true));
            screen
                .entries
                .push(variant("Boot Linux for a Mac Mini (*)", "-d 0 mini", true));
            screen.info_lines.push("NOTE: This is an example. Entries".to_string());
            screen.info_lines.push("marked with (*) may not work.".to_string());
        }
        Some('X') => {
            // skip the loader's built-in selection and boot from hard disk
            override_options = Some("-s -h");
            screen
                .entries
                .push(variant("Boot Windows from Hard Disk", "-s -h", info.graphics));
            screen
                .entries
                .push(variant("Boot Windows from CD-ROM", "-s -c", info.graphics));
            let file_name = basename(&info.path);
            screen
                .entries
                .push(variant(&format!("Run {file_name} in text mode"), "-v", false));
        }
        _ => (),
    }

    screen.entries.push(MenuEntry::new(
        "Return to Main Menu".to_string(),
        EntryTag::Return,
    ));
    (screen, override_options)
}

/// Builds the main menu entry for a volume with legacy boot code.
fn build_legacy_entry(volume: &Volume, index: usize) -> MenuEntry {
    let mut shortcut = None;
    let title = match volume.os_name {
        Some(name) => {
            let first = name.chars().next();
            if first == Some('W') || first == Some('L') {
                shortcut = first;
            }
            name
        }
        None => "Legacy OS",
    };
    let vol_desc = volume.name.as_deref().unwrap_or(if volume.disk_kind == DiskKind::Optical {
        "CD"
    } else {
        "HD"
    });

    let mut sub_screen = MenuScreen {
        title: format!("Boot Options for {title} on {vol_desc}"),
        ..MenuScreen::default()
    };
    sub_screen.entries.push(MenuEntry::new(
        format!("Boot {title}"),
        EntryTag::Legacy { volume: index },
    ));
    sub_screen.entries.push(MenuEntry::new(
        "Return to Main Menu".to_string(),
        EntryTag::Return,
    ));

    MenuEntry {
        title: format!("Boot {title} from {vol_desc}"),
        shortcut_digit: None,
        shortcut_letter: shortcut,
        row: 0,
        tag: EntryTag::Legacy { volume: index },
        sub_screen: Some(sub_screen),
    }
}

/// Fills the main menu from configuration and the discovered volumes.
pub struct Scanner<'a> {
    /// The loaded configuration.
    settings: &'a Settings,

    /// The discovered volumes.
    volumes: &'a VolumeDirectory,

    /// The directory this program runs from, with a leading backslash.
    self_dir: String,

    /// The main menu being filled.
    pub screen: MenuScreen,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner with an empty main menu.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(settings: &'a Settings, volumes: &'a VolumeDirectory, self_dir: &CStr16) -> Self {
        Self {
            settings,
            volumes,
            self_dir: String::from(self_dir),
            screen: MenuScreen {
                title: "Main Menu".to_string(),
                timeout_seconds: settings.timeout,
                timeout_text: "Automatic boot".to_string(),
                ..MenuScreen::default()
            },
        }
    }

    /// Runs every scan the `scanfor` directive asks for, in order, then
    /// assigns number shortcuts to the first boot entries.
    pub fn scan_for_boot_loaders(&mut self) {
        for slot in self.settings.scan_for {
            match slot.to_ascii_lowercase() {
                'c' => self.scan_legacy(DiskKind::Optical),
                'h' => self.scan_legacy(DiskKind::Internal),
                'b' => self.scan_legacy(DiskKind::External),
                'm' => self.scan_user_configured(),
                'e' => self.scan_efi(DiskKind::External),
                'i' => self.scan_efi(DiskKind::Internal),
                'o' => self.scan_efi(DiskKind::Optical),
                _ => (),
            }
        }

        for (i, entry) in self
            .screen
            .entries
            .iter_mut()
            .take(NUM_SHORTCUT_DIGITS)
            .enumerate()
        {
            if entry.row != 0 {
                break;
            }
            entry.shortcut_digit = char::from_digit(i as u32 + 1, 10);
        }
    }

    /// Adds the tool row below the boot entries.
    pub fn scan_for_tools(&mut self) {
        for tag in self.settings.show_tools.iter().flatten() {
            match tag {
                ToolTag::Shutdown => self.add_builtin("Shut Down Computer", Some('U'), EntryTag::Shutdown),
                ToolTag::Reboot => self.add_builtin("Reboot Computer", Some('R'), EntryTag::Reboot),
                ToolTag::About => self.add_builtin("About bootsel", Some('A'), EntryTag::About),
                ToolTag::Exit => self.add_builtin("Exit bootsel", None, EntryTag::Exit),
                ToolTag::Shell => {
                    for name in SHELL_NAMES.split(',') {
                        self.add_tool_entry(name, "EFI Shell", 'E');
                    }
                }
                ToolTag::Gptsync => self.add_tool_entry(GPTSYNC_PATH, "Make Hybrid MBR", 'P'),
            }
        }
    }

    /// Adds one built-in tool entry.
    fn add_builtin(&mut self, title: &str, shortcut: Option<char>, tag: EntryTag) {
        self.screen.entries.push(MenuEntry {
            title: title.to_string(),
            shortcut_digit: None,
            shortcut_letter: shortcut,
            row: 1,
            tag,
            sub_screen: None,
        });
    }

    /// Adds a tool entry for an executable on the boot volume, if it exists.
    fn add_tool_entry(&mut self, path: &str, title: &str, shortcut: char) {
        let Some(index) = self.volumes.self_volume() else {
            return;
        };
        let Some(mut fs) = self.open_fs(index) else {
            return;
        };
        if !fs.exists_str(path).unwrap_or(false) {
            return;
        }
        self.screen.entries.push(MenuEntry {
            title: format!("Start {title}"),
            shortcut_digit: None,
            shortcut_letter: Some(shortcut),
            row: 1,
            tag: EntryTag::Loader(LoaderInfo {
                volume: index,
                path: path.to_string(),
                options: None,
                graphics: false,
            }),
            sub_screen: None,
        });
    }

    /// Opens the filesystem of a volume, if it has a usable one.
    fn open_fs(&self, index: usize) -> Option<UefiFileSystem> {
        let volume = self.volumes.get(index)?;
        if !volume.is_readable {
            return None;
        }
        UefiFileSystem::from_handle(volume.device_handle?).ok()
    }

    /// Scans every volume of one disk kind for EFI boot loaders.
    fn scan_efi(&mut self, kind: DiskKind) {
        for index in 0..self.volumes.volumes().len() {
            if self.volumes.volumes()[index].disk_kind == kind {
                self.scan_efi_files(index);
            }
        }
    }

    /// Scans one volume for EFI boot loaders in the conventional places.
    fn scan_efi_files(&mut self, index: usize) {
        let Some(volume) = self.volumes.get(index) else {
            return;
        };
        if volume.name.is_none() {
            return;
        }
        let Some(mut fs) = self.open_fs(index) else {
            return;
        };

        let known = [
            (MACOS_LOADER_PATH, "Mac OS X"),
            ("\\System\\Library\\CoreServices\\xom.efi", "Windows XP (XoM)"),
            ("\\EFI\\Microsoft\\Boot\\Bootmgfw.efi", "Microsoft EFI boot"),
        ];
        for (path, title) in known {
            if fs.exists_str(path).unwrap_or(false) {
                self.add_loader_entry(&mut fs, index, path, Some(title));
            }
        }

        self.scan_loader_dir(&mut fs, index, None);
        self.scan_loader_dir(&mut fs, index, Some("elilo"));
        self.scan_loader_dir(&mut fs, index, Some("boot"));

        let mut subdirs = Vec::new();
        if let Ok(dir) = fs.read_dir(uefi::cstr16!("EFI")) {
            for file in dir.filter_map(Result::ok) {
                let name = String::from(file.file_name());
                if !file.is_directory()
                    || name.eq_ignore_ascii_case("tools")
                    || name.starts_with('.')
                {
                    continue;
                }
                subdirs.push(format!("EFI\\{name}"));
            }
        }
        for subdir in &subdirs {
            self.scan_loader_dir(&mut fs, index, Some(subdir));
        }

        if let Some(also_scan) = self.settings.also_scan.clone() {
            for dir in also_scan.split(',') {
                self.scan_loader_dir(&mut fs, index, Some(dir.trim_start_matches('\\')));
            }
        }
    }

    /// Scans one directory of a volume for loader executables.
    ///
    /// The program's own directory on its own volume is skipped, as are
    /// dotfiles, known helper binaries and anything that looks like a shell.
    fn scan_loader_dir(&mut self, fs: &mut UefiFileSystem, index: usize, path: Option<&str>) {
        if let Some(path) = path {
            let own_dir = path.eq_ignore_ascii_case(self.self_dir.trim_start_matches('\\'));
            if own_dir && Some(index) == self.volumes.self_volume() {
                return;
            }
        }

        let Ok(dir_c) = str_to_cstr(path.unwrap_or("\\")) else {
            return;
        };
        let Ok(dir) = fs.read_dir(&dir_c) else {
            return;
        };

        let files: Vec<Box<FileInfo>> = dir.filter_map(Result::ok).collect();
        let mut found_kernel = false;
        for file in &files {
            let name = String::from(file.file_name());
            if file.is_directory() || file.file_size() == 0 || !self.is_loader_candidate(&name) {
                continue;
            }
            let is_kernel =
                contains_ignore_case(&name, "vmlinuz") || contains_ignore_case(&name, "bzImage");
            if is_kernel && found_kernel && !self.settings.scan_all_linux {
                continue;
            }
            found_kernel |= is_kernel;

            let file_path = match path {
                Some(p) => format!("\\{p}\\{name}"),
                None => format!("\\{name}"),
            };
            self.add_loader_entry(fs, index, &file_path, None);
        }
    }

    /// Tests if a directory entry should become a boot entry.
    fn is_loader_candidate(&self, name: &str) -> bool {
        if name.starts_with('.') || contains_ignore_case(name, "shell") {
            return false;
        }
        if SKIPPED_LOADERS.iter().any(|x| name.eq_ignore_ascii_case(x)) {
            return false;
        }
        if name.to_ascii_lowercase().ends_with(".efi") {
            return true;
        }
        // extensionless kernels opt in via scan_all_linux
        self.settings.scan_all_linux
            && (contains_ignore_case(name, "vmlinuz") || contains_ignore_case(name, "bzImage"))
    }

    /// Adds one EFI loader to the main menu, with automatic settings.
    fn add_loader_entry(
        &mut self,
        fs: &mut UefiFileSystem,
        index: usize,
        loader_path: &str,
        title: Option<&str>,
    ) {
        let Some(volume) = self.volumes.get(index) else {
            return;
        };
        let defaults = loader_defaults(loader_path);

        let mut info = LoaderInfo {
            volume: index,
            path: loader_path.to_string(),
            options: None,
            graphics: defaults.graphics,
        };
        if defaults.os_type == Some('L') {
            info.options = main_linux_options(fs, loader_path);
        }

        let display = title.unwrap_or_else(|| loader_path.trim_start_matches('\\'));
        let vol_name = volume.display_name();
        let (sub_screen, override_options) = generate_sub_screen(
            Some(fs),
            self.settings.hide_ui,
            display,
            vol_name,
            &info,
            defaults.os_type,
        );
        if let Some(options) = override_options {
            info.options = Some(options.to_string());
        }

        self.screen.entries.push(MenuEntry {
            title: format!("Boot {display} from {vol_name}"),
            shortcut_digit: None,
            shortcut_letter: defaults.shortcut,
            row: 0,
            tag: EntryTag::Loader(info),
            sub_screen: Some(sub_screen),
        });
    }

    /// Adds entries from the `menuentry` stanzas of the configuration file.
    fn scan_user_configured(&mut self) {
        let Some(self_volume) = self.volumes.self_volume() else {
            return;
        };
        let Some(mut fs) = self.open_fs(self_volume) else {
            return;
        };
        let Ok(path) = str_to_cstr(&format!(
            "{}\\{}",
            self.self_dir,
            crate::config::CONFIG_FILE_NAME
        )) else {
            return;
        };
        let Ok(buf) = fs.read(&path) else {
            return;
        };

        let volumes = self.volumes;
        let mut set_defaults = |stanza: &mut stanza::BootStanza, path: &str, volume: usize| {
            let defaults = loader_defaults(path);
            if defaults.os_type.is_some() {
                stanza.os_type = defaults.os_type;
            }
            stanza.shortcut = defaults.shortcut;
            if defaults.graphics {
                stanza.graphics = true;
            }
            if defaults.os_type == Some('L') {
                let handle = volumes.get(volume).and_then(Volume::block_handle);
                if let Some(mut fs) = handle.and_then(|x| UefiFileSystem::from_handle(x).ok()) {
                    stanza.options = main_linux_options(&mut fs, path);
                }
            }
        };
        let stanzas = stanza::parse_stanzas(&buf, self.volumes, self_volume, &mut set_defaults);

        for stanza in stanzas {
            self.add_stanza_entry(stanza);
        }
    }

    /// Turns one parsed stanza into a main menu entry.
    fn add_stanza_entry(&mut self, stanza: stanza::BootStanza) {
        let Some(loader) = stanza.loader.clone() else {
            warn!("stanza {} names no loader, dropping it", stanza.title);
            return;
        };
        let info = LoaderInfo {
            volume: stanza.volume,
            path: loader,
            options: stanza.options.clone(),
            graphics: stanza.graphics,
        };

        let sub_screen = if stanza.submenus.is_empty() {
            let mut fs = self.open_fs(stanza.volume);
            let vol_name = self
                .volumes
                .get(stanza.volume)
                .map_or("Unknown", |x| x.display_name());
            let (screen, _) = generate_sub_screen(
                fs.as_mut(),
                self.settings.hide_ui,
                &stanza.title,
                vol_name,
                &info,
                stanza.os_type,
            );
            screen
        } else {
            let mut screen = MenuScreen {
                title: format!("Boot Options for {}", stanza.title),
                ..MenuScreen::default()
            };
            for sub in stanza.submenus.iter().filter(|x| x.enabled) {
                let Some(loader) = sub.loader.clone() else {
                    continue;
                };
                screen.entries.push(MenuEntry::new(
                    sub.title.clone(),
                    EntryTag::Loader(LoaderInfo {
                        volume: sub.volume,
                        path: loader,
                        options: sub.options.clone(),
                        graphics: sub.graphics,
                    }),
                ));
            }
            screen.entries.push(MenuEntry::new(
                "Return to Main Menu".to_string(),
                EntryTag::Return,
            ));
            screen
        };

        self.screen.entries.push(MenuEntry {
            title: stanza.menu_title,
            shortcut_digit: None,
            shortcut_letter: stanza.shortcut,
            row: 0,
            tag: EntryTag::Loader(info),
            sub_screen: Some(sub_screen),
        });
    }

    /// Scans every volume of one disk kind for legacy boot code.
    fn scan_legacy(&mut self, kind: DiskKind) {
        for index in 0..self.volumes.volumes().len() {
            if self.volumes.volumes()[index].disk_kind == kind {
                self.scan_legacy_volume(index);
            }
        }
    }

    /// Decides whether one volume deserves a legacy boot entry.
    ///
    /// A whole disk entry without a fingerprinted operating system hides
    /// itself when a partition of the same disk is bootable on its own, and
    /// so does an Apple legacy alias.
    fn scan_legacy_volume(&mut self, index: usize) {
        let Some(volume) = self.volumes.get(index) else {
            return;
        };

        let mut show = false;
        let mut hide_if_others = false;
        if volume.is_apple_legacy {
            show = true;
            hide_if_others = true;
        } else if volume.has_boot_code {
            show = true;
            if volume.is_whole_disk() && volume.os_name.is_none() {
                hide_if_others = true;
            }
        }

        if hide_if_others {
            for (i, other) in self.volumes.volumes().iter().enumerate() {
                if i != index
                    && other.has_boot_code
                    && other.whole_disk_handle == volume.whole_disk_handle
                {
                    show = false;
                }
            }
        }

        if show {
            self.screen.entries.push(build_legacy_entry(volume, index));
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;

    use super::*;

    #[test]
    fn test_loader_defaults_for_linux_kernels() {
        let defaults = loader_defaults("\\EFI\\ubuntu\\vmlinuz-6.8.0-45.efi");
        assert_eq!(defaults.os_type, Some('L'));
        assert_eq!(defaults.shortcut, Some('U'));
        assert!(!defaults.graphics);

        let at_root = loader_defaults("\\bzImage");
        assert_eq!(at_root.os_type, Some('L'));
        assert_eq!(at_root.shortcut, Some('L'));
    }

    #[test]
    fn test_loader_defaults_for_known_loaders() {
        let mac = loader_defaults(MACOS_LOADER_PATH);
        assert_eq!(mac.os_type, Some('M'));
        assert!(mac.graphics);

        let windows = loader_defaults("\\EFI\\Microsoft\\Boot\\Bootmgfw.efi");
        assert_eq!(windows.os_type, Some('W'));
        assert_eq!(windows.shortcut, Some('W'));

        let elilo = loader_defaults("\\elilo\\elilo.efi");
        assert_eq!(elilo.os_type, Some('E'));
        assert_eq!(elilo.shortcut, Some('E'));

        let xom = loader_defaults("\\System\\Library\\CoreServices\\xom.efi");
        assert_eq!(xom.os_type, Some('X'));
        assert_eq!(xom.shortcut, Some('W'));
        assert!(xom.graphics);
    }

    #[test]
    fn test_loader_defaults_for_unknown_loaders() {
        let defaults = loader_defaults("\\EFI\\grub\\grubx64.efi");
        assert_eq!(defaults.os_type, None);
        assert_eq!(defaults.shortcut, Some('G'));
    }

    #[test]
    fn test_sub_screen_has_default_and_return() {
        let info = LoaderInfo {
            volume: 0,
            path: "\\EFI\\grub\\grubx64.efi".to_owned(),
            options: None,
            graphics: false,
        };
        let (screen, override_options) =
            generate_sub_screen(None, HideUi::empty(), "grubx64.efi", "ESP", &info, None);
        assert_eq!(override_options, None);
        assert_eq!(screen.title, "Boot Options for grubx64.efi on ESP");
        assert_eq!(screen.entries.len(), 2);
        assert_eq!(screen.entries[0].title, "Boot using default options");
        assert_eq!(screen.entries[1].tag, EntryTag::Return);
    }

    #[test]
    fn test_xbox_sub_screen_overrides_main_options() {
        let info = LoaderInfo {
            volume: 0,
            path: "\\System\\Library\\CoreServices\\xom.efi".to_owned(),
            options: None,
            graphics: true,
        };
        let (screen, override_options) =
            generate_sub_screen(None, HideUi::empty(), "xom.efi", "ESP", &info, Some('X'));
        assert_eq!(override_options, Some("-s -h"));
        assert_eq!(screen.entries.len(), 5);
    }

    #[test]
    fn test_mac_sub_screen_honors_hideui() {
        let info = LoaderInfo {
            volume: 0,
            path: MACOS_LOADER_PATH.to_owned(),
            options: None,
            graphics: true,
        };
        let (full, _) =
            generate_sub_screen(None, HideUi::empty(), "Mac OS X", "Mac HD", &info, Some('M'));
        assert_eq!(full.entries.len(), 4);

        let (hidden, _) = generate_sub_screen(
            None,
            HideUi::SINGLEUSER,
            "Mac OS X",
            "Mac HD",
            &info,
            Some('M'),
        );
        assert_eq!(hidden.entries.len(), 2);
    }

    #[test]
    fn test_legacy_entry_titles() {
        let volume = Volume {
            os_name: Some("Windows"),
            name: Some("SYSTEM".to_owned()),
            has_boot_code: true,
            ..Volume::default()
        };
        let entry = build_legacy_entry(&volume, 3);
        assert_eq!(entry.title, "Boot Windows from SYSTEM");
        assert_eq!(entry.shortcut_letter, Some('W'));
        assert_eq!(entry.tag, EntryTag::Legacy { volume: 3 });

        let nameless = Volume {
            disk_kind: DiskKind::Optical,
            has_boot_code: true,
            ..Volume::default()
        };
        let entry = build_legacy_entry(&nameless, 0);
        assert_eq!(entry.title, "Boot Legacy OS from CD");
        assert_eq!(entry.shortcut_letter, None);
    }
}
