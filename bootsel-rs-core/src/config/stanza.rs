// SPDX-License-Identifier: MIT

//! User-configured boot stanzas.
//!
//! A `menuentry` block in the configuration file describes one boot entry by
//! hand: which volume and loader to use, what options to pass, and optional
//! `submenuentry` blocks for variants of the entry. This module parses those
//! blocks into [`BootStanza`] values; turning them into menu entries is the
//! scanner's job.
//!
//! ```text
//! menuentry Linux {
//!     volume KERNELS
//!     loader \vmlinuz-linux
//!     initrd \initramfs-linux.img
//!     options "root=/dev/sda2 ro"
//!     submenuentry "Fallback initramfs" {
//!         initrd \initramfs-linux-fallback.img
//!     }
//! }
//! ```

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{config::tokens::TokenFile, vol::VolumeDirectory};

/// Fills in loader-derived defaults for a stanza.
///
/// Invoked when a `loader` directive is parsed, and once more with a dummy
/// path if the stanza never named a loader. The scanner supplies the real
/// implementation, which picks the operating system type, icon, shortcut and
/// default options from the loader path and its directory.
pub type SetLoaderDefaults<'a> = dyn FnMut(&mut BootStanza, &str, usize) + 'a;

/// One `menuentry` block from the configuration file.
#[derive(Clone, Debug, Default)]
pub struct BootStanza {
    /// The bare title from the `menuentry` line.
    pub title: String,

    /// The full menu title, `Boot <title> from <volume>`.
    pub menu_title: String,

    /// The volume the loader lives on.
    pub volume: usize,

    /// The loader path on that volume.
    pub loader: Option<String>,

    /// A custom icon path, relative to the volume root.
    pub icon: Option<String>,

    /// The load options passed to the loader.
    pub options: Option<String>,

    /// The operating system type character, like `L` or `W`.
    pub os_type: Option<char>,

    /// Boot in graphics mode without clearing the screen first.
    pub graphics: bool,

    /// The keyboard shortcut for the entry.
    pub shortcut: Option<char>,

    /// The stanza was not marked `disabled`.
    pub enabled: bool,

    /// The `submenuentry` blocks, in file order.
    pub submenus: Vec<SubStanza>,
}

/// One `submenuentry` block inside a stanza.
///
/// Starts out as a copy of the parent entry as parsed so far, then its own
/// directives override individual fields.
#[derive(Clone, Debug, Default)]
pub struct SubStanza {
    /// The title from the `submenuentry` line.
    pub title: String,

    /// The volume the loader lives on.
    pub volume: usize,

    /// The loader path, inherited from the parent unless overridden.
    pub loader: Option<String>,

    /// The load options.
    pub options: Option<String>,

    /// Boot in graphics mode.
    pub graphics: bool,

    /// The block was not marked `disabled`.
    pub enabled: bool,
}

/// Appends `add` to an option string, space separated.
pub(crate) fn merge_options(options: &mut Option<String>, add: &str) {
    match options {
        Some(x) => {
            x.push(' ');
            x.push_str(add);
        }
        None => *options = Some(add.to_string()),
    }
}

/// Folds a pending initrd path into the option string as `initrd=<path>`.
fn merge_initrd(options: &mut Option<String>, initrd: Option<&str>) {
    if let Some(initrd) = initrd {
        merge_options(options, &format!("initrd={initrd}"));
    }
}

fn menu_title(title: &str, volumes: &VolumeDirectory, volume: usize) -> String {
    let name = volumes.get(volume).map_or("Unknown", |x| x.display_name());
    format!("Boot {title} from {name}")
}

/// Parses every enabled `menuentry` block in a configuration file.
///
/// `self_volume` is the volume the configuration file itself lives on, used
/// for stanzas that do not name one. Disabled stanzas are dropped.
pub fn parse_stanzas(
    buf: &[u8],
    volumes: &VolumeDirectory,
    self_volume: usize,
    set_defaults: &mut SetLoaderDefaults,
) -> Vec<BootStanza> {
    let mut stanzas = Vec::new();
    let mut file = TokenFile::new(buf);

    while let Some(tokens) = file.read_token_line() {
        if tokens[0].eq_ignore_ascii_case("menuentry") && tokens.len() > 1 {
            let stanza = parse_stanza(&mut file, &tokens[1], volumes, self_volume, set_defaults);
            if stanza.enabled {
                stanzas.push(stanza);
            }
        }
    }
    stanzas
}

/// Parses one stanza body, consuming tokens up to the closing `}`.
pub fn parse_stanza(
    file: &mut TokenFile,
    title: &str,
    volumes: &VolumeDirectory,
    self_volume: usize,
    set_defaults: &mut SetLoaderDefaults,
) -> BootStanza {
    let mut current_volume = self_volume;
    let mut stanza = BootStanza {
        title: title.to_string(),
        menu_title: menu_title(title, volumes, current_volume),
        volume: current_volume,
        enabled: true,
        ..BootStanza::default()
    };
    let mut initrd: Option<String> = None;
    let mut defaults_set = false;

    while let Some(tokens) = file.read_token_line() {
        let verb = tokens[0].to_ascii_lowercase();
        if verb == "}" {
            break;
        }
        match &*verb {
            "loader" if tokens.len() > 1 => {
                stanza.loader = Some(tokens[1].clone());
                stanza.volume = current_volume;
                set_defaults(&mut stanza, &tokens[1], current_volume);
                // defaults may bring kernel options along, the stanza sets its own
                stanza.options = None;
                defaults_set = true;
            }
            "volume" if tokens.len() > 1 => {
                if let Some(found) = volumes.find(&tokens[1]) {
                    current_volume = found;
                    stanza.volume = found;
                    stanza.menu_title = menu_title(title, volumes, found);
                }
            }
            "icon" if tokens.len() > 1 => stanza.icon = Some(tokens[1].clone()),
            "initrd" if tokens.len() > 1 => initrd = Some(tokens[1].clone()),
            "options" if tokens.len() > 1 => stanza.options = Some(tokens[1].clone()),
            "ostype" if tokens.len() > 1 => stanza.os_type = tokens[1].chars().next(),
            "graphics" if tokens.len() > 1 => stanza.graphics = tokens[1] == "on",
            "disabled" => stanza.enabled = false,
            "submenuentry" if tokens.len() > 1 => {
                let sub = parse_submenu(file, &tokens[1], &stanza, current_volume);
                stanza.submenus.push(sub);
            }
            _ => (),
        }
    }

    merge_initrd(&mut stanza.options, initrd.as_deref());
    if !defaults_set {
        // no loader named, derive what defaults we can from a dummy path
        set_defaults(&mut stanza, "\\EFI\\BOOT\\nemo.efi", current_volume);
    }
    stanza
}

/// Parses one `submenuentry` body. Only one nesting level exists.
fn parse_submenu(
    file: &mut TokenFile,
    title: &str,
    parent: &BootStanza,
    volume: usize,
) -> SubStanza {
    let mut sub = SubStanza {
        title: title.to_string(),
        volume,
        loader: parent.loader.clone(),
        options: parent.options.clone(),
        graphics: parent.graphics,
        enabled: true,
    };
    let mut initrd: Option<String> = None;

    while let Some(tokens) = file.read_token_line() {
        let verb = tokens[0].to_ascii_lowercase();
        if verb == "}" {
            break;
        }
        match &*verb {
            "loader" if tokens.len() > 1 => sub.loader = Some(tokens[1].clone()),
            "initrd" => initrd = tokens.get(1).cloned(),
            "options" => sub.options = tokens.get(1).cloned(),
            "add_options" if tokens.len() > 1 => merge_options(&mut sub.options, &tokens[1]),
            "graphics" if tokens.len() > 1 => sub.graphics = tokens[1] == "on",
            "disabled" => sub.enabled = false,
            _ => (),
        }
    }

    merge_initrd(&mut sub.options, initrd.as_deref());
    sub
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;

    use super::*;
    use crate::vol::Volume;

    fn no_defaults() -> impl FnMut(&mut BootStanza, &str, usize) {
        |_: &mut BootStanza, _: &str, _: usize| ()
    }

    fn volumes() -> VolumeDirectory {
        let volumes = ["ESP", "KERNELS"]
            .map(|name| Volume {
                is_readable: true,
                name: Some(name.to_owned()),
                ..Volume::default()
            })
            .into_iter()
            .collect();
        VolumeDirectory::from_volumes(volumes, Some(0))
    }

    #[test]
    fn test_full_stanza() {
        let conf = b"menuentry Linux {
            volume KERNELS
            loader \\vmlinuz-linux
            initrd \\initramfs-linux.img
            options \"root=/dev/sda2 ro\"
            graphics on
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut no_defaults());
        assert_eq!(stanzas.len(), 1);
        let stanza = &stanzas[0];
        assert_eq!(stanza.menu_title, "Boot Linux from KERNELS");
        assert_eq!(stanza.volume, 1);
        assert_eq!(stanza.loader.as_deref(), Some("\\vmlinuz-linux"));
        assert_eq!(
            stanza.options.as_deref(),
            Some("root=/dev/sda2 ro initrd=\\initramfs-linux.img")
        );
        assert!(stanza.graphics);
    }

    #[test]
    fn test_disabled_stanza_is_dropped() {
        let conf = b"menuentry Old {
            loader \\old.efi
            disabled
        }
        menuentry New {
            loader \\new.efi
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut no_defaults());
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].title, "New");
    }

    #[test]
    fn test_submenu_inherits_and_overrides() {
        let conf = b"menuentry Linux {
            loader \\vmlinuz-linux
            options \"ro quiet\"
            submenuentry \"Single user\" {
                add_options single
            }
            submenuentry Fallback {
                initrd \\initramfs-fallback.img
            }
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut no_defaults());
        let stanza = &stanzas[0];
        assert_eq!(stanza.submenus.len(), 2);
        assert_eq!(stanza.submenus[0].title, "Single user");
        assert_eq!(stanza.submenus[0].loader.as_deref(), Some("\\vmlinuz-linux"));
        assert_eq!(stanza.submenus[0].options.as_deref(), Some("ro quiet single"));
        assert_eq!(
            stanza.submenus[1].options.as_deref(),
            Some("ro quiet initrd=\\initramfs-fallback.img")
        );
    }

    #[test]
    fn test_disabled_submenu_kept_but_marked() {
        let conf = b"menuentry Linux {
            loader \\vmlinuz-linux
            submenuentry Broken {
                disabled
            }
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut no_defaults());
        assert!(!stanzas[0].submenus[0].enabled);
    }

    #[test]
    fn test_loader_discards_earlier_options() {
        let mut defaults = |stanza: &mut BootStanza, _: &str, _: usize| {
            stanza.options = Some("default options".to_owned());
        };
        let conf = b"menuentry Linux {
            loader \\vmlinuz-linux
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut defaults);
        assert_eq!(stanzas[0].options, None);
    }

    #[test]
    fn test_missing_loader_gets_dummy_defaults() {
        let mut seen = alloc::vec::Vec::new();
        let mut defaults = |_: &mut BootStanza, path: &str, _: usize| seen.push(path.to_owned());
        let conf = b"menuentry Mystery {
        }";
        parse_stanzas(conf, &volumes(), 0, &mut defaults);
        assert_eq!(seen, ["\\EFI\\BOOT\\nemo.efi"]);
    }

    #[test]
    fn test_directives_ignore_case() {
        let conf = b"MENUENTRY Windows {
            Volume ESP
            LOADER \\EFI\\Microsoft\\Boot\\bootmgfw.efi
            Graphics on
            SUBMENUENTRY \"Safe mode\" {
                ADD_OPTIONS safe
            }
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 1, &mut no_defaults());
        assert_eq!(stanzas.len(), 1);
        let stanza = &stanzas[0];
        assert_eq!(stanza.volume, 0);
        assert_eq!(
            stanza.loader.as_deref(),
            Some("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")
        );
        assert!(stanza.graphics);
        assert_eq!(stanza.submenus[0].options.as_deref(), Some("safe"));
    }

    #[test]
    fn test_unknown_volume_leaves_current_volume() {
        let conf = b"menuentry Linux {
            volume NOPE
            loader \\vmlinuz-linux
        }";
        let stanzas = parse_stanzas(conf, &volumes(), 0, &mut no_defaults());
        assert_eq!(stanzas[0].volume, 0);
        assert_eq!(stanzas[0].menu_title, "Boot Linux from ESP");
    }
}
