#![allow(clippy::cast_possible_truncation)]
// SPDX-License-Identifier: MIT

//! Provides [`BootSel`], which ties configuration, volumes and the main menu
//! together, and starts whatever the user picks.

use alloc::{boxed::Box, string::String, vec};
use thiserror::Error;
use uefi::{
    CStr16, CString16, boot,
    proto::{device_path::DevicePath, loaded_image::LoadedImage},
};

use crate::{
    BootResult,
    config::Settings,
    menu::{LoaderInfo, MenuScreen},
    scan::Scanner,
    system::{
        fs::UefiFileSystem,
        helper::{dir_of, join_to_device_path, normalize_path, str_to_cstr},
    },
    vol::{VolumeDirectory, mbr},
};

/// The media device path type.
const DEVICE_TYPE_MEDIA: u8 = 4;
/// The file path media sub-type.
const MEDIA_FILE_PATH: u8 = 0x04;

/// An `Error` that may result from starting a boot entry.
#[derive(Error, Debug)]
pub enum LoadError {
    /// An entry referenced a volume that is gone after a rescan.
    #[error("Volume {0} no longer exists")]
    VolumeGone(usize),

    /// The volume behind an entry has no device handle to load from.
    #[error("Volume {0} has no device handle")]
    VolumeMissingHandle(usize),
}

/// The boot selector context.
///
/// Owns the loaded [`Settings`], the discovered volumes and the main menu
/// built from them. The menu and volumes can be rebuilt at any time with
/// [`BootSel::rescan`], so removable media shows up without a reboot.
pub struct BootSel {
    /// The loaded configuration.
    pub settings: Settings,

    /// The discovered volumes.
    pub volumes: VolumeDirectory,

    /// The main menu.
    pub main_menu: MenuScreen,

    /// The directory this program was loaded from.
    self_dir: CString16,
}

impl BootSel {
    /// Loads the configuration, scans every volume and builds the main menu.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image handle does not support
    /// `SimpleFileSystem` or the volume scan fails.
    pub fn new() -> BootResult<Self> {
        let self_dir = find_self_dir()?;
        let mut fs = UefiFileSystem::from_image_fs()?;
        let settings = Settings::load(&mut fs, &self_dir)?;

        let mut bootsel = Self {
            settings,
            volumes: VolumeDirectory::from_volumes(vec![], None),
            main_menu: MenuScreen::default(),
            self_dir,
        };
        bootsel.rescan()?;
        Ok(bootsel)
    }

    /// Rescans every volume and rebuilds the main menu from scratch.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume scan fails.
    pub fn rescan(&mut self) -> BootResult<()> {
        self.volumes = VolumeDirectory::scan()?;

        let mut scanner = Scanner::new(&self.settings, &self.volumes, &self.self_dir);
        scanner.scan_for_boot_loaders();
        scanner.scan_for_tools();
        self.main_menu = scanner.screen;
        Ok(())
    }

    /// Loads and starts an EFI executable from a loader entry.
    ///
    /// Returns once the started image exits.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume is gone, the image could not be
    /// loaded, or the image itself exited with an error.
    pub fn start_loader(&self, info: &LoaderInfo) -> BootResult<()> {
        let volume = self
            .volumes
            .get(info.volume)
            .ok_or(LoadError::VolumeGone(info.volume))?;
        let handle = volume
            .device_handle
            .ok_or(LoadError::VolumeMissingHandle(info.volume))?;

        let path = str_to_cstr(&normalize_path(&info.path))?;
        let image = load_image_from_path(handle, &path)?;
        set_load_options(image, info.options.as_deref())?;

        boot::start_image(image)?;
        Ok(())
    }

    /// Prepares a legacy entry for boot by making its partition active.
    ///
    /// The firmware hand-off itself is machine specific, so after the
    /// rewrite the caller tells the user to let the firmware take over.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume is gone or the partition table
    /// rewrite fails.
    pub fn prepare_legacy(&self, index: usize) -> BootResult<()> {
        let volume = self
            .volumes
            .get(index)
            .ok_or(LoadError::VolumeGone(index))?;

        if volume.is_mbr_partition
            && let (Some(disk), Some(partition)) =
                (volume.whole_disk_handle, volume.mbr_partition_index)
        {
            mbr::activate_partition_on_handle(disk, partition)?;
        }
        Ok(())
    }
}

/// Loads an EFI executable from a path on the volume behind a handle.
fn load_image_from_path(handle: uefi::Handle, path: &CStr16) -> BootResult<uefi::Handle> {
    let dev_path = boot::open_protocol_exclusive::<DevicePath>(handle)?;
    let mut buf = vec![0u8; path.num_bytes() + 8];
    let full_path = join_to_device_path(&dev_path, path, &mut buf)?;

    let src = boot::LoadImageSource::FromDevicePath {
        device_path: &full_path,
        boot_policy: uefi::proto::BootPolicy::ExactMatch,
    };
    Ok(boot::load_image(boot::image_handle(), src)?)
}

/// Passes load options to a loaded image.
fn set_load_options(image: uefi::Handle, options: Option<&str>) -> BootResult<()> {
    let Some(options) = options else {
        return Ok(());
    };
    let mut loaded_image = boot::open_protocol_exclusive::<LoadedImage>(image)?;

    let load_options = Box::new(str_to_cstr(options)?);
    let load_options_size = load_options.num_bytes() as u32;

    // the options must outlive this function, as the image reads them when
    // started, so the Box is leaked to make them static
    let load_options_ptr: &'static CString16 = Box::leak(load_options);

    // SAFETY: the pointer is valid for the size and never freed
    unsafe {
        loaded_image.set_load_options(load_options_ptr.as_ptr().cast(), load_options_size);
    }
    Ok(())
}

/// Finds the directory this program was loaded from, with a leading
/// backslash, or the empty string for the volume root.
fn find_self_dir() -> BootResult<CString16> {
    let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?;

    let mut path = String::new();
    if let Some(file_path) = loaded_image.file_path() {
        for node in file_path.node_iter() {
            if node.device_type().0 != DEVICE_TYPE_MEDIA || node.sub_type().0 != MEDIA_FILE_PATH {
                continue;
            }
            if !path.is_empty() && !path.ends_with('\\') {
                path.push('\\');
            }
            push_ucs2(&mut path, node.data());
        }
    }

    let path = normalize_path(&path);
    Ok(str_to_cstr(dir_of(&path))?)
}

/// Appends a null-terminated UCS-2 little endian byte string to a [`String`].
fn push_ucs2(out: &mut String, data: &[u8]) {
    for pair in data.chunks_exact(2) {
        let raw = u16::from_le_bytes([pair[0], pair[1]]);
        if raw == 0 {
            break;
        }
        if let Some(c) = char::from_u32(u32::from(raw)) {
            out.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_ucs2_stops_at_null() {
        let mut out = String::new();
        let data: alloc::vec::Vec<u8> = "EFI\\BOOT"
            .encode_utf16()
            .chain([0, 0x41]) // null terminator, then stale data
            .flat_map(u16::to_le_bytes)
            .collect();
        push_ucs2(&mut out, &data);
        assert_eq!(out, "EFI\\BOOT");
    }
}
