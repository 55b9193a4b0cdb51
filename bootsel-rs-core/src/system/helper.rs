//! Various helper functions for other modules.

use core::mem::MaybeUninit;

use alloc::string::String;
use smallvec::SmallVec;
use thiserror::Error;
use uefi::{
    CStr16, CString16,
    proto::device_path::{DevicePath, PoolDevicePath, build},
};

/// The max length of a path in UEFI.
const MAX_PATH: usize = 256;

/// An `Error` that may result from converting a [`String`] to another format.
#[derive(Error, Debug)]
pub enum StrError {
    /// A [`String`] could not be converted into a [`CString16`]
    #[error("Could not convert String to CString16")]
    CstrFromStr(#[from] uefi::data_types::FromStrError),

    /// A byte slice could not be converted into a [`CString16`], due to an invalid
    /// character or nul character found.
    #[error("Could not convert a byte slice to a CString*")]
    FromSliceWithNul(#[from] uefi::data_types::FromSliceWithNulError),
}

/// An `Error` that may result from building a [`DevicePath`]
#[derive(Error, Debug)]
pub enum DevicePathError {
    /// A Device Path could not be built. This can happen if the buffer was too small.
    #[error("Could not build DevicePath")]
    Build(#[from] uefi::proto::device_path::build::BuildError),

    /// The Device Path could not be appended to an existing one for some reason.
    #[error("Could not append DevicePath to another DevicePath")]
    DevPathUtil(#[from] uefi::proto::device_path::DevicePathUtilitiesError),
}

/// Gets a [`CString16`] from an [`&str`].
///
/// # Errors
///
/// May return an `Error` if the string could not be converted into a [`CString16`], either due to unsupported
/// characters or an invalid nul character.
pub(crate) fn str_to_cstr(str: &str) -> Result<CString16, StrError> {
    Ok(CString16::try_from(str)?)
}

/// Gets a [`CString16`] path given a prefix and a filename.
///
/// # Errors
///
/// May return an `Error` if the finalized string could not be converted into a [`CString16`]. This should be
/// impossible because of the fact that validation is already done through the parameters being [`CStr16`].
pub(crate) fn get_path_cstr(prefix: &CStr16, filename: &CStr16) -> Result<CString16, StrError> {
    let mut path_buf: SmallVec<[_; MAX_PATH]> =
        SmallVec::with_capacity(prefix.as_slice().len() + 1 + filename.as_slice().len());

    path_buf.extend_from_slice(prefix.to_u16_slice());
    path_buf.push(u16::from(b'\\'));
    path_buf.extend_from_slice(filename.to_u16_slice_with_nul());

    Ok(CStr16::from_u16_with_nul(&path_buf)?.into())
}

/// Gets the joined [`DevicePath`] given an existing [`DevicePath`] (likely to a partition) and a file's path.
///
/// The provided mutable buffer must be large enough to fit the final [`DevicePath`].
///
/// # Errors
///
/// May return an `Error` if the device path is finalized before the file's [`DevicePath`] could be pushed.
/// Though, this should be quite unlikely.
pub(crate) fn join_to_device_path(
    dev_path: &DevicePath,
    path: &CStr16,
    buf: &mut [u8],
) -> Result<PoolDevicePath, DevicePathError> {
    let buf = slice_to_maybe_uninit(buf);
    let path: &DevicePath = build::DevicePathBuilder::with_buf(buf)
        .push(&build::media::FilePath { path_name: path })?
        .finalize()?;
    Ok(dev_path.append_path(path)?)
}

/// Normalizes a path to make it more aligned with UEFI expectations
///
/// Currently this means replacing all forward slashes with backslashes.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn normalize_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Extracts the version-like substring from a filename.
///
/// The substring runs from the first ASCII digit through the last one, keeping any
/// characters in between, so `vmlinuz-6.8.0-45-generic` yields `6.8.0-45`. Returns
/// [`None`] if the filename holds no digits at all. Kernels and their RAM disks are
/// paired by comparing these substrings for equality.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn find_numbers(str: &str) -> Option<&str> {
    let start = str.find(|x: char| x.is_ascii_digit())?;
    let end = str.rfind(|x: char| x.is_ascii_digit())?;
    Some(&str[start..=end])
}

/// The filename part of a backslash-separated path.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn basename(path: &str) -> &str {
    path.rsplit_once('\\').map_or(path, |(_, name)| name)
}

/// The directory part of a backslash-separated path, without a trailing
/// backslash. Empty for paths at the volume root.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn dir_of(path: &str) -> &str {
    path.rsplit_once('\\').map_or("", |(dir, _)| dir)
}

/// The name of the last directory in a path, if it has one.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn last_dir_name(path: &str) -> Option<&str> {
    let dir = dir_of(path);
    match basename(dir) {
        "" => None,
        name => Some(name),
    }
}

/// Case-insensitive substring test, ASCII only like UEFI collation.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Converts a byte slice into an `&mut [MaybeUninit<u8>]`.
pub(crate) fn slice_to_maybe_uninit(slice: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: this is essentially equivalent to reconstructing an &mut [MaybeUninit<u8>] from a mutable slice.
    // because slices are always valid as pointers, and the length of the two slices are the same, this is safe.
    unsafe {
        core::slice::from_raw_parts_mut(slice.as_mut_ptr().cast::<MaybeUninit<u8>>(), slice.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::borrow::ToOwned;
    use uefi::cstr16;

    #[test]
    fn test_str_to_cstr() -> Result<(), StrError> {
        let cstr = str_to_cstr("foo bar")?;
        let str = String::from(&cstr);
        assert_eq!(str, "foo bar".to_owned());
        Ok(())
    }

    #[test]
    fn test_get_path_cstr() -> Result<(), StrError> {
        const PREFIX: &CStr16 = cstr16!("\\EFI\\debian");
        const FILE: &CStr16 = cstr16!("grubx64.efi");
        let path = get_path_cstr(PREFIX, FILE)?;
        let str = String::from(&path);
        assert_eq!(str, "\\EFI\\debian\\grubx64.efi".to_owned());
        Ok(())
    }

    #[test]
    fn test_normalize_path() {
        let path = "/boot/efi/vmlinuz";
        assert_eq!(normalize_path(path), "\\boot\\efi\\vmlinuz");
        let path = "\\already\\a\\uefi\\path";
        assert_eq!(normalize_path(path), path);
    }

    #[test]
    fn test_path_parts() {
        assert_eq!(basename("\\EFI\\kernels\\vmlinuz"), "vmlinuz");
        assert_eq!(basename("vmlinuz"), "vmlinuz");
        assert_eq!(dir_of("\\EFI\\kernels\\vmlinuz"), "\\EFI\\kernels");
        assert_eq!(dir_of("\\vmlinuz"), "");
        assert_eq!(last_dir_name("\\EFI\\kernels\\vmlinuz"), Some("kernels"));
        assert_eq!(last_dir_name("\\vmlinuz"), None);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("\\EFI\\BOOT\\BZIMAGE-6.8", "bzImage"));
        assert!(!contains_ignore_case("grubx64.efi", "shell"));
    }

    #[test]
    fn test_find_numbers() {
        assert_eq!(find_numbers("vmlinuz-6.8.0-45-generic"), Some("6.8.0-45"));
        assert_eq!(find_numbers("initramfs-3.3.0.img"), Some("3.3.0"));
        assert_eq!(find_numbers("foo-3.3.4-7.img"), Some("3.3.4-7"));
        assert_eq!(find_numbers("bzImage"), None);
        assert_eq!(
            find_numbers("bzImage-3.3.0.efi"),
            find_numbers("initramfs-3.3.0.img")
        );
    }
}
