// SPDX-License-Identifier: MIT

//! Volume discovery and classification.
//!
//! Every handle carrying `BlockIO` becomes a [`Volume`]: whole disks, GPT and
//! MBR partitions the firmware knows about, and El Torito images on optical
//! media. On top of that, logical partitions inside extended MBR partitions
//! are synthesized by walking the extended boot record chain ourselves, since
//! firmwares do not hand out handles for those.
//!
//! The scan runs in three passes. The first classifies each handle in
//! isolation: disk kind from the device path and block size, boot code and
//! operating system fingerprint from the first sectors, filesystem label if
//! one can be read. The second walks extended partition chains on whole disks
//! that carry an MBR table. The third ties partition volumes back to their
//! whole disk's table slot, by size and by comparing the boot sector read
//! both ways, so legacy boot entries know which slot to activate.

pub mod classify;
pub mod mbr;

use alloc::{borrow::ToOwned, format, string::String, vec::Vec};
use log::warn;
use smallvec::SmallVec;
use uefi::{
    Handle, Identify,
    boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol, SearchType},
    proto::{
        device_path::{DevicePath, DevicePathNode, DeviceType},
        loaded_image::LoadedImage,
        media::block::BlockIO,
    },
};

use crate::{
    BootResult,
    vol::{
        classify::{BootSectorScan, SAMPLE_SIZE, scan_boot_sector},
        mbr::{MbrPartitionEntry, SECTOR_SIZE, TABLE_LEN},
    },
};

/// Device path sub-types that mark a device as removable or external.
const SUBTYPE_FIBRE_CHANNEL: u8 = 0x03;
/// FireWire.
const SUBTYPE_1394: u8 = 0x04;
/// USB by port.
const SUBTYPE_USB: u8 = 0x05;
/// USB by interface class.
const SUBTYPE_USB_CLASS: u8 = 0x0f;
/// An El Torito boot image on optical media.
const SUBTYPE_CDROM: u8 = 0x02;
/// A vendor-defined media node, used by Apple firmware for legacy boot aliases.
const SUBTYPE_MEDIA_VENDOR: u8 = 0x03;

/// Where a volume physically lives, as far as the firmware will say.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiskKind {
    /// A fixed internal disk.
    #[default]
    Internal,

    /// A removable disk on USB, FireWire or Fibre Channel.
    External,

    /// An optical drive.
    Optical,
}

/// One discovered volume.
#[derive(Clone, Debug, Default)]
pub struct Volume {
    /// The firmware handle this volume was built from, if any.
    ///
    /// Logical partitions synthesized from extended boot records have none,
    /// their sectors are reached through the whole disk handle instead.
    pub device_handle: Option<Handle>,

    /// The handle of the disk this volume lives on, when it could be found.
    pub whole_disk_handle: Option<Handle>,

    /// The LBA offset added to block reads through this volume.
    ///
    /// Zero for handle-backed volumes, the partition start for synthesized
    /// logical partitions.
    pub block_offset: u64,

    /// The media block size in bytes.
    pub block_size: u32,

    /// The last addressable block of the media.
    pub last_block: u64,

    /// Where the volume lives.
    pub disk_kind: DiskKind,

    /// Legacy boot code was found in the volume's first sectors.
    pub has_boot_code: bool,

    /// Comma-delimited icon names for the fingerprinted operating system.
    pub os_icon: Option<&'static str>,

    /// The display name of the fingerprinted operating system.
    pub os_name: Option<&'static str>,

    /// The volume is an Apple legacy boot alias for the whole device.
    pub is_apple_legacy: bool,

    /// A filesystem could be opened on the volume.
    pub is_readable: bool,

    /// The filesystem label, or a synthesized name for logical partitions.
    pub name: Option<String>,

    /// The volume was matched to a slot of its disk's MBR partition table.
    pub is_mbr_partition: bool,

    /// The table slot (0 through 3 primary, 4 and up logical).
    pub mbr_partition_index: Option<usize>,

    /// The MBR partition table found in the volume's first sector, if any.
    pub mbr_table: Option<[MbrPartitionEntry; TABLE_LEN]>,
}

impl Volume {
    /// The handle block reads for this volume go through.
    #[must_use = "Has no effect if the result is unused"]
    pub fn block_handle(&self) -> Option<Handle> {
        self.device_handle.or(self.whole_disk_handle)
    }

    /// Tests if this volume is the whole disk rather than a partition on it.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_whole_disk(&self) -> bool {
        self.device_handle.is_some()
            && self.device_handle == self.whole_disk_handle
            && self.block_offset == 0
    }

    /// The name to show for this volume, falling back for unreadable ones.
    #[must_use = "Has no effect if the result is unused"]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Every volume the scan found, in discovery order.
#[derive(Default)]
pub struct VolumeDirectory {
    /// The discovered volumes.
    volumes: Vec<Volume>,

    /// The index of the volume this program was loaded from.
    self_volume: Option<usize>,
}

impl VolumeDirectory {
    /// Discovers and classifies every volume the firmware exposes.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle enumeration itself fails. Trouble
    /// with individual volumes is logged and degrades that volume instead.
    pub fn scan() -> BootResult<Self> {
        let mut directory = Self::default();

        let handles = boot::locate_handle_buffer(SearchType::ByProtocol(&BlockIO::GUID))?;
        let self_device = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())
            .ok()
            .and_then(|x| x.device());

        for &handle in handles.iter() {
            let volume = scan_volume(handle);
            if Some(handle) == self_device {
                directory.self_volume = Some(directory.volumes.len());
            }
            directory.volumes.push(volume);
        }
        if directory.self_volume.is_none() {
            warn!("own boot volume not found among the scanned volumes");
        }

        directory.scan_extended_partitions();
        directory.associate_mbr_partitions();

        Ok(directory)
    }

    /// Builds a directory from an already scanned set of volumes.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn from_volumes(volumes: Vec<Volume>, self_volume: Option<usize>) -> Self {
        Self {
            volumes,
            self_volume,
        }
    }

    /// All volumes, in discovery order.
    #[must_use = "Has no effect if the result is unused"]
    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// One volume by index.
    #[must_use = "Has no effect if the result is unused"]
    pub fn get(&self, index: usize) -> Option<&Volume> {
        self.volumes.get(index)
    }

    /// The index of the volume this program was loaded from.
    #[must_use = "Has no effect if the result is unused"]
    pub fn self_volume(&self) -> Option<usize> {
        self.self_volume
    }

    /// Resolves a volume identifier from a boot stanza.
    ///
    /// A number followed by a colon, like `0:`, counts through the readable
    /// volumes. Anything else matches filesystem labels case-insensitively.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find(&self, identifier: &str) -> Option<usize> {
        let number = parse_volume_number(identifier);
        let mut counted = 0;
        for (i, volume) in self.volumes.iter().enumerate() {
            if let Some(number) = number {
                if volume.is_readable {
                    if counted == number {
                        return Some(i);
                    }
                    counted += 1;
                }
            } else if volume
                .name
                .as_deref()
                .is_some_and(|x| x.eq_ignore_ascii_case(identifier))
            {
                return Some(i);
            }
        }
        None
    }

    /// Second pass: walk extended partition chains on whole disks.
    fn scan_extended_partitions(&mut self) {
        let mut found = Vec::new();
        for volume in &self.volumes {
            if !volume.is_whole_disk() {
                continue;
            }
            let Some(table) = volume.mbr_table else {
                continue;
            };
            for entry in &table {
                if entry.is_extended() {
                    found.extend(scan_extended_partition(volume, entry));
                }
            }
        }
        self.volumes.extend(found);
    }

    /// Third pass: match partition volumes to their disk's table slots.
    fn associate_mbr_partitions(&mut self) {
        for i in 0..self.volumes.len() {
            let volume = &self.volumes[i];
            if volume.device_handle.is_none()
                || volume.whole_disk_handle.is_none()
                || volume.device_handle == volume.whole_disk_handle
            {
                continue;
            }

            let whole = self
                .volumes
                .iter()
                .find(|x| x.is_whole_disk() && x.device_handle == volume.whole_disk_handle);
            let Some(whole) = whole else {
                continue;
            };
            let Some(table) = whole.mbr_table else {
                continue;
            };

            if let Some(slot) = match_partition_slot(volume, whole, &table) {
                let volume = &mut self.volumes[i];
                volume.is_mbr_partition = true;
                volume.mbr_partition_index = Some(slot);
                if volume.name.is_none() {
                    volume.name = Some(format!("Partition {}", slot + 1));
                }
            }
        }
    }
}

/// Parses the `<number>:` form of a volume identifier.
fn parse_volume_number(identifier: &str) -> Option<usize> {
    if identifier.len() < 2 || !identifier.ends_with(':') {
        return None;
    }
    if !identifier.chars().next()?.is_ascii_digit() {
        return None;
    }
    let digits: String = identifier
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Opens `BlockIO` on a handle without claiming it.
///
/// An exclusive open would make the firmware disconnect whatever driver
/// produced the protocol, which for a partition handle is the filesystem
/// driver the rest of the scan needs.
///
/// # Errors
///
/// May return an `Error` if the handle does not support [`BlockIO`].
fn open_block_io(handle: Handle) -> BootResult<ScopedProtocol<BlockIO>> {
    let params = OpenProtocolParams {
        handle,
        agent: boot::image_handle(),
        controller: None,
    };
    // SAFETY: the protocol is only read through the returned scope, and
    // GetProtocol leaves existing driver bindings untouched, so nothing is
    // pulled out from under another user.
    let io = unsafe { boot::open_protocol::<BlockIO>(params, OpenProtocolAttributes::GetProtocol) };
    Ok(io?)
}

/// Reads one 512 byte sector through a handle's `BlockIO`.
fn read_sector(handle: Handle, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> BootResult<()> {
    let io = open_block_io(handle)?;
    let media_id = io.media().media_id();
    io.read_blocks(media_id, lba, buf)?;
    Ok(())
}

/// Reads the boot code sample of a volume, if the media allows it.
fn read_boot_sample(handle: Handle, offset: u64) -> Option<[u8; SAMPLE_SIZE]> {
    let io = open_block_io(handle).ok()?;
    if io.media().block_size() > SAMPLE_SIZE as u32 {
        return None; // our sample buffer is too small
    }
    let media_id = io.media().media_id();
    let mut buf = [0u8; SAMPLE_SIZE];
    io.read_blocks(media_id, offset, &mut buf).ok()?;
    Some(buf)
}

/// Runs the boot sector scan for a volume and applies the result.
fn apply_boot_sector_scan(volume: &mut Volume, sample: Option<[u8; SAMPLE_SIZE]>) -> bool {
    let scan = sample.map(|x| scan_boot_sector(&x)).unwrap_or_default();
    let BootSectorScan {
        bootable,
        has_boot_code,
        os_icon,
        os_name,
        mbr_table,
    } = scan;
    volume.has_boot_code = has_boot_code;
    volume.os_icon = os_icon;
    volume.os_name = os_name;
    volume.mbr_table = mbr_table;
    bootable
}

/// First pass classification of a single handle.
fn scan_volume(handle: Handle) -> Volume {
    let mut volume = Volume {
        device_handle: Some(handle),
        ..Volume::default()
    };

    match open_block_io(handle) {
        Ok(io) => {
            volume.block_size = io.media().block_size();
            volume.last_block = io.media().last_block();
            if volume.block_size == 2048 {
                volume.disk_kind = DiskKind::Optical;
            }
        }
        Err(e) => warn!("volume has no usable block device: {e}"),
    }

    let mut bootable = apply_boot_sector_scan(&mut volume, read_boot_sample(handle, 0));

    if let Ok(device_path) = boot::open_protocol_exclusive::<DevicePath>(handle) {
        walk_device_path(&mut volume, &device_path, &mut bootable);
    }

    // a volume that cannot be booted the BIOS way has no use for boot code
    if !bootable {
        volume.has_boot_code = false;
    }

    match crate::system::fs::UefiFileSystem::from_handle(handle) {
        Ok(mut fs) => match fs.get_volume_label() {
            Ok(label) => {
                volume.is_readable = true;
                let label = String::from(&label);
                volume.name = if label.is_empty() {
                    Some("Unknown".to_owned())
                } else {
                    Some(label)
                };
            }
            Err(crate::system::fs::FsError::VolumeLabelErr) => {
                volume.is_readable = true;
                volume.name = Some("Unknown".to_owned());
            }
            Err(_) => volume.is_readable = false,
        },
        Err(_) => volume.is_readable = false,
    }

    volume
}

/// Classifies a volume by its device path and finds its whole disk.
///
/// Messaging nodes reveal the transport (USB and friends mean external), and
/// media nodes reveal El Torito images and Apple legacy aliases. At each
/// messaging node the path is also truncated there and re-resolved, which
/// yields the handle of the whole disk the volume sits on.
fn walk_device_path(volume: &mut Volume, device_path: &DevicePath, bootable: &mut bool) {
    let mut prefix: SmallVec<[u8; 128]> = SmallVec::new();

    for node in device_path.node_iter() {
        push_node_bytes(&mut prefix, node);

        if node.device_type() == DeviceType::MESSAGING {
            match node.sub_type().0 {
                SUBTYPE_USB | SUBTYPE_USB_CLASS | SUBTYPE_1394 | SUBTYPE_FIBRE_CHANNEL => {
                    volume.disk_kind = DiskKind::External;
                }
                _ => (),
            }
            locate_whole_disk(volume, &prefix);
        } else if node.device_type() == DeviceType::MEDIA {
            match node.sub_type().0 {
                SUBTYPE_CDROM => {
                    volume.disk_kind = DiskKind::Optical;
                    *bootable = true;
                }
                SUBTYPE_MEDIA_VENDOR => {
                    // this handle's block device is just an alias for the whole disk
                    volume.is_apple_legacy = true;
                    *bootable = false;
                }
                _ => (),
            }
        }
    }
}

/// Appends the raw bytes of one device path node to a buffer.
fn push_node_bytes(buf: &mut SmallVec<[u8; 128]>, node: &DevicePathNode) {
    buf.push(node.device_type().0);
    buf.push(node.sub_type().0);
    buf.extend_from_slice(&node.length().to_le_bytes());
    buf.extend_from_slice(node.data());
}

/// Resolves a truncated device path to the disk handle behind it.
fn locate_whole_disk(volume: &mut Volume, prefix: &[u8]) {
    // end-of-path node
    let mut path_buf: SmallVec<[u8; 128]> = SmallVec::from_slice(prefix);
    path_buf.extend_from_slice(&[0x7f, 0xff, 0x04, 0x00]);

    // SAFETY: path_buf holds a well-formed device path, each node was copied
    // whole from an existing path and the end node was appended by hand.
    let path = unsafe { DevicePath::from_ffi_ptr(path_buf.as_ptr().cast()) };
    let mut remaining = path;
    let Ok(handle) = boot::locate_device_path::<BlockIO>(&mut remaining) else {
        return;
    };

    volume.whole_disk_handle = Some(handle);
    if let Ok(io) = open_block_io(handle) {
        if io.media().block_size() == 2048 {
            volume.disk_kind = DiskKind::Optical;
        }
    }
}

/// Walks one extended partition chain and synthesizes its logical partitions.
///
/// Each extended boot record holds at most one logical partition and at most
/// one link onward. The walk stops at the first record without the boot
/// signature, a read error, or an LBA seen before, so a corrupted chain that
/// loops cannot hang the scan.
fn scan_extended_partition(whole: &Volume, entry: &MbrPartitionEntry) -> Vec<Volume> {
    let mut found = Vec::new();
    let Some(handle) = whole.block_handle() else {
        return found;
    };

    let ext_base = u64::from(entry.start_lba);
    let mut logical_index = mbr::FIRST_LOGICAL_INDEX;
    let mut visited: SmallVec<[u64; 16]> = SmallVec::new();
    let mut current = ext_base;

    while current != 0 {
        if visited.contains(&current) {
            warn!("extended partition chain loops at sector {current}, stopping the walk");
            break;
        }
        visited.push(current);

        let mut sector = [0u8; SECTOR_SIZE];
        if read_sector(handle, current, &mut sector).is_err() || !mbr::has_signature(&sector) {
            break;
        }

        let mut next = 0;
        for slot in &mbr::read_slots(&sector) {
            if !slot.flags_valid() || !slot.is_used() {
                break;
            }
            if slot.is_extended() {
                next = ext_base + u64::from(slot.start_lba);
                break;
            }

            let mut volume = Volume {
                whole_disk_handle: Some(handle),
                block_offset: current + u64::from(slot.start_lba),
                block_size: whole.block_size,
                last_block: whole.last_block,
                disk_kind: whole.disk_kind,
                is_mbr_partition: true,
                mbr_partition_index: Some(logical_index),
                name: Some(format!("Partition {}", logical_index + 1)),
                ..Volume::default()
            };
            logical_index += 1;

            let sample = read_boot_sample(handle, volume.block_offset);
            let bootable = apply_boot_sector_scan(&mut volume, sample);
            if !bootable {
                volume.has_boot_code = false;
            }
            found.push(volume);
        }
        current = next;
    }

    found
}

/// Finds the table slot a partition volume corresponds to, if any.
///
/// A slot matches when its size equals the partition media exactly and the
/// boot sector reads identically through the partition handle and through
/// the whole disk at the slot's start. Sectors that are almost all zeros are
/// not accepted as evidence, two blank partitions look alike.
fn match_partition_slot(
    volume: &Volume,
    whole: &Volume,
    table: &[MbrPartitionEntry; TABLE_LEN],
) -> Option<usize> {
    let volume_handle = volume.block_handle()?;
    let whole_handle = whole.block_handle()?;

    for (slot, entry) in table.iter().enumerate() {
        if u64::from(entry.size) != volume.last_block + 1 {
            continue;
        }

        let mut through_partition = [0u8; SECTOR_SIZE];
        let mut through_disk = [0u8; SECTOR_SIZE];
        if read_sector(volume_handle, volume.block_offset, &mut through_partition).is_err() {
            break;
        }
        if read_sector(whole_handle, u64::from(entry.start_lba), &mut through_disk).is_err() {
            break;
        }
        if through_partition != through_disk {
            continue;
        }
        let sum: usize = through_partition.iter().map(|&x| usize::from(x)).sum();
        if sum < 1000 {
            continue;
        }
        return Some(slot);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(name: &str) -> Volume {
        Volume {
            is_readable: true,
            name: Some(name.to_owned()),
            ..Volume::default()
        }
    }

    #[test]
    fn test_parse_volume_number() {
        assert_eq!(parse_volume_number("0:"), Some(0));
        assert_eq!(parse_volume_number("12:"), Some(12));
        assert_eq!(parse_volume_number(":"), None);
        assert_eq!(parse_volume_number("ESP"), None);
        assert_eq!(parse_volume_number("x:"), None);
    }

    #[test]
    fn test_find_by_label_is_case_insensitive() {
        let directory = VolumeDirectory {
            volumes: alloc::vec![readable("ESP"), readable("Data")],
            self_volume: None,
        };
        assert_eq!(directory.find("esp"), Some(0));
        assert_eq!(directory.find("DATA"), Some(1));
        assert_eq!(directory.find("missing"), None);
    }

    #[test]
    fn test_find_by_number_counts_readable_volumes_only() {
        let unreadable = Volume::default();
        let directory = VolumeDirectory {
            volumes: alloc::vec![unreadable, readable("ESP"), readable("Data")],
            self_volume: None,
        };
        assert_eq!(directory.find("0:"), Some(1));
        assert_eq!(directory.find("1:"), Some(2));
        assert_eq!(directory.find("2:"), None);
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(Volume::default().display_name(), "Unknown");
        assert_eq!(readable("ESP").display_name(), "ESP");
    }
}
