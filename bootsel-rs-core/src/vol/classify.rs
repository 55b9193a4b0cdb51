//! Boot sector inspection for legacy operating system detection.
//!
//! The first sectors of a volume are enough to tell whether anything can be
//! booted from it the BIOS way, and usually which loader family put the code
//! there. Everything here is pure over a byte sample, so the fingerprints can
//! be tested with synthetic sectors. The sample covers [`SAMPLE_SIZE`] bytes
//! because some loaders (ISOLINUX, the FreeBSD BTX loader) leave their marks
//! past the first 512 bytes of El Torito images.

use crate::vol::mbr::{self, MbrPartitionEntry, TABLE_LEN};

/// The number of bytes of a volume inspected for boot code.
pub const SAMPLE_SIZE: usize = 2048;

/// What a look at the first sectors of a volume revealed.
#[derive(Clone, Copy, Debug, Default)]
pub struct BootSectorScan {
    /// The sector carries the boot signature and a nonzero first byte.
    pub bootable: bool,

    /// Boot code was found, by the signature or by a known fingerprint.
    pub has_boot_code: bool,

    /// A comma-delimited list of icon names for the detected loader, most specific first.
    pub os_icon: Option<&'static str>,

    /// The display name of the detected operating system.
    pub os_name: Option<&'static str>,

    /// The MBR partition table, when the sector holds a trustworthy one.
    pub mbr_table: Option<[MbrPartitionEntry; TABLE_LEN]>,
}

/// Searches for a byte pattern within the first `len` bytes of a sample.
fn find_mem(sample: &[u8], len: usize, needle: &[u8]) -> bool {
    let end = len.min(sample.len());
    sample[..end].windows(needle.len()).any(|x| x == needle)
}

/// Tests for a byte pattern at an exact offset.
fn at(sample: &[u8], offset: usize, needle: &[u8]) -> bool {
    sample
        .get(offset..offset + needle.len())
        .is_some_and(|x| x == needle)
}

/// Reads a little endian `u32` at an offset, if the sample reaches that far.
fn u32_at(sample: &[u8], offset: usize) -> Option<u32> {
    let bytes = sample.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Matches the boot code sample against known loader fingerprints.
///
/// The order matters: the first match wins, and some of the later patterns
/// (like `BOOTMGR`) would also appear in sectors the earlier ones describe
/// more precisely.
fn detect_os(sample: &[u8]) -> Option<(&'static str, &'static str)> {
    if at(sample, 2, b"LILO")
        || at(sample, 6, b"LILO")
        || at(sample, 3, b"SYSLINUX")
        || find_mem(sample, SAMPLE_SIZE, b"ISOLINUX")
    {
        Some(("linux", "Linux"))
    } else if find_mem(sample, 512, b"Geom\0Hard Disk\0Read\0 Error") {
        // GRUB stage 1
        Some(("grub,linux", "Linux"))
    } else if (u32_at(sample, 502) == Some(0)
        && u32_at(sample, 506) == Some(50000)
        && mbr::has_signature(sample))
        || find_mem(sample, SAMPLE_SIZE, b"Starting the BTX loader")
    {
        Some(("freebsd", "FreeBSD"))
    } else if find_mem(sample, 512, b"!Loading")
        || find_mem(sample, SAMPLE_SIZE, b"/cdboot\0/CDBOOT\0")
    {
        Some(("openbsd", "OpenBSD"))
    } else if find_mem(sample, 512, b"Not a bootxx image")
        || u32_at(sample, 1028) == Some(0x7886_b6d1)
    {
        Some(("netbsd", "NetBSD"))
    } else if find_mem(sample, SAMPLE_SIZE, b"NTLDR") {
        Some(("win", "Windows"))
    } else if find_mem(sample, SAMPLE_SIZE, b"BOOTMGR") {
        Some(("winvista,win", "Windows"))
    } else if find_mem(sample, 512, b"CPUBOOT SYS") || find_mem(sample, 512, b"KERNEL  SYS") {
        Some(("freedos", "FreeDOS"))
    } else if find_mem(sample, 512, b"OS2LDR") || find_mem(sample, 512, b"OS2BOOT") {
        Some(("ecomstation", "eComStation"))
    } else if find_mem(sample, 512, b"Be Boot Loader") {
        Some(("beos", "BeOS"))
    } else if find_mem(sample, 512, b"yT Boot Loader") {
        Some(("zeta,beos", "ZETA"))
    } else if find_mem(sample, 512, b"\x04beos\x06system\x05zbeos")
        || find_mem(sample, 512, b"\x06system\x0chaiku_loader")
    {
        Some(("haiku,beos", "Haiku"))
    } else {
        None
    }
    // NOTE: entries whose display name starts with 'W' or 'L' get shortcut
    // letters on legacy menu entries, see scan::add_legacy_entry.
}

/// Inspects a boot code sample for bootability, a known loader, and an MBR table.
#[must_use = "Has no effect if the result is unused"]
pub fn scan_boot_sector(sample: &[u8]) -> BootSectorScan {
    let mut scan = BootSectorScan::default();

    if mbr::has_signature(sample) && sample.first().copied().unwrap_or_default() != 0 {
        scan.bootable = true;
        scan.has_boot_code = true;
    }

    if let Some((icon, name)) = detect_os(sample) {
        scan.has_boot_code = true;
        scan.os_icon = Some(icon);
        scan.os_name = Some(name);
    }

    // a dummy FAT boot sector prints this and halts, so there is nothing to boot
    if find_mem(sample, 512, b"Non-system disk") {
        scan.has_boot_code = false;
    }

    scan.mbr_table = mbr::read_table(sample);

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vol::mbr::{SIGNATURE_OFFSET, TABLE_OFFSET};

    fn signed_sector() -> [u8; SAMPLE_SIZE] {
        let mut sample = [0u8; SAMPLE_SIZE];
        sample[0] = 0xEB;
        sample[SIGNATURE_OFFSET] = 0x55;
        sample[SIGNATURE_OFFSET + 1] = 0xAA;
        sample
    }

    #[test]
    fn test_signed_nonzero_sector_is_bootable() {
        let scan = scan_boot_sector(&signed_sector());
        assert!(scan.bootable);
        assert!(scan.has_boot_code);
        assert_eq!(scan.os_name, None);
    }

    #[test]
    fn test_unsigned_sector_is_not_bootable() {
        let mut sample = signed_sector();
        sample[SIGNATURE_OFFSET] = 0;
        let scan = scan_boot_sector(&sample);
        assert!(!scan.bootable);
        assert!(!scan.has_boot_code);
    }

    #[test]
    fn test_zero_first_byte_is_not_bootable() {
        let mut sample = signed_sector();
        sample[0] = 0;
        let scan = scan_boot_sector(&sample);
        assert!(!scan.bootable);
        assert!(!scan.has_boot_code);
    }

    #[test]
    fn test_non_system_disk_overrides_boot_code() {
        let mut sample = signed_sector();
        sample[100..115].copy_from_slice(b"Non-system disk");
        let scan = scan_boot_sector(&sample);
        assert!(scan.bootable);
        assert!(!scan.has_boot_code);
    }

    #[test]
    fn test_lilo_at_offset_six() {
        let mut sample = signed_sector();
        sample[6..10].copy_from_slice(b"LILO");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("linux"));
        assert_eq!(scan.os_name, Some("Linux"));
    }

    #[test]
    fn test_isolinux_found_past_first_sector() {
        let mut sample = signed_sector();
        sample[1400..1408].copy_from_slice(b"ISOLINUX");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_name, Some("Linux"));
        assert!(scan.has_boot_code);
    }

    #[test]
    fn test_grub_fingerprint() {
        let mut sample = signed_sector();
        sample[300..326].copy_from_slice(b"Geom\0Hard Disk\0Read\0 Error");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("grub,linux"));
        assert_eq!(scan.os_name, Some("Linux"));
    }

    #[test]
    fn test_freebsd_numeric_fingerprint() {
        let mut sample = signed_sector();
        sample[506..510].copy_from_slice(&50000u32.to_le_bytes());
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_name, Some("FreeBSD"));
    }

    #[test]
    fn test_ntldr_beats_nothing_but_loses_to_lilo() {
        let mut sample = signed_sector();
        sample[200..205].copy_from_slice(b"NTLDR");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("win"));

        sample[2..6].copy_from_slice(b"LILO");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("linux"));
    }

    #[test]
    fn test_bootmgr_fingerprint() {
        let mut sample = signed_sector();
        sample[600..607].copy_from_slice(b"BOOTMGR");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("winvista,win"));
        assert_eq!(scan.os_name, Some("Windows"));
    }

    #[test]
    fn test_netbsd_magic_number() {
        let mut sample = signed_sector();
        sample[1028..1032].copy_from_slice(&0x7886_b6d1u32.to_le_bytes());
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_name, Some("NetBSD"));
    }

    #[test]
    fn test_haiku_fingerprint() {
        let mut sample = signed_sector();
        sample[64..84].copy_from_slice(b"\x06system\x0chaiku_loader");
        let scan = scan_boot_sector(&sample);
        assert_eq!(scan.os_icon, Some("haiku,beos"));
    }

    #[test]
    fn test_mbr_table_captured_alongside_boot_code() {
        let mut sample = signed_sector();
        let offset = TABLE_OFFSET;
        sample[offset] = 0x80;
        sample[offset + 4] = 0x83;
        sample[offset + 8..offset + 12].copy_from_slice(&2048u32.to_le_bytes());
        sample[offset + 12..offset + 16].copy_from_slice(&100_000u32.to_le_bytes());
        let scan = scan_boot_sector(&sample);
        let table = scan.mbr_table.expect("table should be captured");
        assert_eq!(table[0].start_lba, 2048);
    }
}
