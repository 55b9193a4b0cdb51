//! MBR partition table parsing and partition activation.
//!
//! The legacy BIOS boot path cares about one bit of mutable state on disk: the
//! active flag in the MBR partition table (and, for logical partitions, in the
//! extended partition chain). Everything in this module works on raw 512 byte
//! sectors so the table logic can be exercised without firmware; the only
//! functions touching hardware are the ones taking a [`BlockIO`].

use bytemuck::{Pod, Zeroable};
use log::warn;
use smallvec::SmallVec;
use thiserror::Error;
use uefi::{
    boot,
    proto::media::block::{BlockIO, Lba},
};

use crate::BootResult;

/// The `55 AA` signature closing a valid boot sector.
pub const MBR_SIGNATURE: u16 = 0xAA55;

/// The offset of the signature within a sector.
pub const SIGNATURE_OFFSET: usize = 510;

/// The offset of the partition table within an MBR sector.
pub const TABLE_OFFSET: usize = 446;

/// The number of slots in an MBR partition table.
pub const TABLE_LEN: usize = 4;

/// The size of the boot code area preceding the partition table.
pub const BOOTCODE_SIZE: usize = 440;

/// The size of an MBR sector.
pub const SECTOR_SIZE: usize = 512;

/// Logical partitions are numbered from this index, after the four primary slots.
pub const FIRST_LOGICAL_INDEX: usize = 4;

/// An `Error` that may result from inspecting or rewriting partition tables.
#[derive(Error, Debug)]
pub enum MbrError {
    /// A sector expected to carry a partition table had no `55 AA` signature.
    #[error("no MBR signature on sector {0}")]
    MissingSignature(u64),

    /// A partition flag byte was neither `0x00` nor `0x80`.
    ///
    /// Such a table is left strictly alone, since the byte is likelier to be
    /// part of something that is not a partition table at all.
    #[error("partition flag byte {0:#04x} is neither 0x00 nor 0x80")]
    BadFlags(u8),

    /// The extended partition chain looped back onto a sector already visited.
    #[error("extended partition chain revisits sector {0}")]
    ChainLoop(u64),
}

/// One slot of an MBR partition table, as laid out on disk.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MbrPartitionEntry {
    /// `0x80` when active, `0x00` when not. Anything else poisons the table.
    pub flags: u8,

    /// The CHS address of the first sector, unused here.
    pub start_chs: [u8; 3],

    /// The partition type byte.
    pub part_type: u8,

    /// The CHS address of the last sector, unused here.
    pub end_chs: [u8; 3],

    /// The first LBA of the partition, little endian.
    pub start_lba: u32,

    /// The size of the partition in sectors, little endian.
    pub size: u32,
}

impl MbrPartitionEntry {
    /// Tests if the slot describes a partition at all.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_used(&self) -> bool {
        self.start_lba != 0 && self.size != 0
    }

    /// Tests if the slot's flag byte is one of the two legal values.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn flags_valid(&self) -> bool {
        self.flags == 0x00 || self.flags == 0x80
    }

    /// Tests if the slot links to an extended partition.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_extended(&self) -> bool {
        matches!(self.part_type, 0x05 | 0x0f | 0x85)
    }
}

/// Tests if a sector ends with the `55 AA` boot signature.
#[must_use = "Has no effect if the result is unused"]
pub fn has_signature(sector: &[u8]) -> bool {
    sector.len() >= SECTOR_SIZE
        && u16::from_le_bytes([sector[SIGNATURE_OFFSET], sector[SIGNATURE_OFFSET + 1]])
            == MBR_SIGNATURE
}

/// Parses the four partition table slots out of a sector.
///
/// No validation happens here, the caller decides what the slots mean.
#[must_use = "Has no effect if the result is unused"]
pub fn read_slots(sector: &[u8]) -> [MbrPartitionEntry; TABLE_LEN] {
    let mut slots = [MbrPartitionEntry::default(); TABLE_LEN];
    for (i, slot) in slots.iter_mut().enumerate() {
        let offset = TABLE_OFFSET + i * size_of::<MbrPartitionEntry>();
        *slot = bytemuck::pod_read_unaligned(
            &sector[offset..offset + size_of::<MbrPartitionEntry>()],
        );
    }
    slots
}

/// Writes one slot's flag byte back into a sector buffer.
fn write_flag(sector: &mut [u8], slot: usize, flag: u8) {
    sector[TABLE_OFFSET + slot * size_of::<MbrPartitionEntry>()] = flag;
}

/// Parses a trustworthy partition table out of an MBR sector, if it holds one.
///
/// A table is accepted when the sector carries the boot signature, at least one
/// slot describes a partition, and every slot's flag byte is a legal value. A
/// single bad flag byte rejects the whole table, since the bytes are then more
/// likely boot code than a table.
#[must_use = "Has no effect if the result is unused"]
pub fn read_table(sector: &[u8]) -> Option<[MbrPartitionEntry; TABLE_LEN]> {
    if !has_signature(sector) {
        return None;
    }
    let slots = read_slots(sector);
    if !slots.iter().any(MbrPartitionEntry::is_used) {
        return None;
    }
    if !slots.iter().all(MbrPartitionEntry::flags_valid) {
        return None;
    }
    Some(slots)
}

/// Rewrites the active flags of an MBR sector so that one partition is active.
///
/// Primary partitions are flagged directly. A logical partition (index 4 and
/// up) instead flags the extended slot active, and returns its start LBA so
/// the caller can continue into the extended chain.
///
/// # Errors
///
/// May return an `Error` if the sector has no boot signature or a flag byte is
/// not a legal value. The sector is not modified in that case.
pub fn mark_active_primary(sector: &mut [u8], partition_index: usize) -> Result<u64, MbrError> {
    if !has_signature(sector) {
        return Err(MbrError::MissingSignature(0));
    }
    let slots = read_slots(sector);
    if let Some(slot) = slots.iter().find(|x| !x.flags_valid()) {
        return Err(MbrError::BadFlags(slot.flags));
    }

    if !sector[..BOOTCODE_SIZE].iter().any(|&x| x != 0) {
        warn!("MBR has no boot code, the firmware BIOS compatibility module may refuse to boot it");
    }

    let mut ext_base = 0;
    for (i, slot) in slots.iter().enumerate() {
        let flag = if i == partition_index {
            0x80
        } else if partition_index >= FIRST_LOGICAL_INDEX && slot.is_extended() {
            ext_base = u64::from(slot.start_lba);
            0x80
        } else {
            0x00
        };
        write_flag(sector, i, flag);
    }
    Ok(ext_base)
}

/// Rewrites the active flags of one extended boot record in the chain.
///
/// `logical_index` counts the logical partitions seen so far, starting at
/// [`FIRST_LOGICAL_INDEX`], and is advanced for each one found here. Returns
/// the absolute LBA of the next record in the chain, or zero at the end.
///
/// # Errors
///
/// May return an `Error` if the sector has no boot signature or a flag byte is
/// not a legal value.
pub fn mark_active_logical(
    sector: &mut [u8],
    current_lba: u64,
    ext_base: u64,
    partition_index: usize,
    logical_index: &mut usize,
) -> Result<u64, MbrError> {
    if !has_signature(sector) {
        return Err(MbrError::MissingSignature(current_lba));
    }
    let slots = read_slots(sector);

    let mut next = 0;
    for (i, slot) in slots.iter().enumerate() {
        if !slot.flags_valid() {
            return Err(MbrError::BadFlags(slot.flags));
        }
        if !slot.is_used() {
            break;
        }
        if slot.is_extended() {
            next = ext_base + u64::from(slot.start_lba);
            let flag = if partition_index >= *logical_index {
                0x80
            } else {
                0x00
            };
            write_flag(sector, i, flag);
            break;
        }
        let flag = if partition_index == *logical_index {
            0x80
        } else {
            0x00
        };
        write_flag(sector, i, flag);
        *logical_index += 1;
    }
    Ok(next)
}

/// Sector-granular disk access, so the chain walk can run off any backing.
trait SectorIo {
    /// Reads the sector at an absolute LBA.
    fn read(&mut self, lba: Lba, sector: &mut [u8; SECTOR_SIZE]) -> BootResult<()>;

    /// Writes the sector at an absolute LBA.
    fn write(&mut self, lba: Lba, sector: &[u8; SECTOR_SIZE]) -> BootResult<()>;
}

/// [`SectorIo`] over a [`BlockIO`] protocol.
struct BlockSectors<'a> {
    /// The open protocol.
    block_io: &'a mut BlockIO,

    /// The media id the protocol was opened with.
    media_id: u32,
}

impl SectorIo for BlockSectors<'_> {
    fn read(&mut self, lba: Lba, sector: &mut [u8; SECTOR_SIZE]) -> BootResult<()> {
        Ok(self.block_io.read_blocks(self.media_id, lba, sector)?)
    }

    fn write(&mut self, lba: Lba, sector: &[u8; SECTOR_SIZE]) -> BootResult<()> {
        Ok(self.block_io.write_blocks(self.media_id, lba, sector)?)
    }
}

/// The activation rewrite over any [`SectorIo`] backing.
fn activate_in<S: SectorIo>(store: &mut S, partition_index: usize) -> BootResult<()> {
    let mut sector = [0u8; SECTOR_SIZE];

    store.read(0, &mut sector)?;
    let ext_base = mark_active_primary(&mut sector, partition_index)?;
    store.write(0, &sector)?;

    if partition_index >= FIRST_LOGICAL_INDEX {
        let mut logical_index = FIRST_LOGICAL_INDEX;
        let mut visited: SmallVec<[Lba; 16]> = SmallVec::new();
        let mut current = ext_base;
        while current != 0 {
            if visited.contains(&current) {
                return Err(MbrError::ChainLoop(current).into());
            }
            visited.push(current);

            store.read(current, &mut sector)?;
            let next = mark_active_logical(
                &mut sector,
                current,
                ext_base,
                partition_index,
                &mut logical_index,
            )?;
            store.write(current, &sector)?;

            if partition_index < logical_index {
                break;
            }
            current = next;
        }
    }

    Ok(())
}

/// Makes one partition of a disk the active one, rewriting its MBR in place.
///
/// For logical partitions this walks the extended chain, updating each record
/// until the target has been flagged. The walk keeps a small trail of visited
/// LBAs so a chain that loops back on itself terminates with an error instead
/// of rewriting sectors forever.
///
/// # Errors
///
/// May return an `Error` if a sector could not be read or written, a sector
/// has no boot signature, a flag byte is not a legal value, or the extended
/// chain loops.
pub fn activate_partition(block_io: &mut BlockIO, partition_index: usize) -> BootResult<()> {
    let media_id = block_io.media().media_id();
    activate_in(&mut BlockSectors { block_io, media_id }, partition_index)
}

/// Opens the disk behind a handle and makes one of its partitions active.
///
/// # Errors
///
/// May return an `Error` if the handle does not support [`BlockIO`], or the
/// rewrite itself fails.
pub fn activate_partition_on_handle(
    handle: uefi::Handle,
    partition_index: usize,
) -> BootResult<()> {
    let mut block_io = boot::open_protocol_exclusive::<BlockIO>(handle)?;
    activate_partition(&mut block_io, partition_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector_with_table(slots: &[(u8, u8, u32, u32)]) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[0] = 0xEB; // pretend there is boot code
        sector[SIGNATURE_OFFSET] = 0x55;
        sector[SIGNATURE_OFFSET + 1] = 0xAA;
        for (i, &(flags, part_type, start_lba, size)) in slots.iter().enumerate() {
            let offset = TABLE_OFFSET + i * 16;
            sector[offset] = flags;
            sector[offset + 4] = part_type;
            sector[offset + 8..offset + 12].copy_from_slice(&start_lba.to_le_bytes());
            sector[offset + 12..offset + 16].copy_from_slice(&size.to_le_bytes());
        }
        sector
    }

    #[test]
    fn test_read_table_accepts_plain_table() {
        let sector = sector_with_table(&[(0x80, 0x83, 2048, 100_000), (0x00, 0x07, 102_448, 50_000)]);
        let table = read_table(&sector).expect("a plain table should be accepted");
        assert!(table[0].is_used());
        assert_eq!(table[0].start_lba, 2048);
        assert_eq!(table[1].part_type, 0x07);
        assert!(!table[2].is_used());
    }

    #[test]
    fn test_read_table_rejects_missing_signature() {
        let mut sector = sector_with_table(&[(0x00, 0x83, 2048, 100_000)]);
        sector[SIGNATURE_OFFSET] = 0;
        assert!(read_table(&sector).is_none());
    }

    #[test]
    fn test_read_table_rejects_empty_table() {
        let sector = sector_with_table(&[]);
        assert!(read_table(&sector).is_none());
    }

    #[test]
    fn test_one_bad_flag_byte_rejects_whole_table() {
        let sector = sector_with_table(&[
            (0x80, 0x83, 2048, 100_000),
            (0x40, 0x07, 102_448, 50_000),
        ]);
        assert!(read_table(&sector).is_none());
    }

    #[test]
    fn test_is_extended_types() {
        for part_type in [0x05, 0x0f, 0x85] {
            let entry = MbrPartitionEntry {
                part_type,
                ..MbrPartitionEntry::default()
            };
            assert!(entry.is_extended());
        }
        let entry = MbrPartitionEntry {
            part_type: 0x83,
            ..MbrPartitionEntry::default()
        };
        assert!(!entry.is_extended());
    }

    #[test]
    fn test_mark_active_primary() -> Result<(), MbrError> {
        let mut sector = sector_with_table(&[
            (0x80, 0x83, 2048, 100_000),
            (0x00, 0x07, 102_448, 50_000),
        ]);
        let ext_base = mark_active_primary(&mut sector, 1)?;
        assert_eq!(ext_base, 0);
        let slots = read_slots(&sector);
        assert_eq!(slots[0].flags, 0x00);
        assert_eq!(slots[1].flags, 0x80);
        Ok(())
    }

    #[test]
    fn test_mark_active_primary_flags_extended_for_logical_target() -> Result<(), MbrError> {
        let mut sector = sector_with_table(&[
            (0x80, 0x83, 2048, 100_000),
            (0x00, 0x05, 102_448, 500_000),
        ]);
        let ext_base = mark_active_primary(&mut sector, 4)?;
        assert_eq!(ext_base, 102_448);
        let slots = read_slots(&sector);
        assert_eq!(slots[0].flags, 0x00);
        assert_eq!(slots[1].flags, 0x80);
        Ok(())
    }

    #[test]
    fn test_mark_active_primary_rejects_bad_flags() {
        let mut sector = sector_with_table(&[(0x40, 0x83, 2048, 100_000)]);
        assert!(matches!(
            mark_active_primary(&mut sector, 0),
            Err(MbrError::BadFlags(0x40))
        ));
        // unchanged
        assert_eq!(read_slots(&sector)[0].flags, 0x40);
    }

    #[test]
    fn test_mark_active_logical_walks_and_flags() -> Result<(), MbrError> {
        // first EBR: one logical partition, then a link to the next EBR
        let mut sector = sector_with_table(&[
            (0x00, 0x83, 63, 10_000),
            (0x00, 0x05, 20_000, 10_000),
        ]);
        let mut logical_index = FIRST_LOGICAL_INDEX;
        let next = mark_active_logical(&mut sector, 1000, 1000, 5, &mut logical_index)?;
        assert_eq!(next, 21_000);
        assert_eq!(logical_index, 5);
        let slots = read_slots(&sector);
        assert_eq!(slots[0].flags, 0x00); // index 4, not the target
        assert_eq!(slots[1].flags, 0x80); // chain continues toward the target

        // second EBR: the target logical partition, end of chain
        let mut sector = sector_with_table(&[(0x00, 0x83, 63, 9_000)]);
        let next = mark_active_logical(&mut sector, 21_000, 1000, 5, &mut logical_index)?;
        assert_eq!(next, 0);
        assert_eq!(logical_index, 6);
        assert_eq!(read_slots(&sector)[0].flags, 0x80);
        Ok(())
    }

    struct MemDisk {
        sectors: alloc::collections::BTreeMap<Lba, [u8; SECTOR_SIZE]>,
    }

    impl MemDisk {
        fn new(sectors: &[(Lba, [u8; SECTOR_SIZE])]) -> Self {
            Self {
                sectors: sectors.iter().copied().collect(),
            }
        }
    }

    impl SectorIo for MemDisk {
        fn read(&mut self, lba: Lba, sector: &mut [u8; SECTOR_SIZE]) -> BootResult<()> {
            *sector = self.sectors.get(&lba).copied().unwrap_or([0u8; SECTOR_SIZE]);
            Ok(())
        }

        fn write(&mut self, lba: Lba, sector: &[u8; SECTOR_SIZE]) -> BootResult<()> {
            self.sectors.insert(lba, *sector);
            Ok(())
        }
    }

    #[test]
    fn test_activate_flags_logical_partition_across_chain() -> BootResult<()> {
        let mut disk = MemDisk::new(&[
            (
                0,
                sector_with_table(&[(0x80, 0x83, 2048, 100_000), (0x00, 0x05, 1000, 500_000)]),
            ),
            (
                1000,
                sector_with_table(&[(0x00, 0x83, 63, 10_000), (0x00, 0x05, 20_000, 10_000)]),
            ),
            (21_000, sector_with_table(&[(0x00, 0x83, 63, 9_000)])),
        ]);
        activate_in(&mut disk, 5)?;
        let mbr = disk.sectors[&0];
        assert_eq!(read_slots(&mbr)[0].flags, 0x00);
        assert_eq!(read_slots(&mbr)[1].flags, 0x80);
        let first_ebr = disk.sectors[&1000];
        assert_eq!(read_slots(&first_ebr)[0].flags, 0x00);
        assert_eq!(read_slots(&first_ebr)[1].flags, 0x80);
        let second_ebr = disk.sectors[&21_000];
        assert_eq!(read_slots(&second_ebr)[0].flags, 0x80);
        Ok(())
    }

    #[test]
    fn test_activate_terminates_on_looping_chain() {
        // each EBR links 1000 past the extended base, so the chain revisits
        // LBA 2000 forever instead of reaching a ninth logical partition.
        let mut disk = MemDisk::new(&[
            (
                0,
                sector_with_table(&[(0x80, 0x83, 2048, 100_000), (0x00, 0x05, 1000, 500_000)]),
            ),
            (
                1000,
                sector_with_table(&[(0x00, 0x83, 63, 100), (0x00, 0x05, 1000, 100)]),
            ),
            (
                2000,
                sector_with_table(&[(0x00, 0x83, 63, 100), (0x00, 0x05, 1000, 100)]),
            ),
        ]);
        assert!(matches!(
            activate_in(&mut disk, 9),
            Err(crate::error::BootError::MbrError(MbrError::ChainLoop(2000)))
        ));
    }
}
