use sdcard::{BlockDevice, BLOCK_SIZE};

use super::{FatType, Geometry, Volume};
use crate::{
    cache::BlockCache,
    error::FatError,
    layout::{has_boot_signature, BiosParams, PartitionEntry, DIR_ENTRY_SIZE},
};

const FAT12_MAX_CLUSTERS: u32 = 4085;
const FAT16_MAX_CLUSTERS: u32 = 65525;
/// Highest count a 28-bit FAT32 entry can address below the reserved values.
const MAX_CLUSTERS: u32 = 0x0FFF_FFF5;

impl<D: BlockDevice> Volume<D> {
    /// Mounts the first primary partition, falling back to a volume that
    /// starts at block 0.
    pub fn init(mut device: D) -> Result<Self, FatError> {
        let geometry = match read_geometry(&mut device, 1) {
            Ok(geometry) => geometry,
            Err(err) => {
                log::debug!("spisd: mount_partition_failed part=1 err={err}");
                read_geometry(&mut device, 0)?
            }
        };
        Ok(Self::with_geometry(device, geometry))
    }

    /// Mounts primary partition `part` (1..=4), or block 0 when `part` is 0.
    pub fn init_partition(mut device: D, part: u8) -> Result<Self, FatError> {
        let geometry = read_geometry(&mut device, part)?;
        Ok(Self::with_geometry(device, geometry))
    }

    fn with_geometry(device: D, geometry: Geometry) -> Self {
        let mut cache = BlockCache::new();
        cache.set_mirror(
            geometry.fat_start_block,
            geometry.blocks_per_fat,
            geometry.fat_count,
        );
        log::info!(
            "spisd: mount fat={:?} clusters={} blocks_per_cluster={} fat_start={} data_start={}",
            geometry.fat_type,
            geometry.cluster_count,
            geometry.blocks_per_cluster,
            geometry.fat_start_block,
            geometry.data_start_block
        );
        Self {
            device,
            cache,
            geometry,
            alloc_search_start: 2,
            date_time: None,
        }
    }
}

fn read_geometry<D: BlockDevice>(device: &mut D, part: u8) -> Result<Geometry, FatError> {
    if part > 4 {
        return Err(FatError::InvalidOperation);
    }
    let mut block = [0u8; BLOCK_SIZE];

    let mut volume_start = 0;
    if part != 0 {
        device.read_block(0, &mut block)?;
        let entry = PartitionEntry::parse(&block, part as usize - 1);
        if !entry.is_usable() {
            return Err(FatError::BadGeometry);
        }
        volume_start = entry.first_sector;
    }

    device.read_block(volume_start, &mut block)?;
    if !has_boot_signature(&block) {
        return Err(FatError::BadGeometry);
    }
    geometry_from_bpb(&BiosParams::parse(&block), volume_start)
}

pub(super) fn geometry_from_bpb(bpb: &BiosParams, volume_start: u32) -> Result<Geometry, FatError> {
    if bpb.bytes_per_sector as usize != BLOCK_SIZE || bpb.fat_count == 0 || bpb.reserved_sectors == 0 {
        return Err(FatError::BadGeometry);
    }
    let blocks_per_cluster = bpb.sectors_per_cluster;
    if blocks_per_cluster == 0 || !blocks_per_cluster.is_power_of_two() || blocks_per_cluster > 128 {
        return Err(FatError::BadGeometry);
    }
    let cluster_size_shift = blocks_per_cluster.trailing_zeros() as u8;

    let blocks_per_fat = bpb.sectors_per_fat();
    if blocks_per_fat == 0 {
        return Err(FatError::BadGeometry);
    }

    let fat_start_block = volume_start.saturating_add(bpb.reserved_sectors as u32);
    let fixed_root_start =
        fat_start_block.saturating_add((bpb.fat_count as u32).saturating_mul(blocks_per_fat));
    let root_blocks = (DIR_ENTRY_SIZE as u32 * bpb.root_dir_entry_count as u32 + BLOCK_SIZE as u32 - 1)
        / BLOCK_SIZE as u32;
    let data_start_block = fixed_root_start.saturating_add(root_blocks);

    let cluster_count = bpb
        .total_sectors()
        .checked_sub(data_start_block - volume_start)
        .ok_or(FatError::BadGeometry)?
        >> cluster_size_shift;
    if cluster_count > MAX_CLUSTERS {
        return Err(FatError::BadGeometry);
    }

    let (fat_type, root_dir_start) = if cluster_count < FAT12_MAX_CLUSTERS {
        (FatType::Fat12, fixed_root_start)
    } else if cluster_count < FAT16_MAX_CLUSTERS {
        (FatType::Fat16, fixed_root_start)
    } else {
        (FatType::Fat32, bpb.root_cluster)
    };

    Ok(Geometry {
        fat_type,
        blocks_per_cluster,
        cluster_size_shift,
        blocks_per_fat,
        fat_count: bpb.fat_count,
        fat_start_block,
        data_start_block,
        root_dir_start,
        root_dir_entry_count: bpb.root_dir_entry_count,
        cluster_count,
    })
}
