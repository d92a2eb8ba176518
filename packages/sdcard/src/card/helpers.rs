use super::types::Cid;
use crate::block::BLOCK_SIZE;

pub(crate) fn decode_capacity_bytes(csd: &[u8; 16]) -> Option<u64> {
    let csd_structure = csd_get_bits(csd, 127, 126) as u8;
    match csd_structure {
        0 => {
            // CSD v1.0 (SDSC)
            let c_size = csd_get_bits(csd, 73, 62) as u64;
            let c_size_mult = csd_get_bits(csd, 49, 47) as u64;
            let read_bl_len = csd_get_bits(csd, 83, 80) as u64;

            let block_len = 1u64.checked_shl(read_bl_len as u32)?;
            let mult = 1u64.checked_shl((c_size_mult + 2) as u32)?;
            let blocknr = (c_size + 1).checked_mul(mult)?;
            blocknr.checked_mul(block_len)
        }
        1 => {
            // CSD v2.0 (SDHC/SDXC)
            let c_size = csd_get_bits(csd, 69, 48) as u64;
            (c_size + 1).checked_mul(512 * 1024)
        }
        _ => None,
    }
}

pub(crate) fn decode_capacity_blocks(csd: &[u8; 16]) -> Option<u32> {
    let blocks = decode_capacity_bytes(csd)? / BLOCK_SIZE as u64;
    u32::try_from(blocks).ok()
}

/// Erase granularity in blocks minus one, or `None` when single blocks erase.
pub(crate) fn erase_sector_mask(csd: &[u8; 16]) -> Option<u32> {
    if csd_get_bits(csd, 46, 46) != 0 {
        return None;
    }
    Some(csd_get_bits(csd, 45, 39))
}

pub(crate) fn csd_get_bits(csd: &[u8; 16], msb: u8, lsb: u8) -> u32 {
    let mut value = 0u32;
    for bit in (lsb..=msb).rev() {
        let byte_idx = (127 - bit) / 8;
        let bit_in_byte = bit % 8;
        let b = (csd[byte_idx as usize] >> bit_in_byte) & 1;
        value = (value << 1) | (b as u32);
    }
    value
}

pub(crate) fn decode_cid(raw: &[u8; 16]) -> Cid {
    let mut product_name = heapless::String::new();
    for &byte in &raw[3..8] {
        let ch = if byte.is_ascii_graphic() || byte == b' ' {
            byte as char
        } else {
            '?'
        };
        let _ = product_name.push(ch);
    }
    let date = u16::from_be_bytes([raw[13], raw[14]]) & 0x0FFF;
    Cid {
        manufacturer_id: raw[0],
        oem_id: [raw[1], raw[2]],
        product_name,
        product_revision: raw[8],
        serial_number: u32::from_be_bytes([raw[9], raw[10], raw[11], raw[12]]),
        manufacturing_year: 2000 + (date >> 4),
        manufacturing_month: (date & 0x0F) as u8,
    }
}
