use super::sim::{record_clock, sim_card, SimCs, SimKind, SimSpi};
use super::*;
use crate::block::{BlockDevice, BlockError, BLOCK_SIZE};

fn ready_card(kind: SimKind, blocks: usize) -> (SdCard<SimSpi, SimCs>, super::sim::Shared) {
    let (spi, cs, state) = sim_card(kind, blocks);
    let mut card = SdCard::new(spi, cs).with_clock_hook(record_clock);
    card.init(SpiSpeed::Full).unwrap();
    (card, state)
}

#[test]
fn init_detects_sdhc_and_reports_size() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 2048);
    assert_eq!(card.card_type(), Some(CardType::Sdhc));
    assert_eq!(card.card_size().unwrap(), 2048);
    assert_eq!(card.error_code(), SdErrorCode::None);

    let commands = &state.borrow().commands;
    assert_eq!(commands[0], 0);
    assert_eq!(commands[1], 8);
    assert!(commands.contains(&58));
}

#[test]
fn init_detects_version_one_card() {
    let (card, state) = ready_card(SimKind::V1, 1024);
    assert_eq!(card.card_type(), Some(CardType::Sd1));
    assert!(!state.borrow().commands.contains(&58));
}

#[test]
fn init_detects_standard_capacity_version_two_card() {
    let (card, _state) = ready_card(SimKind::V2, 1024);
    assert_eq!(card.card_type(), Some(CardType::Sd2));
}

#[test]
fn init_applies_slow_clock_then_requested_rate() {
    let (spi, cs, state) = sim_card(SimKind::Sdhc, 1024);
    let mut card = SdCard::new(spi, cs).with_clock_hook(record_clock);
    card.init(SpiSpeed::Quarter).unwrap();
    assert_eq!(card.sck_rate(), 2);
    assert_eq!(state.borrow().clocks, std::vec![400, 6_000]);
}

#[test]
fn absent_card_fails_cmd0_with_timeout() {
    let (spi, cs, state) = sim_card(SimKind::Sdhc, 1024);
    state.borrow_mut().present = false;
    let mut card = SdCard::new(spi, cs);
    let err = card.init(SpiSpeed::Full).unwrap_err();
    assert_eq!(err.code, SdErrorCode::Cmd0);
    assert_eq!(err.data, 0xFF);
    assert_eq!(card.error_code(), SdErrorCode::Cmd0);
    assert_eq!(BlockError::from(err), BlockError::Timeout);
    assert!(!card.is_initialized());
}

#[test]
fn sck_rate_above_limit_is_rejected() {
    let (mut card, _state) = ready_card(SimKind::Sdhc, 1024);
    let err = card.set_sck_rate(7).unwrap_err();
    assert_eq!(err.code, SdErrorCode::SckRate);
    assert_eq!(card.sck_rate(), 0);
    card.set_sck_rate(6).unwrap();
    assert_eq!(card.sck_rate(), 6);
}

#[test]
fn block_read_write_round_trip_on_sdhc() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    let mut block = [0u8; BLOCK_SIZE];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    card.write_block(17, &block).unwrap();
    assert_eq!(state.borrow().storage[17], block);

    let mut back = [0u8; BLOCK_SIZE];
    card.read_block(17, &mut back).unwrap();
    assert_eq!(back, block);

    let mut window = [0u8; 3];
    card.read_data(17, 250, &mut window).unwrap();
    assert_eq!(window, [250, 0, 1]);
}

#[test]
fn standard_capacity_card_uses_byte_addresses() {
    let (mut card, state) = ready_card(SimKind::V1, 1024);
    card.write_block(3, &[0x5Au8; BLOCK_SIZE]).unwrap();
    assert_eq!(state.borrow().storage[3][0], 0x5A);
    assert_eq!(state.borrow().storage[0][0], 0);
}

#[test]
fn block_zero_is_write_protected_by_default() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    let err = card.write_block(0, &[1u8; BLOCK_SIZE]).unwrap_err();
    assert_eq!(err.code, SdErrorCode::WriteBlockZero);
    assert_eq!(card.error_code(), SdErrorCode::WriteBlockZero);
    assert_eq!(state.borrow().storage[0][0], 0);

    card.allow_block_zero_writes(true);
    card.write_block(0, &[1u8; BLOCK_SIZE]).unwrap();
    assert_eq!(state.borrow().storage[0][0], 1);
}

#[test]
fn rejected_data_response_reports_write_error() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    state.borrow_mut().reject_writes = true;
    let err = card.write_block(5, &[7u8; BLOCK_SIZE]).unwrap_err();
    assert_eq!(err.code, SdErrorCode::Write);
    assert_eq!(err.data & 0x1F, 0x0D);
    assert_eq!(BlockError::from(err), BlockError::Protocol);
}

#[test]
fn read_past_end_fails_cmd17() {
    let (mut card, _state) = ready_card(SimKind::Sdhc, 1024);
    let mut block = [0u8; BLOCK_SIZE];
    let err = card.read_block(5000, &mut block).unwrap_err();
    assert_eq!(err.code, SdErrorCode::Cmd17);
    assert_eq!(err.data, 0x40);
}

#[test]
fn uninitialized_card_refuses_io() {
    let (spi, cs, _state) = sim_card(SimKind::Sdhc, 1024);
    let mut card = SdCard::new(spi, cs);
    let mut block = [0u8; BLOCK_SIZE];
    let err = card.read_block(1, &mut block).unwrap_err();
    assert_eq!(err.code, SdErrorCode::NotInitialized);
}

#[test]
fn bus_fault_maps_to_io_error() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    state.borrow_mut().bus_fault = true;
    let mut block = [0u8; BLOCK_SIZE];
    let err = BlockDevice::read_block(&mut card, 1, &mut block).unwrap_err();
    assert_eq!(err, BlockError::Io);
    assert_eq!(card.error_code(), SdErrorCode::Bus);
}

#[test]
fn multi_block_write_streams_consecutive_blocks() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    let mut session = card.write_multiple_start(40, 3).unwrap();
    for fill in 1..=3u8 {
        card.write_multiple_data(&mut session, &[fill; BLOCK_SIZE]).unwrap();
    }
    card.write_multiple_stop(session).unwrap();

    let state = state.borrow();
    assert_eq!(state.pre_erase, Some(3));
    assert_eq!(state.storage[40][0], 1);
    assert_eq!(state.storage[41][100], 2);
    assert_eq!(state.storage[42][511], 3);
    assert_eq!(state.storage[43][0], 0);
}

#[test]
fn erase_zeroes_range_on_single_block_erase_card() {
    let (mut card, state) = ready_card(SimKind::Sdhc, 1024);
    for block in 10..14 {
        state.borrow_mut().storage[block].fill(0xEE);
    }
    card.erase(11, 12).unwrap();
    let state = state.borrow();
    assert_eq!(state.storage[10][0], 0xEE);
    assert_eq!(state.storage[11][0], 0);
    assert_eq!(state.storage[12][0], 0);
    assert_eq!(state.storage[13][0], 0xEE);
}

#[test]
fn erase_requires_sector_alignment_when_block_erase_disabled() {
    let (mut card, _state) = ready_card(SimKind::V1, 1024);
    let err = card.erase(3, 9).unwrap_err();
    assert_eq!(err.code, SdErrorCode::EraseBlkEn);
    card.erase(8, 15).unwrap();
}

#[test]
fn cid_fields_are_decoded() {
    let (mut card, _state) = ready_card(SimKind::Sdhc, 1024);
    let cid = card.read_cid().unwrap();
    assert_eq!(cid.manufacturer_id, 0x03);
    assert_eq!(&cid.oem_id, b"SD");
    assert_eq!(cid.product_name.as_str(), "SU02G");
    assert_eq!(cid.serial_number, 0x1234_5678);
    assert_eq!(cid.manufacturing_year, 2019);
    assert_eq!(cid.manufacturing_month, 6);
}

#[test]
fn standard_capacity_csd_decodes_block_count() {
    let (mut card, _state) = ready_card(SimKind::V1, 2048);
    assert_eq!(card.card_size().unwrap(), 2048);
}
