//! Byte-level SPI SD card model used by the driver tests.

use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc, vec::Vec};

use embedded_hal::{digital, spi};

use crate::block::{Block, BLOCK_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SimKind {
    V1,
    V2,
    Sdhc,
}

struct Receive {
    block: u32,
    buf: Vec<u8>,
}

pub(crate) struct SimState {
    pub(crate) present: bool,
    pub(crate) kind: SimKind,
    pub(crate) storage: Vec<Block>,
    pub(crate) csd: [u8; 16],
    pub(crate) cid: [u8; 16],
    pub(crate) acmd41_busy_polls: u32,
    pub(crate) reject_writes: bool,
    pub(crate) bus_fault: bool,
    pub(crate) commands: Vec<u8>,
    pub(crate) clocks: Vec<u32>,
    pub(crate) pre_erase: Option<u32>,
    selected: bool,
    app_cmd: bool,
    cmd: Vec<u8>,
    out: VecDeque<u8>,
    busy: u32,
    single_write: Option<u32>,
    multi_write: Option<u32>,
    receiving: Option<Receive>,
    erase_start: u32,
    erase_end: u32,
}

pub(crate) type Shared = Rc<RefCell<SimState>>;

pub(crate) struct SimSpi(pub(crate) Shared);

pub(crate) struct SimCs(pub(crate) Shared);

pub(crate) fn sim_card(kind: SimKind, blocks: usize) -> (SimSpi, SimCs, Shared) {
    let csd = match kind {
        SimKind::Sdhc => csd_v2(blocks as u32),
        SimKind::V1 | SimKind::V2 => csd_v1(blocks as u32),
    };
    let state = Rc::new(RefCell::new(SimState {
        present: true,
        kind,
        storage: std::vec![[0u8; BLOCK_SIZE]; blocks],
        csd,
        cid: sample_cid(),
        acmd41_busy_polls: 3,
        reject_writes: false,
        bus_fault: false,
        commands: Vec::new(),
        clocks: Vec::new(),
        pre_erase: None,
        selected: false,
        app_cmd: false,
        cmd: Vec::new(),
        out: VecDeque::new(),
        busy: 0,
        single_write: None,
        multi_write: None,
        receiving: None,
        erase_start: 0,
        erase_end: 0,
    }));
    (SimSpi(state.clone()), SimCs(state.clone()), state)
}

pub(crate) fn record_clock(spi: &mut SimSpi, khz: u32) {
    spi.0.borrow_mut().clocks.push(khz);
}

pub(crate) fn csd_set_bits(csd: &mut [u8; 16], msb: u8, lsb: u8, value: u32) {
    for (shift, bit) in (lsb..=msb).enumerate() {
        let byte_idx = ((127 - bit) / 8) as usize;
        let mask = 1u8 << (bit % 8);
        if (value >> shift) & 1 != 0 {
            csd[byte_idx] |= mask;
        } else {
            csd[byte_idx] &= !mask;
        }
    }
}

/// SDHC layout: capacity in 512 KiB units, single-block erase.
pub(crate) fn csd_v2(blocks: u32) -> [u8; 16] {
    let mut csd = [0u8; 16];
    csd_set_bits(&mut csd, 127, 126, 1);
    csd_set_bits(&mut csd, 69, 48, (blocks / 1024).saturating_sub(1));
    csd_set_bits(&mut csd, 46, 46, 1);
    csd
}

/// SDSC layout with 512-byte blocks, multiplier 512 and 8-block erase sectors.
pub(crate) fn csd_v1(blocks: u32) -> [u8; 16] {
    let mut csd = [0u8; 16];
    csd_set_bits(&mut csd, 83, 80, 9);
    csd_set_bits(&mut csd, 49, 47, 7);
    csd_set_bits(&mut csd, 73, 62, (blocks / 512).saturating_sub(1));
    csd_set_bits(&mut csd, 45, 39, 7);
    csd
}

fn sample_cid() -> [u8; 16] {
    let mut cid = [0u8; 16];
    cid[0] = 0x03;
    cid[1..3].copy_from_slice(b"SD");
    cid[3..8].copy_from_slice(b"SU02G");
    cid[8] = 0x80;
    cid[9..13].copy_from_slice(&0x1234_5678u32.to_be_bytes());
    // 2019-06: year offset 19, month 6.
    cid[13] = 0x01;
    cid[14] = 0x36;
    cid
}

impl SimState {
    fn block_of(&self, arg: u32) -> u32 {
        match self.kind {
            SimKind::Sdhc => arg,
            SimKind::V1 | SimKind::V2 => arg >> 9,
        }
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        if !self.present || !self.selected {
            return 0xFF;
        }

        if let Some(mut rx) = self.receiving.take() {
            rx.buf.push(mosi);
            if rx.buf.len() < BLOCK_SIZE + 2 {
                self.receiving = Some(rx);
                return 0xFF;
            }
            if self.reject_writes {
                // Write error data response.
                self.out.push_back(0xED);
                return 0xFF;
            }
            if let Some(slot) = self.storage.get_mut(rx.block as usize) {
                slot.copy_from_slice(&rx.buf[..BLOCK_SIZE]);
            }
            self.out.push_back(0xE5);
            self.busy = 4;
            return 0xFF;
        }

        if let Some(byte) = self.out.pop_front() {
            return byte;
        }
        if self.busy > 0 {
            self.busy -= 1;
            return 0x00;
        }

        if self.cmd.is_empty() {
            if let Some(block) = self.single_write {
                if mosi == 0xFE {
                    self.single_write = None;
                    self.receiving = Some(Receive {
                        block,
                        buf: Vec::new(),
                    });
                    return 0xFF;
                }
            }
            if let Some(next) = self.multi_write {
                match mosi {
                    0xFC => {
                        self.multi_write = Some(next + 1);
                        self.receiving = Some(Receive {
                            block: next,
                            buf: Vec::new(),
                        });
                        return 0xFF;
                    }
                    0xFD => {
                        self.multi_write = None;
                        self.busy = 3;
                        return 0xFF;
                    }
                    _ => {}
                }
            }
            if (mosi & 0xC0) == 0x40 {
                self.cmd.push(mosi);
            }
            return 0xFF;
        }

        self.cmd.push(mosi);
        if self.cmd.len() == 6 {
            let cmd = self.cmd[0] & 0x3F;
            let arg = u32::from_be_bytes([self.cmd[1], self.cmd[2], self.cmd[3], self.cmd[4]]);
            self.cmd.clear();
            self.command(cmd, arg);
        }
        0xFF
    }

    fn command(&mut self, cmd: u8, arg: u32) {
        self.commands.push(cmd);
        let app = core::mem::replace(&mut self.app_cmd, false);
        // NCR: one idle byte before R1.
        self.out.push_back(0xFF);
        match (cmd, app) {
            (0, _) => {
                self.single_write = None;
                self.multi_write = None;
                self.out.push_back(0x01);
            }
            (8, _) => {
                if self.kind == SimKind::V1 {
                    self.out.push_back(0x05);
                } else {
                    self.out.extend([0x01, 0x00, 0x00, 0x01, (arg & 0xFF) as u8]);
                }
            }
            (55, _) => {
                self.app_cmd = true;
                self.out.push_back(0x01);
            }
            (41, true) => {
                if self.acmd41_busy_polls > 0 {
                    self.acmd41_busy_polls -= 1;
                    self.out.push_back(0x01);
                } else {
                    self.out.push_back(0x00);
                }
            }
            (23, true) => {
                self.pre_erase = Some(arg);
                self.out.push_back(0x00);
            }
            (58, _) => {
                let ocr0 = if self.kind == SimKind::Sdhc { 0xC0 } else { 0x80 };
                self.out.extend([0x00, ocr0, 0xFF, 0x80, 0x00]);
            }
            (9, _) | (10, _) => {
                let reg = if cmd == 9 { self.csd } else { self.cid };
                self.out.extend([0x00, 0xFF, 0xFE]);
                self.out.extend(reg);
                self.out.extend([0xAB, 0xCD]);
            }
            (17, _) => {
                let block = self.block_of(arg);
                match self.storage.get(block as usize) {
                    Some(data) => {
                        let data = *data;
                        self.out.extend([0x00, 0xFF, 0xFF, 0xFE]);
                        self.out.extend(data);
                        self.out.extend([0x12, 0x34]);
                    }
                    None => self.out.push_back(0x40),
                }
            }
            (24, _) => {
                self.single_write = Some(self.block_of(arg));
                self.out.push_back(0x00);
            }
            (25, _) => {
                self.multi_write = Some(self.block_of(arg));
                self.out.push_back(0x00);
            }
            (13, _) => self.out.extend([0x00, 0x00]),
            (32, _) => {
                self.erase_start = self.block_of(arg);
                self.out.push_back(0x00);
            }
            (33, _) => {
                self.erase_end = self.block_of(arg);
                self.out.push_back(0x00);
            }
            (38, _) => {
                for block in self.erase_start..=self.erase_end {
                    if let Some(slot) = self.storage.get_mut(block as usize) {
                        slot.fill(0);
                    }
                }
                self.out.push_back(0x00);
                self.busy = 8;
            }
            _ => self.out.push_back(0x04),
        }
    }
}

impl spi::ErrorType for SimSpi {
    type Error = spi::ErrorKind;
}

impl spi::SpiBus for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = 0xFF;
        }
        self.transfer_in_place(words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            let mut frame = [word];
            self.transfer_in_place(&mut frame)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        for idx in 0..len {
            let mut frame = [write.get(idx).copied().unwrap_or(0xFF)];
            self.transfer_in_place(&mut frame)?;
            if let Some(slot) = read.get_mut(idx) {
                *slot = frame[0];
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.bus_fault {
            return Err(spi::ErrorKind::Other);
        }
        for word in words.iter_mut() {
            *word = state.exchange(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl digital::ErrorType for SimCs {
    type Error = Infallible;
}

impl digital::OutputPin for SimCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().selected = true;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.selected = false;
        state.cmd.clear();
        state.out.clear();
        Ok(())
    }
}
