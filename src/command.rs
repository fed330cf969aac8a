use log::trace;

use crate::address::LinearOffset;
use crate::buffer::TransferBuffer;
use crate::config::{COMMAND_LENGTH, ERASE_CDW10, ERASE_OFFSET_WORD};
use crate::request::Direction;

pub const COMMAND_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Write = 0x01,
    Read = 0x02,
    Erase = 0x09,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Opcode::Write),
            0x02 => Some(Opcode::Read),
            0x09 => Some(Opcode::Erase),
            _ => None,
        }
    }
}

/// Field layout of the command body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBody {
    ReadWrite {
        slba: u64,
        length: u16,
        control: u16,
        dsmgmt: u32,
        reftag: u32,
        apptag: u16,
        appmask: u16,
    },
    Common { cdw2: [u32; 2], cdw10: [u32; 6] },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub opcode: Opcode,
    pub flags: u8,
    pub nsid: u32,
    pub body: CommandBody,
}

impl DeviceCommand {
    /// Starting offset of an I/O command.
    pub fn slba(&self) -> Option<u64> {
        match self.body {
            CommandBody::ReadWrite { slba, .. } => Some(slba),
            CommandBody::Common { .. } => None,
        }
    }

    /// Encodes the submission entry, little-endian.
    pub fn encode(&self) -> [u8; COMMAND_SIZE] {
        let mut raw = [0u8; COMMAND_SIZE];
        raw[0] = self.opcode as u8;
        raw[1] = self.flags;
        raw[4..8].copy_from_slice(&self.nsid.to_le_bytes());

        match self.body {
            CommandBody::ReadWrite {
                slba,
                length,
                control,
                dsmgmt,
                reftag,
                apptag,
                appmask,
            } => {
                raw[40..48].copy_from_slice(&slba.to_le_bytes());
                raw[48..50].copy_from_slice(&length.to_le_bytes());
                raw[50..52].copy_from_slice(&control.to_le_bytes());
                raw[52..56].copy_from_slice(&dsmgmt.to_le_bytes());
                raw[56..60].copy_from_slice(&reftag.to_le_bytes());
                raw[60..62].copy_from_slice(&apptag.to_le_bytes());
                raw[62..64].copy_from_slice(&appmask.to_le_bytes());
            }
            CommandBody::Common { cdw2, cdw10 } => {
                for (i, w) in cdw2.iter().enumerate() {
                    raw[8 + i * 4..12 + i * 4].copy_from_slice(&w.to_le_bytes());
                }
                for (i, w) in cdw10.iter().enumerate() {
                    raw[40 + i * 4..44 + i * 4].copy_from_slice(&w.to_le_bytes());
                }
            }
        }
        raw
    }

    /// `None` for opcodes this device does not implement.
    pub fn decode(raw: &[u8; COMMAND_SIZE]) -> Option<Self> {
        let u16_at = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let u64_at = |at: usize| u64::from(u32_at(at)) | u64::from(u32_at(at + 4)) << 32;

        let opcode = Opcode::from_u8(raw[0])?;
        let body = match opcode {
            Opcode::Read | Opcode::Write => CommandBody::ReadWrite {
                slba: u64_at(40),
                length: u16_at(48),
                control: u16_at(50),
                dsmgmt: u32_at(52),
                reftag: u32_at(56),
                apptag: u16_at(60),
                appmask: u16_at(62),
            },
            Opcode::Erase => {
                let mut cdw10 = [0u32; 6];
                for (i, w) in cdw10.iter_mut().enumerate() {
                    *w = u32_at(40 + i * 4);
                }
                CommandBody::Common {
                    cdw2: [u32_at(8), u32_at(12)],
                    cdw10,
                }
            }
        };
        Some(DeviceCommand {
            opcode,
            flags: raw[1],
            nsid: u32_at(4),
            body,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder {
    nsid: u32,
}

impl CommandBuilder {
    pub fn new(nsid: u32) -> Self {
        CommandBuilder { nsid }
    }

    /// Builds the command for `direction` targeting `ofs`.
    ///
    /// Erase writes `ofs` into the second payload word of `buffer`.
    pub fn build(
        &self,
        direction: Direction,
        ofs: LinearOffset,
        buffer: &mut TransferBuffer,
    ) -> Box<DeviceCommand> {
        let cmd = match direction {
            Direction::Read => self.read_write(Opcode::Read, ofs),
            Direction::Write => self.read_write(Opcode::Write, ofs),
            Direction::Erase => {
                buffer.write_word(ERASE_OFFSET_WORD, ofs.as_u64());
                DeviceCommand {
                    opcode: Opcode::Erase,
                    flags: 0,
                    nsid: self.nsid,
                    body: CommandBody::Common {
                        cdw2: [0, 0],
                        cdw10: ERASE_CDW10,
                    },
                }
            }
        };
        trace!("{:?} command => {}", cmd.opcode, ofs);
        Box::new(cmd)
    }

    fn read_write(&self, opcode: Opcode, ofs: LinearOffset) -> DeviceCommand {
        DeviceCommand {
            opcode,
            flags: 0,
            nsid: self.nsid,
            body: CommandBody::ReadWrite {
                slba: ofs.as_u64(),
                length: COMMAND_LENGTH,
                control: 0,
                dsmgmt: 0,
                reftag: 0,
                apptag: 0,
                appmask: 0,
            },
        }
    }
}
