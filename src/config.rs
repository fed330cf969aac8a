use crate::error::{Error, Result};

pub type BaseType = usize;

// slice field is always zero at this layer
pub const SLICE_BITS: u32 = 6;
pub const PAGE_BITS: u32 = 7;
pub const CHANNEL_BITS: u32 = 6;

pub const ADDRESS_BITS: u32 = 32;

pub const UNIT_SIZE: BaseType = 4096;
pub const TRANSFER_UNITS: BaseType = 64;
pub const TRANSFER_SIZE: BaseType = UNIT_SIZE * TRANSFER_UNITS;

/// Length field of read/write commands: one less than the transfer units.
pub const COMMAND_LENGTH: u16 = (TRANSFER_UNITS - 1) as u16;

pub const NAMESPACE_ID: u32 = 1;

pub const ERASE_CDW10: [u32; 6] = [0, 4, 0, 0, 0, 0];

/// Index of the 8-byte payload word carrying the erase target.
pub const ERASE_OFFSET_WORD: BaseType = 1;

// Emulated drive shape used by the exerciser
pub const CHANNELS: BaseType = 4;
pub const BLOCKS: BaseType = 32;
pub const PAGES_PER_BLOCK: BaseType = 128;

pub const ALL_BLOCKS: BaseType = CHANNELS * BLOCKS;
pub const ALL_PAGES: BaseType = ALL_BLOCKS * PAGES_PER_BLOCK;

pub const CAPACITY: usize = ALL_PAGES * UNIT_SIZE;

/// Bit widths used to pack a physical address into a linear offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub slice_bits: u32,
    pub page_bits: u32,
    pub channel_bits: u32,
}

impl Geometry {
    pub const DUMBSSD: Geometry = Geometry {
        slice_bits: SLICE_BITS,
        page_bits: PAGE_BITS,
        channel_bits: CHANNEL_BITS,
    };

    pub fn page_shift(&self) -> u32 {
        self.slice_bits
    }

    pub fn channel_shift(&self) -> u32 {
        self.page_bits + self.slice_bits
    }

    pub fn block_shift(&self) -> u32 {
        self.channel_bits + self.page_bits + self.slice_bits
    }

    /// Combined width of the fields below the block, `None` on overflow.
    fn field_bits(&self) -> Option<u32> {
        self.slice_bits
            .checked_add(self.page_bits)?
            .checked_add(self.channel_bits)
    }

    /// Rejects widths that leave no room for the block field.
    pub fn validate(&self) -> Result<()> {
        let fits = matches!(self.field_bits(), Some(bits) if bits < ADDRESS_BITS);
        if !fits || self.page_bits == 0 || self.channel_bits == 0 {
            return Err(Error::InvalidGeometry {
                slice_bits: self.slice_bits,
                page_bits: self.page_bits,
                channel_bits: self.channel_bits,
            });
        }
        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::DUMBSSD
    }
}

/// How commands are handed to the underlying queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    #[default]
    NonBlocking,
    /// Waits for the queue, then runs completion inline.
    Blocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub geometry: Geometry,
    pub mode: SubmitMode,
    pub namespace_id: u32,
}

impl DriverConfig {
    pub fn with_mode(mut self, mode: SubmitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            geometry: Geometry::DUMBSSD,
            mode: SubmitMode::NonBlocking,
            namespace_id: NAMESPACE_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_valid() {
        let g = Geometry::default();
        assert!(g.validate().is_ok());
        assert_eq!(g.channel_shift(), 13);
        assert_eq!(g.block_shift(), 19);
    }

    #[test]
    fn geometry_filling_the_register_is_rejected() {
        let g = Geometry {
            slice_bits: 12,
            page_bits: 12,
            channel_bits: 8,
        };
        assert!(matches!(g.validate(), Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn overflowing_widths_are_rejected() {
        for g in [
            Geometry {
                slice_bits: u32::MAX,
                page_bits: 1,
                channel_bits: 1,
            },
            Geometry {
                page_bits: u32::MAX,
                ..Geometry::DUMBSSD
            },
            Geometry {
                channel_bits: u32::MAX - 6,
                ..Geometry::DUMBSSD
            },
        ] {
            assert_eq!(
                g.validate(),
                Err(Error::InvalidGeometry {
                    slice_bits: g.slice_bits,
                    page_bits: g.page_bits,
                    channel_bits: g.channel_bits,
                })
            );
        }
    }

    #[test]
    fn command_length_is_one_below_units() {
        assert_eq!(COMMAND_LENGTH, 63);
        assert_eq!(TRANSFER_SIZE, 262144);
    }
}
