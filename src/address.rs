use std::fmt;

use crate::config::Geometry;

/// Flash location in driver-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhysicalAddress {
    pub channel: u32,
    pub block: u32,
    pub page: u32,
}

impl PhysicalAddress {
    pub fn new(channel: u32, block: u32, page: u32) -> Self {
        PhysicalAddress { channel, block, page }
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.block, self.channel, self.page)
    }
}

/// Offset presented to the device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinearOffset(pub u32);

impl LinearOffset {
    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for LinearOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:x})", self.0, self.0)
    }
}

/// Whether the page field takes part in the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Page,
    Block,
}

impl Geometry {
    /// Packs `addr` into a linear offset.
    ///
    /// Inputs wider than their fields alias into neighbouring fields, and
    /// block bits above the register width are dropped. The geometry must
    /// have passed [`validate`](Geometry::validate).
    pub fn translate(&self, addr: PhysicalAddress, granularity: Granularity) -> LinearOffset {
        let mut ofs = (addr.block as u64) << self.block_shift()
            | (addr.channel as u64) << self.channel_shift();
        if granularity == Granularity::Page {
            ofs |= (addr.page as u64) << self.page_shift();
        }
        LinearOffset(ofs as u32)
    }

    /// Splits an offset back into its fields.
    pub fn decode(&self, ofs: LinearOffset) -> PhysicalAddress {
        let ofs = ofs.0 as u64;
        let mask = |bits: u32| (1u64 << bits) - 1;
        PhysicalAddress {
            channel: ((ofs >> self.channel_shift()) & mask(self.channel_bits)) as u32,
            block: (ofs >> self.block_shift()) as u32,
            page: ((ofs >> self.page_shift()) & mask(self.page_bits)) as u32,
        }
    }
}

/// Translation with the device's own geometry.
pub fn translate(addr: PhysicalAddress, granularity: Granularity) -> LinearOffset {
    Geometry::DUMBSSD.translate(addr, granularity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_page_address() {
        let addr = PhysicalAddress::new(3, 10, 5);
        let ofs = translate(addr, Granularity::Page);
        assert_eq!(ofs.0, (10 << 19) | (3 << 13) | (5 << 6));
    }

    #[test]
    fn erase_drops_page() {
        let addr = PhysicalAddress::new(3, 10, 5);
        assert_eq!(translate(addr, Granularity::Block).0, (10 << 19) | (3 << 13));

        let other = PhysicalAddress { page: 127, ..addr };
        assert_eq!(
            translate(addr, Granularity::Block),
            translate(other, Granularity::Block)
        );
    }

    #[test]
    fn decode_recovers_every_field() {
        let g = Geometry::DUMBSSD;
        for channel in [0, 1, 31, 63] {
            for block in [0, 1, 1000, 8191] {
                for page in [0, 1, 64, 127] {
                    let addr = PhysicalAddress::new(channel, block, page);
                    assert_eq!(g.decode(g.translate(addr, Granularity::Page)), addr);
                }
            }
        }
    }

    #[test]
    fn slice_field_stays_zero() {
        let ofs = translate(PhysicalAddress::new(63, 8191, 127), Granularity::Page);
        assert_eq!(ofs.0 & 0x3f, 0);
    }

    #[test]
    fn out_of_range_page_aliases_into_channel() {
        let wide = translate(PhysicalAddress::new(0, 0, 128), Granularity::Page);
        let next = translate(PhysicalAddress::new(1, 0, 0), Granularity::Page);
        assert_eq!(wide, next);
    }
}
