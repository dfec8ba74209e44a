//! Icon flags and status bar levels.
//!
//! Field layout:
//!
//! ```text
//! [icons changed: 1][icons: 64]
//! [presence changed: 1][presence mask: 5]
//! [record count: 3] then per record [slot: 3 | level: 8]
//! ```
//!
//! A bar that becomes visible always gets a level record. A bar that is
//! hidden only flips its presence bit.

use bitstream::{BitReader, BitWriter};
use facet::{BarKind, StatusDisplay, BAR_SLOTS};

use crate::delta::DeltaField;
use crate::error::{ReplicationError, ReplicationResult};
use crate::existence::{FacetCodec, Tracked};
use crate::item::ItemKind;

/// Width of the record count.
pub const BAR_COUNT_BITS: u8 = 3;

/// Width of one `(slot << 8 | level)` record.
pub const BAR_RECORD_BITS: u8 = 11;

/// Most records one update can carry.
pub const MAX_BAR_RECORDS: usize = (1 << BAR_COUNT_BITS) - 1;

const PRESENCE_BITS: u8 = BAR_SLOTS as u8;

pub type StatusItem = Tracked<StatusCodec>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCodec {
    icons: DeltaField<u64>,
    bars: [Option<u8>; BAR_SLOTS],
    presence_changed: bool,
    level_changed: [bool; BAR_SLOTS],
}

/// Decoded status changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub icons: Option<u64>,
    /// New presence mask, bit `i` set when bar slot `i` is visible.
    pub presence: Option<u8>,
    /// Level records in slot order.
    pub levels: Vec<(BarKind, u8)>,
}

impl StatusCodec {
    pub const fn bars(&self) -> &[Option<u8>; BAR_SLOTS] {
        &self.bars
    }

    fn presence_mask(&self) -> u8 {
        self.bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| bar.is_some())
            .fold(0u8, |mask, (slot, _)| mask | (1 << slot))
    }

    fn records(&self, force: bool) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.bars
            .iter()
            .zip(self.level_changed)
            .enumerate()
            .filter_map(move |(slot, (bar, changed))| {
                bar.filter(|_| changed || force).map(|level| (slot, level))
            })
    }
}

impl FacetCodec for StatusCodec {
    type Facet = StatusDisplay;
    type Update = StatusUpdate;

    const KIND: ItemKind = ItemKind::Status;

    fn diff(&mut self, facet: &StatusDisplay) -> bool {
        let icons = self.icons.check(&facet.icons);
        self.presence_changed = false;
        self.level_changed = [false; BAR_SLOTS];
        for (slot, &bar) in facet.bars.iter().enumerate() {
            let previous = self.bars[slot];
            if previous.is_some() != bar.is_some() {
                self.presence_changed = true;
            }
            if bar.is_some() && bar != previous {
                self.level_changed[slot] = true;
            }
            self.bars[slot] = bar;
        }
        icons || self.presence_changed || self.level_changed.contains(&true)
    }

    fn mark_all_changed(&mut self) {
        self.icons.mark_changed();
        self.presence_changed = true;
        for (changed, bar) in self.level_changed.iter_mut().zip(self.bars) {
            *changed = bar.is_some();
        }
    }

    fn write(&self, writer: &mut BitWriter, force: bool) -> ReplicationResult<()> {
        self.icons.write(writer, force)?;

        let presence = self.presence_changed || force;
        writer.write_bool(presence);
        if presence {
            writer.write_bits(u64::from(self.presence_mask()), PRESENCE_BITS)?;
        }

        let count = self.records(force).count();
        if count > MAX_BAR_RECORDS {
            return Err(ReplicationError::TooManyBarRecords {
                count,
                max: MAX_BAR_RECORDS,
            });
        }
        writer.write_bits(count as u64, BAR_COUNT_BITS)?;
        for (slot, level) in self.records(force) {
            let record = ((slot as u64) << 8) | u64::from(level);
            writer.write_bits(record, BAR_RECORD_BITS)?;
        }
        Ok(())
    }

    fn read(&mut self, reader: &mut BitReader<'_>) -> ReplicationResult<StatusUpdate> {
        let icons = self.icons.read(reader)?;

        let presence = if reader.read_bit()? {
            let mask = reader.read_bits(PRESENCE_BITS)?;
            for (slot, bar) in self.bars.iter_mut().enumerate() {
                if mask & (1 << slot) == 0 {
                    *bar = None;
                }
            }
            // Five bits always fit.
            Some(mask as u8)
        } else {
            None
        };

        let count = reader.read_bits(BAR_COUNT_BITS)?;
        let mut levels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let record = reader.read_bits(BAR_RECORD_BITS)?;
            let slot = record >> 8;
            let kind = BarKind::from_index(slot as usize)
                .ok_or(ReplicationError::InvalidBarSlot { slot })?;
            let level = (record & 0xFF) as u8;
            self.bars[kind.index()] = Some(level);
            levels.push((kind, level));
        }

        Ok(StatusUpdate {
            icons,
            presence,
            levels,
        })
    }

    fn apply(update: &StatusUpdate, facet: &mut StatusDisplay) {
        if let Some(icons) = update.icons {
            facet.icons = icons;
        }
        if let Some(mask) = update.presence {
            for kind in BarKind::ALL {
                if mask & (1 << kind.index()) == 0 {
                    facet.clear_bar(kind);
                }
            }
        }
        for &(kind, level) in &update.levels {
            facet.bars[kind.index()] = Some(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &StatusCodec, force: bool) -> (Vec<u8>, usize) {
        let mut writer = BitWriter::new();
        codec.write(&mut writer, force).unwrap();
        let bits = writer.bits_written();
        (writer.finish(), bits)
    }

    #[test]
    fn unchanged_status_is_five_bits() {
        let mut codec = StatusCodec::default();
        assert!(!codec.diff(&StatusDisplay::default()));
        let (_, bits) = encode(&codec, false);
        // icons [0], presence [0], count [000]
        assert_eq!(bits, 5);
    }

    #[test]
    fn hidden_bar_is_presence_only() {
        let mut status = StatusDisplay::default();
        status.set_bar(BarKind::Health, 80);
        let mut codec = StatusCodec::default();
        codec.diff(&status);

        status.clear_bar(BarKind::Health);
        assert!(codec.diff(&status));
        let (_, bits) = encode(&codec, false);
        assert_eq!(bits, 1 + (1 + 5) + 3);
    }

    #[test]
    fn level_change_without_presence_change() {
        let mut status = StatusDisplay::default();
        status.set_bar(BarKind::Shield, 10);
        let mut codec = StatusCodec::default();
        codec.diff(&status);

        status.set_bar(BarKind::Shield, 11);
        assert!(codec.diff(&status));
        let (bytes, bits) = encode(&codec, false);
        assert_eq!(bits, 1 + 1 + 3 + 11);

        let mut client = StatusCodec::default();
        client.bars[BarKind::Shield.index()] = Some(10);
        let update = client.read(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(update.presence, None);
        assert_eq!(update.levels, vec![(BarKind::Shield, 11)]);
    }

    #[test]
    fn invalid_slot_is_rejected() {
        let mut writer = BitWriter::new();
        writer.write_bool(false);
        writer.write_bool(false);
        writer.write_bits(1, BAR_COUNT_BITS).unwrap();
        writer.write_bits((6 << 8) | 50, BAR_RECORD_BITS).unwrap();
        let bytes = writer.finish();

        let mut client = StatusCodec::default();
        let err = client.read(&mut BitReader::new(&bytes)).unwrap_err();
        assert_eq!(err, ReplicationError::InvalidBarSlot { slot: 6 });
    }

    #[test]
    fn apply_hides_and_sets() {
        let mut facet = StatusDisplay::default();
        facet.set_bar(BarKind::Health, 50);
        facet.set_bar(BarKind::Mana, 20);
        let update = StatusUpdate {
            icons: Some(0b101),
            presence: Some((1 << BarKind::Mana.index()) | (1 << BarKind::Progress.index())),
            levels: vec![(BarKind::Progress, 75)],
        };
        StatusCodec::apply(&update, &mut facet);
        assert_eq!(facet.icons, 0b101);
        assert_eq!(facet.bar(BarKind::Health), None);
        assert_eq!(facet.bar(BarKind::Mana), Some(20));
        assert_eq!(facet.bar(BarKind::Progress), Some(75));
    }
}
