use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use uuid::Uuid;

use super::error::SchedulingError;
use super::types::BlockedDate;

/// Date overrides per closer. Blocks are additive: any match blocks.
#[derive(Debug, Clone, Default)]
pub struct BlockedDateRegistry {
    blocks: HashMap<(Uuid, NaiveDate), Vec<BlockedDate>>,
}

impl BlockedDateRegistry {
    pub fn new(blocks: &[BlockedDate]) -> Self {
        let mut index: HashMap<(Uuid, NaiveDate), Vec<BlockedDate>> = HashMap::new();
        for block in blocks {
            index
                .entry((block.closer_id, block.date))
                .or_default()
                .push(block.clone());
        }
        Self { blocks: index }
    }

    pub fn is_blocked(&self, closer_id: Uuid, date: NaiveDate, time: NaiveTime) -> bool {
        self.blocks
            .get(&(closer_id, date))
            .is_some_and(|blocks| blocks.iter().any(|b| b.covers(time)))
    }
}

/// Checks an administrative block before it is stored.
pub fn validate_block(block: &BlockedDate) -> Result<(), SchedulingError> {
    match (block.start_time, block.end_time) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) if start < end => Ok(()),
        (Some(start), Some(end)) => Err(SchedulingError::InvalidInput(format!(
            "block end {end} must be after start {start}"
        ))),
        _ => Err(SchedulingError::InvalidInput(
            "block needs both start and end, or neither for a whole day".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn test_whole_day_block() {
        let closer = Uuid::new_v4();
        let registry = BlockedDateRegistry::new(&[BlockedDate::whole_day(closer, day())]);
        assert!(registry.is_blocked(closer, day(), t(0, 0)));
        assert!(registry.is_blocked(closer, day(), t(18, 30)));
        assert!(!registry.is_blocked(closer, day().succ_opt().unwrap(), t(9, 0)));
        assert!(!registry.is_blocked(Uuid::new_v4(), day(), t(9, 0)));
    }

    #[test]
    fn test_overlapping_blocks_use_or_semantics() {
        let closer = Uuid::new_v4();
        let registry = BlockedDateRegistry::new(&[
            BlockedDate::range(closer, day(), t(9, 0), t(11, 0)),
            BlockedDate::range(closer, day(), t(10, 0), t(13, 0)),
        ]);
        assert!(registry.is_blocked(closer, day(), t(9, 0)));
        assert!(registry.is_blocked(closer, day(), t(12, 30)));
        assert!(!registry.is_blocked(closer, day(), t(13, 0)));
    }

    #[test]
    fn test_validate_block() {
        let closer = Uuid::new_v4();
        assert!(validate_block(&BlockedDate::whole_day(closer, day())).is_ok());
        assert!(validate_block(&BlockedDate::range(closer, day(), t(9, 0), t(10, 0))).is_ok());
        assert!(validate_block(&BlockedDate::range(closer, day(), t(10, 0), t(10, 0))).is_err());

        let mut half_open = BlockedDate::whole_day(closer, day());
        half_open.start_time = Some(t(9, 0));
        assert!(matches!(
            validate_block(&half_open),
            Err(SchedulingError::InvalidInput(_))
        ));
    }
}
