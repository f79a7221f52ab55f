//! Output buffer partition layout
//!
//! A multi-partition profile holds `xcc_count` equally sized runs of samples,
//! except that the device-wide memory controller (UMC) samples are written once
//! and attributed to partition 0. Partition 0 is therefore
//! `extra_samples + per_partition` entries long and every later partition
//! `per_partition` entries long.

use rocscope_shared::{BlockKind, SAMPLE_BYTE_WIDTH, UMC_SAMPLE_BYTE_WIDTH};

use crate::hardware::ProfileBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    pub xcc_count: u32,

    /// UMC samples carried only by partition 0
    pub extra_samples: usize,

    /// Samples per partition, not counting the extra ones
    pub per_partition: usize,
}

impl SampleLayout {
    pub fn new(buffer_size: usize, extra_samples: usize, xcc_count: u32) -> Self {
        let xcc_count = xcc_count.max(1);
        let per_partition = buffer_size.saturating_sub(extra_samples * UMC_SAMPLE_BYTE_WIDTH)
            / (SAMPLE_BYTE_WIDTH * xcc_count as usize);
        Self {
            xcc_count,
            extra_samples,
            per_partition,
        }
    }

    /// Layout of `buffer` on a device with `xcc_count` partitions. UMC samples
    /// are only split out when there is more than one partition.
    pub fn for_buffer(buffer: &ProfileBuffer, xcc_count: u32) -> Self {
        let extra = if xcc_count > 1 {
            buffer
                .events
                .iter()
                .filter(|e| e.block == BlockKind::Umc)
                .count()
        } else {
            0
        };
        Self::new(buffer.size(), extra, xcc_count)
    }

    /// Partition that the sample at buffer position `index` belongs to.
    ///
    /// UMC samples always land in partition 0, whichever die they were read
    /// from.
    pub fn partition_of(&self, index: usize) -> u32 {
        let first = self.extra_samples + self.per_partition;
        if index < first || self.per_partition == 0 {
            return 0;
        }
        1 + ((index - first) / self.per_partition) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocscope_shared::{Agent, AgentKind, Event};

    fn agent() -> Agent {
        Agent {
            handle: 1,
            kind: AgentKind::Gpu,
            index: 0,
        }
    }

    #[test]
    fn test_single_partition_is_all_zero() {
        let layout = SampleLayout::new(10 * SAMPLE_BYTE_WIDTH, 0, 1);
        assert_eq!(layout.per_partition, 10);
        assert!((0..10).all(|i| layout.partition_of(i) == 0));
    }

    #[test]
    fn test_four_partitions_with_umc() {
        // 3 regular events per partition, 2 UMC samples in partition 0
        let k = 2;
        let per = 3;
        let size = (k + 4 * per) * SAMPLE_BYTE_WIDTH;
        let layout = SampleLayout::new(size, k, 4);
        assert_eq!(layout.per_partition, per);

        let parts: Vec<u32> = (0..k + 4 * per).map(|i| layout.partition_of(i)).collect();
        assert_eq!(
            parts,
            vec![0, 0, 0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]
        );
    }

    #[test]
    fn test_umc_ignored_on_single_partition() {
        let events = vec![
            Event::new(BlockKind::Umc, 0, 1),
            Event::new(BlockKind::Sq, 0, 1),
        ];
        let buf = ProfileBuffer::new(agent(), events.clone(), vec![0; 2 * SAMPLE_BYTE_WIDTH]);
        let layout = SampleLayout::for_buffer(&buf, 1);
        assert_eq!(layout.extra_samples, 0);
        assert_eq!(layout.per_partition, 2);

        let buf = ProfileBuffer::new(agent(), events, vec![0; 3 * SAMPLE_BYTE_WIDTH]);
        let layout = SampleLayout::for_buffer(&buf, 2);
        assert_eq!(layout.extra_samples, 1);
        assert_eq!(layout.per_partition, 1);
    }

    #[test]
    fn test_empty_partitions_do_not_divide_by_zero() {
        let layout = SampleLayout::new(SAMPLE_BYTE_WIDTH, 1, 4);
        assert_eq!(layout.per_partition, 0);
        assert_eq!(layout.partition_of(5), 0);
    }
}
