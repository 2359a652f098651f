//! Part layout of a chunked blob.
//!
//! A blob of `total` bytes with part size `P` is stored as parts at offsets
//! `0, P, 2P, ...` below `total`; the part at offset `o` is
//! `min(P, total - o)` bytes long.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub index: u64,
    pub offset: u64,
    pub len: usize,
}

impl Part {
    /// Byte range of this part within the blob.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.len
    }
}

/// `ceil(total / part_size)`; zero for an empty blob.
pub fn part_count(total: u64, part_size: u32) -> u64 {
    if part_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(part_size))
}

/// Every part of a `total`-byte blob, in offset order.
pub fn plan(total: u64, part_size: u32) -> impl Iterator<Item = Part> {
    let step = u64::from(part_size);
    (0..part_count(total, part_size)).map(move |index| {
        let offset = index * step;
        Part {
            index,
            offset,
            len: step.min(total - offset) as usize,
        }
    })
}

/// The final part, computed without walking the plan.
pub fn last_part(total: u64, part_size: u32) -> Option<Part> {
    let index = part_count(total, part_size).checked_sub(1)?;
    let offset = index * u64::from(part_size);
    Some(Part {
        index,
        offset,
        len: (total - offset) as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_count() {
        assert_eq!(part_count(0, 1024), 0);
        assert_eq!(part_count(1, 1024), 1);
        assert_eq!(part_count(1024, 1024), 1);
        assert_eq!(part_count(1025, 1024), 2);
        assert_eq!(part_count(2500, 1024), 3);
    }

    #[test]
    fn test_plan_lengths() {
        let parts: Vec<Part> = plan(2500, 1024).collect();
        let lens: Vec<usize> = parts.iter().map(|p| p.len).collect();
        let offsets: Vec<u64> = parts.iter().map(|p| p.offset).collect();

        assert_eq!(lens, vec![1024, 1024, 452]);
        assert_eq!(offsets, vec![0, 1024, 2048]);
        assert_eq!(parts[2].range(), 2048..2500);
    }

    #[test]
    fn test_plan_covers_blob_without_gaps() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let rebuilt: Vec<u8> = plan(data.len() as u64, 333)
            .flat_map(|p| data[p.range()].to_vec())
            .collect();
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_last_part_matches_plan() {
        for (total, size) in [(2500, 1024), (2048, 1024), (1, 7), (5000, 333)] {
            assert_eq!(last_part(total, size), plan(total, size).last());
        }
        assert_eq!(last_part(0, 1024), None);
        assert_eq!(last_part(10, 0), None);
    }

    #[test]
    fn test_last_part_of_huge_blob() {
        let last = last_part(1 << 60, 1024).unwrap();
        assert_eq!(last.offset, (1 << 60) - 1024);
        assert_eq!(last.len, 1024);
    }

    #[test]
    fn test_empty_plan() {
        assert_eq!(plan(0, 1024).count(), 0);
    }

    #[test]
    fn test_zero_part_size_plans_nothing() {
        assert_eq!(plan(10, 0).count(), 0);
    }
}
