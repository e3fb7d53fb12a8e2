use core::ops::Index;
use itertools::Itertools;

/**********
 * Buckets *
 **********/

/// Bucket `i` holds times in `[WIDTH * i, WIDTH * (i + 1) - 1]`.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct SimpleBucketU64<const WIDTH: u64, const N: usize>(usize);

impl<const WIDTH: u64, const N: usize> SimpleBucketU64<WIDTH, N> {
    pub const MAX: SimpleBucketU64<WIDTH, N> = Self(N - 1);
    pub const MIN: SimpleBucketU64<WIDTH, N> = Self(0);

    /// Bucket for `time`, times past the last bucket land in the last bucket.
    pub fn saturating_from(time: u64) -> Self {
        Self::try_from(time).unwrap_or(Self::MAX)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    /// Lowest time in this bucket.
    pub const fn time(self) -> u64 {
        self.0 as u64 * WIDTH
    }
}

impl<const WIDTH: u64, const N: usize> TryFrom<u64> for SimpleBucketU64<WIDTH, N> {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let r = (value / WIDTH) as usize;
        if r >= N {
            Err(())
        } else {
            Ok(SimpleBucketU64::<WIDTH, N>(r))
        }
    }
}

impl<const WIDTH: u64, const N: usize> From<SimpleBucketU64<WIDTH, N>> for u64 {
    fn from(bucket: SimpleBucketU64<WIDTH, N>) -> u64 {
        bucket.time()
    }
}

/**************
 * Histograms *
 **************/

#[derive(Debug, Clone, PartialEq)]
pub struct StaticHistogram<const WIDTH: u64, const N: usize> {
    data: [u32; N],
}

impl<const WIDTH: u64, const N: usize> StaticHistogram<WIDTH, N> {
    pub fn empty() -> Self {
        Self { data: [0; N] }
    }

    pub fn record(&mut self, time: u64) {
        let bucket = SimpleBucketU64::<WIDTH, N>::saturating_from(time);
        self.data[bucket.0] += 1;
    }

    pub fn get(&self, time: u64) -> Option<&u32> {
        match SimpleBucketU64::<WIDTH, N>::try_from(time) {
            Ok(index) => Some(&self.data[index.0]),
            Err(_) => None,
        }
    }

    pub fn total(&self) -> u64 {
        self.data.iter().map(|&c| c as u64).sum()
    }

    /// Most populated bucket, the lowest one on ties. `None` when empty.
    pub fn mode(&self) -> Option<SimpleBucketU64<WIDTH, N>> {
        if self.total() == 0 {
            return None;
        }
        // position_max keeps the last maximum, walk backwards to get the first.
        self.data
            .iter()
            .rev()
            .position_max()
            .map(|rev_index| SimpleBucketU64(N - 1 - rev_index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SimpleBucketU64<WIDTH, N>, u32)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(i, &count)| (SimpleBucketU64(i), count))
    }
}

impl<const WIDTH: u64, const N: usize> Default for StaticHistogram<WIDTH, N> {
    fn default() -> Self {
        StaticHistogram::empty()
    }
}

impl<const WIDTH: u64, const N: usize> Index<&SimpleBucketU64<WIDTH, N>>
    for StaticHistogram<WIDTH, N>
{
    type Output = u32;

    fn index(&self, index: &SimpleBucketU64<WIDTH, N>) -> &Self::Output {
        &self.data[index.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Hist = StaticHistogram<5, 10>;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(SimpleBucketU64::<5, 10>::try_from(4), Ok(SimpleBucketU64(0)));
        assert_eq!(SimpleBucketU64::<5, 10>::try_from(5), Ok(SimpleBucketU64(1)));
        assert_eq!(SimpleBucketU64::<5, 10>::try_from(50), Err(()));
        assert_eq!(
            SimpleBucketU64::<5, 10>::saturating_from(1000),
            SimpleBucketU64::<5, 10>::MAX
        );
        assert_eq!(u64::from(SimpleBucketU64::<5, 10>(3)), 15);
    }

    #[test]
    fn record_saturates() {
        let mut h = Hist::empty();
        h.record(3);
        h.record(7);
        h.record(9);
        h.record(10_000);
        assert_eq!(h.get(0), Some(&1));
        assert_eq!(h.get(5), Some(&2));
        assert_eq!(h[&SimpleBucketU64::MAX], 1);
        assert_eq!(h.get(50), None);
        assert_eq!(h.total(), 4);
    }

    #[test]
    fn mode_prefers_lowest_bucket() {
        let mut h = Hist::empty();
        assert_eq!(h.mode(), None);
        h.record(12);
        h.record(31);
        assert_eq!(h.mode(), Some(SimpleBucketU64(2)));
        h.record(33);
        assert_eq!(h.mode(), Some(SimpleBucketU64(6)));
    }
}
