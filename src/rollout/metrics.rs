#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkerMetrics {
    pub steps: u64,
    pub episodes: u64,
    pub abandoned: u64,
    pub build_failures: u64,

    pub rows_published: u64,
    pub rows_rejected: u64,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn bump_episode(&mut self) {
        self.episodes += 1;
    }

    #[inline]
    pub fn bump_abandoned(&mut self) {
        self.abandoned += 1;
    }

    #[inline]
    pub fn bump_build_failure(&mut self) {
        self.build_failures += 1;
    }

    #[inline]
    pub fn add_published(&mut self, n: usize) {
        self.rows_published += n as u64;
    }

    #[inline]
    pub fn add_rejected(&mut self, n: usize) {
        self.rows_rejected += n as u64;
    }
}
