/// Receives completion percentages (0..=100).
///
/// Always invoked from the thread that drives the operation, never from
/// worker threads, so implementations need not be `Sync`.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Sink for callers that do not care about progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// `floor(done / total * 100)`, clamped; an empty total counts as done.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done.min(total) as u128 * 100) / total as u128;
    pct as u8
}

/// Keeps reported values monotonically non-decreasing.
pub(crate) struct Monotonic<'a> {
    sink: &'a mut dyn ProgressSink,
    last: u8,
}

impl<'a> Monotonic<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0 }
    }

    pub(crate) fn update(&mut self, done: u64, total: u64) {
        self.last = self.last.max(percent(done, total));
        self.sink.report(self.last);
    }
}

/// Maps 0..=100 of one stage onto `base..=base + span` of a longer operation.
pub(crate) struct Scaled<'a> {
    pub(crate) sink: &'a mut dyn ProgressSink,
    pub(crate) base: u8,
    pub(crate) span: u8,
}

impl ProgressSink for Scaled<'_> {
    fn report(&mut self, percent: u8) {
        let scaled = self.base as u16 + percent.min(100) as u16 * self.span as u16 / 100;
        self.sink.report(scaled.min(100) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |p: u8| seen.push(p);
            let mut m = Monotonic::new(&mut sink);
            m.update(5, 10);
            m.update(4, 10);
            m.update(10, 10);
        }
        assert_eq!(seen, vec![50, 50, 100]);
    }

    #[test]
    fn scaled_stages_cover_the_whole_range() {
        let mut seen = Vec::new();
        {
            let mut sink = |p: u8| seen.push(p);
            let mut first = Scaled { sink: &mut sink, base: 0, span: 50 };
            first.report(0);
            first.report(100);
            let mut second = Scaled { sink: &mut sink, base: 50, span: 50 };
            second.report(33);
            second.report(100);
        }
        assert_eq!(seen, vec![0, 50, 66, 100]);
    }
}
