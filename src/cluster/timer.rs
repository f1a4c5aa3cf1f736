use crate::commands::Command;
use crate::network::Transport;
use std::collections::VecDeque;

/// Wall-clock instant as handed in by the event loop via
/// [`proc`](crate::cluster::Cluster::proc). The core keeps no clock of its
/// own; seconds and microseconds are normalized on every arithmetic step so
/// the derived ordering is plain lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimePoint {
    sec: i64,
    usec: i64,
}

impl TimePoint {
    pub fn new(sec: i64, usec: i64) -> Self {
        let mut point = TimePoint { sec, usec };
        point.normalize();
        point
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn usec(&self) -> i64 {
        self.usec
    }

    /// The zero instant doubles as "no tick observed yet"
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.usec == 0
    }

    pub fn advanced_by(&self, sec: i64, usec: i64) -> TimePoint {
        TimePoint::new(self.sec + sec, self.usec + usec)
    }

    fn normalize(&mut self) {
        self.sec += self.usec / 1_000_000;
        self.usec %= 1_000_000;
        if self.usec < 0 {
            self.usec += 1_000_000;
            self.sec -= 1;
        }
    }
}

/// Deadline-ordered queue of commands awaiting a paced retry.
///
/// Insertion keeps deadline order and is stable for equal deadlines; with a
/// fixed timer interval deadlines arrive monotonically, so the scan from the
/// back terminates immediately in the common case.
pub(crate) struct DelayQueue<T: Transport> {
    entries: VecDeque<(TimePoint, Command<T>)>,
}

impl<T: Transport> DelayQueue<T> {
    pub(crate) fn new() -> Self {
        DelayQueue {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, deadline: TimePoint, cmd: Command<T>) {
        let position = self
            .entries
            .iter()
            .rposition(|(entry_deadline, _)| *entry_deadline <= deadline)
            .map(|index| index + 1)
            .unwrap_or(0);
        self.entries.insert(position, (deadline, cmd));
    }

    /// Removes and returns the head if its deadline has passed
    pub(crate) fn pop_due(&mut self, now: TimePoint) -> Option<Command<T>> {
        match self.entries.front() {
            Some((deadline, _)) if *deadline <= now => self.entries.pop_front().map(|(_, cmd)| cmd),
            _ => None,
        }
    }

    pub(crate) fn pop_any(&mut self) -> Option<Command<T>> {
        self.entries.pop_front().map(|(_, cmd)| cmd)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
