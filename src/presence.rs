use serde::{Deserialize, Serialize};

/// Whether a vehicle currently occupies the monitored spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceState {
    Absent,
    Present,
}

/// A state-change edge emitted by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    /// Absent -> Present
    Entry,
    /// Present -> Absent
    Exit,
}

/// Hysteresis state machine over smoothed distances
///
/// A reading below `present_mm` asserts presence, a reading above
/// `absent_mm` asserts absence, and the band in between holds the current
/// state so noise near a single cutoff cannot chatter. A missing reading is
/// inconclusive and never forces a transition.
pub struct PresenceDetector {
    state: PresenceState,
    present_mm: u32,
    absent_mm: u32,
}

impl PresenceDetector {
    pub fn new(present_mm: u32, absent_mm: u32) -> Self {
        debug_assert!(present_mm < absent_mm);
        Self {
            state: PresenceState::Absent,
            present_mm,
            absent_mm,
        }
    }

    /// Current presence state
    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Feed one smoothed distance; returns the edge if the state changed
    pub fn observe(&mut self, smoothed_mm: Option<u32>) -> Option<PresenceEdge> {
        let d = smoothed_mm?;

        match self.state {
            PresenceState::Absent if d < self.present_mm => {
                self.state = PresenceState::Present;
                Some(PresenceEdge::Entry)
            }
            PresenceState::Present if d > self.absent_mm => {
                self.state = PresenceState::Absent;
                Some(PresenceEdge::Exit)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges_for(detector: &mut PresenceDetector, stream: &[u32]) -> Vec<(usize, PresenceEdge)> {
        stream
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| detector.observe(Some(d)).map(|e| (i, e)))
            .collect()
    }

    #[test]
    fn test_reference_stream_single_entry_and_exit() {
        let mut detector = PresenceDetector::new(500, 700);
        let stream = [800, 800, 400, 400, 400, 650, 650, 800, 800];
        let edges = edges_for(&mut detector, &stream);

        // One entry at the first 400, one exit at the first 800 after the
        // band readings; 650 sits inside the band and moves nothing
        assert_eq!(
            edges,
            vec![(2, PresenceEdge::Entry), (7, PresenceEdge::Exit)]
        );
        assert_eq!(detector.state(), PresenceState::Absent);
    }

    #[test]
    fn test_band_readings_hold_state() {
        let mut detector = PresenceDetector::new(500, 700);
        assert_eq!(detector.observe(Some(600)), None);
        assert_eq!(detector.state(), PresenceState::Absent);

        detector.observe(Some(400));
        assert_eq!(detector.state(), PresenceState::Present);
        assert_eq!(detector.observe(Some(600)), None);
        assert_eq!(detector.state(), PresenceState::Present);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let mut detector = PresenceDetector::new(500, 700);
        // Exactly at present_mm is still inside the band
        assert_eq!(detector.observe(Some(500)), None);
        assert_eq!(detector.observe(Some(499)), Some(PresenceEdge::Entry));
        // Exactly at absent_mm is still inside the band
        assert_eq!(detector.observe(Some(700)), None);
        assert_eq!(detector.observe(Some(701)), Some(PresenceEdge::Exit));
    }

    #[test]
    fn test_missing_reading_is_inconclusive() {
        let mut detector = PresenceDetector::new(500, 700);
        detector.observe(Some(300));
        assert_eq!(detector.state(), PresenceState::Present);

        // A failed read must not retract presence
        assert_eq!(detector.observe(None), None);
        assert_eq!(detector.state(), PresenceState::Present);
    }

    #[test]
    fn test_no_consecutive_entries_without_exit() {
        let mut detector = PresenceDetector::new(500, 700);
        let stream = [
            800, 450, 300, 200, 480, 650, 720, 710, 400, 390, 800, 250, 900,
        ];
        let edges = edges_for(&mut detector, &stream);

        let mut last = None;
        for (_, edge) in &edges {
            assert_ne!(Some(*edge), last, "repeated edge without its opposite");
            last = Some(*edge);
        }
        assert!(edges.first().map(|(_, e)| *e) == Some(PresenceEdge::Entry));
    }

    #[test]
    fn test_repeated_low_readings_emit_one_entry() {
        let mut detector = PresenceDetector::new(500, 700);
        let edges = edges_for(&mut detector, &[400, 380, 350, 420, 399]);
        assert_eq!(edges.len(), 1);
    }
}
