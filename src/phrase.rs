//! Pluggable phrase-generator boundary.
//!
//! An external generator (e.g. a neural phrase model) may be injected per
//! render call. It receives one (instrument, section) request at a time with
//! an explicit time budget and returns beat-relative events or an error; on
//! any error — including its own timeout — the core falls back to the
//! algorithmic generator for that request. The core never measures wall
//! clock itself, so a render without a strategy is bit-reproducible.

use std::time::Duration;

use crate::song::{Meter, Section};
use crate::stem::{Event, Instrument};
use crate::theory::Chord;

/// One generation request: a single instrument over a single section.
pub struct PhraseRequest<'a> {
    pub instrument: Instrument,
    pub section: &'a Section,
    /// One chord per bar of the section.
    pub chords: &'a [Chord],
    pub density: f64,
    pub meter: Meter,
    /// The strategy must return (or give up) within this budget.
    pub time_budget: Duration,
}

/// Why a strategy produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhraseError {
    #[error("phrase generator exceeded its time budget")]
    Timeout,
    #[error("phrase generator failed: {0}")]
    Failed(String),
}

/// An injectable phrase generator. Implementations own their cancellation:
/// exceeding `time_budget` must surface as [`PhraseError::Timeout`], never a
/// hang.
pub trait PhraseGenerator {
    fn generate(&self, request: &PhraseRequest<'_>) -> Result<Vec<Event>, PhraseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    impl PhraseGenerator for AlwaysFails {
        fn generate(&self, _request: &PhraseRequest<'_>) -> Result<Vec<Event>, PhraseError> {
            Err(PhraseError::Failed("model unavailable".into()))
        }
    }

    #[test]
    fn error_messages_are_descriptive() {
        assert!(PhraseError::Timeout.to_string().contains("time budget"));
        let failed = AlwaysFails
            .generate(&PhraseRequest {
                instrument: Instrument::Keys,
                section: &Section {
                    name: "verse".into(),
                    length_bars: 4,
                },
                chords: &[],
                density: 0.5,
                meter: Meter {
                    numerator: 4,
                    denominator: 4,
                },
                time_budget: Duration::from_millis(50),
            })
            .unwrap_err();
        assert!(failed.to_string().contains("model unavailable"));
    }
}
