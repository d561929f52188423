//! Which of the two diff-calculation queues a dispatcher tick should serve
//! when both have work (§4.5): "draw `r ∈ [0,1)`; with probability
//! `calculateCLDataProportion = 0.8` do secondary, else primary."
//!
//! Grounded on the teacher's `Ballot` (cumulative-probability draw over a
//! `BTreeMap<ProofType, f64>`), generalized from a deterministic
//! per-block-hash seed to a fresh random draw each tick, since the spec
//! calls for a coin flip per poll rather than a replayable per-block
//! selection.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy)]
pub struct Ballot {
    /// Probability of choosing the secondary-branch queue when both queues
    /// have work (`calculateCLDataProportion` in the source).
    secondary_proportion: f64,
}

impl Default for Ballot {
    fn default() -> Self {
        Self::new(0.8).unwrap()
    }
}

impl Ballot {
    pub fn new(secondary_proportion: f64) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&secondary_proportion) {
            return Err(format!(
                "secondary_proportion must be in [0, 1], got {secondary_proportion}"
            ));
        }
        Ok(Self { secondary_proportion })
    }

    pub fn secondary_proportion(&self) -> f64 {
        self.secondary_proportion
    }

    /// Draws which queue to serve this tick, given both have work.
    pub fn draw(&self) -> Queue {
        self.draw_from(rand::random::<f64>())
    }

    /// Testable entry point: draws deterministically from a supplied `r`.
    pub fn draw_from(&self, r: f64) -> Queue {
        if r < self.secondary_proportion {
            Queue::Secondary
        } else {
            Queue::Primary
        }
    }
}
