//! Poll sequencing watermark.
//!
//! Poll requests can overlap (scheduled tick plus an explicit or forced
//! refresh), and responses can arrive out of order. Each request is tagged
//! with a [`PollSeq`] at issue time; only the response to the **latest issued**
//! request may be merged.
//!
//! # Invariants
//!
//! - **Strictly increasing**: every [`issue`][PollSequencer::issue] returns
//!   a sequence greater than all previous ones.
//! - **Last issued wins**: a response is accepted only if its sequence equals
//!   the latest issued sequence. Earlier responses are superseded even if no
//!   later response has arrived yet.
//! - **Single acceptance**: a given sequence is accepted at most once.

/// Sequence number of one poll request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollSeq(u64);

impl PollSeq {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PollSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollFreshness {
    /// Response belongs to the latest issued request; merge it.
    Latest,
    /// A newer request was issued after this one; discard.
    Superseded { latest: PollSeq, got: PollSeq },
    /// This sequence was already accepted once.
    Duplicate { got: PollSeq },
}

impl PollFreshness {
    pub fn is_latest(&self) -> bool {
        matches!(self, PollFreshness::Latest)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PollSequencer {
    issued: u64,
    accepted: Option<u64>,
}

impl PollSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a new poll request.
    pub fn issue(&mut self) -> PollSeq {
        self.issued += 1;
        PollSeq(self.issued)
    }

    /// Read-only freshness probe.
    pub fn check(&self, seq: PollSeq) -> PollFreshness {
        if self.accepted == Some(seq.0) {
            return PollFreshness::Duplicate { got: seq };
        }
        if seq.0 != self.issued {
            return PollFreshness::Superseded {
                latest: PollSeq(self.issued),
                got: seq,
            };
        }
        PollFreshness::Latest
    }

    /// Check and, if latest, record the acceptance.
    pub fn accept(&mut self, seq: PollSeq) -> PollFreshness {
        let result = self.check(seq);
        if result.is_latest() {
            self.accepted = Some(seq.0);
        }
        result
    }

    pub fn last_issued(&self) -> Option<PollSeq> {
        (self.issued > 0).then_some(PollSeq(self.issued))
    }

    pub fn last_accepted(&self) -> Option<PollSeq> {
        self.accepted.map(PollSeq)
    }
}
