use blobgate_types::ObjectKey;

/// What happened to one archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Stored { key: ObjectKey, size: u64 },
    /// The entry carries nothing to transfer (directory marker, link, ...).
    Skipped { name: String, reason: String },
    Failed { name: String, reason: String },
}

/// Per-entry outcomes of one bulk operation, in stream order.
///
/// Only [`TransferReport::stored`] is reported back to callers; failures
/// surface through logs.
#[derive(Clone, Debug, Default)]
pub struct TransferReport {
    outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: TransferOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    /// Number of entries transferred successfully.
    pub fn stored(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Stored { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Failed { .. }))
    }

    /// Names of the entries that failed.
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
            TransferOutcome::Failed { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Total bytes of successfully transferred entries.
    pub fn bytes_stored(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TransferOutcome::Stored { size, .. } => *size,
                _ => 0,
            })
            .sum()
    }

    /// At least one entry failed.
    pub fn is_partial(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}
